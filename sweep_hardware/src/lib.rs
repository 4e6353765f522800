#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Simulated bench instruments implementing the `sweep_traits` capabilities.
//!
//! Every model is deterministic: state only changes when a method is called,
//! so a run paced by a `ManualClock` produces the same trace every time. The
//! simulators stand in for the GPIB-attached source-meter, ITC temperature
//! controller, IPS magnet supply, and ILM level meter of a real rig.

pub mod error;

use error::HwError;
use sweep_traits::{AuxSensor, Cryostat, CryostatStatus, Magnet, RampMode, Source, Temperatures};

/// Simulated voltage-driven source-meter with an ohmic load attached.
///
/// `read()` returns (applied volts, applied / load amps). Reading or applying
/// before `arm()` fails with `HwError::NotArmed`; `disarm()` always succeeds.
pub struct SimSourceMeter {
    armed: bool,
    level_v: f64,
    load_ohms: f64,
}

impl SimSourceMeter {
    pub fn new() -> Self {
        Self::with_load(1.0e6)
    }

    pub fn with_load(load_ohms: f64) -> Self {
        Self {
            armed: false,
            level_v: 0.0,
            load_ohms,
        }
    }
}

impl Default for SimSourceMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Source for SimSourceMeter {
    fn arm(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.armed = true;
        tracing::debug!("sim source armed");
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.armed = false;
        Ok(())
    }

    fn apply(&mut self, level: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.armed {
            return Err(Box::new(HwError::NotArmed));
        }
        self.level_v = level;
        Ok(())
    }

    fn read(&mut self) -> Result<(f64, f64), Box<dyn std::error::Error + Send + Sync>> {
        if !self.armed {
            return Err(Box::new(HwError::NotArmed));
        }
        Ok((self.level_v, self.level_v / self.load_ohms))
    }
}

/// Simulated cryostat: the sample sensor `t1` steps toward the ramp target on
/// every `temperatures()` call, `t3` lags `t1` first-order, `t2` trails `t1`
/// with a fixed offset.
pub struct SimCryostat {
    t1: f64,
    t2_offset: f64,
    t3: f64,
    set_point: f64,
    ramp_target: Option<f64>,
    rate_k_per_min: f64,
    /// Simulated wall seconds represented by one `temperatures()` call.
    seconds_per_read: f64,
    auto_pid: bool,
    pid_toggles: Vec<bool>,
    heater_percent: f64,
    gas_flow_percent: f64,
}

impl SimCryostat {
    pub fn new(start_k: f64) -> Self {
        Self {
            t1: start_k,
            t2_offset: 0.5,
            t3: start_k,
            set_point: start_k,
            ramp_target: None,
            rate_k_per_min: 1.0,
            seconds_per_read: 1.0,
            auto_pid: true,
            pid_toggles: Vec::new(),
            heater_percent: 12.0,
            gas_flow_percent: 30.0,
        }
    }

    /// Override the wall seconds one read represents (shrinks or stretches
    /// the simulated ramp; tests use large values to converge quickly).
    pub fn with_seconds_per_read(mut self, s: f64) -> Self {
        self.seconds_per_read = s;
        self
    }

    pub fn auto_pid_toggles(&self) -> &[bool] {
        &self.pid_toggles
    }

    pub fn set_point(&self) -> f64 {
        self.set_point
    }

    fn step(&mut self) {
        if let Some(target) = self.ramp_target {
            let step_k = self.rate_k_per_min / 60.0 * self.seconds_per_read;
            let delta = target - self.t1;
            if delta.abs() <= step_k {
                self.t1 = target;
            } else {
                self.t1 += step_k * delta.signum();
            }
        }
        // first-order lag toward t1
        self.t3 += (self.t1 - self.t3) * 0.5;
    }
}

impl Cryostat for SimCryostat {
    fn set_setpoint(&mut self, kelvin: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.set_point = kelvin;
        Ok(())
    }

    fn begin_ramp(
        &mut self,
        target_k: f64,
        rate_k_per_min: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ramp_target = Some(target_k);
        self.rate_k_per_min = rate_k_per_min;
        tracing::debug!(target_k, rate_k_per_min, "sim cryostat ramp started");
        Ok(())
    }

    fn end_ramp(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ramp_target = None;
        Ok(())
    }

    fn temperatures(&mut self) -> Result<Temperatures, Box<dyn std::error::Error + Send + Sync>> {
        self.step();
        Ok(Temperatures {
            t1: self.t1,
            t2: self.t1 + self.t2_offset,
            t3: self.t3,
        })
    }

    fn set_auto_pid(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.auto_pid = on;
        self.pid_toggles.push(on);
        Ok(())
    }

    fn status(&mut self) -> Result<CryostatStatus, Box<dyn std::error::Error + Send + Sync>> {
        Ok(CryostatStatus {
            set_point_k: self.set_point,
            heater_percent: self.heater_percent,
            gas_flow_percent: self.gas_flow_percent,
            auto_pid: self.auto_pid,
            ramp_active: self.ramp_target.is_some(),
        })
    }
}

/// Simulated magnet supply: the field steps toward the target on every
/// `field()` read while the mode commands movement; `Hold` freezes it.
pub struct SimMagnet {
    field_t: f64,
    target_t: f64,
    rate_t_per_min: f64,
    mode: RampMode,
    seconds_per_read: f64,
    fail_writes: bool,
}

impl SimMagnet {
    pub fn new() -> Self {
        Self {
            field_t: 0.0,
            target_t: 0.0,
            rate_t_per_min: 0.5,
            mode: RampMode::Hold,
            seconds_per_read: 1.0,
            fail_writes: false,
        }
    }

    pub fn with_seconds_per_read(mut self, s: f64) -> Self {
        self.seconds_per_read = s;
        self
    }

    /// Make every write fail with a bus error (for fault-tolerance tests).
    pub fn fail_writes(&mut self, on: bool) {
        self.fail_writes = on;
    }

    pub fn mode(&self) -> RampMode {
        self.mode
    }

    fn check_write(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_writes {
            return Err(Box::new(HwError::Bus("injected write failure".into())));
        }
        Ok(())
    }
}

impl Default for SimMagnet {
    fn default() -> Self {
        Self::new()
    }
}

impl Magnet for SimMagnet {
    fn set_target(&mut self, tesla: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check_write()?;
        self.target_t = tesla;
        Ok(())
    }

    fn set_ramp_rate(
        &mut self,
        tesla_per_min: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check_write()?;
        self.rate_t_per_min = tesla_per_min;
        Ok(())
    }

    fn set_mode(&mut self, mode: RampMode) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check_write()?;
        self.mode = mode;
        Ok(())
    }

    fn field(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        let target = match self.mode {
            RampMode::ToSetpoint => self.target_t,
            RampMode::ToZero => 0.0,
            RampMode::Hold => return Ok(self.field_t),
        };
        let step_t = self.rate_t_per_min / 60.0 * self.seconds_per_read;
        let delta = target - self.field_t;
        if delta.abs() <= step_t {
            self.field_t = target;
        } else {
            self.field_t += step_t * delta.signum();
        }
        Ok(self.field_t)
    }
}

/// Simulated helium level meter reporting a constant level.
pub struct SimLevelMeter {
    level_percent: f64,
}

impl SimLevelMeter {
    pub fn new(level_percent: f64) -> Self {
        Self { level_percent }
    }
}

impl AuxSensor for SimLevelMeter {
    fn read_scalar(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.level_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_rejects_reads_before_arm() {
        let mut smu = SimSourceMeter::new();
        assert!(smu.read().is_err());
        assert!(smu.apply(1.0).is_err());
        smu.arm().unwrap();
        smu.apply(2.0).unwrap();
        let (v, i) = smu.read().unwrap();
        assert_eq!(v, 2.0);
        assert!(i > 0.0);
        // disarm is always safe, armed or not
        smu.disarm().unwrap();
        smu.disarm().unwrap();
    }

    #[test]
    fn cryostat_ramps_toward_target_and_t3_lags() {
        let mut itc = SimCryostat::new(20.0).with_seconds_per_read(60.0);
        itc.begin_ramp(10.0, 1.0).unwrap();
        let first = itc.temperatures().unwrap();
        assert!(first.t1 < 20.0);
        let mut last = first;
        for _ in 0..30 {
            last = itc.temperatures().unwrap();
        }
        assert_eq!(last.t1, 10.0);
        assert!((last.t3 - 10.0).abs() < 0.1);
    }

    #[test]
    fn magnet_holds_when_commanded() {
        let mut mag = SimMagnet::new().with_seconds_per_read(60.0);
        mag.set_target(1.0).unwrap();
        mag.set_mode(RampMode::ToSetpoint).unwrap();
        let b1 = mag.field().unwrap();
        assert!(b1 > 0.0);
        mag.set_mode(RampMode::Hold).unwrap();
        let frozen = mag.field().unwrap();
        assert_eq!(mag.field().unwrap(), frozen);
    }

    #[test]
    fn magnet_write_injection_fails_writes_only() {
        let mut mag = SimMagnet::new();
        mag.fail_writes(true);
        assert!(mag.set_target(1.0).is_err());
        assert!(mag.set_mode(RampMode::ToZero).is_err());
        assert!(mag.field().is_ok());
    }
}
