//! The measurement loop: drives the plan, samples instruments each tick,
//! tolerates per-sample failures, polls cancellation, and guarantees device
//! teardown on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sweep_traits::{AuxSensor, Clock, Cryostat, Magnet, RampMode, Source, Temperatures};

use crate::cancel::CancelToken;
use crate::error::SweepError;
use crate::hw_error::map_hw_error;
use crate::phase::FieldLoop;
use crate::plan::{RunOutcome, SamplePoint, SweepPlan};
use crate::signals::SignalChannel;
use crate::sink::{DataSink, Notifier, status_block};
use crate::stabilize::StabilityDetector;
use crate::trajectory::Trajectory;

/// Physical bounds checked at build time. A plan outside these limits never
/// starts. The low-temperature floor is per-rig configuration, not a
/// constant: the source-of-truth rigs disagreed on its value.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_temperature_k: f64,
    pub max_temp_rate_k_per_min: f64,
    pub max_field_t: f64,
    pub max_field_rate_t_per_min: f64,
    pub max_bias_v: f64,
    /// If the realized temperature ends below this, the set-point is forced
    /// back up before finishing.
    pub temp_floor_k: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_temperature_k: 299.0,
            max_temp_rate_k_per_min: 2.5,
            max_field_t: 8.0,
            max_field_rate_t_per_min: 1.0,
            max_bias_v: 10.0,
            temp_floor_k: 10.0,
        }
    }
}

/// Loop pacing and field tolerances.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Inter-sample interval of the tick loops.
    pub tick: Duration,
    /// Settle delay after a ramp phase reaches its target.
    pub settle: Duration,
    /// Poll interval while waiting for the field to reach a set-point.
    pub field_poll: Duration,
    /// A field is "reached" within this many tesla of its target.
    pub field_tolerance_t: f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            settle: Duration::from_secs(2),
            field_poll: Duration::from_secs(1),
            field_tolerance_t: 0.001,
        }
    }
}

/// Early-exit signal for the inner loops.
enum Flow {
    Continue,
    Abort,
}

/// One configured measurement run. Built via `Sweep::builder()`; `run()`
/// consumes a full sweep and reports exactly one `RunOutcome`.
pub struct SweepRunner {
    pub(crate) plan: SweepPlan,
    pub(crate) source: Box<dyn Source>,
    pub(crate) cryostat: Option<Box<dyn Cryostat>>,
    pub(crate) magnet: Option<Box<dyn Magnet>>,
    pub(crate) level_meter: Option<Box<dyn AuxSensor>>,
    pub(crate) sink: Box<dyn DataSink>,
    pub(crate) signals: Box<dyn SignalChannel>,
    pub(crate) notifier: Box<dyn Notifier>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) cancel: CancelToken,
    pub(crate) pacing: Pacing,
    pub(crate) detector: StabilityDetector,
    pub(crate) temp_floor_k: f64,

    pub(crate) epoch: Instant,
    pub(crate) last_temps: Temperatures,
    pub(crate) have_temps: bool,
    pub(crate) last_field_t: f64,
    pub(crate) last_pid_toggle_ms: u64,
    pub(crate) sample_failures: u64,
    pub(crate) torn_down: bool,
}

impl core::fmt::Debug for SweepRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SweepRunner")
            .field("plan", &self.plan)
            .field("sample_failures", &self.sample_failures)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl SweepRunner {
    /// Execute the run to completion, abort, or setup failure. Teardown runs
    /// exactly once on every exit path.
    pub fn run(&mut self) -> RunOutcome {
        self.torn_down = false;
        if let Err(e) = self.setup() {
            tracing::error!(error = %e, "sweep setup failed");
            let outcome = RunOutcome::FailedSetup(e);
            self.teardown(&outcome.message());
            return outcome;
        }

        let plan = self.plan.clone();
        tracing::info!(kind = plan.kind(), "sweep started");
        let flow = match plan {
            SweepPlan::VoltageRamp {
                start_v,
                end_v,
                points,
            } => self.sweep_trajectory(Trajectory::ramp(start_v, end_v, points)),
            SweepPlan::VoltageHysteresis {
                amplitude_v,
                points_per_leg,
                loops,
            } => self.sweep_trajectory(Trajectory::hysteresis(amplitude_v, points_per_leg, loops)),
            SweepPlan::TemperatureRamp { end_k, .. } => self.temperature_loop(end_k),
            SweepPlan::FieldHysteresis { max_field_t, .. } => self.field_loop(max_field_t),
            SweepPlan::SteppedField {
                fields_t,
                amplitude_v,
                points_per_leg,
                ..
            } => self.stepped_field(&fields_t, amplitude_v, points_per_leg),
        };

        let outcome = match flow {
            Flow::Continue => RunOutcome::Completed,
            Flow::Abort => RunOutcome::Aborted,
        };
        tracing::info!(outcome = %outcome, failures = self.sample_failures, "sweep ended");
        self.teardown(&outcome.message());
        outcome
    }

    /// Number of per-sample acquisition failures tolerated during the run.
    pub fn sample_failures(&self) -> u64 {
        self.sample_failures
    }

    // ── setup ────────────────────────────────────────────────────────────

    fn setup(&mut self) -> std::result::Result<(), SweepError> {
        self.epoch = self.clock.now();
        self.last_pid_toggle_ms = 0;
        self.sample_failures = 0;
        self.have_temps = false;
        self.last_field_t = 0.0;
        self.detector.reset();

        self.source
            .arm()
            .map_err(|e| SweepError::Setup(format!("arm source: {}", map_hw_error(&*e))))?;

        match self.plan.clone() {
            SweepPlan::TemperatureRamp {
                end_k,
                rate_k_per_min,
                bias_v,
            } => {
                let cryo = self
                    .cryostat
                    .as_mut()
                    .ok_or_else(|| SweepError::Setup("cryostat missing".into()))?;
                let temps = cryo.temperatures().map_err(|e| {
                    SweepError::Setup(format!("read temperatures: {}", map_hw_error(&*e)))
                })?;
                // Ramp from where the system actually is, not from the old
                // set-point.
                cryo.set_setpoint(temps.t1).map_err(|e| {
                    SweepError::Setup(format!("set set-point: {}", map_hw_error(&*e)))
                })?;
                cryo.begin_ramp(end_k, rate_k_per_min).map_err(|e| {
                    SweepError::Setup(format!("start temperature ramp: {}", map_hw_error(&*e)))
                })?;
                self.last_temps = temps;
                self.have_temps = true;
                self.apply_bias(bias_v)?;
                self.send_notification(&format!("Start of sweep to {end_k:.2} K"));
            }
            SweepPlan::FieldHysteresis {
                rate_t_per_min,
                bias_v,
                max_field_t,
            } => {
                self.init_magnet(rate_t_per_min)?;
                self.apply_bias(bias_v)?;
                self.send_notification(&format!("Start of field loop to {max_field_t:.3} T"));
            }
            SweepPlan::SteppedField { rate_t_per_min, .. } => {
                self.init_magnet(rate_t_per_min)?;
                self.send_notification("Start of stepped-field sweep");
            }
            SweepPlan::VoltageRamp { .. } | SweepPlan::VoltageHysteresis { .. } => {
                self.send_notification(&format!("Start of {}", self.plan.kind()));
            }
        }
        Ok(())
    }

    fn init_magnet(&mut self, rate_t_per_min: f64) -> std::result::Result<(), SweepError> {
        let mag = self
            .magnet
            .as_mut()
            .ok_or_else(|| SweepError::Setup("magnet missing".into()))?;
        mag.set_mode(RampMode::Hold)
            .map_err(|e| SweepError::Setup(format!("magnet hold: {}", map_hw_error(&*e))))?;
        mag.set_ramp_rate(rate_t_per_min)
            .map_err(|e| SweepError::Setup(format!("magnet ramp rate: {}", map_hw_error(&*e))))?;
        Ok(())
    }

    fn apply_bias(&mut self, bias_v: f64) -> std::result::Result<(), SweepError> {
        self.source
            .apply(bias_v)
            .map_err(|e| SweepError::Setup(format!("apply bias: {}", map_hw_error(&*e))))
    }

    // ── plan loops ───────────────────────────────────────────────────────

    /// Step through a set-point sequence, sampling after each application.
    /// Cancellation is checked before every step; per-step failures are
    /// logged and skipped.
    fn sweep_trajectory(&mut self, trajectory: Trajectory) -> Flow {
        for set_point in trajectory {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested, aborting trajectory");
                self.signals.emit_aborted();
                return Flow::Abort;
            }
            if let Err(e) = self.apply_and_sample(set_point) {
                self.sample_failures += 1;
                tracing::warn!(error = %e, set_point, "failed to acquire data point");
            }
        }
        Flow::Continue
    }

    /// Tick loop for the temperature ramp: sample, nudge the PID, evaluate
    /// stabilization on t1 (control) and t3 (monitored), sleep.
    fn temperature_loop(&mut self, end_k: f64) -> Flow {
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested, aborting temperature sweep");
                self.signals.emit_aborted();
                return Flow::Abort;
            }
            if let Err(e) = self.sample_tick() {
                self.sample_failures += 1;
                tracing::warn!(error = %e, "failed to acquire data point");
            }
            self.toggle_pid_if_necessary();

            if self.have_temps {
                let temps = self.last_temps;
                if self.detector.observe(end_k, temps.t1, temps.t3) {
                    tracing::info!(t1 = temps.t1, "final temperature stabilized");
                    self.enforce_temp_floor();
                    return Flow::Continue;
                }
            }
            self.clock.sleep(self.pacing.tick);
        }
    }

    /// Tick loop for the full field hysteresis excursion.
    fn field_loop(&mut self, max_field_t: f64) -> Flow {
        let mut lp = FieldLoop::new(max_field_t, self.pacing.field_tolerance_t, self.pacing.settle);
        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested, aborting field loop");
                self.signals.emit_aborted();
                return Flow::Abort;
            }
            if let Some(mag) = self.magnet.as_mut() {
                // Magnet write failures are per-tick transients; the next
                // tick retries the same phase action.
                if let Err(e) = lp.advance(mag.as_mut(), &*self.clock) {
                    self.sample_failures += 1;
                    tracing::warn!(error = %e, phase = ?lp.phase(), "field loop tick failed");
                }
            }
            if lp.is_done() {
                return Flow::Continue;
            }
            self.last_field_t = lp.last_field();
            if let Err(e) = self.sample_tick() {
                self.sample_failures += 1;
                tracing::warn!(error = %e, "failed to acquire data point");
            }
            self.clock.sleep(self.pacing.tick);
        }
    }

    /// Visit each listed field: stabilize there, then run the up/down
    /// voltage ramp.
    fn stepped_field(&mut self, fields_t: &[f64], amplitude_v: f64, points_per_leg: usize) -> Flow {
        for &field_t in fields_t {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested, aborting stepped-field sweep");
                self.signals.emit_aborted();
                return Flow::Abort;
            }
            match self.goto_field(field_t) {
                Ok(Flow::Abort) => return Flow::Abort,
                Ok(Flow::Continue) => {}
                Err(e) => {
                    // Skip this field rather than kill the whole run.
                    self.sample_failures += 1;
                    tracing::warn!(error = %e, field_t, "could not reach field, skipping");
                    continue;
                }
            }
            self.clock.sleep(self.pacing.settle);
            if let Flow::Abort = self.sweep_trajectory(Trajectory::up_down(amplitude_v, points_per_leg))
            {
                return Flow::Abort;
            }
        }
        Flow::Continue
    }

    /// Drive the magnet to `field_t` and poll until within tolerance.
    fn goto_field(
        &mut self,
        field_t: f64,
    ) -> std::result::Result<Flow, Box<dyn std::error::Error + Send + Sync>> {
        let tolerance = self.pacing.field_tolerance_t;
        let Some(mag) = self.magnet.as_mut() else {
            return Err("magnet missing".into());
        };
        mag.set_target(field_t)?;
        mag.set_mode(RampMode::ToSetpoint)?;
        tracing::debug!(field_t, "new field set-point");

        loop {
            if self.cancel.is_cancelled() {
                self.signals.emit_aborted();
                return Ok(Flow::Abort);
            }
            match mag.field() {
                Ok(b) => {
                    self.last_field_t = b;
                    if (b - field_t).abs() < tolerance {
                        return Ok(Flow::Continue);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, stale_t = self.last_field_t,
                        "field read failed while approaching set-point");
                }
            }
            self.clock.sleep(self.pacing.field_poll);
        }
    }

    // ── sampling ─────────────────────────────────────────────────────────

    fn apply_and_sample(
        &mut self,
        set_point: f64,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.source.apply(set_point)?;
        self.sample_tick()
    }

    /// Acquire one data point and push it to the sink and the live channel.
    /// Channel layout depends on the plan: field plans prepend `b`, plans
    /// with a cryostat append the temperature triplet (or just `t3` for
    /// plain voltage sweeps).
    fn sample_tick(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (v, i) = self.source.read()?;
        let mut channels: Vec<(&'static str, f64)> = Vec::with_capacity(6);
        if self.plan.needs_magnet() {
            let b = match self.magnet.as_mut() {
                Some(mag) => match mag.field() {
                    Ok(b) => {
                        self.last_field_t = b;
                        b
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, stale_t = self.last_field_t,
                            "field read failed, recording last value");
                        self.last_field_t
                    }
                },
                None => self.last_field_t,
            };
            channels.push(("b", b));
        }
        channels.push(("v", v));
        channels.push(("i", i));
        if let Some(temps) = self.read_temperatures() {
            if self.plan.needs_cryostat() {
                channels.push(("t1", temps.t1));
                channels.push(("t2", temps.t2));
                channels.push(("t3", temps.t3));
            } else {
                channels.push(("t3", temps.t3));
            }
        }
        let point = SamplePoint::now(channels);
        self.sink.record(&point)?;
        self.signals.emit(&point);
        Ok(())
    }

    /// Temperature triplet with stale-value fallback: an intermittent read
    /// failure reuses the last good triplet instead of failing the sample.
    fn read_temperatures(&mut self) -> Option<Temperatures> {
        let cryo = self.cryostat.as_mut()?;
        match cryo.temperatures() {
            Ok(t) => {
                self.last_temps = t;
                self.have_temps = true;
                Some(t)
            }
            Err(e) => {
                tracing::warn!(error = %e, "temperature read failed, reusing last value");
                self.have_temps.then_some(self.last_temps)
            }
        }
    }

    // ── temperature-sweep helpers ────────────────────────────────────────

    /// In the 20-30 K band the controller's auto-PID occasionally winds up;
    /// cycling it off and on once per 100 s keeps the ramp smooth.
    fn toggle_pid_if_necessary(&mut self) {
        if !self.have_temps {
            return;
        }
        let t1 = self.last_temps.t1;
        let now_ms = self.clock.ms_since(self.epoch);
        if !(20.0 < t1 && t1 < 30.0) || now_ms.saturating_sub(self.last_pid_toggle_ms) < 100_000 {
            return;
        }
        if let Some(cryo) = self.cryostat.as_mut() {
            if let Err(e) = cryo.set_auto_pid(false) {
                tracing::warn!(error = %e, "auto-PID off failed");
            }
            self.clock.sleep(Duration::from_millis(500));
            if let Err(e) = cryo.set_auto_pid(true) {
                tracing::warn!(error = %e, "auto-PID on failed");
            }
            self.last_pid_toggle_ms = now_ms;
            tracing::debug!(t1, "auto-PID cycled");
        }
    }

    /// Low-temperature safety: never leave the set-point below the floor.
    fn enforce_temp_floor(&mut self) {
        if self.last_temps.t1 >= self.temp_floor_k {
            return;
        }
        let floor = self.temp_floor_k;
        tracing::info!(floor, "set-point raised to floor for safety");
        if let Some(cryo) = self.cryostat.as_mut()
            && let Err(e) = cryo.set_setpoint(floor)
        {
            tracing::warn!(error = %e, "raising set-point to floor failed");
        }
    }

    // ── teardown ─────────────────────────────────────────────────────────

    /// Return every driven output to a safe state, once. Safe to call again;
    /// subsequent calls are no-ops.
    fn teardown(&mut self, message: &str) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.source.apply(0.0) {
            tracing::warn!(error = %e, "zeroing source output failed");
        }
        if let Err(e) = self.source.disarm() {
            tracing::warn!(error = %e, "disarming source failed");
        }
        if self.plan.sweeps_temperature()
            && let Some(cryo) = self.cryostat.as_mut()
            && let Err(e) = cryo.end_ramp()
        {
            tracing::warn!(error = %e, "stopping temperature ramp failed");
        }
        if self.plan.needs_magnet() {
            self.zero_magnet();
        }
        self.send_notification(message);
        tracing::info!("teardown complete");
    }

    /// Ramp the field to zero and hold. Teardown ignores the cancel token;
    /// a hung instrument call blocks here (known operational risk, no
    /// per-call timeouts).
    fn zero_magnet(&mut self) {
        let tolerance = self.pacing.field_tolerance_t;
        let Some(mag) = self.magnet.as_mut() else {
            return;
        };
        if let Err(e) = mag.set_target(0.0) {
            tracing::warn!(error = %e, "magnet zero target failed");
            return;
        }
        if let Err(e) = mag.set_mode(RampMode::ToZero) {
            tracing::warn!(error = %e, "magnet to-zero mode failed");
            return;
        }
        loop {
            match mag.field() {
                Ok(b) if b.abs() < tolerance => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "field read failed while zeroing, giving up wait");
                    break;
                }
            }
            self.clock.sleep(self.pacing.field_poll);
        }
        if let Err(e) = mag.set_mode(RampMode::Hold) {
            tracing::warn!(error = %e, "magnet hold failed after zeroing");
        }
    }

    /// Best-effort notification with a cryostat/helium status block when
    /// available. Never fails the run.
    fn send_notification(&mut self, message: &str) {
        let mut text = message.to_string();
        let mut include_status = false;
        if let Some(cryo) = self.cryostat.as_mut() {
            match cryo.status() {
                Ok(st) => {
                    let helium = self
                        .level_meter
                        .as_mut()
                        .and_then(|m| m.read_scalar().ok());
                    text.push('\n');
                    text.push_str(&status_block(&st, helium));
                    include_status = true;
                }
                Err(e) => tracing::warn!(error = %e, "cryostat status unavailable"),
            }
        }
        if let Err(e) = self.notifier.notify(&text, include_status) {
            tracing::warn!(error = %e, "notifier failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{CountingNotifier, RecordingSink, ScriptedSource};
    use sweep_traits::clock::ManualClock;

    #[test]
    fn repeated_teardown_is_a_no_op() {
        let source = ScriptedSource::new();
        let state = source.state();
        let notifier = CountingNotifier::new();

        let mut runner = SweepRunner::builder()
            .with_plan(SweepPlan::VoltageRamp {
                start_v: 0.0,
                end_v: 1.0,
                points: 2,
            })
            .with_source(source)
            .with_sink(RecordingSink::new())
            .with_notifier(notifier.clone())
            .with_clock(Box::new(ManualClock::new()))
            .build()
            .unwrap();
        assert!(runner.run().is_completed());

        // run() already tore down; further calls must not touch the rig.
        runner.teardown("late teardown");
        runner.teardown("late teardown");

        let st = state.lock().unwrap();
        assert_eq!(st.disarm_calls, 1);
        assert_eq!(st.applied, vec![0.0, 1.0, 0.0]);
        assert_eq!(notifier.count(), 2);
    }
}
