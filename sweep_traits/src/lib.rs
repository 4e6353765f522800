//! Capability traits for the instruments driven by the sweep engine.
//!
//! Concrete drivers (bench hardware, simulators, test doubles) live elsewhere;
//! the engine in `sweep_core` only ever talks to these traits. All methods
//! return boxed errors so drivers are free to use their own error types.

pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// A driven source-meter output.
///
/// `disarm()` must be safe to call even if `arm()` never succeeded; teardown
/// relies on that.
pub trait Source {
    fn arm(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn disarm(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Command an output level (volts for a voltage-driven source).
    fn apply(&mut self, level: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Read back one data point: (applied level, measured response).
    fn read(&mut self) -> Result<(f64, f64), Box<dyn std::error::Error + Send + Sync>>;
}

/// Temperature triplet from a cryostat controller (sample, shield, sensor 3).
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Temperatures {
    pub t1: f64,
    pub t2: f64,
    pub t3: f64,
}

/// Snapshot of the controller state used for notifier status blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CryostatStatus {
    pub set_point_k: f64,
    pub heater_percent: f64,
    pub gas_flow_percent: f64,
    pub auto_pid: bool,
    pub ramp_active: bool,
}

/// A temperature controller with a built-in set-point ramp.
pub trait Cryostat {
    fn set_setpoint(&mut self, kelvin: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Start ramping the set-point toward `target_k` at `rate_k_per_min`.
    fn begin_ramp(
        &mut self,
        target_k: f64,
        rate_k_per_min: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn end_ramp(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn temperatures(&mut self) -> Result<Temperatures, Box<dyn std::error::Error + Send + Sync>>;
    fn set_auto_pid(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn status(&mut self) -> Result<CryostatStatus, Box<dyn std::error::Error + Send + Sync>>;
}

/// Sweep mode of a magnet power supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampMode {
    ToSetpoint,
    ToZero,
    Hold,
}

/// A superconducting magnet power supply.
pub trait Magnet {
    fn set_target(&mut self, tesla: f64) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn set_ramp_rate(
        &mut self,
        tesla_per_min: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn set_mode(&mut self, mode: RampMode) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn field(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}

/// A read-only auxiliary sensor (e.g. a helium level meter).
///
/// Reads may fail intermittently; callers are expected to reuse the last
/// good value rather than abort.
pub trait AuxSensor {
    fn read_scalar(&mut self) -> Result<f64, Box<dyn std::error::Error + Send + Sync>>;
}
