//! Immutable sweep descriptions and per-run data types.

use chrono::{DateTime, Utc};

use crate::error::SweepError;

/// What one measurement run should do. Created once at setup, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum SweepPlan {
    /// Linear voltage ramp, `points` evenly spaced set-points inclusive.
    VoltageRamp {
        start_v: f64,
        end_v: f64,
        points: usize,
    },
    /// Ferroelectric hysteresis loop: 0 -> +A, then `loops` repetitions of
    /// +A -> 0 -> -A -> 0 -> +A, then +A -> 0.
    VoltageHysteresis {
        amplitude_v: f64,
        points_per_leg: usize,
        loops: usize,
    },
    /// Ramp the cryostat toward `end_k` while sampling at a fixed bias.
    TemperatureRamp {
        end_k: f64,
        rate_k_per_min: f64,
        bias_v: f64,
    },
    /// Full field hysteresis loop (+max, -max, +max, zero) at a fixed bias.
    FieldHysteresis {
        max_field_t: f64,
        rate_t_per_min: f64,
        bias_v: f64,
    },
    /// For each listed field: stabilize, then run an up/down voltage ramp.
    SteppedField {
        fields_t: Vec<f64>,
        rate_t_per_min: f64,
        amplitude_v: f64,
        points_per_leg: usize,
    },
}

impl SweepPlan {
    /// Plans that ramp the cryostat or record the full temperature triplet.
    pub fn needs_cryostat(&self) -> bool {
        matches!(
            self,
            SweepPlan::TemperatureRamp { .. }
                | SweepPlan::FieldHysteresis { .. }
                | SweepPlan::SteppedField { .. }
        )
    }

    pub fn needs_magnet(&self) -> bool {
        matches!(
            self,
            SweepPlan::FieldHysteresis { .. } | SweepPlan::SteppedField { .. }
        )
    }

    pub fn sweeps_temperature(&self) -> bool {
        matches!(self, SweepPlan::TemperatureRamp { .. })
    }

    /// Short label used in log lines and data file headers.
    pub fn kind(&self) -> &'static str {
        match self {
            SweepPlan::VoltageRamp { .. } => "voltage-ramp",
            SweepPlan::VoltageHysteresis { .. } => "voltage-hysteresis",
            SweepPlan::TemperatureRamp { .. } => "temperature-ramp",
            SweepPlan::FieldHysteresis { .. } => "field-hysteresis",
            SweepPlan::SteppedField { .. } => "stepped-field",
        }
    }
}

/// One acquired reading: timestamp plus named channel values, in the order
/// they appear in the data file.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePoint {
    pub at: DateTime<Utc>,
    pub channels: Vec<(&'static str, f64)>,
}

impl SamplePoint {
    pub fn now(channels: Vec<(&'static str, f64)>) -> Self {
        Self {
            at: Utc::now(),
            channels,
        }
    }

    pub fn channel(&self, name: &str) -> Option<f64> {
        self.channels
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }
}

/// Terminal outcome of one run; produced exactly once by the runner.
#[derive(Debug)]
pub enum RunOutcome {
    Completed,
    Aborted,
    FailedSetup(SweepError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    /// Human-readable message sent to the notifier at teardown.
    pub fn message(&self) -> String {
        match self {
            RunOutcome::Completed => "Measurement finished, sweep stopped.".to_string(),
            RunOutcome::Aborted => "Measurement aborted, sweep stopped.".to_string(),
            RunOutcome::FailedSetup(e) => format!("Measurement setup failed: {e}"),
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Aborted => write!(f, "aborted"),
            RunOutcome::FailedSetup(e) => write!(f, "setup failed: {e}"),
        }
    }
}
