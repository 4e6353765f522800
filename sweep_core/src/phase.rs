//! Multi-leg field sweep state machine.
//!
//! Sequences a full hysteresis excursion of the magnet: up to +max, down to
//! -max, back up to +max, then to zero. Transitions are strictly
//! one-directional and each state is visited at most once per run.

use std::time::Duration;

use sweep_traits::{Clock, Magnet, RampMode};

/// Phases of the field loop, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPhase {
    Start,
    RampingUp,
    HoldingUp,
    RampingDown,
    HoldingDown,
    RampingBackUp,
    HoldingUp2,
    RampingToZero,
    Done,
}

/// Driver for one field hysteresis excursion. `advance` is called once per
/// runner tick; magnet write failures propagate to the caller (which treats
/// them as per-tick transient errors), field read failures never do.
#[derive(Debug)]
pub struct FieldLoop {
    phase: FieldPhase,
    max_field_t: f64,
    tolerance_t: f64,
    settle: Duration,
    last_field_t: f64,
    read_failures: u64,
}

impl FieldLoop {
    pub fn new(max_field_t: f64, tolerance_t: f64, settle: Duration) -> Self {
        Self {
            phase: FieldPhase::Start,
            max_field_t,
            tolerance_t,
            settle,
            last_field_t: 0.0,
            read_failures: 0,
        }
    }

    pub fn phase(&self) -> FieldPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == FieldPhase::Done
    }

    /// Last known field value (stale fallback when a read fails).
    pub fn last_field(&self) -> f64 {
        self.last_field_t
    }

    pub fn read_failures(&self) -> u64 {
        self.read_failures
    }

    /// One tick of the state machine.
    pub fn advance(
        &mut self,
        magnet: &mut dyn Magnet,
        clock: &dyn Clock,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let field = match magnet.field() {
            Ok(b) => b,
            Err(e) => {
                self.read_failures += 1;
                tracing::warn!(error = %e, stale_t = self.last_field_t,
                    "field read failed, reusing last value");
                self.last_field_t
            }
        };
        self.last_field_t = field;

        let max = self.max_field_t;
        match self.phase {
            FieldPhase::Start => {
                magnet.set_target(max)?;
                magnet.set_mode(RampMode::ToSetpoint)?;
                self.phase = FieldPhase::RampingUp;
            }
            FieldPhase::RampingUp => {
                if (field - max).abs() < self.tolerance_t {
                    clock.sleep(self.settle);
                    magnet.set_mode(RampMode::Hold)?;
                    self.phase = FieldPhase::HoldingUp;
                }
            }
            FieldPhase::HoldingUp => {
                magnet.set_target(-max)?;
                magnet.set_mode(RampMode::ToSetpoint)?;
                self.phase = FieldPhase::RampingDown;
            }
            FieldPhase::RampingDown => {
                if (field + max).abs() < self.tolerance_t {
                    clock.sleep(self.settle);
                    magnet.set_mode(RampMode::Hold)?;
                    self.phase = FieldPhase::HoldingDown;
                }
            }
            FieldPhase::HoldingDown => {
                magnet.set_target(max)?;
                magnet.set_mode(RampMode::ToSetpoint)?;
                self.phase = FieldPhase::RampingBackUp;
            }
            FieldPhase::RampingBackUp => {
                if (field - max).abs() < self.tolerance_t {
                    clock.sleep(self.settle);
                    magnet.set_mode(RampMode::Hold)?;
                    self.phase = FieldPhase::HoldingUp2;
                }
            }
            FieldPhase::HoldingUp2 => {
                magnet.set_target(0.0)?;
                magnet.set_mode(RampMode::ToZero)?;
                self.phase = FieldPhase::RampingToZero;
            }
            FieldPhase::RampingToZero => {
                if field.abs() < self.tolerance_t {
                    clock.sleep(self.settle);
                    magnet.set_mode(RampMode::Hold)?;
                    self.phase = FieldPhase::Done;
                    tracing::info!("field loop done, magnet holding at zero");
                }
            }
            FieldPhase::Done => {}
        }
        Ok(())
    }
}
