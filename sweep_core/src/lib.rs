#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core sweep orchestration (hardware-agnostic).
//!
//! This crate drives stimulus/response sweeps against cryostat, magnet, and
//! source-meter instruments. All hardware interactions go through the
//! `sweep_traits` traits, so the same engine runs on GPIB rigs and on the
//! simulators in `sweep_hardware`.
//!
//! ## Architecture
//!
//! - **Plans**: what to sweep (`plan` module)
//! - **Trajectories**: lazy set-point sequences (`trajectory` module)
//! - **Stabilization**: windowed linear-fit convergence (`stabilize` module)
//! - **Field phases**: the hysteresis-loop state machine (`phase` module)
//! - **Runner**: the tick loop with guaranteed teardown (`runner` module)
//! - **Signals**: bounded live-data channel for UIs (`signals` module)

pub mod cancel;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod phase;
pub mod plan;
pub mod runner;
pub mod signals;
pub mod sink;
pub mod stabilize;
pub mod trajectory;

use std::marker::PhantomData;
use std::sync::Arc;

use sweep_traits::clock::{Clock, MonotonicClock};
use sweep_traits::{AuxSensor, Cryostat, Magnet, Source, Temperatures};

pub use crate::cancel::CancelToken;
pub use crate::error::{BuildError, Result, SweepError};
pub use crate::plan::{RunOutcome, SamplePoint, SweepPlan};
pub use crate::runner::{Limits, Pacing, SweepRunner};
pub use crate::signals::{ChannelSignals, NullSignals, SignalChannel, SignalEvent};
pub use crate::sink::{DataSink, Notifier, NullNotifier};
pub use crate::stabilize::{StabilityCfg, StabilityDetector};

use crate::signals::NullSignals as DefaultSignals;
use crate::sink::NullNotifier as DefaultNotifier;

pub struct Missing;
pub struct Set;

/// Builder for [`SweepRunner`]. The plan, source, and sink are tracked in the
/// type system; everything else is optional with defaults and validated on
/// `build()`.
pub struct SweepBuilder<P, S, K> {
    plan: Option<SweepPlan>,
    source: Option<Box<dyn Source>>,
    sink: Option<Box<dyn DataSink>>,
    cryostat: Option<Box<dyn Cryostat>>,
    magnet: Option<Box<dyn Magnet>>,
    level_meter: Option<Box<dyn AuxSensor>>,
    signals: Option<Box<dyn SignalChannel>>,
    notifier: Option<Box<dyn Notifier>>,
    // Optional clock for tests (accept Box here)
    clock: Option<Box<dyn Clock + Send + Sync>>,
    cancel: Option<CancelToken>,
    pacing: Option<Pacing>,
    stability: Option<StabilityCfg>,
    limits: Option<Limits>,
    // Type-state markers
    _p: PhantomData<P>,
    _s: PhantomData<S>,
    _k: PhantomData<K>,
}

impl SweepRunner {
    pub fn builder() -> SweepBuilder<Missing, Missing, Missing> {
        SweepBuilder::default()
    }
}

impl Default for SweepBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            plan: None,
            source: None,
            sink: None,
            cryostat: None,
            magnet: None,
            level_meter: None,
            signals: None,
            notifier: None,
            clock: None,
            cancel: None,
            pacing: None,
            stability: None,
            limits: None,
            _p: PhantomData,
            _s: PhantomData,
            _k: PhantomData,
        }
    }
}

impl<S, K> SweepBuilder<Missing, S, K> {
    pub fn with_plan(self, plan: SweepPlan) -> SweepBuilder<Set, S, K> {
        let SweepBuilder {
            plan: _,
            source,
            sink,
            cryostat,
            magnet,
            level_meter,
            signals,
            notifier,
            clock,
            cancel,
            pacing,
            stability,
            limits,
            _p: _,
            _s: _,
            _k: _,
        } = self;
        SweepBuilder {
            plan: Some(plan),
            source,
            sink,
            cryostat,
            magnet,
            level_meter,
            signals,
            notifier,
            clock,
            cancel,
            pacing,
            stability,
            limits,
            _p: PhantomData,
            _s: PhantomData,
            _k: PhantomData,
        }
    }
}

impl<P, K> SweepBuilder<P, Missing, K> {
    pub fn with_source(self, source: impl Source + 'static) -> SweepBuilder<P, Set, K> {
        let SweepBuilder {
            plan,
            source: _,
            sink,
            cryostat,
            magnet,
            level_meter,
            signals,
            notifier,
            clock,
            cancel,
            pacing,
            stability,
            limits,
            _p: _,
            _s: _,
            _k: _,
        } = self;
        SweepBuilder {
            plan,
            source: Some(Box::new(source)),
            sink,
            cryostat,
            magnet,
            level_meter,
            signals,
            notifier,
            clock,
            cancel,
            pacing,
            stability,
            limits,
            _p: PhantomData,
            _s: PhantomData,
            _k: PhantomData,
        }
    }
}

impl<P, S> SweepBuilder<P, S, Missing> {
    pub fn with_sink(self, sink: impl DataSink + 'static) -> SweepBuilder<P, S, Set> {
        let SweepBuilder {
            plan,
            source,
            sink: _,
            cryostat,
            magnet,
            level_meter,
            signals,
            notifier,
            clock,
            cancel,
            pacing,
            stability,
            limits,
            _p: _,
            _s: _,
            _k: _,
        } = self;
        SweepBuilder {
            plan,
            source,
            sink: Some(Box::new(sink)),
            cryostat,
            magnet,
            level_meter,
            signals,
            notifier,
            clock,
            cancel,
            pacing,
            stability,
            limits,
            _p: PhantomData,
            _s: PhantomData,
            _k: PhantomData,
        }
    }
}

impl<P, S, K> SweepBuilder<P, S, K> {
    pub fn with_cryostat(mut self, cryostat: impl Cryostat + 'static) -> Self {
        self.cryostat = Some(Box::new(cryostat));
        self
    }

    pub fn with_magnet(mut self, magnet: impl Magnet + 'static) -> Self {
        self.magnet = Some(Box::new(magnet));
        self
    }

    pub fn with_level_meter(mut self, meter: impl AuxSensor + 'static) -> Self {
        self.level_meter = Some(Box::new(meter));
        self
    }

    pub fn with_signals(mut self, signals: impl SignalChannel + 'static) -> Self {
        self.signals = Some(Box::new(signals));
        self
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = Some(pacing);
        self
    }

    pub fn with_stability(mut self, stability: StabilityCfg) -> Self {
        self.stability = Some(stability);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = Some(limits);
        self
    }

    /// Fallible build available in any type-state; returns detailed
    /// `BuildError` for missing or invalid pieces.
    pub fn try_build(self) -> Result<SweepRunner> {
        let SweepBuilder {
            plan,
            source,
            sink,
            cryostat,
            magnet,
            level_meter,
            signals,
            notifier,
            clock,
            cancel,
            pacing,
            stability,
            limits,
            _p: _,
            _s: _,
            _k: _,
        } = self;

        let plan = plan.ok_or_else(|| eyre::Report::new(BuildError::MissingPlan))?;
        let source = source.ok_or_else(|| eyre::Report::new(BuildError::MissingSource))?;
        let sink = sink.ok_or_else(|| eyre::Report::new(BuildError::MissingSink))?;

        if plan.needs_cryostat() && cryostat.is_none() {
            return Err(eyre::Report::new(BuildError::MissingCryostat));
        }
        if plan.needs_magnet() && magnet.is_none() {
            return Err(eyre::Report::new(BuildError::MissingMagnet));
        }

        let limits = limits.unwrap_or_default();
        let pacing = pacing.unwrap_or_default();
        let stability = stability.unwrap_or_default();

        validate_plan(&plan, &limits)?;
        if pacing.tick.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "tick must be > 0",
            )));
        }
        if pacing.field_tolerance_t <= 0.0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "field tolerance must be > 0",
            )));
        }
        if stability.window < 2 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "stability window must be >= 2",
            )));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        Ok(SweepRunner {
            plan,
            source,
            cryostat,
            magnet,
            level_meter,
            sink,
            signals: signals.unwrap_or_else(|| Box::new(DefaultSignals)),
            notifier: notifier.unwrap_or_else(|| Box::new(DefaultNotifier)),
            epoch: clock.now(),
            clock,
            cancel: cancel.unwrap_or_default(),
            pacing,
            detector: StabilityDetector::new(stability),
            temp_floor_k: limits.temp_floor_k,
            last_temps: Temperatures::default(),
            have_temps: false,
            last_field_t: 0.0,
            last_pid_toggle_ms: 0,
            sample_failures: 0,
            torn_down: false,
        })
    }
}

impl SweepBuilder<Set, Set, Set> {
    /// Validate and build the runner. Only available once the plan, source,
    /// and sink are set.
    pub fn build(self) -> Result<SweepRunner> {
        self.try_build()
    }
}

fn validate_plan(plan: &SweepPlan, limits: &Limits) -> Result<()> {
    let bias_ok = |v: f64| v.is_finite() && v.abs() <= limits.max_bias_v;
    let invalid = |msg: &'static str| Err(eyre::Report::new(BuildError::InvalidConfig(msg)));
    match plan {
        SweepPlan::VoltageRamp {
            start_v,
            end_v,
            points,
        } => {
            if *points == 0 {
                return invalid("ramp needs at least one point");
            }
            if !bias_ok(*start_v) || !bias_ok(*end_v) {
                return invalid("ramp voltage out of range");
            }
        }
        SweepPlan::VoltageHysteresis {
            amplitude_v,
            points_per_leg,
            loops,
        } => {
            if *points_per_leg == 0 {
                return invalid("hysteresis needs at least one point per leg");
            }
            if *loops == 0 {
                return invalid("hysteresis needs at least one loop");
            }
            if !bias_ok(*amplitude_v) || *amplitude_v < 0.0 {
                return invalid("hysteresis amplitude out of range");
            }
        }
        SweepPlan::TemperatureRamp {
            end_k,
            rate_k_per_min,
            bias_v,
        } => {
            if !(0.0..=limits.max_temperature_k).contains(end_k) {
                return invalid("target temperature out of range");
            }
            if !(*rate_k_per_min > 0.0 && *rate_k_per_min <= limits.max_temp_rate_k_per_min) {
                return invalid("temperature rate out of range");
            }
            if !bias_ok(*bias_v) {
                return invalid("bias voltage out of range");
            }
        }
        SweepPlan::FieldHysteresis {
            max_field_t,
            rate_t_per_min,
            bias_v,
        } => {
            if !(0.0..=limits.max_field_t).contains(max_field_t) {
                return invalid("field amplitude out of range");
            }
            if !(*rate_t_per_min > 0.0 && *rate_t_per_min <= limits.max_field_rate_t_per_min) {
                return invalid("field rate out of range");
            }
            if !bias_ok(*bias_v) {
                return invalid("bias voltage out of range");
            }
        }
        SweepPlan::SteppedField {
            fields_t,
            rate_t_per_min,
            amplitude_v,
            points_per_leg,
        } => {
            if fields_t.is_empty() {
                return invalid("stepped-field sweep needs at least one field");
            }
            if fields_t
                .iter()
                .any(|b| !b.is_finite() || b.abs() > limits.max_field_t)
            {
                return invalid("scheduled field out of range");
            }
            if !(*rate_t_per_min > 0.0 && *rate_t_per_min <= limits.max_field_rate_t_per_min) {
                return invalid("field rate out of range");
            }
            if *points_per_leg == 0 {
                return invalid("stepped-field sweep needs at least one point per leg");
            }
            if !bias_ok(*amplitude_v) || *amplitude_v < 0.0 {
                return invalid("voltage amplitude out of range");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{RecordingSink, ScriptedSource};

    fn ramp_plan() -> SweepPlan {
        SweepPlan::VoltageRamp {
            start_v: 0.0,
            end_v: 1.0,
            points: 5,
        }
    }

    #[test]
    fn try_build_reports_missing_plan() {
        let err = SweepRunner::builder()
            .with_source(ScriptedSource::new())
            .with_sink(RecordingSink::new())
            .try_build()
            .unwrap_err();
        assert!(err.downcast_ref::<BuildError>().is_some());
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingPlan)
        ));
    }

    #[test]
    fn try_build_requires_cryostat_for_temperature_plans() {
        let err = SweepRunner::builder()
            .with_plan(SweepPlan::TemperatureRamp {
                end_k: 100.0,
                rate_k_per_min: 2.0,
                bias_v: 0.1,
            })
            .with_source(ScriptedSource::new())
            .with_sink(RecordingSink::new())
            .try_build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingCryostat)
        ));
    }

    #[test]
    fn try_build_rejects_out_of_range_rate() {
        let err = SweepRunner::builder()
            .with_plan(SweepPlan::FieldHysteresis {
                max_field_t: 5.0,
                rate_t_per_min: 3.0,
                bias_v: 0.1,
            })
            .with_source(ScriptedSource::new())
            .with_sink(RecordingSink::new())
            .with_cryostat(sweep_hardware::SimCryostat::new(295.0))
            .with_magnet(sweep_hardware::SimMagnet::new())
            .try_build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn try_build_rejects_zero_points() {
        let err = SweepRunner::builder()
            .with_plan(SweepPlan::VoltageRamp {
                start_v: 0.0,
                end_v: 1.0,
                points: 0,
            })
            .with_source(ScriptedSource::new())
            .with_sink(RecordingSink::new())
            .try_build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn build_succeeds_with_required_pieces() {
        let runner = SweepRunner::builder()
            .with_plan(ramp_plan())
            .with_source(ScriptedSource::new())
            .with_sink(RecordingSink::new())
            .build();
        assert!(runner.is_ok());
    }
}
