//! Field-driven plans against the simulated magnet supply: the hysteresis
//! phase machine, the full loop run, and the stepped-field sweep.

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sweep_core::mocks::{RecordingSink, ScriptedSource};
use sweep_core::phase::{FieldLoop, FieldPhase};
use sweep_core::{SweepPlan, SweepRunner};
use sweep_hardware::{SimCryostat, SimMagnet};
use sweep_traits::clock::ManualClock;
use sweep_traits::{Magnet, RampMode};

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Clone)]
struct SharedMagnet(Arc<Mutex<SimMagnet>>);

impl SharedMagnet {
    fn new(sim: SimMagnet) -> Self {
        Self(Arc::new(Mutex::new(sim)))
    }

    fn mode(&self) -> RampMode {
        self.0.lock().unwrap().mode()
    }
}

impl Magnet for SharedMagnet {
    fn set_target(&mut self, tesla: f64) -> Result<(), BoxError> {
        self.0.lock().unwrap().set_target(tesla)
    }
    fn set_ramp_rate(&mut self, tesla_per_min: f64) -> Result<(), BoxError> {
        self.0.lock().unwrap().set_ramp_rate(tesla_per_min)
    }
    fn set_mode(&mut self, mode: RampMode) -> Result<(), BoxError> {
        self.0.lock().unwrap().set_mode(mode)
    }
    fn field(&mut self) -> Result<f64, BoxError> {
        self.0.lock().unwrap().field()
    }
}

/// One simulated read covers a minute, so the default 0.5 T/min rate moves
/// the field half a tesla per tick.
fn fast_magnet() -> SimMagnet {
    SimMagnet::new().with_seconds_per_read(60.0)
}

#[test]
fn phase_machine_visits_all_states_in_order() {
    let mut magnet = fast_magnet();
    let clock = ManualClock::new();
    let mut lp = FieldLoop::new(1.0, 0.001, Duration::from_secs(2));

    let mut visited = vec![lp.phase()];
    for _ in 0..64 {
        if lp.is_done() {
            break;
        }
        lp.advance(&mut magnet, &clock).unwrap();
        if visited.last() != Some(&lp.phase()) {
            visited.push(lp.phase());
        }
    }

    assert_eq!(
        visited,
        vec![
            FieldPhase::Start,
            FieldPhase::RampingUp,
            FieldPhase::HoldingUp,
            FieldPhase::RampingDown,
            FieldPhase::HoldingDown,
            FieldPhase::RampingBackUp,
            FieldPhase::HoldingUp2,
            FieldPhase::RampingToZero,
            FieldPhase::Done,
        ]
    );
    assert_eq!(lp.read_failures(), 0);
}

#[test]
fn field_loop_completes_and_magnet_ends_held_at_zero() {
    let magnet = SharedMagnet::new(fast_magnet());
    let sink = RecordingSink::new();

    let mut runner = SweepRunner::builder()
        .with_plan(SweepPlan::FieldHysteresis {
            max_field_t: 1.0,
            rate_t_per_min: 0.5,
            bias_v: 0.1,
        })
        .with_source(ScriptedSource::new())
        .with_sink(sink.clone())
        .with_cryostat(SimCryostat::new(295.0))
        .with_magnet(magnet.clone())
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap();
    let outcome = runner.run();

    assert!(outcome.is_completed());
    assert_eq!(magnet.mode(), RampMode::Hold);

    let points = sink.points();
    assert!(!points.is_empty());
    // Field rides along with every electrical sample and reaches both poles.
    let fields: Vec<f64> = points.iter().filter_map(|p| p.channel("b")).collect();
    assert_eq!(fields.len(), points.len());
    let max = fields.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = fields.iter().cloned().fold(f64::INFINITY, f64::min);
    assert!(max > 0.9, "never saw the positive pole: {max}");
    assert!(min < -0.9, "never saw the negative pole: {min}");
}

#[test]
fn stepped_field_sweeps_voltage_at_each_scheduled_field() {
    let magnet = SharedMagnet::new(fast_magnet());
    let sink = RecordingSink::new();
    let points_per_leg = 3;

    let mut runner = SweepRunner::builder()
        .with_plan(SweepPlan::SteppedField {
            fields_t: vec![0.5, -0.5],
            rate_t_per_min: 0.5,
            amplitude_v: 1.0,
            points_per_leg,
        })
        .with_source(ScriptedSource::new())
        .with_sink(sink.clone())
        .with_cryostat(SimCryostat::new(295.0))
        .with_magnet(magnet.clone())
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap();
    let outcome = runner.run();

    assert!(outcome.is_completed());
    let points = sink.points();
    // Two fields, an up leg and a down leg each.
    assert_eq!(points.len(), 2 * 2 * points_per_leg);
    assert!((points[0].channel("b").unwrap() - 0.5).abs() < 1e-9);
    assert!((points.last().unwrap().channel("b").unwrap() + 0.5).abs() < 1e-9);
    // The inner sweep peaks at the amplitude before coming back down.
    assert_eq!(points[points_per_leg - 1].channel("v"), Some(1.0));
    assert_eq!(points[2 * points_per_leg - 1].channel("v"), Some(0.0));

    assert_eq!(magnet.mode(), RampMode::Hold);
}

#[test]
fn magnet_write_failures_during_the_loop_do_not_kill_the_run() {
    // The loop treats write failures as transients and retries the same
    // phase action next tick; clearing the fault lets it finish.
    let mut sim = fast_magnet();
    sim.fail_writes(true);
    let mut magnet = SharedMagnet::new(sim);
    let clock = ManualClock::new();
    let mut lp = FieldLoop::new(1.0, 0.001, Duration::ZERO);

    assert!(lp.advance(&mut magnet, &clock).is_err());
    assert_eq!(lp.phase(), FieldPhase::Start);

    magnet.0.lock().unwrap().fail_writes(false);
    lp.advance(&mut magnet, &clock).unwrap();
    assert_eq!(lp.phase(), FieldPhase::RampingUp);
}
