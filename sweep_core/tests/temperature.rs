//! Temperature-sweep runs against the simulated cryostat: stabilization,
//! the low-temperature floor, PID nudging, and tolerant sampling.

use std::error::Error;
use std::sync::{Arc, Mutex};

use sweep_core::mocks::{CountingNotifier, RecordingSink, ScriptedSource};
use sweep_core::{Limits, SweepPlan, SweepRunner};
use sweep_hardware::SimCryostat;
use sweep_traits::clock::ManualClock;
use sweep_traits::{Cryostat, CryostatStatus, Temperatures};

type BoxError = Box<dyn Error + Send + Sync>;

/// Keeps a handle on the simulator after the runner boxes it.
#[derive(Clone)]
struct SharedCryostat(Arc<Mutex<SimCryostat>>);

impl SharedCryostat {
    fn new(sim: SimCryostat) -> Self {
        Self(Arc::new(Mutex::new(sim)))
    }
}

impl Cryostat for SharedCryostat {
    fn set_setpoint(&mut self, kelvin: f64) -> Result<(), BoxError> {
        self.0.lock().unwrap().set_setpoint(kelvin)
    }
    fn begin_ramp(&mut self, target_k: f64, rate_k_per_min: f64) -> Result<(), BoxError> {
        self.0.lock().unwrap().begin_ramp(target_k, rate_k_per_min)
    }
    fn end_ramp(&mut self) -> Result<(), BoxError> {
        self.0.lock().unwrap().end_ramp()
    }
    fn temperatures(&mut self) -> Result<Temperatures, BoxError> {
        self.0.lock().unwrap().temperatures()
    }
    fn set_auto_pid(&mut self, on: bool) -> Result<(), BoxError> {
        self.0.lock().unwrap().set_auto_pid(on)
    }
    fn status(&mut self) -> Result<CryostatStatus, BoxError> {
        self.0.lock().unwrap().status()
    }
}

/// Delegating cryostat whose every `period`-th temperature read fails.
struct FlakyCryostat {
    inner: SimCryostat,
    reads: u32,
    period: u32,
}

impl Cryostat for FlakyCryostat {
    fn set_setpoint(&mut self, kelvin: f64) -> Result<(), BoxError> {
        self.inner.set_setpoint(kelvin)
    }
    fn begin_ramp(&mut self, target_k: f64, rate_k_per_min: f64) -> Result<(), BoxError> {
        self.inner.begin_ramp(target_k, rate_k_per_min)
    }
    fn end_ramp(&mut self) -> Result<(), BoxError> {
        self.inner.end_ramp()
    }
    fn temperatures(&mut self) -> Result<Temperatures, BoxError> {
        self.reads += 1;
        if self.reads % self.period == 0 {
            return Err("flaky sensor".into());
        }
        self.inner.temperatures()
    }
    fn set_auto_pid(&mut self, on: bool) -> Result<(), BoxError> {
        self.inner.set_auto_pid(on)
    }
    fn status(&mut self) -> Result<CryostatStatus, BoxError> {
        self.inner.status()
    }
}

fn temp_plan(end_k: f64) -> SweepPlan {
    SweepPlan::TemperatureRamp {
        end_k,
        rate_k_per_min: 2.0,
        bias_v: 0.1,
    }
}

#[test]
fn sweep_runs_until_final_temperature_stabilizes() {
    // One read stands for a minute of wall time, so the ramp covers
    // 2 K per sample and the run converges in tens of ticks.
    let cryo = SharedCryostat::new(SimCryostat::new(200.0).with_seconds_per_read(60.0));
    let sink = RecordingSink::new();
    let notifier = CountingNotifier::new();

    let mut runner = SweepRunner::builder()
        .with_plan(temp_plan(210.0))
        .with_source(ScriptedSource::new())
        .with_sink(sink.clone())
        .with_cryostat(cryo.clone())
        .with_notifier(notifier.clone())
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap();
    let outcome = runner.run();

    assert!(outcome.is_completed());
    // The triplet rides along with every electrical sample.
    let points = sink.points();
    assert!(points.len() >= 10);
    let last = points.last().unwrap();
    assert!((last.channel("t1").unwrap() - 210.0).abs() < 0.01);
    assert!(last.channel("t2").is_some());
    assert!(last.channel("t3").is_some());
    assert!(last.channel("v").is_some());
    assert_eq!(notifier.count(), 2);

    // Teardown ended the controller ramp.
    let st = cryo.0.lock().unwrap().status().unwrap();
    assert!(!st.ramp_active);
}

#[test]
fn cold_finish_raises_set_point_to_the_floor() {
    let cryo = SharedCryostat::new(SimCryostat::new(12.0).with_seconds_per_read(60.0));

    let mut runner = SweepRunner::builder()
        .with_plan(temp_plan(5.0))
        .with_source(ScriptedSource::new())
        .with_sink(RecordingSink::new())
        .with_cryostat(cryo.clone())
        .with_limits(Limits::default())
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap();
    let outcome = runner.run();

    assert!(outcome.is_completed());
    assert_eq!(cryo.0.lock().unwrap().set_point(), 10.0);
}

#[test]
fn warm_finish_leaves_set_point_alone() {
    let cryo = SharedCryostat::new(SimCryostat::new(200.0).with_seconds_per_read(60.0));

    let mut runner = SweepRunner::builder()
        .with_plan(temp_plan(210.0))
        .with_source(ScriptedSource::new())
        .with_sink(RecordingSink::new())
        .with_cryostat(cryo.clone())
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap();
    runner.run();

    // Set-point was moved to the realized start temperature, never to the
    // floor.
    assert!(cryo.0.lock().unwrap().set_point() > 100.0);
}

#[test]
fn pid_is_cycled_in_the_critical_band() {
    // Hold at 25 K (zero-width ramp) with minute-long ticks so the 100 s
    // nudge interval elapses while the detector window fills.
    let cryo = SharedCryostat::new(SimCryostat::new(25.0).with_seconds_per_read(0.0));
    let pacing = sweep_core::Pacing {
        tick: std::time::Duration::from_secs(60),
        ..Default::default()
    };

    let mut runner = SweepRunner::builder()
        .with_plan(temp_plan(25.0))
        .with_source(ScriptedSource::new())
        .with_sink(RecordingSink::new())
        .with_cryostat(cryo.clone())
        .with_pacing(pacing)
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap();
    let outcome = runner.run();
    assert!(outcome.is_completed());

    let guard = cryo.0.lock().unwrap();
    let toggles = guard.auto_pid_toggles();
    // Off/on pairs, at least one full cycle, none back-to-back.
    assert!(toggles.len() >= 2);
    assert_eq!(toggles.len() % 2, 0);
    for pair in toggles.chunks(2) {
        assert_eq!(pair, [false, true]);
    }
}

#[test]
fn intermittent_sensor_failures_reuse_the_last_triplet() {
    let cryo = FlakyCryostat {
        inner: SimCryostat::new(200.0).with_seconds_per_read(60.0),
        reads: 0,
        period: 3,
    };
    let sink = RecordingSink::new();

    let mut runner = SweepRunner::builder()
        .with_plan(temp_plan(206.0))
        .with_source(ScriptedSource::new())
        .with_sink(sink.clone())
        .with_cryostat(cryo)
        .with_clock(Box::new(ManualClock::new()))
        .build()
        .unwrap();
    let outcome = runner.run();

    assert!(outcome.is_completed());
    // Every record still carries a triplet, stale or fresh.
    assert!(sink.points().iter().all(|p| p.channel("t1").is_some()));
}
