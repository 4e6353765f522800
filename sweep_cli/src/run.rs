//! Config mapping, rig assembly, and sweep execution.

use std::time::Duration;

use eyre::WrapErr;
use sweep_core::{
    CancelToken, ChannelSignals, Limits, Pacing, RunOutcome, StabilityCfg, SweepPlan, SweepRunner,
};
use sweep_hardware::{SimCryostat, SimLevelMeter, SimMagnet, SimSourceMeter};
use sweep_traits::Source;

use crate::cli::{Cli, Commands};
use crate::output::{FileSink, LogNotifier, spawn_printer};

/// What a finished invocation reports, for text or JSON output.
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub samples: u64,
    pub file: Option<std::path::PathBuf>,
}

pub fn plan_from_command(cmd: &Commands) -> eyre::Result<Option<SweepPlan>> {
    let plan = match cmd {
        Commands::Ramp { start, end, points } => SweepPlan::VoltageRamp {
            start_v: *start,
            end_v: *end,
            points: *points,
        },
        Commands::Hysteresis {
            amplitude,
            points_per_leg,
            loops,
        } => SweepPlan::VoltageHysteresis {
            amplitude_v: *amplitude,
            points_per_leg: *points_per_leg,
            loops: *loops,
        },
        Commands::TempSweep { end_k, rate, bias } => SweepPlan::TemperatureRamp {
            end_k: *end_k,
            rate_k_per_min: *rate,
            bias_v: *bias,
        },
        Commands::FieldLoop {
            max_field,
            rate,
            bias,
        } => SweepPlan::FieldHysteresis {
            max_field_t: *max_field,
            rate_t_per_min: *rate,
            bias_v: *bias,
        },
        Commands::FieldSteps {
            fields,
            schedule,
            rate,
            amplitude,
            points_per_leg,
        } => {
            let fields_t = match schedule {
                Some(path) => sweep_config::load_field_schedule_csv(path)
                    .wrap_err("loading field schedule")?,
                None => fields.clone(),
            };
            if fields_t.is_empty() {
                return Err(eyre::Report::new(sweep_core::SweepError::Config(
                    "field-steps needs --fields or --schedule".into(),
                )));
            }
            SweepPlan::SteppedField {
                fields_t,
                rate_t_per_min: *rate,
                amplitude_v: *amplitude,
                points_per_leg: *points_per_leg,
            }
        }
        Commands::SelfCheck => return Ok(None),
    };
    Ok(Some(plan))
}

fn limits_from(cfg: &sweep_config::Limits) -> Limits {
    Limits {
        max_temperature_k: cfg.max_temperature_k,
        max_temp_rate_k_per_min: cfg.max_temp_rate_k_per_min,
        max_field_t: cfg.max_field_t,
        max_field_rate_t_per_min: cfg.max_field_rate_t_per_min,
        max_bias_v: cfg.max_bias_v,
        temp_floor_k: cfg.temp_floor_k,
    }
}

fn pacing_from(cfg: &sweep_config::PacingCfg) -> Pacing {
    Pacing {
        tick: Duration::from_millis(cfg.tick_ms),
        settle: Duration::from_millis(cfg.settle_ms),
        field_poll: Duration::from_millis(cfg.field_poll_ms),
        field_tolerance_t: cfg.field_tolerance_t,
    }
}

fn stability_from(cfg: &sweep_config::Stabilize, pacing: &Pacing) -> StabilityCfg {
    StabilityCfg::from_drift(
        cfg.window,
        cfg.approach_band_k,
        cfg.max_drift_k,
        Duration::from_secs_f64(cfg.drift_window_s),
        pacing.tick,
    )
}

/// Arm, exercise, and disarm the sim source-meter.
pub fn self_check() -> eyre::Result<()> {
    let mut source = SimSourceMeter::new();
    source.arm().map_err(|e| eyre::eyre!("arm: {e}"))?;
    source.apply(0.1).map_err(|e| eyre::eyre!("apply: {e}"))?;
    let (v, i) = source.read().map_err(|e| eyre::eyre!("read: {e}"))?;
    source.disarm().map_err(|e| eyre::eyre!("disarm: {e}"))?;
    println!("self-check OK (v={v:.3} V, i={i:.6} A)");
    Ok(())
}

/// Wire the simulated rig to the engine and run the plan to its outcome.
pub fn execute(cli: &Cli, cfg: &sweep_config::Config, plan: SweepPlan) -> eyre::Result<RunSummary> {
    let pacing = pacing_from(&cfg.pacing);
    let stability = stability_from(&cfg.stabilize, &pacing);
    let limits = limits_from(&cfg.limits);

    let sink = FileSink::create(&cli.out, &plan, cli.comment.as_deref())?;
    let samples = sink.counter();
    let file = sink.path().to_path_buf();

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            tracing::info!("Ctrl-C received, cancelling sweep");
            cancel.cancel();
        })
        .wrap_err("installing Ctrl-C handler")?;
    }

    let (signals, rx) = ChannelSignals::pair(64);
    let printer = spawn_printer(rx, cli.json);

    let mut builder = SweepRunner::builder()
        .with_plan(plan.clone())
        .with_source(SimSourceMeter::new())
        .with_sink(sink)
        .with_signals(signals)
        .with_notifier(LogNotifier::new(&cfg.telegram))
        .with_cancel(cancel)
        .with_pacing(pacing)
        .with_stability(stability)
        .with_limits(limits)
        .with_level_meter(SimLevelMeter::new(82.0));
    if plan.needs_cryostat() {
        builder = builder.with_cryostat(SimCryostat::new(295.0));
    }
    if plan.needs_magnet() {
        builder = builder.with_magnet(SimMagnet::new());
    }

    let mut runner = builder.try_build()?;
    let outcome = runner.run();
    drop(runner);
    if printer.join().is_err() {
        tracing::warn!("printer thread panicked");
    }

    Ok(RunSummary {
        outcome,
        samples: samples.load(std::sync::atomic::Ordering::Relaxed),
        file: Some(file),
    })
}
