//! Binary entry point: tracing setup, config load, dispatch, exit codes.

mod cli;
mod error_fmt;
mod output;
mod run;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{format_error_json, humanize};
use sweep_core::RunOutcome;

fn init_tracing(cli: &Cli, logging: &sweep_config::Logging) {
    let level = cli
        .log_level
        .as_deref()
        .or(logging.level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(file) = logging.file.as_deref() {
        let path = std::path::Path::new(file);
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let name = path.file_name().unwrap_or_else(|| "sweep.log".as_ref());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .init();
    } else {
        // Console logs go to stderr; stdout carries data frames / JSON.
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(cli: &Cli) -> eyre::Result<sweep_config::Config> {
    if !cli.config.exists() {
        // A missing file at the default path means "all defaults"; an
        // explicitly wrong path should still show up in the log.
        tracing::debug!(path = ?cli.config, "config file not found, using defaults");
        return Ok(sweep_config::Config::default());
    }
    let text = std::fs::read_to_string(&cli.config)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", cli.config, e))?;
    let cfg = sweep_config::load_toml(&text)
        .map_err(|e| eyre::eyre!("parse config {:?}: {}", cli.config, e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn report_summary(cli: &Cli, summary: &run::RunSummary) {
    if cli.json {
        let obj = serde_json::json!({
            "outcome": summary.outcome.to_string(),
            "samples": summary.samples,
            "file": summary.file.as_ref().map(|p| p.display().to_string()),
        });
        println!("{obj}");
    } else {
        println!(
            "{} ({} samples, data in {})",
            summary.outcome.message(),
            summary.samples,
            summary
                .file
                .as_deref()
                .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
        );
    }
}

fn real_main() -> eyre::Result<i32> {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    color_eyre::install()?;

    // Tracing needs [logging]; parse the config before anything logs.
    let cfg = load_config(&cli)?;
    init_tracing(&cli, &cfg.logging);

    if matches!(cli.cmd, Commands::SelfCheck) {
        run::self_check()?;
        return Ok(0);
    }

    let plan = run::plan_from_command(&cli.cmd)?
        .ok_or_else(|| eyre::eyre!("no plan for command {:?}", cli.cmd))?;
    let summary = run::execute(&cli, &cfg, plan)?;
    report_summary(&cli, &summary);

    Ok(match summary.outcome {
        RunOutcome::Completed => 0,
        RunOutcome::Aborted => 2,
        RunOutcome::FailedSetup(_) => 1,
    })
}

fn main() {
    match real_main() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&err));
            } else {
                eprintln!("{}", humanize(&err));
            }
            std::process::exit(1);
        }
    }
}
