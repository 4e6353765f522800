//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "sweep", version, about = "Stimulus-sweep orchestration CLI")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/sweep_config.toml")]
    pub config: PathBuf,

    /// Data file to write (created, never appended)
    #[arg(long, value_name = "FILE", default_value = "sweep.dat")]
    pub out: PathBuf,

    /// Free-form comment recorded in the data-file header
    #[arg(long, value_name = "TEXT")]
    pub comment: Option<String>,

    /// Emit one JSON result object on stdout instead of live frames
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); overrides the
    /// config's [logging] level, default "info"
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Linear voltage ramp
    Ramp {
        /// Start voltage (V)
        #[arg(long)]
        start: f64,
        /// End voltage (V)
        #[arg(long)]
        end: f64,
        /// Number of points, endpoints inclusive
        #[arg(long)]
        points: usize,
    },
    /// Voltage hysteresis loop 0 -> +A -> -A -> +A -> 0
    Hysteresis {
        /// Amplitude (V)
        #[arg(long)]
        amplitude: f64,
        /// Points per leg
        #[arg(long, default_value_t = 100)]
        points_per_leg: usize,
        /// Number of middle-loop repetitions
        #[arg(long, default_value_t = 1)]
        loops: usize,
    },
    /// Temperature sweep at constant bias, sampling until stabilized
    TempSweep {
        /// Target temperature (K)
        #[arg(long)]
        end_k: f64,
        /// Ramp rate (K/min)
        #[arg(long)]
        rate: f64,
        /// Bias voltage held during the sweep (V)
        #[arg(long, default_value_t = 0.1)]
        bias: f64,
    },
    /// Full field hysteresis loop at constant bias
    FieldLoop {
        /// Field amplitude (T)
        #[arg(long)]
        max_field: f64,
        /// Ramp rate (T/min)
        #[arg(long)]
        rate: f64,
        /// Bias voltage held during the loop (V)
        #[arg(long, default_value_t = 0.1)]
        bias: f64,
    },
    /// Voltage up/down sweeps at each scheduled field
    FieldSteps {
        /// Inline schedule, comma-separated fields in tesla
        #[arg(long, value_delimiter = ',', value_name = "T,T,...")]
        fields: Vec<f64>,
        /// CSV schedule (header 'field_t'); overrides --fields
        #[arg(long, value_name = "FILE")]
        schedule: Option<PathBuf>,
        /// Ramp rate between fields (T/min)
        #[arg(long)]
        rate: f64,
        /// Voltage amplitude of the inner sweep (V)
        #[arg(long)]
        amplitude: f64,
        /// Points per inner-sweep leg
        #[arg(long, default_value_t = 100)]
        points_per_leg: usize,
    },
    /// Quick health check (arm/read/disarm the sim rig)
    SelfCheck,
}
