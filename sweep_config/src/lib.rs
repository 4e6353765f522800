#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and field-schedule parsing for the sweep rig.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Field-schedule CSV loader enforces the header and parses one field
//!   value per row for stepped-field sweeps.

use serde::Deserialize;

/// Physical bounds of the rig. Everything a plan must stay inside.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Limits {
    pub max_temperature_k: f64,
    pub max_temp_rate_k_per_min: f64,
    pub max_field_t: f64,
    pub max_field_rate_t_per_min: f64,
    pub max_bias_v: f64,
    /// Safety floor: a finished sweep never leaves the set-point below this.
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

/// Stabilization detector tuning. The drift bound is physical
/// (kelvin over wall seconds); the per-tick slope limit is derived from it
/// and the pacing tick at wiring time.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Stabilize {
    pub window: usize,
    pub approach_band_k: f64,
    pub max_drift_k: f64,
    pub drift_window_s: f64,
}

impl Default for Stabilize {
    fn default() -> Self {
        Self {
            window: 10,
            approach_band_k: 1.0,
            max_drift_k: 0.1,
            drift_window_s: 120.0,
        }
    }
}

/// Loop timing and field tolerance.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PacingCfg {
    pub tick_ms: u64,
    pub settle_ms: u64,
    pub field_poll_ms: u64,
    pub field_tolerance_t: f64,
}

impl Default for PacingCfg {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            settle_ms: 2000,
            field_poll_ms: 1000,
            field_tolerance_t: 0.001,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

/// Notifier credentials. Optional; without them status messages only go to
/// the log.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Telegram {
    pub token: Option<String>,
    pub chat_id: Option<String>,
}

/// GPIB resource strings for the real rig. Carried as configuration only;
/// the shape is validated so a typo fails at load time instead of at the
/// first bus transaction.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Addresses {
    pub sourcemeter: Option<String>,
    pub cryostat: Option<String>,
    pub magnet: Option<String>,
    pub level_meter: Option<String>,
}

impl Addresses {
    fn entries(&self) -> [(&'static str, Option<&String>); 4] {
        [
            ("addresses.sourcemeter", self.sourcemeter.as_ref()),
            ("addresses.cryostat", self.cryostat.as_ref()),
            ("addresses.magnet", self.magnet.as_ref()),
            ("addresses.level_meter", self.level_meter.as_ref()),
        ]
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub limits: Limits,
    pub stabilize: Stabilize,
    pub pacing: PacingCfg,
    pub logging: Logging,
    pub telegram: Telegram,
    pub addresses: Addresses,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// `GPIB<board>::<addr>::INSTR` with numeric board and address.
fn is_gpib_resource(s: &str) -> bool {
    let Some(rest) = s.strip_prefix("GPIB") else {
        return false;
    };
    let mut parts = rest.split("::");
    let board = parts.next().unwrap_or("");
    let addr = parts.next().unwrap_or("");
    let suffix = parts.next().unwrap_or("");
    parts.next().is_none()
        && !board.is_empty()
        && board.chars().all(|c| c.is_ascii_digit())
        && !addr.is_empty()
        && addr.chars().all(|c| c.is_ascii_digit())
        && suffix == "INSTR"
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Limits
        if !(self.limits.max_temperature_k > 0.0) {
            eyre::bail!("limits.max_temperature_k must be > 0");
        }
        if !(self.limits.max_temp_rate_k_per_min > 0.0) {
            eyre::bail!("limits.max_temp_rate_k_per_min must be > 0");
        }
        if !(self.limits.max_field_t > 0.0) {
            eyre::bail!("limits.max_field_t must be > 0");
        }
        if !(self.limits.max_field_rate_t_per_min > 0.0) {
            eyre::bail!("limits.max_field_rate_t_per_min must be > 0");
        }
        if !(self.limits.max_bias_v > 0.0) {
            eyre::bail!("limits.max_bias_v must be > 0");
        }
        if self.limits.temp_floor_k < 0.0 {
            eyre::bail!("limits.temp_floor_k must be >= 0");
        }
        if self.limits.temp_floor_k > self.limits.max_temperature_k {
            eyre::bail!("limits.temp_floor_k must not exceed limits.max_temperature_k");
        }

        // Stabilize
        if self.stabilize.window < 2 {
            eyre::bail!("stabilize.window must be >= 2");
        }
        if !(self.stabilize.approach_band_k > 0.0) {
            eyre::bail!("stabilize.approach_band_k must be > 0");
        }
        if !(self.stabilize.max_drift_k > 0.0) {
            eyre::bail!("stabilize.max_drift_k must be > 0");
        }
        if !(self.stabilize.drift_window_s > 0.0) {
            eyre::bail!("stabilize.drift_window_s must be > 0");
        }

        // Pacing
        if self.pacing.tick_ms == 0 {
            eyre::bail!("pacing.tick_ms must be >= 1");
        }
        if self.pacing.field_poll_ms == 0 {
            eyre::bail!("pacing.field_poll_ms must be >= 1");
        }
        if !(self.pacing.field_tolerance_t > 0.0) {
            eyre::bail!("pacing.field_tolerance_t must be > 0");
        }

        // Logging: rotation restricted to the known policies
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Telegram: both halves or neither
        if self.telegram.token.is_some() != self.telegram.chat_id.is_some() {
            eyre::bail!("telegram requires both token and chat_id");
        }

        // Addresses
        for (name, value) in self.addresses.entries() {
            if let Some(addr) = value
                && !is_gpib_resource(addr)
            {
                eyre::bail!("{name} is not a GPIB resource (expected GPIB<n>::<addr>::INSTR)");
            }
        }

        Ok(())
    }
}

/// Field-schedule CSV schema.
///
/// Expected header:
/// field_t
///
/// Example:
/// field_t
/// 0.0
/// 2.5
/// -2.5
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ScheduleRow {
    pub field_t: f64,
}

pub fn load_field_schedule_csv(path: &std::path::Path) -> eyre::Result<Vec<f64>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open field schedule CSV {:?}: {}", path, e))?;

    // Enforce exact header
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != ["field_t"] {
        eyre::bail!(
            "field schedule CSV must have header 'field_t', got: {}",
            actual.join(",")
        );
    }

    let mut fields = Vec::new();
    for (idx, rec) in rdr.deserialize::<ScheduleRow>().enumerate() {
        match rec {
            Ok(row) => {
                if !row.field_t.is_finite() {
                    eyre::bail!("invalid CSV row {}: field must be finite", idx + 2);
                }
                fields.push(row.field_t);
            }
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    if fields.is_empty() {
        eyre::bail!("field schedule CSV {:?} contains no rows", path);
    }
    Ok(fields)
}
