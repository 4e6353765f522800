//! Data sink and notifier seams.

use sweep_traits::CryostatStatus;

use crate::plan::SamplePoint;

/// Append-only sample log. Append order equals temporal order; each record
/// is expected to be flush-durable before the call returns.
pub trait DataSink {
    fn record(
        &mut self,
        point: &SamplePoint,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Best-effort status messaging (the original rig posted to a Telegram bot).
/// Failures are logged by the runner and never abort a run.
pub trait Notifier {
    fn notify(
        &mut self,
        message: &str,
        include_status: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Notifier that drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(
        &mut self,
        _message: &str,
        _include_status: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Render the cryostat/helium status block appended to notifier messages.
pub fn status_block(status: &CryostatStatus, helium_level: Option<f64>) -> String {
    let mut out = String::new();
    out.push_str(&format!("T_set = {:.2} K\n", status.set_point_k));
    out.push_str(&format!("Heater = {:.2} %\n", status.heater_percent));
    out.push_str(&format!("Gas flow = {:.2} %\n", status.gas_flow_percent));
    if let Some(level) = helium_level {
        out.push_str(&format!("Helium level = {level:.2} %\n"));
    }
    out.push_str(&format!("Auto PID = {}\n", status.auto_pid));
    out.push_str(&format!("Ramp active = {}", status.ramp_active));
    out
}
