//! Data-file sink, log-based notifier, and the live-frame printer thread.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use chrono::{SecondsFormat, Utc};
use sweep_core::signals::SignalEvent;
use sweep_core::{DataSink, Notifier, SamplePoint, SweepPlan};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Plain-text data file: `#`-prefixed header lines, one column-name line,
/// then space-separated rows with ISO timestamps. Each record is flushed
/// before `record` returns so a killed run loses at most one row.
pub struct FileSink {
    writer: BufWriter<File>,
    path: PathBuf,
    columns_written: bool,
    written: Arc<AtomicU64>,
}

impl FileSink {
    pub fn create(path: &Path, plan: &SweepPlan, comment: Option<&str>) -> eyre::Result<Self> {
        let file = File::create(path)
            .map_err(|e| eyre::eyre!("create data file {:?}: {}", path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "# sweep data file")?;
        writeln!(
            writer,
            "# created: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        writeln!(writer, "# plan: {}", describe_plan(plan))?;
        if let Some(c) = comment {
            writeln!(writer, "# comment: {c}")?;
        }
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            columns_written: false,
            written: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared row counter; stays valid after the runner takes the sink.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.written)
    }
}

fn describe_plan(plan: &SweepPlan) -> String {
    match plan {
        SweepPlan::VoltageRamp {
            start_v,
            end_v,
            points,
        } => format!("voltage ramp {start_v} V -> {end_v} V, {points} points"),
        SweepPlan::VoltageHysteresis {
            amplitude_v,
            points_per_leg,
            loops,
        } => format!(
            "voltage hysteresis +/-{amplitude_v} V, {points_per_leg} points/leg, {loops} loops"
        ),
        SweepPlan::TemperatureRamp {
            end_k,
            rate_k_per_min,
            bias_v,
        } => format!("temperature sweep to {end_k} K at {rate_k_per_min} K/min, bias {bias_v} V"),
        SweepPlan::FieldHysteresis {
            max_field_t,
            rate_t_per_min,
            bias_v,
        } => format!(
            "field loop +/-{max_field_t} T at {rate_t_per_min} T/min, bias {bias_v} V"
        ),
        SweepPlan::SteppedField {
            fields_t,
            rate_t_per_min,
            amplitude_v,
            points_per_leg,
        } => format!(
            "stepped field {fields_t:?} T at {rate_t_per_min} T/min, +/-{amplitude_v} V, {points_per_leg} points/leg"
        ),
    }
}

impl DataSink for FileSink {
    fn record(&mut self, point: &SamplePoint) -> Result<(), BoxError> {
        if !self.columns_written {
            write!(self.writer, "t")?;
            for (name, _) in &point.channels {
                write!(self.writer, " {name}")?;
            }
            writeln!(self.writer)?;
            self.columns_written = true;
        }
        write!(
            self.writer,
            "{}",
            point.at.to_rfc3339_opts(SecondsFormat::Millis, true)
        )?;
        for (_, value) in &point.channels {
            write!(self.writer, " {value}")?;
        }
        writeln!(self.writer)?;
        self.writer.flush()?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Notifier that writes status messages to the log. Telegram credentials are
/// accepted from the config so real-rig deployments can keep them in one
/// place, but this build only records where the message would have gone.
pub struct LogNotifier {
    chat_id: Option<String>,
}

impl LogNotifier {
    pub fn new(telegram: &sweep_config::Telegram) -> Self {
        Self {
            chat_id: telegram.chat_id.clone(),
        }
    }
}

impl Notifier for LogNotifier {
    fn notify(&mut self, message: &str, include_status: bool) -> Result<(), BoxError> {
        match &self.chat_id {
            Some(chat) => tracing::info!(chat, include_status, %message, "sweep notification"),
            None => tracing::info!(include_status, %message, "sweep notification"),
        }
        Ok(())
    }
}

/// Consume live frames on a worker thread, printing one line per sample.
/// Ends when the runner drops its channel half.
pub fn spawn_printer(rx: crossbeam_channel::Receiver<SignalEvent>, quiet: bool) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in rx {
            match event {
                SignalEvent::Data(point) => {
                    if quiet {
                        continue;
                    }
                    let mut line = point.at.to_rfc3339_opts(SecondsFormat::Millis, true);
                    for (name, value) in &point.channels {
                        line.push_str(&format!(" {name}={value:.6}"));
                    }
                    println!("{line}");
                }
                SignalEvent::Aborted => {
                    if !quiet {
                        println!("-- aborted --");
                    }
                }
            }
        }
    })
}
