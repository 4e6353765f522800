//! Test and helper mocks for sweep_core. The shared-handle pattern
//! (`Arc<Mutex<..>>`) lets a test keep inspecting a double after the runner
//! has taken ownership of it.

use std::sync::{Arc, Mutex};

use crate::cancel::CancelToken;
use crate::plan::SamplePoint;
use crate::sink::{DataSink, Notifier};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Observable state of a [`ScriptedSource`].
#[derive(Debug, Default)]
pub struct SourceState {
    pub armed: bool,
    pub applied: Vec<f64>,
    pub arm_calls: u32,
    pub disarm_calls: u32,
    pub reads: u32,
    /// When set, `arm()` fails with this message.
    pub fail_arm: Option<&'static str>,
    /// When set, every `apply()` after the Nth fails.
    pub fail_apply_after: Option<u32>,
    /// Fires the token once `reads` reaches the count; lets tests cancel at
    /// a deterministic point mid-run.
    pub cancel_after_reads: Option<(u32, CancelToken)>,
}

/// Stimulus source whose failures and side effects are scripted up front.
/// Reads report the last applied level through a 1 kΩ ohmic load.
#[derive(Debug, Default, Clone)]
pub struct ScriptedSource {
    state: Arc<Mutex<SourceState>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_arm(message: &'static str) -> Self {
        let s = Self::default();
        s.state.lock().unwrap().fail_arm = Some(message);
        s
    }

    pub fn cancelling_after(reads: u32, token: CancelToken) -> Self {
        let s = Self::default();
        s.state.lock().unwrap().cancel_after_reads = Some((reads, token));
        s
    }

    /// Handle for assertions; stays valid after the runner consumes `self`.
    pub fn state(&self) -> Arc<Mutex<SourceState>> {
        Arc::clone(&self.state)
    }
}

impl sweep_traits::Source for ScriptedSource {
    fn arm(&mut self) -> Result<(), BoxError> {
        let mut st = self.state.lock().unwrap();
        st.arm_calls += 1;
        if let Some(msg) = st.fail_arm {
            return Err(msg.into());
        }
        st.armed = true;
        Ok(())
    }

    fn disarm(&mut self) -> Result<(), BoxError> {
        let mut st = self.state.lock().unwrap();
        st.disarm_calls += 1;
        st.armed = false;
        Ok(())
    }

    fn apply(&mut self, level_v: f64) -> Result<(), BoxError> {
        let mut st = self.state.lock().unwrap();
        if let Some(after) = st.fail_apply_after
            && st.applied.len() as u32 >= after
        {
            return Err("scripted apply failure".into());
        }
        st.applied.push(level_v);
        Ok(())
    }

    fn read(&mut self) -> Result<(f64, f64), BoxError> {
        let mut st = self.state.lock().unwrap();
        st.reads += 1;
        if let Some((after, token)) = &st.cancel_after_reads
            && st.reads >= *after
        {
            token.cancel();
        }
        let v = st.applied.last().copied().unwrap_or(0.0);
        Ok((v, v / 1_000.0))
    }
}

/// Sink that records every sample in memory.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    points: Arc<Mutex<Vec<SamplePoint>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn points(&self) -> Vec<SamplePoint> {
        self.points.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.points.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataSink for RecordingSink {
    fn record(&mut self, point: &SamplePoint) -> Result<(), BoxError> {
        self.points.lock().unwrap().push(point.clone());
        Ok(())
    }
}

/// Notifier that counts calls and keeps the message texts.
#[derive(Debug, Default, Clone)]
pub struct CountingNotifier {
    calls: Arc<Mutex<Vec<(String, bool)>>>,
}

impl CountingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, bool)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Notifier for CountingNotifier {
    fn notify(&mut self, message: &str, include_status: bool) -> Result<(), BoxError> {
        self.calls
            .lock()
            .unwrap()
            .push((message.to_string(), include_status));
        Ok(())
    }
}
