//! Live signal channel: fire-and-forget frames for a UI or printer thread.

use crossbeam_channel as xch;

use crate::plan::SamplePoint;

/// Event stream seen by the consumer side.
#[derive(Debug, Clone)]
pub enum SignalEvent {
    Data(SamplePoint),
    Aborted,
}

/// Emission seam used by the runner. Infallible by contract: implementations
/// drop frames rather than block or error.
pub trait SignalChannel {
    fn emit(&self, point: &SamplePoint);
    fn emit_aborted(&self);
}

/// Discards everything; the default when no UI is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSignals;

impl SignalChannel for NullSignals {
    fn emit(&self, _point: &SamplePoint) {}
    fn emit_aborted(&self) {}
}

/// Crossbeam-backed channel implementation. A full channel drops frames
/// (`try_send`) so a slow consumer can never stall the measurement loop.
pub struct ChannelSignals {
    tx: xch::Sender<SignalEvent>,
}

impl ChannelSignals {
    /// Build a bounded sender/receiver pair.
    pub fn pair(capacity: usize) -> (Self, xch::Receiver<SignalEvent>) {
        let (tx, rx) = xch::bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl SignalChannel for ChannelSignals {
    fn emit(&self, point: &SamplePoint) {
        if self.tx.try_send(SignalEvent::Data(point.clone())).is_err() {
            tracing::trace!("live channel full, frame dropped");
        }
    }

    fn emit_aborted(&self) {
        let _ = self.tx.try_send(SignalEvent::Aborted);
    }
}
