//! Host-facing notifications.

use murmur_types::{SessionState, TranscriptUpdate};
use tokio::sync::mpsc;

/// Receives session notifications.
///
/// `on_volume` is called from the audio device thread at frame rate and
/// must return quickly. Every method has an empty default so hosts only
/// implement what they display.
pub trait SessionObserver: Send + Sync {
    /// Microphone loudness, model-speaking feedback, or `0.0` once playback
    /// drains.
    fn on_volume(&self, _level: f32) {}

    fn on_transcript(&self, _update: TranscriptUpdate) {}

    /// A tool call is about to run.
    fn on_tool_start(&self, _name: &str) {}

    fn on_state(&self, _state: SessionState) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// A notification forwarded by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Volume(f32),
    Transcript(TranscriptUpdate),
    ToolStart(String),
    State(SessionState),
}

/// Forwards every notification into an unbounded channel, for hosts that
/// consume events from an async task.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_volume(&self, level: f32) {
        self.forward(SessionEvent::Volume(level));
    }

    fn on_transcript(&self, update: TranscriptUpdate) {
        self.forward(SessionEvent::Transcript(update));
    }

    fn on_tool_start(&self, name: &str) {
        self.forward(SessionEvent::ToolStart(name.to_string()));
    }

    fn on_state(&self, state: SessionState) {
        self.forward(SessionEvent::State(state));
    }
}
