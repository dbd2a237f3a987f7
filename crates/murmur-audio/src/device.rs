//! Device abstraction between the pipeline and a concrete audio host.
//!
//! The capture and playback components only talk to these traits, so the
//! session can run against real hardware (`CpalBackend`) or against the
//! scripted devices in `testing`.

use std::sync::Arc;

use crate::error::AudioError;

/// Negotiated format of an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    /// Native sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels per block.
    pub channels: u16,
}

/// Receives interleaved float blocks on the device thread.
///
/// Implementations must return quickly; the callback runs on the capture
/// cadence.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Invoked once when a scheduled buffer finishes playing.
pub type EndedCallback = Box<dyn FnOnce() + Send + 'static>;

/// An open input stream. Dropping or closing it releases the device.
pub trait InputStream: Send {
    /// Stops delivery and releases the device. Idempotent.
    fn close(&mut self);
}

/// An output device with a monotonic clock and a start-time scheduler.
pub trait OutputDevice: Send + Sync {
    /// Seconds elapsed on the device timeline.
    fn current_time(&self) -> f64;

    /// Plays mono `samples` recorded at `sample_rate` starting at `start_at`
    /// seconds on the device timeline.
    fn schedule(
        &self,
        start_at: f64,
        samples: Vec<f32>,
        sample_rate: u32,
        on_ended: EndedCallback,
    ) -> Result<(), AudioError>;

    /// Drops every buffer that has not finished playing. Their ended
    /// callbacks never fire.
    fn clear(&self);

    /// Releases the device. Idempotent.
    fn close(&self);
}

/// Source of input and output devices.
pub trait AudioBackend: Send + Sync {
    /// Negotiates the input format closest to `preferred_rate`.
    fn input_format(&self, preferred_rate: u32) -> Result<InputFormat, AudioError>;

    /// Opens the input device with a previously negotiated format.
    fn open_input(
        &self,
        format: InputFormat,
        on_block: InputCallback,
    ) -> Result<Box<dyn InputStream>, AudioError>;

    /// Opens the output device, preferring `sample_rate`.
    fn open_output(&self, sample_rate: u32) -> Result<Arc<dyn OutputDevice>, AudioError>;
}
