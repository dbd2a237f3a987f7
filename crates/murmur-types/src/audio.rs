//! Audio frame and loudness types.
//!
//! An `AudioFrame` is the unit of audio handed between pipeline stages. It is
//! immutable once produced; cloning shares the underlying sample buffer.

use std::sync::Arc;
use std::time::Duration;

/// A block of signed 16-bit mono samples tagged with its sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Creates a frame from samples recorded at `sample_rate` Hz.
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds. Zero for a zero sample rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }
}

/// A loudness reading in `[0, 1]` for UI feedback.
///
/// Transient: each new sample supersedes the previous one.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct VolumeSample(f32);

impl VolumeSample {
    /// Silence, reported when playback drains.
    pub const SILENT: Self = Self(0.0);

    /// Creates a sample, clamping into `[0, 1]`. NaN maps to silence.
    pub fn new(value: f32) -> Self {
        if value.is_nan() {
            return Self::SILENT;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl From<VolumeSample> for f32 {
    fn from(sample: VolumeSample) -> Self {
        sample.0
    }
}
