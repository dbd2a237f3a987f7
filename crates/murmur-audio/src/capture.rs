//! Microphone capture.
//!
//! A `CaptureUnit` owns the input stream while active. Every block from the
//! device is downmixed, resampled to the capture rate, and cut into
//! fixed-size frames. Each frame reports its loudness and is handed to the
//! frame sink; the sink decides whether the frame goes anywhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use murmur_types::{AudioFrame, VolumeSample, CAPTURE_SAMPLE_RATE_HZ, DEFAULT_FRAME_SIZE};
use tracing::{debug, info};

use crate::codec;
use crate::device::{AudioBackend, InputStream};
use crate::error::AudioError;
use crate::resample::{downmix, FrameResampler};

/// Capture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Rate of emitted frames in Hz.
    pub sample_rate: u32,
    /// Samples per emitted frame.
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE_HZ,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

/// Owns the microphone while capture is active.
pub struct CaptureUnit {
    config: CaptureConfig,
    stream: Mutex<Option<Box<dyn InputStream>>>,
    active: Arc<AtomicBool>,
}

impl std::fmt::Debug for CaptureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureUnit")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish()
    }
}

impl CaptureUnit {
    /// Opens the input device and starts producing frames.
    ///
    /// `on_volume` receives one loudness sample per frame regardless of what
    /// `on_frame` does with the frame. Both run on the device thread and must
    /// not block.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::DeviceUnavailable` if there is no usable
    /// microphone or access is denied.
    pub fn start<V, F>(
        backend: &dyn AudioBackend,
        config: CaptureConfig,
        on_volume: V,
        mut on_frame: F,
    ) -> Result<Self, AudioError>
    where
        V: Fn(VolumeSample) + Send + 'static,
        F: FnMut(AudioFrame) + Send + 'static,
    {
        let format = backend.input_format(config.sample_rate)?;
        let mut resampler =
            FrameResampler::new(format.sample_rate, config.sample_rate, config.frame_size)?;

        info!(
            device_rate = format.sample_rate,
            channels = format.channels,
            frame_size = config.frame_size,
            "starting audio capture"
        );

        let active = Arc::new(AtomicBool::new(true));
        let callback_active = active.clone();
        let rate = config.sample_rate;

        let stream = backend.open_input(
            format,
            Box::new(move |block: &[f32]| {
                if !callback_active.load(Ordering::Acquire) {
                    return;
                }
                let mono = downmix(block, format.channels);
                resampler.push(&mono, |samples| {
                    // A callback may stop capture part way through a block.
                    if !callback_active.load(Ordering::Acquire) {
                        return;
                    }
                    on_volume(codec::rms(samples));
                    on_frame(codec::frame_from_samples(samples, rate));
                });
            }),
        )?;

        Ok(Self {
            config,
            stream: Mutex::new(Some(stream)),
            active,
        })
    }

    pub fn config(&self) -> CaptureConfig {
        self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stops capture and releases the device. Safe to call repeatedly and
    /// concurrently with an in-flight frame callback.
    pub fn stop(&self) {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut stream) = stream {
            stream.close();
            info!("audio capture stopped");
        } else if was_active {
            debug!("audio capture had no stream to release");
        }
    }
}

impl Drop for CaptureUnit {
    fn drop(&mut self) {
        self.stop();
    }
}
