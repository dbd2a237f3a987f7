//! Sample-rate conversion and re-framing.
//!
//! Capture devices deliver blocks at their native rate, channel count, and
//! buffer size. `FrameResampler` turns that into fixed-size mono frames at
//! the capture rate. Playback uses `resample_linear`, which is enough for
//! short speech buffers and keeps each buffer independent.

use rubato::{FftFixedIn, Resampler};

use crate::error::AudioError;

const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Converts a stream of mono blocks into fixed-size frames at a target rate.
pub struct FrameResampler {
    resampler: Option<FftFixedIn<f32>>,
    chunk_in: usize,
    in_buf: Vec<f32>,
    frame_samples: usize,
    pending: Vec<f32>,
}

impl std::fmt::Debug for FrameResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameResampler")
            .field("resampling", &self.resampler.is_some())
            .field("frame_samples", &self.frame_samples)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl FrameResampler {
    /// Creates a resampler from `in_hz` to `out_hz` emitting `frame_samples`
    /// samples per frame.
    ///
    /// # Errors
    ///
    /// Returns `AudioError::Stream` if the rates are unusable.
    pub fn new(in_hz: u32, out_hz: u32, frame_samples: usize) -> Result<Self, AudioError> {
        if frame_samples == 0 {
            return Err(AudioError::Stream("frame size must be positive".to_string()));
        }

        let mut chunk_in = RESAMPLER_CHUNK_SIZE;
        let resampler = if in_hz == out_hz {
            None
        } else {
            let r = FftFixedIn::<f32>::new(
                in_hz as usize,
                out_hz as usize,
                RESAMPLER_CHUNK_SIZE,
                1,
                1,
            )
            .map_err(|e| AudioError::Stream(format!("failed to create resampler: {e}")))?;
            // The FFT size is rounded to fit the rate ratio.
            chunk_in = r.input_frames_next();
            Some(r)
        };

        Ok(Self {
            resampler,
            chunk_in,
            in_buf: Vec::with_capacity(chunk_in),
            frame_samples,
            pending: Vec::with_capacity(frame_samples),
        })
    }

    /// Feeds mono samples, calling `emit` once per completed frame.
    pub fn push(&mut self, mut src: &[f32], mut emit: impl FnMut(&[f32])) {
        if self.resampler.is_none() {
            self.emit_frames(src, &mut emit);
            return;
        }

        while !src.is_empty() {
            let space = self.chunk_in - self.in_buf.len();
            let take = space.min(src.len());
            self.in_buf.extend_from_slice(&src[..take]);
            src = &src[take..];

            if self.in_buf.len() == self.chunk_in {
                let out = match self.resampler.as_mut() {
                    Some(r) => r.process(&[&self.in_buf[..]], None),
                    None => break,
                };
                self.in_buf.clear();
                match out {
                    Ok(out) => self.emit_frames(&out[0], &mut emit),
                    Err(e) => tracing::warn!(error = %e, "resampler dropped a chunk"),
                }
            }
        }
    }

    fn emit_frames(&mut self, mut data: &[f32], emit: &mut impl FnMut(&[f32])) {
        while !data.is_empty() {
            let space = self.frame_samples - self.pending.len();
            let take = space.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.frame_samples {
                emit(&self.pending);
                self.pending.clear();
            }
        }
    }
}

/// Averages interleaved channels down to mono.
pub fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = usize::from(channels.max(1));
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|c| c.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampling of one mono buffer.
pub fn resample_linear(samples: &[f32], in_hz: u32, out_hz: u32) -> Vec<f32> {
    if in_hz == out_hz || samples.is_empty() || in_hz == 0 || out_hz == 0 {
        return samples.to_vec();
    }
    let ratio = f64::from(in_hz) / f64::from(out_hz);
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let last = samples.len() - 1;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}
