//! PCM codec: float samples to 16-bit little-endian PCM and back, plus the
//! base64 transport text used on the wire.
//!
//! All functions are pure. Quantization is asymmetric: negative samples are
//! scaled by 32768 and non-negative samples by 32767 so both ends of the
//! `[-1, 1]` range map onto the full `i16` range without overflow.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use murmur_types::{AudioFrame, VolumeSample};

use crate::error::CodecError;

/// Quantizes one float sample to `i16`, clamping to `[-1, 1]` first.
pub fn quantize(sample: f32) -> i16 {
    let s = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Maps an `i16` sample back into `[-1, 1)`.
pub fn dequantize(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Encodes float samples as 16-bit little-endian PCM bytes.
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        bytes.extend_from_slice(&quantize(s).to_le_bytes());
    }
    bytes
}

/// Decodes 16-bit little-endian PCM bytes into float samples.
///
/// The sample rate does not affect the values; it is accepted so callers
/// keep frame metadata next to the bytes it describes.
///
/// # Errors
///
/// Returns `CodecError::OddLength` if `bytes` cannot hold whole samples.
pub fn decode_frame(bytes: &[u8], _sample_rate: u32) -> Result<Vec<f32>, CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| dequantize(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

/// Builds an `AudioFrame` from float samples.
pub fn frame_from_samples(samples: &[f32], sample_rate: u32) -> AudioFrame {
    let quantized: Vec<i16> = samples.iter().map(|&s| quantize(s)).collect();
    AudioFrame::new(quantized, sample_rate)
}

/// Serializes an `AudioFrame` as little-endian PCM bytes.
pub fn frame_to_bytes(frame: &AudioFrame) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(frame.len() * 2);
    for &s in frame.samples() {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}

/// Encodes arbitrary bytes as base64 transport text.
pub fn to_transport_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes base64 transport text.
///
/// # Errors
///
/// Returns `CodecError::Transport` for characters outside the alphabet or
/// invalid padding.
pub fn from_transport_text(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(text.trim())?)
}

/// Root-mean-square loudness of a block of samples.
pub fn rms(samples: &[f32]) -> VolumeSample {
    if samples.is_empty() {
        return VolumeSample::SILENT;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    VolumeSample::new((sum / samples.len() as f32).sqrt())
}
