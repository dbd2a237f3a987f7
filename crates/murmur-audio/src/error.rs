//! Error types for the audio layer.

use thiserror::Error;

/// Errors from the PCM codec and transport encoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A 16-bit PCM buffer must contain an even number of bytes.
    #[error("pcm buffer has odd length: {0} bytes")]
    OddLength(usize),

    /// The transport text contained characters outside the base64 alphabet.
    #[error("malformed transport text: {0}")]
    Transport(#[from] base64::DecodeError),
}

/// Errors from capture, playback, and device management.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No device exists, or access to it was denied.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A running device stream reported an error.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// Inbound audio could not be decoded.
    #[error("audio decode error: {0}")]
    Decode(#[from] CodecError),

    /// The component has been shut down and accepts no more work.
    #[error("audio component stopped")]
    Stopped,
}
