use murmur_audio::{AudioError, CodecError};
use thiserror::Error;

/// Errors surfaced by the streaming session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No microphone or speaker, or access to one was denied.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The network session could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Inbound audio or transport text was malformed.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// The session is not open.
    #[error("session not connected")]
    NotConnected,

    /// A session is already connecting or open.
    #[error("a voice session is already active")]
    AlreadyActive,

    /// `stop` was called while `connect` was still in flight.
    #[error("connect aborted by stop")]
    Aborted,

    /// The server sent something the session cannot act on.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<AudioError> for SessionError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::DeviceUnavailable(msg) | AudioError::Stream(msg) => {
                SessionError::DeviceUnavailable(msg)
            }
            AudioError::Decode(e) => SessionError::DecodeError(e.to_string()),
            AudioError::Stopped => SessionError::NotConnected,
        }
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::DecodeError(e.to_string())
    }
}
