//! Shared types and constants for the Murmur voice engine.
//!
//! This crate provides the data model used across all Murmur crates:
//! audio frames, speaker channels, session states, transcript updates,
//! and the tool invocation types exchanged with the remote model.
//!
//! No crate in the workspace depends on anything *except* `murmur-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod audio;
mod tool;

pub use audio::{AudioFrame, VolumeSample};
pub use tool::{ToolDeclaration, ToolInvocation, ToolResult};

/// Sample rate (16 kHz) of microphone frames sent to the remote model.
pub const CAPTURE_SAMPLE_RATE_HZ: u32 = 16_000;

/// Sample rate (24 kHz) of synthesized speech received from the remote model.
pub const PLAYBACK_SAMPLE_RATE_HZ: u32 = 24_000;

/// Number of samples per capture frame.
pub const DEFAULT_FRAME_SIZE: usize = 2048;

/// The two transcript channels of a voice conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The human speaking into the microphone.
    User,
    /// The remote conversational model.
    Model,
}

impl Speaker {
    /// Returns the string label for this speaker.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown speaker label.
#[derive(Debug, Clone, Error)]
#[error("unknown speaker: {0}")]
pub struct ParseSpeakerError(pub String);

impl std::str::FromStr for Speaker {
    type Err = ParseSpeakerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "model" => Ok(Self::Model),
            _ => Err(ParseSpeakerError(s.to_string())),
        }
    }
}

/// Lifecycle of a streaming session.
///
/// `Idle → Connecting → Open → Closing → Closed`. Any state may move to
/// `Closed` on error or explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has been started yet.
    #[default]
    Idle,
    /// Devices are being acquired and the handshake is in flight.
    Connecting,
    /// The remote model is accepting audio and tool results.
    Open,
    /// Teardown is in progress.
    Closing,
    /// The session has ended; a new `connect` is allowed.
    Closed,
}

impl SessionState {
    /// Returns the canonical label for this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether a session in this state holds devices or a connection.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Open | Self::Closing)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transcript notification for one speaker.
///
/// Non-final updates carry the full accumulated text of the current turn,
/// not just the latest fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptUpdate {
    pub speaker: Speaker,
    pub text: String,
    pub is_final: bool,
}

impl TranscriptUpdate {
    pub fn partial(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            is_final: false,
        }
    }

    pub fn final_text(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            is_final: true,
        }
    }
}
