//! Streaming voice session for the Murmur voice engine.
//!
//! A [`VoiceSession`] captures microphone audio, streams it to the remote
//! model over a [`Connector`], plays the model's speech back gap-free,
//! assembles transcripts, and answers the model's tool calls through the
//! tool bridge. Hosts watch it through a [`SessionObserver`].

pub mod config;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod session;
pub mod transcript;
pub mod transport;

pub use config::{SessionConfig, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION, DEFAULT_VOICE};
pub use error::SessionError;
pub use observer::{ChannelObserver, NoopObserver, SessionEvent, SessionObserver};
pub use protocol::{ClientMessage, InboundEvent, ServerMessage};
pub use session::{OutboundEvent, VoiceSession};
pub use transcript::TranscriptAggregator;
pub use transport::{
    Connection, Connector, GeminiConnector, Inbound, RemoteEnd, DEFAULT_ENDPOINT,
    DEFAULT_HANDSHAKE_TIMEOUT,
};
