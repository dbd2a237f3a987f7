//! Server-invoked tools for the Murmur voice engine.
//!
//! The remote model calls functions by name in the middle of a
//! conversation. This crate declares those functions, maps each call onto a
//! host [`Capabilities`] implementation, and runs it off the audio path via
//! [`ToolBridge`], answering every call with exactly one correlated result.

pub mod bridge;
pub mod capability;
pub mod declarations;
pub mod error;
pub mod workspace;

pub use bridge::{error_payload, ToolBridge, ToolResultSink};
pub use capability::{execute, today, CalendarEvent, Capabilities, CurrentTime, Email};
pub use declarations::default_tool_declarations;
pub use error::ToolError;
pub use workspace::{InMemoryWorkspace, SentEmail};
