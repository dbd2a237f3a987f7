use thiserror::Error;

/// Errors raised while executing a tool invocation.
///
/// None of these fail the session: the bridge turns every one of them into
/// an `{"error": ...}` payload sent back under the invocation's id.
#[derive(Error, Debug)]
pub enum ToolError {
    /// A required argument is missing or has the wrong type.
    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The host capability reported a failure.
    #[error("capability failed: {0}")]
    Capability(String),

    /// The capability panicked while running.
    #[error("tool {0} panicked")]
    Panicked(String),

    /// The result could not be handed back to the session.
    #[error("tool result undeliverable: {0}")]
    Undeliverable(String),
}
