//! Tool-call bridge.
//!
//! Every invocation gets exactly one result under its own id. Capabilities
//! run on tokio's blocking pool behind a spawned task so a slow or
//! panicking capability never stalls inbound audio routing; its failure
//! becomes an `{"error": ...}` payload instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use murmur_types::{ToolInvocation, ToolResult};
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::capability::{execute, Capabilities};
use crate::error::ToolError;

/// Receives tool results for delivery back to the remote model.
pub trait ToolResultSink: Send + Sync {
    fn deliver(&self, result: ToolResult) -> Result<(), ToolError>;
}

impl<F> ToolResultSink for F
where
    F: Fn(ToolResult) -> Result<(), ToolError> + Send + Sync,
{
    fn deliver(&self, result: ToolResult) -> Result<(), ToolError> {
        self(result)
    }
}

type StartHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Turns a tool error into the payload the model receives.
pub fn error_payload(error: &ToolError) -> Value {
    json!({ "error": error.to_string() })
}

/// Dispatches tool invocations to host capabilities.
pub struct ToolBridge {
    capabilities: Arc<dyn Capabilities>,
    sink: Arc<dyn ToolResultSink>,
    on_start: Option<StartHook>,
    accepting: Arc<AtomicBool>,
    tasks: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for ToolBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolBridge")
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

impl ToolBridge {
    pub fn new(capabilities: Arc<dyn Capabilities>, sink: Arc<dyn ToolResultSink>) -> Self {
        Self {
            capabilities,
            sink,
            on_start: None,
            accepting: Arc::new(AtomicBool::new(true)),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Called with the tool name before each dispatch.
    pub fn with_start_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(hook));
        self
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Starts executing `invocation` and returns immediately.
    ///
    /// Must be called from within a tokio runtime. Returns `false` if the
    /// bridge has been shut down and the invocation was dropped.
    pub fn dispatch(&self, invocation: ToolInvocation) -> bool {
        if !self.is_accepting() {
            debug!(id = %invocation.id, name = %invocation.name, "bridge shut down, dropping tool call");
            return false;
        }
        info!(id = %invocation.id, name = %invocation.name, "tool call received");
        if let Some(hook) = &self.on_start {
            hook(&invocation.name);
            // The hook may have shut the bridge down.
            if !self.is_accepting() {
                debug!(id = %invocation.id, "bridge shut down by start hook, dropping tool call");
                return false;
            }
        }

        let capabilities = self.capabilities.clone();
        let sink = self.sink.clone();
        let accepting = self.accepting.clone();

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            let call = invocation.clone();
            let outcome =
                tokio::task::spawn_blocking(move || execute(capabilities.as_ref(), &call)).await;

            let response = match outcome {
                Ok(Ok(payload)) => payload,
                Ok(Err(e)) => {
                    warn!(id = %invocation.id, name = %invocation.name, error = %e, "tool call failed");
                    error_payload(&e)
                }
                Err(join) if join.is_panic() => {
                    let e = ToolError::Panicked(invocation.name.clone());
                    warn!(id = %invocation.id, error = %e, "tool call panicked");
                    error_payload(&e)
                }
                Err(_) => return,
            };

            if !accepting.load(Ordering::Acquire) {
                debug!(id = %invocation.id, "discarding tool result after shutdown");
                return;
            }
            let result = ToolResult::new(&invocation, response);
            match sink.deliver(result) {
                Ok(()) => debug!(id = %invocation.id, "tool result delivered"),
                Err(e) => warn!(id = %invocation.id, error = %e, "tool result not delivered"),
            }
        });
        true
    }

    /// Stops accepting invocations and abandons in-flight ones. Idempotent.
    pub fn shutdown(&self) {
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return;
        }
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_all();
        debug!("tool bridge shut down");
    }
}

impl Drop for ToolBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
