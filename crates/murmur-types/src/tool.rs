//! Tool invocation types exchanged with the remote model.
//!
//! A `ToolInvocation` arrives embedded in the inbound stream, is dispatched
//! exactly once, and is answered by exactly one `ToolResult` carrying the
//! same `id`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A function call requested by the remote model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation identifier echoed back in the result.
    #[serde(default)]
    pub id: String,
    /// Name of the capability to invoke.
    pub name: String,
    /// Arguments as received. Normally an object keyed by parameter name;
    /// any other shape is kept so execution can reject it under this id.
    #[serde(default)]
    pub args: Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args: Value::Object(Map::new()),
        }
    }

    /// Adds an argument, builder style. Replaces non-object arguments.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if !self.args.is_object() {
            self.args = Value::Object(Map::new());
        }
        if let Value::Object(args) = &mut self.args {
            args.insert(key.into(), value.into());
        }
        self
    }

    /// Whether the arguments are an object or absent altogether.
    pub fn has_object_args(&self) -> bool {
        self.args.is_object() || self.args.is_null()
    }

    /// Returns a string argument, or `None` if it is absent or not a string.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    pub fn arg_bool(&self, key: &str) -> Option<bool> {
        self.args.get(key).and_then(Value::as_bool)
    }
}

/// The reply to a `ToolInvocation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub response: Value,
}

impl ToolResult {
    pub fn new(invocation: &ToolInvocation, response: Value) -> Self {
        Self {
            id: invocation.id.clone(),
            name: invocation.name.clone(),
            response,
        }
    }

    /// Whether the response carries an `error` field.
    pub fn is_error(&self) -> bool {
        self.response.get("error").is_some()
    }
}

/// A function advertised to the remote model at session setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema describing the parameters object.
    pub parameters: Value,
}
