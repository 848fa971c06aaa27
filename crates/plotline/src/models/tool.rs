use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised by the tool server, usable by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool, unique within a discovery snapshot
    pub name: String,
    /// A description of what the tool does
    #[serde(default)]
    pub description: String,
    /// JSON schema for the tool's arguments, passed through opaquely
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl Tool {
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool call the model asked for, ready to execute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The name of the tool to execute
    pub name: String,
    /// The arguments for the execution
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// The recorded outcome of one tool invocation. Exactly one of `result`
/// and `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutcome {
    pub tool: String,
    pub arguments: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success<S: Into<String>>(tool: S, arguments: Value, result: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure<S: Into<String>, E: Into<String>>(tool: S, arguments: Value, error: E) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
