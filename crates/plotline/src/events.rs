use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::tool::ToolOutcome;
use crate::providers::base::Usage;

/// Step tags for progress events, serialized the way the stream consumers
/// (SSE clients, test harnesses) match on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStep {
    Init,
    Tools,
    ToolsFound,
    AnalysisStart,
    IterationStart,
    ToolsExecuting,
    ToolExecuting,
    ToolCompleted,
    ToolError,
    IterationComplete,
    Complete,
    MaxIterations,
}

/// A transient status notification describing loop state. Ordering within a
/// turn is the only guarantee; nothing here is part of the final answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub message: String,
    pub step: ProgressStep,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub iteration: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_iterations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub arguments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tools_executed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Progress {
    pub fn new<S: Into<String>>(step: ProgressStep, message: S) -> Self {
        Self {
            message: message.into(),
            step,
            iteration: None,
            max_iterations: None,
            tool: None,
            arguments: None,
            tool_count: None,
            tools_executed: None,
            success: None,
            error: None,
        }
    }

    pub fn with_iteration(mut self, iteration: usize) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_tool<S: Into<String>>(mut self, tool: S) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    pub fn with_tool_count(mut self, tool_count: usize) -> Self {
        self.tool_count = Some(tool_count);
        self
    }

    pub fn with_tools_executed(mut self, tools_executed: usize) -> Self {
        self.tools_executed = Some(tools_executed);
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_error<S: Into<String>>(mut self, error: S) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// The terminal payload of a successful turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResult {
    pub response: String,
    pub tool_results: Vec<ToolOutcome>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub usage: Option<Usage>,
    pub iterations: usize,
}

/// The terminal payload of a failed turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnError {
    pub error: String,
    pub details: String,
}

/// One event on the turn stream. A turn emits zero or more `Progress`
/// events followed by exactly one terminal event: `Result` then `Done`,
/// or `Error` alone — never both.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Progress(Progress),
    Result(TurnResult),
    Error(TurnError),
    Done,
}

impl TurnEvent {
    pub fn error<E: Into<String>, D: Into<String>>(error: E, details: D) -> Self {
        TurnEvent::Error(TurnError {
            error: error.into(),
            details: details.into(),
        })
    }

    /// Event name as it appears on the wire (`event:` field of an SSE frame)
    pub fn name(&self) -> &'static str {
        match self {
            TurnEvent::Progress(_) => "progress",
            TurnEvent::Result(_) => "result",
            TurnEvent::Error(_) => "error",
            TurnEvent::Done => "done",
        }
    }

    /// Event payload as it appears on the wire (`data:` field of an SSE frame)
    pub fn payload(&self) -> Value {
        match self {
            TurnEvent::Progress(progress) => serde_json::to_value(progress).unwrap_or_default(),
            TurnEvent::Result(result) => serde_json::to_value(result).unwrap_or_default(),
            TurnEvent::Error(error) => serde_json::to_value(error).unwrap_or_default(),
            TurnEvent::Done => serde_json::json!({"message": "Stream complete"}),
        }
    }

    pub fn as_progress(&self) -> Option<&Progress> {
        match self {
            TurnEvent::Progress(progress) => Some(progress),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<&TurnResult> {
        match self {
            TurnEvent::Result(result) => Some(result),
            _ => None,
        }
    }
}
