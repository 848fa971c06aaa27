use chrono::Utc;

use super::role::Role;

/// A tool call requested by the model. Arguments are kept as the raw JSON
/// text the model produced so the exchange replays to the completion service
/// byte-for-byte; the executor parses them and answers a bad payload with a
/// failed tool result instead of aborting the turn.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A message to or from an LLM
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: String,
    /// Tool calls requested by an assistant message
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_requests: Vec<ToolRequest>,
    /// Correlates a tool-role message back to the request it answers
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: String::new(),
            tool_requests: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Message::new(Role::System)
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Message::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Message::new(Role::Assistant)
    }

    /// Create a new tool-role message answering the given request id
    pub fn tool<S: Into<String>>(tool_call_id: S) -> Self {
        Message {
            tool_call_id: Some(tool_call_id.into()),
            ..Message::new(Role::Tool)
        }
    }

    /// Set the text content of the message
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = text.into();
        self
    }

    /// Add a tool request to an assistant message
    pub fn with_tool_request<I, N, A>(mut self, id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        self.tool_requests.push(ToolRequest {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        });
        self
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }
}
