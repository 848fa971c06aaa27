use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};

use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::Tool;

/// Convert internal messages to the chat-completions message specification.
///
/// Tool requests ride on assistant messages as `tool_calls` with the raw
/// argument text, and tool-role messages carry the `tool_call_id` they
/// answer, so a replayed history is identical to what the service produced.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });

        match message.role {
            Role::System | Role::User => {
                converted["content"] = json!(message.content);
            }
            Role::Assistant => {
                if !message.content.is_empty() {
                    converted["content"] = json!(message.content);
                }
                if !message.tool_requests.is_empty() {
                    let tool_calls: Vec<Value> = message
                        .tool_requests
                        .iter()
                        .map(|request| {
                            json!({
                                "id": request.id,
                                "type": "function",
                                "function": {
                                    "name": sanitize_function_name(&request.name),
                                    "arguments": request.arguments,
                                }
                            })
                        })
                        .collect();
                    converted["tool_calls"] = json!(tool_calls);
                }
            }
            Role::Tool => {
                converted["content"] = json!(message.content);
                if let Some(id) = &message.tool_call_id {
                    converted["tool_call_id"] = json!(id);
                }
            }
        }

        messages_spec.push(converted);
    }

    messages_spec
}

/// Convert tool descriptors to the chat-completions function specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert a chat-completions response into an internal assistant message
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("Response had no message choice"))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|c| c.as_str()) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();
            message = message.with_tool_request(id, name, arguments);
        }
    }

    Ok(message)
}

fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    re.replace_all(name, "_").to_string()
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
