use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use super::ToolServer;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SESSION_HEADER: &str = "mcp-session-id";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(default)]
    id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

#[derive(Default)]
struct Session {
    initialized: bool,
    id: Option<String>,
}

/// JSON-RPC 2.0 client for a streamable-HTTP tool server.
///
/// The handshake runs lazily on the first request, so a dead server surfaces
/// through `discover` as a turn-fatal error rather than at construction.
pub struct HttpToolServer {
    client: Client,
    url: Url,
    next_id: AtomicU64,
    session: Mutex<Session>,
}

impl HttpToolServer {
    pub fn new(url: &str) -> AgentResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| AgentError::Internal(format!("Invalid tool server url: {}", e)))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AgentError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
            session: Mutex::new(Session::default()),
        })
    }

    fn headers(&self, session_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        if let Some(id) = session_id {
            if let Ok(value) = HeaderValue::from_str(id) {
                headers.insert(SESSION_HEADER, value);
            }
        }
        headers
    }

    async fn post(&self, body: Value, session_id: Option<&str>) -> AgentResult<reqwest::Response> {
        let response = self
            .client
            .post(self.url.clone())
            .headers(self.headers(session_id))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ExecutionError(format!("Tool server request failed: {}", e)))?;

        if !response.status().is_success() && response.status().as_u16() != 202 {
            return Err(AgentError::ExecutionError(format!(
                "Tool server returned {}",
                response.status()
            )));
        }
        Ok(response)
    }

    /// Perform the initialize handshake once, capturing the session id the
    /// server may assign.
    async fn ensure_session(&self) -> AgentResult<Option<String>> {
        let mut session = self.session.lock().await;
        if session.initialized {
            return Ok(session.id.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "clientInfo": {
                    "name": "plotline",
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }
        });

        let response = self.post(request, None).await?;
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;
        let rpc = parse_rpc_payload(&body)?;
        if let Some(error) = rpc.error {
            return Err(AgentError::ExecutionError(format!(
                "Initialize failed: {} (code {})",
                error.message, error.code
            )));
        }

        // The server expects the initialized notification before any request
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        });
        self.post(notification, session_id.as_deref()).await?;

        session.initialized = true;
        session.id = session_id.clone();
        Ok(session_id)
    }

    async fn request(&self, method: &str, params: Value) -> AgentResult<Value> {
        let session_id = self.ensure_session().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.post(request, session_id.as_deref()).await?;
        let body = response
            .text()
            .await
            .map_err(|e| AgentError::ExecutionError(e.to_string()))?;
        let rpc = parse_rpc_payload(&body)?;

        if let Some(error) = rpc.error {
            return Err(AgentError::ExecutionError(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }
        rpc.result
            .ok_or_else(|| AgentError::ExecutionError(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ToolServer for HttpToolServer {
    async fn discover(&self) -> AgentResult<Vec<Tool>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| AgentError::Internal("tools/list result had no tools".to_string()))?;
        serde_json::from_value(tools)
            .map_err(|e| AgentError::Internal(format!("Malformed tool list: {}", e)))
    }

    async fn invoke(&self, name: &str, arguments: Value) -> AgentResult<Value> {
        let result = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        if result.get("isError").and_then(|v| v.as_bool()) == Some(true) {
            return Err(AgentError::ExecutionError(content_text(&result)));
        }

        // The content array is the payload; it stays opaque to this layer
        Ok(result.get("content").cloned().unwrap_or(result))
    }

    async fn close(&self) -> AgentResult<()> {
        let session = self.session.lock().await;
        if !session.initialized {
            return Ok(());
        }
        let mut request = self.client.delete(self.url.clone());
        if let Some(id) = &session.id {
            request = request.header(SESSION_HEADER, id);
        }
        // Best effort: the server reclaims the session on its own timeout
        if let Err(e) = request.send().await {
            debug!("Tool server session close failed: {}", e);
        }
        Ok(())
    }
}

/// Decode a JSON-RPC response body that is either plain JSON or an SSE frame
/// (`data:` lines), which streamable-HTTP servers may answer with.
fn parse_rpc_payload(body: &str) -> AgentResult<JsonRpcResponse> {
    if let Ok(rpc) = serde_json::from_str::<JsonRpcResponse>(body) {
        return Ok(rpc);
    }

    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data:") {
            if let Ok(rpc) = serde_json::from_str::<JsonRpcResponse>(data.trim()) {
                return Ok(rpc);
            }
        }
    }

    Err(AgentError::ExecutionError(
        "Tool server response was not a JSON-RPC message".to_string(),
    ))
}

/// Join the text items of a tool result's content array, for error reporting
fn content_text(result: &Value) -> String {
    let texts: Vec<&str> = result
        .get("content")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        "Tool execution failed".to_string()
    } else {
        texts.join("\n")
    }
}
