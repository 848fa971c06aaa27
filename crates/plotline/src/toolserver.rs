use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AgentResult;
use crate::models::tool::Tool;

pub mod http;
pub mod mock;

pub use http::HttpToolServer;
pub use mock::MockToolServer;

/// A remote server exposing data-retrieval tools.
///
/// The tool set is a capability list fetched once per turn; tools are named
/// operations with a schema, never a statically compiled interface, so the
/// set can change between turns without changing the orchestrator.
///
/// A connection is exclusively owned by one turn and closed at turn end,
/// success or failure — never pooled or reused across turns.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// List the tools currently available on the server
    async fn discover(&self) -> AgentResult<Vec<Tool>>;

    /// Execute a named tool and return its payload verbatim. One attempt per
    /// call; the model re-requesting the same tool later is an independent
    /// invocation.
    async fn invoke(&self, name: &str, arguments: Value) -> AgentResult<Value>;

    /// Release the connection. Safe to call when nothing was established.
    async fn close(&self) -> AgentResult<()>;
}
