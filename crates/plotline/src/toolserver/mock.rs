use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::ToolServer;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::Tool;

/// A scripted tool server for testing the agent loop without a network
#[derive(Default)]
pub struct MockToolServer {
    tools: Vec<Tool>,
    responses: Mutex<HashMap<String, VecDeque<AgentResult<Value>>>>,
    discover_error: Option<String>,
    invocations: Arc<Mutex<Vec<(String, Value)>>>,
    closed: Arc<AtomicBool>,
}

impl MockToolServer {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self {
            tools,
            ..Default::default()
        }
    }

    /// A server whose discovery always fails, for exercising fatal paths
    pub fn failing_discovery<S: Into<String>>(error: S) -> Self {
        Self {
            discover_error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Queue a successful payload for the named tool
    pub fn with_result<S: Into<String>>(self, tool: S, result: Value) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(tool.into())
            .or_default()
            .push_back(Ok(result));
        self
    }

    /// Queue a failure for the named tool
    pub fn with_failure<S: Into<String>, E: Into<String>>(self, tool: S, error: E) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(tool.into())
            .or_default()
            .push_back(Err(AgentError::ExecutionError(error.into())));
        self
    }

    /// Handle for asserting on recorded invocations after the turn
    pub fn invocations(&self) -> Arc<Mutex<Vec<(String, Value)>>> {
        self.invocations.clone()
    }

    /// Handle for asserting the connection was released
    pub fn close_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

#[async_trait]
impl ToolServer for MockToolServer {
    async fn discover(&self) -> AgentResult<Vec<Tool>> {
        if let Some(error) = &self.discover_error {
            return Err(AgentError::Internal(error.clone()));
        }
        Ok(self.tools.clone())
    }

    async fn invoke(&self, name: &str, arguments: Value) -> AgentResult<Value> {
        self.invocations
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));

        self.responses
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Err(AgentError::ToolNotFound(name.to_string())))
    }

    async fn close(&self) -> AgentResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
