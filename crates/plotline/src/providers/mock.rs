use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
    usage: Usage,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            usage: Usage::default(),
        }
    }

    /// Report the given usage on every completion
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, _messages: &[Message], _tools: &[Tool]) -> Result<(Message, Usage)> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok((Message::assistant().with_text(""), self.usage.clone()))
        } else {
            Ok((responses.remove(0), self.usage.clone()))
        }
    }
}

/// A provider whose every completion fails, for exercising fatal paths
pub struct FailingProvider {
    message: String,
}

impl FailingProvider {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Provider for FailingProvider {
    async fn complete(&self, _messages: &[Message], _tools: &[Tool]) -> Result<(Message, Usage)> {
        Err(anyhow!("{}", self.message))
    }
}
