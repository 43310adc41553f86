//! Scripted model adapter for tests and offline runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ModelRequest, ModelResponse, ToolCall};
use crate::domain::ports::ModelAdapter;

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Respond(ModelResponse),
    Fail(String),
}

impl ScriptedReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Respond(ModelResponse::text(content))
    }

    /// A single tool call with JSON arguments.
    pub fn tool(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::Respond(ModelResponse::with_tool_calls(vec![ToolCall::new(
            id,
            name,
            arguments.to_string(),
        )]))
    }

    pub fn tools(calls: Vec<ToolCall>) -> Self {
        Self::Respond(ModelResponse::with_tool_calls(calls))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// Hook invoked with the zero-based call index before each reply.
pub type ScriptHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Model adapter that replays queued replies in order.
///
/// Once the script is exhausted every request fails, which drives the
/// orchestrator into its degraded path.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ModelRequest>>,
    configured: bool,
    hook: Option<ScriptHook>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            configured: true,
            hook: None,
        }
    }

    /// A model that reports itself unconfigured.
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_hook(mut self, hook: ScriptHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn complete(&self, request: ModelRequest) -> DomainResult<ModelResponse> {
        let index = {
            let mut requests = self.requests.lock().await;
            requests.push(request);
            requests.len() - 1
        };
        if let Some(hook) = &self.hook {
            hook(index);
        }
        match self.replies.lock().await.pop_front() {
            Some(ScriptedReply::Respond(response)) => Ok(response),
            Some(ScriptedReply::Fail(message)) => Err(DomainError::Model(message)),
            None => Err(DomainError::Model("scripted replies exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ChatMessage;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ChatMessage::user("q")],
            tools: Vec::new(),
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_replays_in_order_then_fails() {
        let model = ScriptedModel::new(vec![
            ScriptedReply::text("plan"),
            ScriptedReply::tool("c1", "list_dir", serde_json::json!({"targetPath": "."})),
        ]);
        assert_eq!(model.complete(request()).await.unwrap().text_content(), "plan");
        assert!(model.complete(request()).await.unwrap().has_tool_calls());
        assert!(model.complete(request()).await.is_err());
        assert_eq!(model.call_count().await, 3);
    }

    #[test]
    fn test_unconfigured() {
        assert!(!ScriptedModel::unconfigured().is_configured());
    }
}
