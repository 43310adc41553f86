//! Model adapter port - interface for tool-calling chat models.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ModelRequest, ModelResponse};

/// A chat model that can be offered tools.
///
/// Implementations normalize their provider's response shape into
/// [`ModelResponse`] so the orchestrator never inspects raw payloads.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Adapter name, used in logs.
    fn name(&self) -> &str;

    /// Whether credentials are present. When `false` the orchestrator takes
    /// the local path without sending any request.
    fn is_configured(&self) -> bool;

    /// Send one request and wait for the complete response.
    async fn complete(&self, request: ModelRequest) -> DomainResult<ModelResponse>;
}
