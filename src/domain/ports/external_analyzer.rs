//! External analysis port - optional static-analysis collaborator.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::models::ToolName;

/// Failure of an external analysis invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalToolError {
    /// The runner could not be started (missing interpreter or script).
    #[error("external analyzer unavailable: {0}")]
    Unavailable(String),

    /// The runner started but reported or caused a failure.
    #[error("external analyzer failed: {0}")]
    Failed(String),
}

/// Runs `extract_import_graph` / `analyze_complexity` out of process.
#[async_trait]
pub trait ExternalAnalyzer: Send + Sync {
    async fn run(
        &self,
        tool: ToolName,
        files: &[PathBuf],
        workspace: &Path,
    ) -> Result<serde_json::Value, ExternalToolError>;
}

/// What to do after an external tool failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    /// Stop calling this tool for the rest of the run.
    Skip,
    /// Retry once for each call of this tool.
    Retry,
}

/// Decides how to handle an external tool failure. Consulted at most once
/// per tool per run.
pub trait FailureResolver: Send + Sync {
    fn resolve(&self, tool: ToolName, error: &ExternalToolError) -> FailureDecision;
}

/// Resolver that always skips. Used when no one can be asked.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysSkip;

impl FailureResolver for AlwaysSkip {
    fn resolve(&self, _tool: ToolName, _error: &ExternalToolError) -> FailureDecision {
        FailureDecision::Skip
    }
}

/// Resolver that always retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl FailureResolver for AlwaysRetry {
    fn resolve(&self, _tool: ToolName, _error: &ExternalToolError) -> FailureDecision {
        FailureDecision::Retry
    }
}
