//! Research orchestrator - drives one research run from query to result.
//!
//! The orchestrator is split into subsystems:
//!
//! - **types**: request and progress types
//! - **state**: per-run mutable state (history, steps, evidence, usage)
//! - **llm_loop**: the model-driven tool-calling loop and its controllers
//! - **finalize**: evidence-depth remediation, forced finalization, result assembly
//! - **local**: deterministic walk used when no model is configured

pub mod types;
mod finalize;
mod llm_loop;
mod local;
mod state;

pub use types::{ProgressCallback, ProgressEvent, ResearchRequest};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CodeTree, ResearchConfig, ResearchResult, Stage};
use crate::domain::ports::{
    AlwaysSkip, ExternalAnalyzer, FailureResolver, ModelAdapter, RunLogKind, TreeCache,
    TreeFilter, WorkspaceTools,
};
use crate::services::discovery::DiscoverySession;
use crate::services::tool_executor::{CompressionPolicy, ToolExecutor};

use state::RunState;

/// Coordinates the model, the workspace tools, and the research controllers.
pub struct ResearchOrchestrator {
    pub(super) config: ResearchConfig,
    pub(super) tools: Arc<dyn WorkspaceTools>,
    pub(super) model: Option<Arc<dyn ModelAdapter>>,
    pub(super) analyzer: Option<Arc<dyn ExternalAnalyzer>>,
    pub(super) resolver: Arc<dyn FailureResolver>,
    pub(super) cache: Option<Arc<dyn TreeCache>>,
    pub(super) max_tokens: Option<u32>,
}

impl ResearchOrchestrator {
    pub fn new(config: ResearchConfig, tools: Arc<dyn WorkspaceTools>) -> Self {
        Self {
            config,
            tools,
            model: None,
            analyzer: None,
            resolver: Arc::new(AlwaysSkip),
            cache: None,
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ModelAdapter>) -> Self {
        self.model = Some(model);
        self
    }

    /// Enable the external analysis tools.
    pub fn with_analyzer(
        mut self,
        analyzer: Arc<dyn ExternalAnalyzer>,
        resolver: Arc<dyn FailureResolver>,
    ) -> Self {
        self.analyzer = Some(analyzer);
        self.resolver = resolver;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn TreeCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Completion token cap sent with every model request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Run one research query against a workspace.
    ///
    /// Returns `DomainError::Cancelled` when the request's token fires, and
    /// `DomainError::WorkspaceNotFound` for a missing workspace. Model and
    /// tool failures never fail the run; they degrade the result instead.
    #[instrument(skip(self, request), fields(workspace = %request.workspace.display()))]
    pub async fn run(&self, request: ResearchRequest) -> DomainResult<ResearchResult> {
        if request.cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        let workspace = canonical_workspace(&request.workspace).await?;
        let (tree, cached) = self.load_code_tree(&workspace).await;

        let mut session = DiscoverySession::new(workspace.clone());
        session.seed_from_tree(&tree);
        let mut state = RunState::new(&request, session, tree);
        state.emit(ProgressEvent::Started {
            workspace: workspace.clone(),
        });
        state.emit(ProgressEvent::TreeLoaded {
            files: state.tree.files.len(),
            cached,
        });
        let query = state.query.clone();
        state.push_step(Stage::Plan, "start", &query, "research started");

        let result = match self.configured_model() {
            Some(model) => self.run_with_model(model.as_ref(), &mut state).await?,
            None => {
                info!("No model configured; running local analysis");
                self.run_local(&mut state).await?
            }
        };

        state.log(
            RunLogKind::Result,
            &serde_json::to_string_pretty(&result).unwrap_or_default(),
        );
        state.emit(ProgressEvent::Finished {
            acceptance: result.acceptance,
        });
        info!(
            acceptance = result.acceptance.as_str(),
            steps = result.steps.len(),
            references = result.references.len(),
            total_tokens = result.token_usage.total_tokens,
            "Research finished"
        );
        Ok(result)
    }

    fn configured_model(&self) -> Option<Arc<dyn ModelAdapter>> {
        self.model
            .as_ref()
            .filter(|model| model.is_configured())
            .cloned()
    }

    pub(super) fn executor(&self) -> ToolExecutor<'_> {
        ToolExecutor::new(
            self.tools.as_ref(),
            self.analyzer.as_deref(),
            self.resolver.as_ref(),
            CompressionPolicy::from_config(&self.config),
        )
    }

    /// Code tree from the cache when fresh, otherwise rebuilt and cached.
    ///
    /// A tree that cannot be built degrades to an empty one.
    async fn load_code_tree(&self, workspace: &Path) -> (CodeTree, bool) {
        let ttl = Duration::from_secs(self.config.cache_ttl_sec);
        if let Some(cache) = &self.cache {
            if let Some(tree) = cache.read(workspace, ttl).await {
                debug!(files = tree.files.len(), "Using cached code tree");
                return (tree, true);
            }
        }

        let filter = TreeFilter {
            include: self.config.include_globs.clone(),
            exclude: self.config.exclude_globs.clone(),
        };
        let tree = match self.tools.build_code_tree(workspace, &filter).await {
            Ok(tree) => tree,
            Err(err) => {
                warn!(error = %err, "Failed to build code tree; continuing without one");
                return (
                    CodeTree {
                        root: workspace.display().to_string(),
                        ..CodeTree::default()
                    },
                    false,
                );
            }
        };
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.write(workspace, &tree).await {
                warn!(error = %err, "Failed to write code tree cache");
            }
        }
        (tree, false)
    }
}

async fn canonical_workspace(raw: &Path) -> DomainResult<PathBuf> {
    let workspace = tokio::fs::canonicalize(raw)
        .await
        .map_err(|_| DomainError::WorkspaceNotFound(raw.display().to_string()))?;
    let meta = tokio::fs::metadata(&workspace).await?;
    if !meta.is_dir() {
        return Err(DomainError::Workspace(format!(
            "{} is not a directory",
            workspace.display()
        )));
    }
    Ok(workspace)
}
