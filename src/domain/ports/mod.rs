//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces adapters implement:
//! - ModelAdapter: tool-calling chat model
//! - WorkspaceTools: filesystem primitives offered to the model as tools
//! - ExternalAnalyzer: optional static-analysis subprocess
//! - FailureResolver: skip/retry decision when an external tool fails
//! - TreeCache: persisted code tree keyed by workspace
//! - RunLog: per-run transcript sink
//!
//! These traits keep the orchestrator independent of providers, the
//! filesystem, and any user interface.

pub mod external_analyzer;
pub mod model_adapter;
pub mod run_log;
pub mod tree_cache;
pub mod workspace_tools;

pub use external_analyzer::{
    AlwaysRetry, AlwaysSkip, ExternalAnalyzer, ExternalToolError, FailureDecision, FailureResolver,
};
pub use model_adapter::ModelAdapter;
pub use run_log::{RunLog, RunLogKind};
pub use tree_cache::TreeCache;
pub use workspace_tools::{
    DirEntry, DirectorySummary, FileContent, FileDependencies, TreeFilter, WorkspaceTools,
};
