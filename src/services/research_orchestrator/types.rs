//! Public types for the research orchestrator.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domain::models::Acceptance;
use crate::domain::ports::RunLog;

/// Progress notifications emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { workspace: PathBuf },
    TreeLoaded { files: usize, cached: bool },
    Round { round: u32, max_rounds: u32 },
    ToolCall { tool: String, input: String },
    /// A controller decision such as a gate failure or a catalogue change.
    Decision(String),
    Finished { acceptance: Acceptance },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { workspace } => write!(f, "researching {}", workspace.display()),
            Self::TreeLoaded { files, cached } => {
                let source = if *cached { "cached" } else { "scanned" };
                write!(f, "code tree {source}: {files} files")
            }
            Self::Round { round, max_rounds } => write!(f, "round {round}/{max_rounds}"),
            Self::ToolCall { tool, input } => write!(f, "{tool} {input}"),
            Self::Decision(text) => f.write_str(text),
            Self::Finished { acceptance } => write!(f, "finished ({})", acceptance.as_str()),
        }
    }
}

/// Callback invoked synchronously for every progress event.
pub type ProgressCallback = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Input of one research run.
#[derive(Clone)]
pub struct ResearchRequest {
    pub query: String,
    pub workspace: PathBuf,
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
    pub run_log: Option<Arc<dyn RunLog>>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            query: query.into(),
            workspace: workspace.into(),
            progress: None,
            cancel: CancellationToken::new(),
            run_log: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_run_log(mut self, run_log: Arc<dyn RunLog>) -> Self {
        self.run_log = Some(run_log);
        self
    }
}

impl fmt::Debug for ResearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResearchRequest")
            .field("query", &self.query)
            .field("workspace", &self.workspace)
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("run_log", &self.run_log.as_ref().and_then(|log| log.path()))
            .finish()
    }
}
