//! Run log port - append-only transcript of one research run.

use std::path::Path;

/// Entry kinds written to a run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLogKind {
    Request,
    Response,
    Tool,
    Decision,
    Result,
}

impl RunLogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Response => "RESPONSE",
            Self::Tool => "TOOL",
            Self::Decision => "DECISION",
            Self::Result => "RESULT",
        }
    }
}

/// Sink for run transcript entries.
///
/// Implementations must never fail the run: write errors are reported
/// through tracing and otherwise ignored.
pub trait RunLog: Send + Sync {
    /// Location of the log, if it is backed by a file.
    fn path(&self) -> Option<&Path>;

    fn record(&self, kind: RunLogKind, body: &str);
}
