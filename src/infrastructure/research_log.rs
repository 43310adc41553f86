//! Append-only, redacted transcript of one research run.

use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{RunLog, RunLogKind};
use crate::infrastructure::logging::scrub_secrets;

/// Run logs live under `<workspace>/.corawiki/logs`.
pub const LOG_SUBDIR: &str = ".corawiki/logs";

pub struct ResearchLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl ResearchLogger {
    /// Create a fresh log file for a run in `workspace`.
    pub fn create(workspace: &Path) -> DomainResult<Self> {
        let dir = workspace.join(LOG_SUBDIR);
        std::fs::create_dir_all(&dir)
            .map_err(|e| DomainError::Io(format!("{}: {e}", dir.display())))?;
        let id = Uuid::new_v4().simple().to_string();
        let name = format!(
            "research-{}-{}.log",
            Utc::now().format("%Y%m%dT%H%M%S"),
            &id[..8]
        );
        let path = dir.join(name);
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| DomainError::Io(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl std::fmt::Debug for ResearchLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchLogger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RunLog for ResearchLogger {
    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn record(&self, kind: RunLogKind, body: &str) {
        let entry = format!(
            "[{}] {}\n{}\n\n",
            Utc::now().to_rfc3339(),
            kind.as_str(),
            scrub_secrets(body)
        );
        let Ok(mut file) = self.file.lock() else {
            warn!(path = %self.path.display(), "Run log lock poisoned; entry dropped");
            return;
        };
        if let Err(err) = file.write_all(entry.as_bytes()) {
            warn!(path = %self.path.display(), error = %err, "Failed to write run log entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_is_created_under_workspace() {
        let ws = tempfile::tempdir().unwrap();
        let logger = ResearchLogger::create(ws.path()).unwrap();
        let path = logger.path().unwrap();
        assert!(path.starts_with(ws.path().join(LOG_SUBDIR)));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("research-"));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_entries_are_appended_and_redacted() {
        let ws = tempfile::tempdir().unwrap();
        let logger = ResearchLogger::create(ws.path()).unwrap();
        logger.record(RunLogKind::Request, r#"{"authorization": "Bearer sk-abcdefghijkl"}"#);
        logger.record(RunLogKind::Decision, "list_dir removed");

        let text = std::fs::read_to_string(logger.path().unwrap()).unwrap();
        assert!(text.contains("] REQUEST\n"));
        assert!(text.contains("] DECISION\nlist_dir removed"));
        assert!(!text.contains("abcdefghijkl"));
        assert!(text.find("REQUEST").unwrap() < text.find("DECISION").unwrap());
    }

    #[test]
    fn test_two_runs_get_distinct_files() {
        let ws = tempfile::tempdir().unwrap();
        let first = ResearchLogger::create(ws.path()).unwrap();
        let second = ResearchLogger::create(ws.path()).unwrap();
        assert_ne!(first.path(), second.path());
    }
}
