//! Subprocess adapter for the external analysis runner.
//!
//! The runner reads one JSON object on stdin and answers with one JSON object
//! on stdout: `{"ok": true, "result": ...}` or `{"ok": false, "error": "..."}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::models::{AnalysisConfig, ToolName};
use crate::domain::ports::{ExternalAnalyzer, ExternalToolError};

#[derive(Debug, Deserialize)]
struct RunnerReply {
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<String>,
}

/// Launches `<python> <runner_path>` once per tool call.
#[derive(Debug, Clone)]
pub struct PythonRunner {
    python: String,
    runner_path: PathBuf,
    timeout: Duration,
}

impl PythonRunner {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self::with_command(
            config.python.clone(),
            config.runner_path.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_command(python: impl Into<String>, runner_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            runner_path: runner_path.into(),
            timeout,
        }
    }

    pub fn runner_path(&self) -> &Path {
        &self.runner_path
    }

    fn parse_reply(stdout: &str) -> Result<serde_json::Value, ExternalToolError> {
        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| ExternalToolError::Failed("runner produced no output".to_string()))?;
        let reply: RunnerReply = serde_json::from_str(line)
            .map_err(|e| ExternalToolError::Failed(format!("invalid runner output: {e}")))?;
        if reply.ok {
            Ok(reply.result)
        } else {
            Err(ExternalToolError::Failed(
                reply.error.unwrap_or_else(|| "runner reported failure".to_string()),
            ))
        }
    }
}

#[async_trait]
impl ExternalAnalyzer for PythonRunner {
    async fn run(
        &self,
        tool: ToolName,
        files: &[PathBuf],
        workspace: &Path,
    ) -> Result<serde_json::Value, ExternalToolError> {
        if !self.runner_path.is_file() {
            return Err(ExternalToolError::Unavailable(format!(
                "runner script not found at {}",
                self.runner_path.display()
            )));
        }

        let payload = json!({
            "tool": tool.as_str(),
            "args": {
                "filePaths": files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>(),
            },
            "workspacePath": workspace.display().to_string(),
        });

        let mut child = Command::new(&self.python)
            .arg(&self.runner_path)
            .current_dir(workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExternalToolError::Unavailable(format!("failed to start {}: {e}", self.python))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let bytes = payload.to_string().into_bytes();
            if let Err(e) = stdin.write_all(&bytes).await {
                warn!(tool = tool.as_str(), error = %e, "Failed to write runner input");
            }
            // Dropping stdin closes the pipe so the runner sees EOF.
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ExternalToolError::Failed(e.to_string()))?,
            Err(_) => {
                return Err(ExternalToolError::Failed(format!(
                    "timed out after {} s",
                    self.timeout.as_secs()
                )))
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            tool = tool.as_str(),
            status = ?output.status.code(),
            stderr_len = stderr.len(),
            "External runner finished"
        );

        match Self::parse_reply(&stdout) {
            Ok(result) => Ok(result),
            Err(err) if !output.status.success() && !stderr.trim().is_empty() => Err(
                ExternalToolError::Failed(format!("{err}; stderr: {}", stderr.trim())),
            ),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_uses_last_line() {
        let value = PythonRunner::parse_reply("noise\n{\"ok\":true,\"result\":[1,2]}\n\n").unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn test_parse_reply_failure() {
        let err = PythonRunner::parse_reply(r#"{"ok":false,"error":"no radon"}"#).unwrap_err();
        assert_eq!(err, ExternalToolError::Failed("no radon".to_string()));
        assert!(PythonRunner::parse_reply("").is_err());
        assert!(PythonRunner::parse_reply("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_runner_is_unavailable() {
        let runner = PythonRunner::with_command("python3", "/nonexistent/runner.py", Duration::from_secs(1));
        let err = runner
            .run(ToolName::ExtractImportGraph, &[], Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, ExternalToolError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_round_trip_through_shell() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("runner.sh");
        std::fs::write(
            &script,
            "read input\necho '{\"ok\": true, \"result\": {\"seen\": true}}'\n",
        )
        .unwrap();
        let runner = PythonRunner::with_command("sh", &script, Duration::from_secs(10));
        let value = runner
            .run(ToolName::AnalyzeComplexity, &[PathBuf::from("a.py")], dir.path())
            .await
            .unwrap();
        assert_eq!(value, json!({"seen": true}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow.sh");
        std::fs::write(&script, "sleep 5\n").unwrap();
        let runner = PythonRunner::with_command("sh", &script, Duration::from_millis(200));
        let err = runner
            .run(ToolName::AnalyzeComplexity, &[], dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
