//! JSON file store for cached code trees.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CodeTree;
use crate::domain::ports::TreeCache;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    workspace_path: String,
    created_at: DateTime<Utc>,
    tree: CodeTree,
}

/// One `<sanitized workspace path>.json` file per workspace under `dir`.
#[derive(Debug, Clone)]
pub struct TreeCacheStore {
    dir: PathBuf,
}

impl TreeCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache file location for `workspace`.
    pub fn entry_path(&self, workspace: &Path) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(&workspace.display().to_string())))
    }
}

fn sanitize(path: &str) -> String {
    let sanitized: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "workspace".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl TreeCache for TreeCacheStore {
    async fn read(&self, workspace: &Path, ttl: Duration) -> Option<CodeTree> {
        let path = self.entry_path(workspace);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "No cached code tree");
                return None;
            }
        };
        let entry: CacheFile = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Ignoring unreadable cache file");
                return None;
            }
        };
        if entry.workspace_path != workspace.display().to_string() {
            debug!(path = %path.display(), "Cache file belongs to another workspace");
            return None;
        }

        let age = Utc::now()
            .signed_duration_since(entry.created_at)
            .to_std()
            .unwrap_or_default();
        if age >= ttl {
            debug!(age_secs = age.as_secs(), ttl_secs = ttl.as_secs(), "Cached code tree is stale");
            return None;
        }
        Some(entry.tree)
    }

    async fn write(&self, workspace: &Path, tree: &CodeTree) -> DomainResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let entry = CacheFile {
            workspace_path: workspace.display().to_string(),
            created_at: Utc::now(),
            tree: tree.clone(),
        };
        let body = serde_json::to_string(&entry)?;
        let path = self.entry_path(workspace);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| DomainError::Io(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), files = tree.files.len(), "Code tree cached");
        Ok(())
    }

    async fn clear(&self) -> DomainResult<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") && entry.file_type().await?.is_file() {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
