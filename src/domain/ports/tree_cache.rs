//! Tree cache port - persisted code trees keyed by workspace.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::models::CodeTree;

#[async_trait]
pub trait TreeCache: Send + Sync {
    /// Cached tree for `workspace` if it is younger than `ttl`.
    ///
    /// Missing, stale, or unreadable entries yield `None`.
    async fn read(&self, workspace: &Path, ttl: Duration) -> Option<CodeTree>;

    /// Overwrite the cached tree for `workspace`.
    async fn write(&self, workspace: &Path, tree: &CodeTree) -> DomainResult<()>;

    /// Remove every cached tree. Returns the number of entries removed.
    async fn clear(&self) -> DomainResult<usize>;
}
