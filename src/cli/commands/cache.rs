//! Implementation of the `corawiki cache` command.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::domain::ports::TreeCache;
use crate::infrastructure::TreeCacheStore;

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

impl CacheArgs {
    pub fn workspace(&self) -> &Path {
        match &self.command {
            CacheCommands::Status { workspace } | CacheCommands::Clear { workspace } => workspace,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Report whether a fresh code tree is cached for the workspace
    Status {
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
    /// Remove every cached code tree
    Clear {
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOutput {
    pub cache_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fresh: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
}

impl CommandOutput for CacheOutput {
    fn to_human(&self) -> String {
        if let Some(removed) = self.removed {
            return format!("Removed {removed} cached tree(s) from {}", self.cache_dir.display());
        }
        match (self.fresh, self.files) {
            (Some(true), Some(files)) => format!("Fresh code tree cached ({files} files)"),
            _ => format!("No fresh code tree in {}", self.cache_dir.display()),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: CacheArgs, config: &Config, json_mode: bool) -> Result<()> {
    let workspace = std::fs::canonicalize(args.workspace())
        .with_context(|| format!("Workspace not found: {}", args.workspace().display()))?;
    let cache_dir = if config.research.cache_dir.is_absolute() {
        config.research.cache_dir.clone()
    } else {
        workspace.join(&config.research.cache_dir)
    };
    let store = TreeCacheStore::new(&cache_dir);

    let result = match args.command {
        CacheCommands::Status { .. } => {
            let ttl = Duration::from_secs(config.research.cache_ttl_sec);
            let tree = store.read(&workspace, ttl).await;
            CacheOutput {
                cache_dir,
                fresh: Some(tree.is_some()),
                files: tree.map(|tree| tree.files.len()),
                removed: None,
            }
        }
        CacheCommands::Clear { .. } => {
            let removed = store.clear().await.context("Failed to clear the cache")?;
            CacheOutput {
                cache_dir,
                fresh: None,
                files: None,
                removed: Some(removed),
            }
        }
    };
    output(&result, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CodeTree;

    #[tokio::test]
    async fn test_status_then_clear() {
        let ws = tempfile::tempdir().unwrap();
        let workspace = std::fs::canonicalize(ws.path()).unwrap();
        let config = Config::default();
        let store = TreeCacheStore::new(workspace.join(&config.research.cache_dir));
        store.write(&workspace, &CodeTree::default()).await.unwrap();

        let status = CacheArgs {
            command: CacheCommands::Status {
                workspace: workspace.clone(),
            },
        };
        execute(status, &config, true).await.unwrap();

        let clear = CacheArgs {
            command: CacheCommands::Clear {
                workspace: workspace.clone(),
            },
        };
        execute(clear, &config, true).await.unwrap();
        assert!(store.read(&workspace, Duration::from_secs(60)).await.is_none());
    }
}
