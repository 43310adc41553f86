//! Workspace tools port - filesystem primitives the model calls as tools.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::errors::DomainResult;
use crate::domain::models::CodeTree;

/// One entry returned by `list_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    /// Absolute path.
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
}

/// A line range of a file returned by `read_full_code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub path: PathBuf,
    pub text: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub total_lines: usize,
}

/// Aggregate view of one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySummary {
    pub path: PathBuf,
    pub file_count: usize,
    pub dir_count: usize,
    pub total_bytes: u64,
    /// File count per language label.
    pub languages: BTreeMap<String, usize>,
    /// Largest source files, absolute paths.
    pub notable_files: Vec<PathBuf>,
}

/// Imports found in one file by `analyze_dependencies`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDependencies {
    pub path: PathBuf,
    pub imports: Vec<String>,
    /// Local imports resolved to existing files.
    pub local: Vec<PathBuf>,
    pub external: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Include/exclude globs applied when building a code tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Filesystem primitives. All paths passed in are absolute and have already
/// been checked to lie inside the workspace.
#[async_trait]
pub trait WorkspaceTools: Send + Sync {
    /// Immediate children of a directory, directories first, sorted by name.
    async fn list_dir(&self, dir: &Path) -> DomainResult<Vec<DirEntry>>;

    /// Signature-level outline of a source file: imports, declarations, exports.
    async fn read_skeleton(&self, file: &Path) -> DomainResult<String>;

    /// A 1-based inclusive line range; `None` bounds mean file start/end.
    async fn read_full_code(
        &self,
        file: &Path,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> DomainResult<FileContent>;

    /// Likely program entry points under `root`.
    async fn discover_entrypoints(&self, root: &Path) -> DomainResult<Vec<PathBuf>>;

    /// Import statements of each file.
    async fn analyze_dependencies(
        &self,
        files: &[PathBuf],
        workspace: &Path,
    ) -> DomainResult<Vec<FileDependencies>>;

    async fn summarize_directory(&self, dir: &Path) -> DomainResult<DirectorySummary>;

    /// Walk the workspace and index every file that passes the filter.
    async fn build_code_tree(&self, root: &Path, filter: &TreeFilter) -> DomainResult<CodeTree>;
}
