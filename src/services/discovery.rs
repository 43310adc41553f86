//! Per-run discovery state and path guard.
//!
//! A file may be read only after it has been discovered through a listing,
//! entrypoint discovery, import auto-expansion, the root whitelist, or the
//! hotspot scan. Each file may be read at most once per run.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::domain::models::imports::{
    import_candidates, normalize_lexically, relative_to, ENTRYPOINT_STEMS,
};
use crate::domain::models::{language_for_path, CodeTree, ToolName};
use crate::domain::ports::FailureDecision;

/// Root files that are always readable without a listing.
const ROOT_WHITELIST: &[&str] = &[
    "README",
    "README.md",
    "README.rst",
    "README.txt",
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "tsconfig.json",
    "Makefile",
    "Dockerfile",
    "docker-compose.yml",
];

const MAX_HOTSPOTS: usize = 24;

/// Why a path was refused before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardRejection {
    /// The path lies outside the workspace.
    OutsideWorkspace(String),
    /// The file has not been discovered; `list_dir` the given directory.
    Undiscovered { path: String, list_dir: String },
    /// The file was already read in this run.
    AlreadyRead(String),
}

impl GuardRejection {
    /// Render as a tool result for the model.
    pub fn render(&self, tool: ToolName) -> String {
        match self {
            Self::OutsideWorkspace(path) => format!(
                "path_guard_blocked({tool}): {path} is outside the workspace; only paths under the workspace root can be used"
            ),
            Self::Undiscovered { path, list_dir } => format!(
                "path_guard_blocked({tool}): {path} has not been discovered yet; call list_dir with targetPath \"{list_dir}\" first and pick a file from its entries"
            ),
            Self::AlreadyRead(path) => format!(
                "duplicate_read_blocked({tool}): {path} was already read in this run; reuse the earlier result and read a different file"
            ),
        }
    }
}

/// Discovery and read bookkeeping for one research run.
#[derive(Debug, Clone)]
pub struct DiscoverySession {
    workspace: PathBuf,
    discovered_files: BTreeSet<PathBuf>,
    discovered_dirs: BTreeSet<PathBuf>,
    already_read: BTreeSet<PathBuf>,
    read_order: Vec<PathBuf>,
    source_reads: usize,
    external_decisions: HashMap<ToolName, FailureDecision>,
}

impl DiscoverySession {
    /// `workspace` must be absolute and normalized.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let mut discovered_dirs = BTreeSet::new();
        discovered_dirs.insert(workspace.clone());
        Self {
            workspace,
            discovered_files: BTreeSet::new(),
            discovered_dirs,
            already_read: BTreeSet::new(),
            read_order: Vec::new(),
            source_reads: 0,
            external_decisions: HashMap::new(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Resolve a model-supplied path against the workspace.
    ///
    /// `.` and `..` are normalized lexically. Paths escaping the workspace are
    /// rejected.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, GuardRejection> {
        let trimmed = raw.trim();
        let candidate = Path::new(trimmed);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.workspace.join(candidate)
        };
        let normalized = normalize_lexically(&joined)
            .ok_or_else(|| GuardRejection::OutsideWorkspace(trimmed.to_string()))?;
        if normalized.starts_with(&self.workspace) {
            Ok(normalized)
        } else {
            Err(GuardRejection::OutsideWorkspace(trimmed.to_string()))
        }
    }

    /// Workspace-relative, forward-slash form of an absolute path.
    pub fn relative(&self, path: &Path) -> String {
        relative_to(&self.workspace, path)
    }

    /// Check the discovery and duplicate-read guards for a read.
    pub fn check_read(&self, path: &Path) -> Result<(), GuardRejection> {
        if !self.discovered_files.contains(path) {
            let parent = path
                .parent()
                .map_or_else(|| ".".to_string(), |dir| self.relative(dir));
            return Err(GuardRejection::Undiscovered {
                path: self.relative(path),
                list_dir: parent,
            });
        }
        if self.already_read.contains(path) {
            return Err(GuardRejection::AlreadyRead(self.relative(path)));
        }
        Ok(())
    }

    /// Reserve a read so a second call in the same round is refused.
    pub fn reserve_read(&mut self, path: &Path) {
        self.already_read.insert(path.to_path_buf());
    }

    /// Undo a reservation whose read failed.
    pub fn release_read(&mut self, path: &Path) {
        self.already_read.remove(path);
    }

    /// Record a successful read.
    pub fn record_read(&mut self, path: &Path) {
        self.read_order.push(path.to_path_buf());
        if language_for_path(&path.to_string_lossy()).is_some() {
            self.source_reads += 1;
        }
    }

    pub fn add_file(&mut self, path: PathBuf) -> bool {
        if let Some(parent) = path.parent() {
            self.discovered_dirs.insert(parent.to_path_buf());
        }
        self.discovered_files.insert(path)
    }

    pub fn add_dir(&mut self, path: PathBuf) -> bool {
        self.discovered_dirs.insert(path)
    }

    pub fn is_discovered(&self, path: &Path) -> bool {
        self.discovered_files.contains(path)
    }

    pub fn is_dir_discovered(&self, path: &Path) -> bool {
        self.discovered_dirs.contains(path)
    }

    pub fn was_read(&self, path: &Path) -> bool {
        self.already_read.contains(path)
    }

    /// Files successfully read, in read order.
    pub fn read_files(&self) -> &[PathBuf] {
        &self.read_order
    }

    /// Number of successful reads of source files.
    pub fn source_reads(&self) -> usize {
        self.source_reads
    }

    pub fn discovered_file_count(&self) -> usize {
        self.discovered_files.len()
    }

    /// Remembered skip/retry decision for an external tool.
    pub fn external_decision(&self, tool: ToolName) -> Option<FailureDecision> {
        self.external_decisions.get(&tool).copied()
    }

    pub fn remember_external_decision(&mut self, tool: ToolName, decision: FailureDecision) {
        self.external_decisions.insert(tool, decision);
    }

    /// Seed whitelisted root files and entrypoint hotspots from the code tree.
    pub fn seed_from_tree(&mut self, tree: &CodeTree) {
        for dir in &tree.dirs {
            self.discovered_dirs.insert(self.workspace.join(dir));
        }
        for file in &tree.files {
            if !file.path.contains('/') && ROOT_WHITELIST.contains(&file.path.as_str()) {
                self.add_file(self.workspace.join(&file.path));
            }
        }
        for hotspot in hotspot_candidates(tree).into_iter().take(MAX_HOTSPOTS) {
            self.add_file(self.workspace.join(hotspot));
        }
    }

    /// Candidate paths for the relative imports of a file whose skeleton was read.
    pub fn import_candidates(&self, file: &Path, skeleton: &str) -> Vec<PathBuf> {
        import_candidates(&self.workspace, file, skeleton)
    }
}

/// Entrypoint-named source files in tree order, shallowest first.
pub fn hotspot_candidates(tree: &CodeTree) -> Vec<String> {
    let mut hotspots: Vec<&str> = tree
        .source_files()
        .map(|file| file.path.as_str())
        .filter(|path| {
            let stem = Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default();
            ENTRYPOINT_STEMS.contains(&stem.as_str())
                && !crate::services::references::has_excluded_segment(path)
        })
        .collect();
    hotspots.sort_by_key(|path| path.matches('/').count());
    hotspots.into_iter().map(String::from).collect()
}
