//! Filesystem implementation of the workspace tools.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::imports::{
    import_candidates, js_specifiers, relative_to, ENTRYPOINT_STEMS,
};
use crate::domain::models::{language_for_path, CodeFile, CodeTree};
use crate::domain::ports::{
    DirEntry, DirectorySummary, FileContent, FileDependencies, TreeFilter, WorkspaceTools,
};

/// Files larger than this are refused by the read tools.
const MAX_READ_BYTES: u64 = 2 * 1024 * 1024;

/// Files indexed by one code tree build.
const MAX_TREE_FILES: usize = 20_000;

const ENTRYPOINT_DEPTH: usize = 4;
const MAX_ENTRYPOINTS: usize = 32;
const NOTABLE_FILES: usize = 5;

/// Lines returned as a skeleton when no declaration is recognized.
const FALLBACK_SKELETON_LINES: usize = 40;

const DECLARATION_PREFIXES: &[&str] = &[
    "import ",
    "from ",
    "export ",
    "use ",
    "pub ",
    "pub(",
    "mod ",
    "fn ",
    "async fn ",
    "struct ",
    "enum ",
    "trait ",
    "impl ",
    "impl<",
    "type ",
    "class ",
    "abstract class ",
    "def ",
    "async def ",
    "interface ",
    "function ",
    "async function ",
    "package ",
    "func ",
    "module.exports",
    "@",
];

/// Declarations only recognized at the top level.
const TOP_LEVEL_PREFIXES: &[&str] = &["const ", "let ", "var ", "static "];

static PY_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:from\s+([\w.]+)\s+import\b|import\s+([\w.]+))")
        .expect("valid python import regex")
});
static RUST_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:use\s+([\w:]+)|mod\s+(\w+)\s*;)")
        .expect("valid rust use regex")
});

/// Workspace tools backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct FsWorkspace {
    /// Entries hidden from listings and summaries.
    hidden: GlobSet,
    /// Paths under this root are matched workspace-relative.
    root: Option<PathBuf>,
}

impl FsWorkspace {
    /// Hide entries matching any of `exclude_globs` from listings and walks.
    pub fn new(exclude_globs: &[String]) -> DomainResult<Self> {
        Ok(Self {
            hidden: build_globset(exclude_globs)?,
            root: None,
        })
    }

    /// Match exclusions against paths relative to `root` rather than to the
    /// listed or walked directory.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    fn is_hidden(&self, base: &Path, path: &Path, is_dir: bool) -> bool {
        let relative = match &self.root {
            Some(root) if path.starts_with(root) => relative_to(root, path),
            _ => relative_to(base, path),
        };
        is_excluded(&self.hidden, &relative, is_dir)
    }
}

fn build_globset(patterns: &[String]) -> DomainResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|err| {
            DomainError::ValidationFailed(format!("invalid glob '{pattern}': {err}"))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| DomainError::ValidationFailed(format!("invalid glob set: {err}")))
}

/// A relative path matches when the whole path or any of its segments does.
///
/// Directories are also tried with a trailing `/`, which is what `**/name/**`
/// needs to match the directory itself.
fn is_excluded(set: &GlobSet, relative: &str, is_dir: bool) -> bool {
    !set.is_empty()
        && (set.is_match(relative)
            || (is_dir && set.is_match(format!("{relative}/")))
            || relative.split('/').any(|segment| set.is_match(segment)))
}

fn io_error(path: &Path, err: &std::io::Error) -> DomainError {
    DomainError::Io(format!("{}: {err}", path.display()))
}

async fn read_text(file: &Path) -> DomainResult<String> {
    let meta = tokio::fs::metadata(file)
        .await
        .map_err(|err| io_error(file, &err))?;
    if !meta.is_file() {
        return Err(DomainError::Workspace(format!(
            "{} is not a regular file",
            file.display()
        )));
    }
    if meta.len() > MAX_READ_BYTES {
        return Err(DomainError::Workspace(format!(
            "{} is too large to read ({} bytes)",
            file.display(),
            meta.len()
        )));
    }
    let bytes = tokio::fs::read(file)
        .await
        .map_err(|err| io_error(file, &err))?;
    if bytes.iter().take(8192).any(|byte| *byte == 0) {
        return Err(DomainError::Workspace(format!(
            "{} looks like a binary file",
            file.display()
        )));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Signature-level outline of a source text.
pub fn extract_skeleton(path: &str, text: &str) -> String {
    if language_for_path(path).is_none() {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".md") || lower.ends_with(".markdown") {
            let headings: Vec<&str> = text
                .lines()
                .filter(|line| line.trim_start().starts_with('#'))
                .collect();
            if !headings.is_empty() {
                return headings.join("\n");
            }
        }
        return head_lines(text, FALLBACK_SKELETON_LINES);
    }

    let kept: Vec<&str> = text
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            let top_level = trimmed.len() == line.len();
            DECLARATION_PREFIXES
                .iter()
                .any(|prefix| trimmed.starts_with(prefix))
                || (top_level
                    && TOP_LEVEL_PREFIXES
                        .iter()
                        .any(|prefix| trimmed.starts_with(prefix)))
        })
        .map(str::trim_end)
        .collect();
    if kept.is_empty() {
        head_lines(text, FALLBACK_SKELETON_LINES)
    } else {
        kept.join("\n")
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn head_lines(text: &str, count: usize) -> String {
    text.lines().take(count).collect::<Vec<_>>().join("\n")
}

/// Imports of one file, split into local files and external packages.
fn file_dependencies(
    workspace: &Path,
    file: &Path,
    text: &str,
) -> (Vec<String>, Vec<PathBuf>, Vec<String>) {
    let mut imports: Vec<String> = Vec::new();
    let mut external: Vec<String> = Vec::new();
    let name = file.to_string_lossy();

    match language_for_path(&name) {
        Some("python") => {
            for caps in PY_IMPORT.captures_iter(text) {
                let Some(module) = caps.get(1).or_else(|| caps.get(2)) else {
                    continue;
                };
                let module = module.as_str().to_string();
                if !module.starts_with('.') {
                    let root = module.split('.').next().unwrap_or_default().to_string();
                    push_unique(&mut external, root);
                }
                push_unique(&mut imports, module);
            }
        }
        Some("rust") => {
            for caps in RUST_USE.captures_iter(text) {
                if let Some(path) = caps.get(1) {
                    let path = path.as_str().trim_end_matches("::").to_string();
                    let root = path.split("::").next().unwrap_or_default().to_string();
                    if !matches!(root.as_str(), "crate" | "self" | "super") {
                        push_unique(&mut external, root);
                    }
                    push_unique(&mut imports, path);
                } else if let Some(module) = caps.get(2) {
                    push_unique(&mut imports, format!("mod {}", module.as_str()));
                }
            }
        }
        _ => {
            for spec in js_specifiers(text) {
                if !spec.starts_with('.') {
                    push_unique(&mut external, spec.clone());
                }
                push_unique(&mut imports, spec);
            }
        }
    }

    let local = import_candidates(workspace, file, text)
        .into_iter()
        .filter(|candidate| candidate.is_file())
        .collect();
    (imports, local, external)
}

#[async_trait]
impl WorkspaceTools for FsWorkspace {
    async fn list_dir(&self, dir: &Path) -> DomainResult<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .map_err(|err| io_error(dir, &err))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|err| io_error(dir, &err))?
        {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if self.is_hidden(dir, &entry.path(), meta.is_dir()) {
                continue;
            }
            entries.push(DirEntry {
                path: entry.path(),
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.path.cmp(&b.path)));
        Ok(entries)
    }

    async fn read_skeleton(&self, file: &Path) -> DomainResult<String> {
        let text = read_text(file).await?;
        Ok(extract_skeleton(&file.to_string_lossy(), &text))
    }

    async fn read_full_code(
        &self,
        file: &Path,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> DomainResult<FileContent> {
        let text = read_text(file).await?;
        let lines: Vec<&str> = text.lines().collect();
        let total_lines = lines.len();
        let start = start_line.unwrap_or(1).max(1);
        if total_lines > 0 && start > total_lines {
            return Err(DomainError::ValidationFailed(format!(
                "startLine {start} is beyond the end of {} ({total_lines} lines)",
                file.display()
            )));
        }
        let end = end_line.unwrap_or(total_lines).min(total_lines);
        let selected = if total_lines == 0 || end < start {
            String::new()
        } else {
            lines[start - 1..end].join("\n")
        };
        Ok(FileContent {
            path: file.to_path_buf(),
            text: selected,
            start_line: start,
            end_line: end.max(start.min(total_lines)),
            total_lines,
        })
    }

    #[instrument(skip(self))]
    async fn discover_entrypoints(&self, root: &Path) -> DomainResult<Vec<PathBuf>> {
        let walker = self.clone();
        let root = root.to_path_buf();
        let found = tokio::task::spawn_blocking(move || {
            let mut found: Vec<(usize, PathBuf)> = WalkDir::new(&root)
                .max_depth(ENTRYPOINT_DEPTH)
                .into_iter()
                .filter_entry(|entry| {
                    entry.depth() == 0
                        || !walker.is_hidden(&root, entry.path(), entry.file_type().is_dir())
                })
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| {
                    let path = entry.path().to_string_lossy();
                    let stem = entry
                        .path()
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().to_ascii_lowercase())
                        .unwrap_or_default();
                    language_for_path(&path).is_some() && ENTRYPOINT_STEMS.contains(&stem.as_str())
                })
                .map(|entry| (entry.depth(), entry.into_path()))
                .collect();
            found.sort();
            found
                .into_iter()
                .take(MAX_ENTRYPOINTS)
                .map(|(_, path)| path)
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|err| DomainError::Workspace(format!("entrypoint scan failed: {err}")))?;
        debug!(count = found.len(), "Entrypoints discovered");
        Ok(found)
    }

    async fn analyze_dependencies(
        &self,
        files: &[PathBuf],
        workspace: &Path,
    ) -> DomainResult<Vec<FileDependencies>> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            match read_text(file).await {
                Ok(text) => {
                    let (imports, local, external) = file_dependencies(workspace, file, &text);
                    results.push(FileDependencies {
                        path: file.clone(),
                        imports,
                        local,
                        external,
                        error: None,
                    });
                }
                Err(err) => results.push(FileDependencies {
                    path: file.clone(),
                    error: Some(err.to_string()),
                    ..FileDependencies::default()
                }),
            }
        }
        Ok(results)
    }

    async fn summarize_directory(&self, dir: &Path) -> DomainResult<DirectorySummary> {
        let meta = tokio::fs::metadata(dir)
            .await
            .map_err(|err| io_error(dir, &err))?;
        if !meta.is_dir() {
            return Err(DomainError::Workspace(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        let walker = self.clone();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut summary = DirectorySummary {
                path: dir.clone(),
                ..DirectorySummary::default()
            };
            let mut sources: Vec<(u64, PathBuf)> = Vec::new();
            for entry in WalkDir::new(&dir)
                .into_iter()
                .filter_entry(|entry| {
                    entry.depth() == 0
                        || !walker.is_hidden(&dir, entry.path(), entry.file_type().is_dir())
                })
                .filter_map(Result::ok)
                .filter(|entry| entry.depth() > 0)
            {
                if entry.file_type().is_dir() {
                    summary.dir_count += 1;
                    continue;
                }
                let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
                summary.file_count += 1;
                summary.total_bytes += size;
                if let Some(language) = language_for_path(&entry.path().to_string_lossy()) {
                    *summary.languages.entry(language.to_string()).or_insert(0) += 1;
                    sources.push((size, entry.into_path()));
                }
            }
            sources.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            summary.notable_files = sources
                .into_iter()
                .take(NOTABLE_FILES)
                .map(|(_, path)| path)
                .collect();
            summary
        })
        .await
        .map_err(|err| DomainError::Workspace(format!("directory summary failed: {err}")))
    }

    #[instrument(skip(self, filter), fields(root = %root.display()))]
    async fn build_code_tree(&self, root: &Path, filter: &TreeFilter) -> DomainResult<CodeTree> {
        let include = build_globset(&filter.include)?;
        let exclude = build_globset(&filter.exclude)?;
        let root = root.to_path_buf();
        let tree = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            let mut dirs = Vec::new();
            let walker = WalkDir::new(&root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    entry.depth() == 0
                        || !is_excluded(
                            &exclude,
                            &relative_to(&root, entry.path()),
                            entry.file_type().is_dir(),
                        )
                });
            for entry in walker.filter_map(Result::ok).filter(|entry| entry.depth() > 0) {
                let relative = relative_to(&root, entry.path());
                if entry.file_type().is_dir() {
                    dirs.push(relative);
                    continue;
                }
                if !entry.file_type().is_file() {
                    continue;
                }
                if !include.is_empty() && !include.is_match(&relative) {
                    continue;
                }
                if files.len() >= MAX_TREE_FILES {
                    break;
                }
                let size = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
                files.push(CodeFile {
                    language: language_for_path(&relative).map(String::from),
                    path: relative,
                    size,
                });
            }
            CodeTree {
                root: root.display().to_string(),
                files,
                dirs,
            }
        })
        .await
        .map_err(|err| DomainError::Workspace(format!("code tree scan failed: {err}")))?;
        debug!(files = tree.files.len(), dirs = tree.dirs.len(), "Code tree built");
        Ok(tree)
    }
}
