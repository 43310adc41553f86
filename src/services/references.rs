//! Reference classification and normalization.
//!
//! A reference is `path`, `path:line`, or `path:start-end`. Tiers:
//! P0 runtime source under a source root, P1 build and config descriptors,
//! P2 everything else.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::models::imports::{normalize_lexically, relative_to};
use crate::domain::models::{language_for_path, ReferenceStats};

/// Evidence tier of a reference. Ordered P0 first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    P0,
    P1,
    P2,
}

const SOURCE_ROOTS: &[&str] = &[
    "src", "lib", "app", "apps", "crates", "packages", "cmd", "internal", "pkg", "server",
    "client", "core", "modules", "services", "backend", "frontend", "source",
];

const EXCLUDED_SEGMENTS: &[&str] = &[
    "test", "tests", "__tests__", "spec", "specs", "docs", "doc", "examples", "example",
    "fixtures", "__mocks__", "testdata", "benches", "node_modules", "vendor", "dist", "build",
];

const MANIFEST_NAMES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "pnpm-workspace.yaml",
    "Cargo.toml",
    "Cargo.lock",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "Pipfile",
    "Pipfile.lock",
    "poetry.lock",
    "go.mod",
    "go.sum",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "Makefile",
    "CMakeLists.txt",
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "Gemfile",
    "Gemfile.lock",
    "composer.json",
    ".gitignore",
    ".editorconfig",
];

const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "jsonc", "yaml", "yml", "toml", "ini", "cfg", "conf", "lock", "gradle", "xml", "env",
    "properties",
];

/// Strip a trailing `:N` or `:N-M` line suffix.
///
/// Returns the path part and the suffix (including the colon), if any.
pub fn split_reference(reference: &str) -> (&str, Option<&str>) {
    let trimmed = reference.trim();
    if let Some((path, suffix)) = trimmed.rsplit_once(':') {
        let is_line = !suffix.is_empty()
            && match suffix.split_once('-') {
                Some((start, end)) => is_digits(start) && is_digits(end),
                None => is_digits(suffix),
            };
        if is_line && !path.is_empty() {
            return (path, Some(&trimmed[path.len()..]));
        }
    }
    (trimmed, None)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn path_segments(reference: &str) -> Vec<String> {
    let (path, _) = split_reference(reference);
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .map(String::from)
        .collect()
}

/// Whether any directory segment, or the file name itself, marks test, doc,
/// or example material.
pub fn has_excluded_segment(reference: &str) -> bool {
    let segments = path_segments(reference);
    let Some((file, dirs)) = segments.split_last() else {
        return false;
    };
    if dirs
        .iter()
        .any(|segment| EXCLUDED_SEGMENTS.contains(&segment.to_ascii_lowercase().as_str()))
    {
        return true;
    }
    let lower = file.to_ascii_lowercase();
    let stem = lower.split('.').next().unwrap_or_default();
    lower.contains(".test.")
        || lower.contains(".spec.")
        || stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_spec")
}

/// Tier of a reference string. Pure function of the string.
pub fn classify_reference(reference: &str) -> Tier {
    let segments = path_segments(reference);
    let Some((file, dirs)) = segments.split_last() else {
        return Tier::P2;
    };

    let extension = file
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let in_ci_dir = dirs
        .first()
        .is_some_and(|first| first == ".github" || first == ".circleci" || first == ".gitlab");
    if MANIFEST_NAMES.contains(&file.as_str())
        || (file.starts_with("requirements") && extension == "txt")
        || file.starts_with("tsconfig")
        || file.starts_with(".gitlab-ci")
        || CONFIG_EXTENSIONS.contains(&extension.as_str())
        || in_ci_dir
    {
        return Tier::P1;
    }

    let is_source = language_for_path(file).is_some();
    let under_root = dirs.is_empty()
        || dirs
            .iter()
            .any(|segment| SOURCE_ROOTS.contains(&segment.to_ascii_lowercase().as_str()));
    if is_source && under_root && !has_excluded_segment(reference) {
        Tier::P0
    } else {
        Tier::P2
    }
}

/// Tier shares over a list of references.
pub fn reference_stats(references: &[String], dropped: usize) -> ReferenceStats {
    let mut stats = ReferenceStats {
        total: references.len(),
        dropped,
        ..Default::default()
    };
    for reference in references {
        match classify_reference(reference) {
            Tier::P0 => stats.p0 += 1,
            Tier::P1 => stats.p1 += 1,
            Tier::P2 => stats.p2 += 1,
        }
    }
    if stats.total > 0 {
        stats.p0_share = stats.p0 as f64 / stats.total as f64;
        stats.p2_share = stats.p2 as f64 / stats.total as f64;
    }
    stats
}

/// Final references with their tier statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedReferences {
    pub references: Vec<String>,
    pub stats: ReferenceStats,
}

/// Filter, dedupe, tier-sort and cap raw references.
///
/// Each reference is resolved against `workspace`; only existing regular
/// files inside it survive. References are rewritten workspace-relative,
/// keeping any line suffix. Duplicates by path keep the first spelling.
pub async fn normalize_references<I>(
    raw: I,
    workspace: &Path,
    max_references: usize,
) -> NormalizedReferences
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut kept: Vec<(Tier, String)> = Vec::new();
    let mut dropped = 0usize;

    for reference in raw {
        let (path, suffix) = split_reference(&reference);
        if path.is_empty() {
            dropped += 1;
            continue;
        }
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            workspace.join(candidate)
        };
        let Some(resolved) = normalize_lexically(&joined).filter(|p| p.starts_with(workspace))
        else {
            dropped += 1;
            continue;
        };
        let is_file = tokio::fs::metadata(&resolved)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if !is_file || !seen.insert(resolved.clone()) {
            dropped += 1;
            continue;
        }
        let relative = relative_to(workspace, &resolved);
        let rendered = match suffix {
            Some(suffix) => format!("{relative}{suffix}"),
            None => relative,
        };
        kept.push((classify_reference(&rendered), rendered));
    }

    kept.sort_by_key(|(tier, _)| *tier);
    if kept.len() > max_references {
        dropped += kept.len() - max_references;
        kept.truncate(max_references);
    }
    let references: Vec<String> = kept.into_iter().map(|(_, reference)| reference).collect();
    let stats = reference_stats(&references, dropped);
    NormalizedReferences { references, stats }
}
