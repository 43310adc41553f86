//! Import resolution and path helpers shared by discovery and the workspace adapter.

use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// File stems that mark likely entrypoints.
pub const ENTRYPOINT_STEMS: &[&str] = &[
    "main", "index", "app", "server", "lib", "cli", "__main__", "manage", "mod", "extension",
];

/// Extensions tried, in order, when resolving an extensionless import.
const IMPORT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "py"];

const INDEX_FILES: &[&str] = &["index.ts", "index.tsx", "index.js", "index.jsx", "__init__.py"];

static JS_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?:import|export)\b[^'";]*?\bfrom\s*['"]([^'"]+)['"]"#)
        .expect("valid js import regex")
});
static JS_BARE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s*['"]([^'"]+)['"]"#).expect("valid js bare import regex")
});
static JS_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:require|import)\s*\(\s*['"]([^'"]+)['"]\s*\)"#)
        .expect("valid js require regex")
});
static PY_FROM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*from\s+(\.+)([\w.]*)\s+import[ \t]+([\w \t,()*]+)")
        .expect("valid python import regex")
});
static RUST_MOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([A-Za-z_][A-Za-z0-9_]*)\s*;")
        .expect("valid rust mod regex")
});

/// Candidate paths for the relative imports of `file`, given its skeleton or source.
///
/// Candidates outside the workspace are dropped. Callers check existence.
pub fn import_candidates(workspace: &Path, file: &Path, skeleton: &str) -> Vec<PathBuf> {
    let Some(dir) = file.parent() else {
        return Vec::new();
    };
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut candidates = Vec::new();

    for spec in js_specifiers(skeleton) {
        if !spec.starts_with('.') {
            continue;
        }
        let base = dir.join(&spec);
        candidates.push(base.clone());
        let has_ext = Path::new(&spec).extension().is_some();
        if !has_ext {
            for ext in IMPORT_EXTENSIONS {
                candidates.push(with_extension_appended(&base, ext));
            }
        }
        for index in INDEX_FILES {
            candidates.push(base.join(index));
        }
    }

    for module in python_relative_modules(skeleton) {
        let mut base = dir.to_path_buf();
        for _ in 1..module.dots {
            base.push("..");
        }
        for part in module.path.split('.').filter(|p| !p.is_empty()) {
            base.push(part);
        }
        candidates.push(with_extension_appended(&base, "py"));
        candidates.push(base.join("__init__.py"));
        candidates.push(base);
    }

    if name.ends_with(".rs") {
        let module_dir = match name.as_str() {
            "mod.rs" | "lib.rs" | "main.rs" => dir.to_path_buf(),
            _ => dir.join(name.trim_end_matches(".rs")),
        };
        for module in RUST_MOD.captures_iter(skeleton) {
            let module = &module[1];
            candidates.push(module_dir.join(format!("{module}.rs")));
            candidates.push(module_dir.join(module).join("mod.rs"));
            candidates.push(module_dir.join(module));
        }
    }

    let mut seen = BTreeSet::new();
    candidates
        .into_iter()
        .filter_map(|candidate| normalize_lexically(&candidate))
        .filter(|candidate| candidate.starts_with(&workspace) && candidate != file)
        .filter(|candidate| seen.insert(candidate.clone()))
        .collect()
}

/// Import specifiers found in JS/TS source.
pub fn js_specifiers(source: &str) -> Vec<String> {
    let mut specs = Vec::new();
    for regex in [&*JS_FROM, &*JS_BARE, &*JS_CALL] {
        for caps in regex.captures_iter(source) {
            let spec = caps[1].to_string();
            if !specs.contains(&spec) {
                specs.push(spec);
            }
        }
    }
    specs
}

struct PythonModule {
    dots: usize,
    path: String,
}

fn python_relative_modules(source: &str) -> Vec<PythonModule> {
    let mut modules = Vec::new();
    for caps in PY_FROM.captures_iter(source) {
        let dots = caps[1].len();
        let path = caps[2].to_string();
        if path.is_empty() {
            // `from . import a, b` names sibling modules.
            for name in caps[3].split(',') {
        let name = name.trim().trim_matches(|c| c == '(' || c == ')').trim();
        let name = name.split_whitespace().next().unwrap_or_default();
                if !name.is_empty() && name != "*" {
                    modules.push(PythonModule {
                        dots,
                        path: name.to_string(),
                    });
                }
            }
        } else {
            modules.push(PythonModule { dots, path });
        }
    }
    modules
}

fn with_extension_appended(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}

/// Normalize `.` and `..` without touching the filesystem.
///
/// Returns `None` when `..` climbs above the filesystem root.
pub fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }
    Some(normalized)
}

/// Forward-slash path of `path` relative to `root`; `.` for the root itself.
pub fn relative_to(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}
