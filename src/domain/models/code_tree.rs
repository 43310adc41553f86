use serde::{Deserialize, Serialize};

/// A source file recorded in the code tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFile {
    /// Workspace-relative, forward-slash path.
    pub path: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Pre-built structural index of a workspace, filtered by include/exclude globs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeTree {
    pub root: String,
    pub files: Vec<CodeFile>,
    pub dirs: Vec<String>,
}

impl CodeTree {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Files with a recognized programming language, in tree order.
    pub fn source_files(&self) -> impl Iterator<Item = &CodeFile> {
        self.files.iter().filter(|file| file.language.is_some())
    }
}

/// Map a file extension to a language label.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext)?;
    let language = match ext.to_ascii_lowercase().as_str() {
        "rs" => "rust",
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "scala" => "scala",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => return None,
    };
    Some(language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_detection() {
        assert_eq!(language_for_path("src/a.ts"), Some("typescript"));
        assert_eq!(language_for_path("lib/x.PY"), Some("python"));
        assert_eq!(language_for_path("README.md"), None);
        assert_eq!(language_for_path("Makefile"), None);
    }

    #[test]
    fn test_source_files_filter() {
        let tree = CodeTree {
            root: "/w".into(),
            files: vec![
                CodeFile {
                    path: "README.md".into(),
                    size: 10,
                    language: None,
                },
                CodeFile {
                    path: "src/a.ts".into(),
                    size: 24,
                    language: Some("typescript".into()),
                },
            ],
            dirs: vec!["src".into()],
        };
        let sources: Vec<_> = tree.source_files().map(|f| f.path.as_str()).collect();
        assert_eq!(sources, vec!["src/a.ts"]);
    }
}
