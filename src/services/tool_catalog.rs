//! Tool declarations offered to the model.

use serde_json::json;

use crate::domain::models::{ToolName, ToolSpec};

/// One-line description used in the catalogue and the status message.
pub fn describe(tool: ToolName) -> &'static str {
    match tool {
        ToolName::ListDir => "List the entries of a workspace directory. Every returned entry becomes readable.",
        ToolName::ReadSkeleton => "Read the outline of a discovered file: imports, declarations and exports. Relative imports become readable.",
        ToolName::ReadFullCode => "Read a discovered file, optionally a 1-based inclusive line range.",
        ToolName::DiscoverEntrypoints => "Find likely program entry points under a directory.",
        ToolName::AnalyzeDependencies => "List the import statements of the given files, split into local and external.",
        ToolName::SummarizeDirectory => "Summarize a directory: file counts, languages, and its largest source files.",
        ToolName::ExtractImportGraph => "Run the external analyzer to extract the import graph of the given files.",
        ToolName::AnalyzeComplexity => "Run the external analyzer to measure cyclomatic complexity of the given Python files.",
    }
}

fn parameters(tool: ToolName) -> serde_json::Value {
    match tool {
        ToolName::ListDir | ToolName::SummarizeDirectory => json!({
            "type": "object",
            "properties": {
                "targetPath": {"type": "string", "description": "Directory path relative to the workspace root"}
            },
            "required": ["targetPath"],
            "additionalProperties": false
        }),
        ToolName::ReadSkeleton => json!({
            "type": "object",
            "properties": {
                "filePath": {"type": "string", "description": "File path relative to the workspace root"}
            },
            "required": ["filePath"],
            "additionalProperties": false
        }),
        ToolName::ReadFullCode => json!({
            "type": "object",
            "properties": {
                "filePath": {"type": "string", "description": "File path relative to the workspace root"},
                "startLine": {"type": "integer", "minimum": 1},
                "endLine": {"type": "integer", "minimum": 1}
            },
            "required": ["filePath"],
            "additionalProperties": false
        }),
        ToolName::DiscoverEntrypoints => json!({
            "type": "object",
            "properties": {
                "root": {"type": "string", "description": "Directory to search, defaults to the workspace root"}
            },
            "additionalProperties": false
        }),
        ToolName::AnalyzeDependencies | ToolName::ExtractImportGraph | ToolName::AnalyzeComplexity => {
            json!({
                "type": "object",
                "properties": {
                    "filePaths": {"type": "array", "items": {"type": "string"}, "minItems": 1},
                    "workspacePath": {"type": "string"}
                },
                "required": ["filePaths"],
                "additionalProperties": false
            })
        }
    }
}

pub fn spec(tool: ToolName) -> ToolSpec {
    ToolSpec {
        name: tool.as_str().to_string(),
        description: describe(tool).to_string(),
        parameters: parameters(tool),
    }
}

/// Tool names offered in one round, in catalogue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCatalog {
    tools: Vec<ToolName>,
}

impl ToolCatalog {
    /// Built-in tools, plus the external ones when an analyzer is configured.
    pub fn new(with_external: bool) -> Self {
        let mut tools = ToolName::BUILTIN.to_vec();
        if with_external {
            tools.extend(ToolName::EXTERNAL);
        }
        Self { tools }
    }

    /// Read-only catalogue used by evidence-depth remediation rounds.
    pub fn reads_only() -> Self {
        Self {
            tools: vec![ToolName::ReadSkeleton, ToolName::ReadFullCode],
        }
    }

    pub fn empty() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn remove(&mut self, tool: ToolName) {
        self.tools.retain(|t| *t != tool);
    }

    pub fn contains(&self, tool: ToolName) -> bool {
        self.tools.contains(&tool)
    }

    pub fn tools(&self) -> &[ToolName] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().copied().map(spec).collect()
    }
}
