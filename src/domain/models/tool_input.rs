//! Typed tool-call arguments.
//!
//! The model sends a tool name and a raw JSON object. Both are validated here
//! into one closed [`ToolInput`] variant before any filesystem work happens.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Every tool the orchestrator knows how to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ListDir,
    ReadSkeleton,
    ReadFullCode,
    DiscoverEntrypoints,
    AnalyzeDependencies,
    SummarizeDirectory,
    ExtractImportGraph,
    AnalyzeComplexity,
}

impl ToolName {
    /// Tools always offered to the model, in catalogue order.
    pub const BUILTIN: [Self; 6] = [
        Self::ListDir,
        Self::ReadSkeleton,
        Self::ReadFullCode,
        Self::DiscoverEntrypoints,
        Self::AnalyzeDependencies,
        Self::SummarizeDirectory,
    ];

    /// Tools delegated to the external analysis runner.
    pub const EXTERNAL: [Self; 2] = [Self::ExtractImportGraph, Self::AnalyzeComplexity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListDir => "list_dir",
            Self::ReadSkeleton => "read_skeleton",
            Self::ReadFullCode => "read_full_code",
            Self::DiscoverEntrypoints => "discover_entrypoints",
            Self::AnalyzeDependencies => "analyze_dependencies",
            Self::SummarizeDirectory => "summarize_directory",
            Self::ExtractImportGraph => "extract_import_graph",
            Self::AnalyzeComplexity => "analyze_complexity",
        }
    }

    /// Reads that are subject to the discovery and duplicate-read guards.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::ReadSkeleton | Self::ReadFullCode)
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::ExtractImportGraph | Self::AnalyzeComplexity)
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::BUILTIN
            .iter()
            .chain(Self::EXTERNAL.iter())
            .find(|tool| tool.as_str() == s)
            .copied()
            .ok_or_else(|| ToolInputError::UnknownTool(s.to_string()))
    }
}

/// Validation failure for a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolInputError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("malformed arguments for {tool}: {reason}")]
    MalformedArguments { tool: ToolName, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TargetPathArgs {
    pub target_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilePathArgs {
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadRangeArgs {
    pub file_path: String,
    #[serde(default)]
    pub start_line: Option<usize>,
    #[serde(default)]
    pub end_line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RootArgs {
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileSetArgs {
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub workspace_path: Option<String>,
}

/// Validated arguments of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolInput {
    ListDir(TargetPathArgs),
    ReadSkeleton(FilePathArgs),
    ReadFullCode(ReadRangeArgs),
    DiscoverEntrypoints(RootArgs),
    AnalyzeDependencies(FileSetArgs),
    SummarizeDirectory(TargetPathArgs),
    ExtractImportGraph(FileSetArgs),
    AnalyzeComplexity(FileSetArgs),
}

impl ToolInput {
    /// Parse a tool call's name and raw JSON arguments.
    ///
    /// An empty argument string is treated as `{}`.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolInputError> {
        let tool: ToolName = name.parse()?;
        let raw = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };

        let malformed = |err: serde_json::Error| ToolInputError::MalformedArguments {
            tool,
            reason: err.to_string(),
        };

        let input = match tool {
            ToolName::ListDir => Self::ListDir(serde_json::from_str(raw).map_err(malformed)?),
            ToolName::ReadSkeleton => {
                Self::ReadSkeleton(serde_json::from_str(raw).map_err(malformed)?)
            }
            ToolName::ReadFullCode => {
                Self::ReadFullCode(serde_json::from_str(raw).map_err(malformed)?)
            }
            ToolName::DiscoverEntrypoints => {
                Self::DiscoverEntrypoints(serde_json::from_str(raw).map_err(malformed)?)
            }
            ToolName::AnalyzeDependencies => {
                Self::AnalyzeDependencies(serde_json::from_str(raw).map_err(malformed)?)
            }
            ToolName::SummarizeDirectory => {
                Self::SummarizeDirectory(serde_json::from_str(raw).map_err(malformed)?)
            }
            ToolName::ExtractImportGraph => {
                Self::ExtractImportGraph(serde_json::from_str(raw).map_err(malformed)?)
            }
            ToolName::AnalyzeComplexity => {
                Self::AnalyzeComplexity(serde_json::from_str(raw).map_err(malformed)?)
            }
        };

        input.validate()?;
        Ok(input)
    }

    fn validate(&self) -> Result<(), ToolInputError> {
        let fail = |reason: &str| {
            Err(ToolInputError::MalformedArguments {
                tool: self.tool(),
                reason: reason.to_string(),
            })
        };
        match self {
            Self::ListDir(args) | Self::SummarizeDirectory(args)
                if args.target_path.trim().is_empty() =>
            {
                fail("targetPath must not be empty")
            }
            Self::ReadSkeleton(args) if args.file_path.trim().is_empty() => {
                fail("filePath must not be empty")
            }
            Self::ReadFullCode(args) => {
                if args.file_path.trim().is_empty() {
                    return fail("filePath must not be empty");
                }
                match (args.start_line, args.end_line) {
                    (Some(0), _) | (_, Some(0)) => fail("line numbers are 1-based"),
                    (Some(start), Some(end)) if start > end => {
                        fail("startLine must not exceed endLine")
                    }
                    _ => Ok(()),
                }
            }
            Self::AnalyzeDependencies(args)
            | Self::ExtractImportGraph(args)
            | Self::AnalyzeComplexity(args)
                if args.file_paths.is_empty() =>
            {
                fail("filePaths must contain at least one path")
            }
            _ => Ok(()),
        }
    }

    pub fn tool(&self) -> ToolName {
        match self {
            Self::ListDir(_) => ToolName::ListDir,
            Self::ReadSkeleton(_) => ToolName::ReadSkeleton,
            Self::ReadFullCode(_) => ToolName::ReadFullCode,
            Self::DiscoverEntrypoints(_) => ToolName::DiscoverEntrypoints,
            Self::AnalyzeDependencies(_) => ToolName::AnalyzeDependencies,
            Self::SummarizeDirectory(_) => ToolName::SummarizeDirectory,
            Self::ExtractImportGraph(_) => ToolName::ExtractImportGraph,
            Self::AnalyzeComplexity(_) => ToolName::AnalyzeComplexity,
        }
    }

    /// The file a read tool targets, if this is a read.
    pub fn read_target(&self) -> Option<&str> {
        match self {
            Self::ReadSkeleton(args) => Some(&args.file_path),
            Self::ReadFullCode(args) => Some(&args.file_path),
            _ => None,
        }
    }

    /// Short human-readable argument summary for step records.
    pub fn describe(&self) -> String {
        match self {
            Self::ListDir(args) | Self::SummarizeDirectory(args) => args.target_path.clone(),
            Self::ReadSkeleton(args) => args.file_path.clone(),
            Self::ReadFullCode(args) => match (args.start_line, args.end_line) {
                (Some(start), Some(end)) => format!("{}:{start}-{end}", args.file_path),
                (Some(start), None) => format!("{}:{start}-", args.file_path),
                (None, Some(end)) => format!("{}:1-{end}", args.file_path),
                (None, None) => args.file_path.clone(),
            },
            Self::DiscoverEntrypoints(args) => args.root.clone().unwrap_or_else(|| ".".into()),
            Self::AnalyzeDependencies(args)
            | Self::ExtractImportGraph(args)
            | Self::AnalyzeComplexity(args) => args.file_paths.join(", "),
        }
    }
}
