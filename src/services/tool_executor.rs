//! Executes one round of model-requested tool calls.
//!
//! A round runs in three phases:
//! 1. validation, guards and read reservations, sequential on the session;
//! 2. I/O for every admitted call, concurrently;
//! 3. discovery updates, failure resolution and compression, in call order.

use futures::future::join_all;
use serde_json::json;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::models::{ResearchConfig, ToolCall, ToolInput, ToolInputError, ToolName};
use crate::domain::ports::{
    DirEntry, DirectorySummary, ExternalAnalyzer, ExternalToolError, FailureDecision,
    FailureResolver, FileContent, FileDependencies, WorkspaceTools,
};
use crate::services::context_window::compress_file_content;
use crate::services::discovery::DiscoverySession;
use crate::services::tool_catalog::ToolCatalog;

/// How a tool call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Ok,
    /// Refused by the discovery or duplicate-read guard.
    Guarded,
    Error,
    /// External tool skipped after an earlier failure.
    Skipped,
}

/// Result of one tool call, ready to become a `tool` message and a step.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub call_id: String,
    /// Tool name as requested by the model.
    pub tool: String,
    pub input: String,
    /// Content sent to the model, compressed when long.
    pub model_output: String,
    /// Uncompressed content for the run log.
    pub log_output: String,
    /// Workspace-relative file references backing this result.
    pub evidence: Vec<String>,
    pub status: OutcomeStatus,
}

impl ToolOutcome {
    fn immediate(call: &ToolCall, input: String, output: String, status: OutcomeStatus) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            input,
            model_output: output.clone(),
            log_output: output,
            evidence: Vec::new(),
            status,
        }
    }

    /// Whether this outcome read a file successfully.
    pub fn is_read(&self) -> bool {
        self.status == OutcomeStatus::Ok
            && self.tool.parse::<ToolName>().is_ok_and(|tool| tool.is_read())
    }
}

/// Line thresholds for compressing file content sent to the model.
#[derive(Debug, Clone, Copy)]
pub struct CompressionPolicy {
    pub threshold_lines: usize,
    pub head_lines: usize,
    pub tail_lines: usize,
}

impl CompressionPolicy {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            threshold_lines: config.compress_threshold_lines,
            head_lines: config.compress_head_lines,
            tail_lines: config.compress_tail_lines,
        }
    }

    fn apply(&self, text: &str) -> String {
        compress_file_content(text, self.threshold_lines, self.head_lines, self.tail_lines)
            .unwrap_or_else(|| text.to_string())
    }
}

/// A call with its paths resolved, admitted for execution.
#[derive(Debug, Clone)]
enum Resolved {
    ListDir(PathBuf),
    ReadSkeleton(PathBuf),
    ReadFullCode(PathBuf, Option<usize>, Option<usize>),
    DiscoverEntrypoints(PathBuf),
    AnalyzeDependencies(Vec<PathBuf>, PathBuf),
    SummarizeDirectory(PathBuf),
    External(ToolName, Vec<PathBuf>, PathBuf),
}

struct Admitted {
    call: ToolCall,
    input: String,
    resolved: Resolved,
    /// Retry an external failure once without consulting the resolver.
    retry_external: bool,
}

enum Planned {
    Done(ToolOutcome),
    Run(Admitted),
}

enum RawResult {
    Listing(Vec<DirEntry>),
    Skeleton(String),
    Code(FileContent),
    Entrypoints(Vec<PathBuf>),
    Dependencies(Vec<FileDependencies>),
    Summary(DirectorySummary),
    External(Result<serde_json::Value, ExternalToolError>),
    Failed(String),
}

/// Executes tool calls against the workspace on behalf of one run.
pub struct ToolExecutor<'a> {
    tools: &'a dyn WorkspaceTools,
    analyzer: Option<&'a dyn ExternalAnalyzer>,
    resolver: &'a dyn FailureResolver,
    compression: CompressionPolicy,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(
        tools: &'a dyn WorkspaceTools,
        analyzer: Option<&'a dyn ExternalAnalyzer>,
        resolver: &'a dyn FailureResolver,
        compression: CompressionPolicy,
    ) -> Self {
        Self {
            tools,
            analyzer,
            resolver,
            compression,
        }
    }

    /// Execute every call of a round. Outcomes are returned in call order.
    pub async fn execute_round(
        &self,
        session: &mut DiscoverySession,
        catalog: &ToolCatalog,
        calls: &[ToolCall],
    ) -> Vec<ToolOutcome> {
        let planned: Vec<Planned> = calls
            .iter()
            .map(|call| Self::plan(session, catalog, call))
            .collect();

        let raw_results = join_all(planned.iter().map(|plan| async move {
            match plan {
                Planned::Run(admitted) => Some(self.run(admitted).await),
                Planned::Done(_) => None,
            }
        }))
        .await;

        let mut outcomes = Vec::with_capacity(calls.len());
        for (plan, raw) in planned.into_iter().zip(raw_results) {
            let outcome = match (plan, raw) {
                (Planned::Done(outcome), _) => outcome,
                (Planned::Run(admitted), Some(raw)) => self.finish(session, admitted, raw).await,
                (Planned::Run(admitted), None) => ToolOutcome::immediate(
                    &admitted.call,
                    admitted.input,
                    format!("tool_error({}): call was not executed", admitted.call.name),
                    OutcomeStatus::Error,
                ),
            };
            debug!(
                tool = %outcome.tool,
                input = %outcome.input,
                status = ?outcome.status,
                evidence = outcome.evidence.len(),
                "Tool call finished"
            );
            outcomes.push(outcome);
        }
        outcomes
    }

    fn plan(session: &mut DiscoverySession, catalog: &ToolCatalog, call: &ToolCall) -> Planned {
        let input = match ToolInput::parse(&call.name, &call.arguments) {
            Ok(input) => input,
            Err(err) => {
                let tool = match &err {
                    ToolInputError::UnknownTool(name) => name.clone(),
                    ToolInputError::MalformedArguments { tool, .. } => tool.to_string(),
                };
                return Planned::Done(ToolOutcome::immediate(
                    call,
                    call.arguments.clone(),
                    format!("tool_error({tool}): {err}"),
                    OutcomeStatus::Error,
                ));
            }
        };
        let tool = input.tool();
        let summary = input.describe();

        if !catalog.contains(tool) {
            let offered: Vec<&str> = catalog.tools().iter().map(ToolName::as_str).collect();
            return Planned::Done(ToolOutcome::immediate(
                call,
                summary,
                format!(
                    "tool_error({tool}): not available in this round; available tools: {}",
                    if offered.is_empty() {
                        "none".to_string()
                    } else {
                        offered.join(", ")
                    }
                ),
                OutcomeStatus::Error,
            ));
        }

        let mut retry_external = false;
        if tool.is_external() {
            match session.external_decision(tool) {
                Some(FailureDecision::Skip) => {
                    return Planned::Done(ToolOutcome::immediate(
                        call,
                        summary,
                        format!(
                            "tool_skipped({tool}): skipped for the rest of this run after an earlier failure"
                        ),
                        OutcomeStatus::Skipped,
                    ));
                }
                Some(FailureDecision::Retry) => retry_external = true,
                None => {}
            }
        }

        let guarded = |rejection: crate::services::discovery::GuardRejection| {
            Planned::Done(ToolOutcome::immediate(
                call,
                summary.clone(),
                rejection.render(tool),
                OutcomeStatus::Guarded,
            ))
        };

        let resolved = match &input {
            ToolInput::ListDir(args) => match session.resolve(&args.target_path) {
                Ok(path) => Resolved::ListDir(path),
                Err(rejection) => return guarded(rejection),
            },
            ToolInput::SummarizeDirectory(args) => match session.resolve(&args.target_path) {
                Ok(path) => Resolved::SummarizeDirectory(path),
                Err(rejection) => return guarded(rejection),
            },
            ToolInput::DiscoverEntrypoints(args) => {
                match session.resolve(args.root.as_deref().unwrap_or(".")) {
                    Ok(path) => Resolved::DiscoverEntrypoints(path),
                    Err(rejection) => return guarded(rejection),
                }
            }
            ToolInput::ReadSkeleton(_) | ToolInput::ReadFullCode(_) => {
                let raw = input.read_target().unwrap_or_default();
                let path = match session.resolve(raw) {
                    Ok(path) => path,
                    Err(rejection) => return guarded(rejection),
                };
                if let Err(rejection) = session.check_read(&path) {
                    return guarded(rejection);
                }
                session.reserve_read(&path);
                match &input {
                    ToolInput::ReadFullCode(args) => {
                        Resolved::ReadFullCode(path, args.start_line, args.end_line)
                    }
                    _ => Resolved::ReadSkeleton(path),
                }
            }
            ToolInput::AnalyzeDependencies(args)
            | ToolInput::ExtractImportGraph(args)
            | ToolInput::AnalyzeComplexity(args) => {
                let mut paths = Vec::with_capacity(args.file_paths.len());
                for raw in &args.file_paths {
                    match session.resolve(raw) {
                        Ok(path) => paths.push(path),
                        Err(rejection) => return guarded(rejection),
                    }
                }
                let workspace = session.workspace().to_path_buf();
                if tool == ToolName::AnalyzeDependencies {
                    Resolved::AnalyzeDependencies(paths, workspace)
                } else {
                    Resolved::External(tool, paths, workspace)
                }
            }
        };

        Planned::Run(Admitted {
            call: call.clone(),
            input: summary,
            resolved,
            retry_external,
        })
    }

    async fn run(&self, admitted: &Admitted) -> RawResult {
        let result = match &admitted.resolved {
            Resolved::ListDir(dir) => self.tools.list_dir(dir).await.map(RawResult::Listing),
            Resolved::ReadSkeleton(file) => {
                self.tools.read_skeleton(file).await.map(RawResult::Skeleton)
            }
            Resolved::ReadFullCode(file, start, end) => self
                .tools
                .read_full_code(file, *start, *end)
                .await
                .map(RawResult::Code),
            Resolved::DiscoverEntrypoints(root) => self
                .tools
                .discover_entrypoints(root)
                .await
                .map(RawResult::Entrypoints),
            Resolved::AnalyzeDependencies(files, workspace) => self
                .tools
                .analyze_dependencies(files, workspace)
                .await
                .map(RawResult::Dependencies),
            Resolved::SummarizeDirectory(dir) => self
                .tools
                .summarize_directory(dir)
                .await
                .map(RawResult::Summary),
            Resolved::External(tool, files, workspace) => {
                return RawResult::External(
                    self.run_external(*tool, files, workspace, admitted.retry_external)
                        .await,
                );
            }
        };
        result.unwrap_or_else(|err| RawResult::Failed(err.to_string()))
    }

    async fn run_external(
        &self,
        tool: ToolName,
        files: &[PathBuf],
        workspace: &Path,
        retry: bool,
    ) -> Result<serde_json::Value, ExternalToolError> {
        let Some(analyzer) = self.analyzer else {
            return Err(ExternalToolError::Unavailable(
                "no external analyzer configured".to_string(),
            ));
        };
        match analyzer.run(tool, files, workspace).await {
            Err(err) if retry => {
                debug!(%tool, error = %err, "Retrying external tool");
                analyzer.run(tool, files, workspace).await
            }
            other => other,
        }
    }

    async fn finish(
        &self,
        session: &mut DiscoverySession,
        admitted: Admitted,
        raw: RawResult,
    ) -> ToolOutcome {
        let Admitted {
            call,
            input,
            resolved,
            retry_external,
        } = admitted;
        let tool = call.name.clone();
        let mut outcome = ToolOutcome {
            call_id: call.id.clone(),
            tool: tool.clone(),
            input,
            model_output: String::new(),
            log_output: String::new(),
            evidence: Vec::new(),
            status: OutcomeStatus::Ok,
        };

        match raw {
            RawResult::Listing(entries) => {
                let mut text = String::new();
                for entry in &entries {
                    let rel = session.relative(&entry.path);
                    if entry.is_dir {
                        let _ = writeln!(text, "{rel}/");
                        session.add_dir(entry.path.clone());
                    } else {
                        let _ = writeln!(text, "{rel} ({} bytes)", entry.size);
                        session.add_file(entry.path.clone());
                    }
                }
                if entries.is_empty() {
                    text.push_str("(empty directory)\n");
                }
                outcome.log_output = text.clone();
                outcome.model_output = text;
            }
            RawResult::Skeleton(skeleton) => {
                let Resolved::ReadSkeleton(path) = resolved else {
                    return outcome;
                };
                session.record_read(&path);
                let mut expanded = Vec::new();
                for candidate in session.import_candidates(&path, &skeleton) {
                    let Ok(meta) = tokio::fs::metadata(&candidate).await else {
                        continue;
                    };
                    let added = if meta.is_file() {
                        session.add_file(candidate.clone())
                    } else if meta.is_dir() {
                        session.add_dir(candidate.clone())
                    } else {
                        false
                    };
                    if added && meta.is_file() {
                        expanded.push(session.relative(&candidate));
                    }
                }
                let rel = session.relative(&path);
                let mut model_output = self.compression.apply(&skeleton);
                if !expanded.is_empty() {
                    let _ = write!(
                        model_output,
                        "\n[imports now readable: {}]",
                        expanded.join(", ")
                    );
                }
                outcome.log_output = skeleton;
                outcome.model_output = model_output;
                outcome.evidence.push(rel);
            }
            RawResult::Code(content) => {
                session.record_read(&content.path);
                let rel = session.relative(&content.path);
                let partial = content.start_line > 1 || content.end_line < content.total_lines;
                let reference = if partial {
                    format!("{rel}:{}-{}", content.start_line, content.end_line)
                } else {
                    rel.clone()
                };
                let header = format!(
                    "{rel} lines {}-{} of {}\n",
                    content.start_line, content.end_line, content.total_lines
                );
                outcome.model_output =
                    format!("{header}{}", self.compression.apply(&content.text));
                outcome.log_output = format!("{header}{}", content.text);
                outcome.evidence.push(reference);
            }
            RawResult::Entrypoints(files) => {
                let mut text = String::new();
                for file in &files {
                    let _ = writeln!(text, "{}", session.relative(file));
                    session.add_file(file.clone());
                }
                if files.is_empty() {
                    text.push_str("(no entry points found)\n");
                }
                outcome.log_output = text.clone();
                outcome.model_output = text;
            }
            RawResult::Dependencies(deps) => {
                let rendered: Vec<serde_json::Value> = deps
                    .iter()
                    .map(|dep| {
                        json!({
                            "filePath": session.relative(&dep.path),
                            "imports": dep.imports,
                            "localDeps": dep
                                .local
                                .iter()
                                .map(|p| session.relative(p))
                                .collect::<Vec<_>>(),
                            "externalDeps": dep.external,
                            "error": dep.error,
                        })
                    })
                    .collect();
                outcome.evidence = deps
                    .iter()
                    .filter(|dep| dep.error.is_none())
                    .map(|dep| session.relative(&dep.path))
                    .collect();
                let text = serde_json::to_string_pretty(&rendered).unwrap_or_default();
                outcome.log_output = text.clone();
                outcome.model_output = self.compression.apply(&text);
            }
            RawResult::Summary(summary) => {
                session.add_dir(summary.path.clone());
                let mut text = format!(
                    "{}: {} files, {} directories, {} bytes\n",
                    session.relative(&summary.path),
                    summary.file_count,
                    summary.dir_count,
                    summary.total_bytes
                );
                if !summary.languages.is_empty() {
                    let languages: Vec<String> = summary
                        .languages
                        .iter()
                        .map(|(lang, count)| format!("{lang}: {count}"))
                        .collect();
                    let _ = writeln!(text, "languages: {}", languages.join(", "));
                }
                if !summary.notable_files.is_empty() {
                    let notable: Vec<String> = summary
                        .notable_files
                        .iter()
                        .map(|p| session.relative(p))
                        .collect();
                    let _ = writeln!(text, "largest source files: {}", notable.join(", "));
                }
                outcome.log_output = text.clone();
                outcome.model_output = text;
            }
            RawResult::External(result) => {
                let Resolved::External(external_tool, files, workspace) = resolved else {
                    return outcome;
                };
                let result = match result {
                    Err(err) if !retry_external => {
                        let decision = match session.external_decision(external_tool) {
                            Some(decision) => decision,
                            None => {
                                let decision = self.resolver.resolve(external_tool, &err);
                                warn!(
                                    tool = %external_tool,
                                    error = %err,
                                    ?decision,
                                    "External tool failed"
                                );
                                session.remember_external_decision(external_tool, decision);
                                decision
                            }
                        };
                        match decision {
                            FailureDecision::Retry => {
                                self.run_external(external_tool, &files, &workspace, false)
                                    .await
                            }
                            FailureDecision::Skip => Err(err),
                        }
                    }
                    other => other,
                };
                match result {
                    Ok(value) => {
                        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
                        outcome.log_output = text.clone();
                        outcome.model_output = self.compression.apply(&text);
                        outcome.evidence = files.iter().map(|p| session.relative(p)).collect();
                    }
                    Err(err) => {
                        let skipped = session.external_decision(external_tool)
                            == Some(FailureDecision::Skip);
                        let text = if skipped {
                            format!(
                                "tool_skipped({external_tool}): {err}; skipped for the rest of this run"
                            )
                        } else {
                            format!("tool_error({external_tool}): {err}")
                        };
                        outcome.status = if skipped {
                            OutcomeStatus::Skipped
                        } else {
                            OutcomeStatus::Error
                        };
                        outcome.log_output = text.clone();
                        outcome.model_output = text;
                    }
                }
            }
            RawResult::Failed(err) => {
                if let Resolved::ReadSkeleton(path) | Resolved::ReadFullCode(path, _, _) = &resolved
                {
                    session.release_read(path);
                }
                let text = format!("tool_error({tool}): {err}");
                outcome.status = OutcomeStatus::Error;
                outcome.log_output = text.clone();
                outcome.model_output = text;
            }
        }
        outcome
    }
}
