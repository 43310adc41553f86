//! Deterministic research walk used when no model is configured.

use serde_json::json;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Acceptance, ResearchResult, Stage, ToolCall, ToolName};
use crate::services::tool_catalog::ToolCatalog;
use crate::services::tool_executor::{OutcomeStatus, ToolExecutor, ToolOutcome};

use super::state::RunState;
use super::types::ProgressEvent;
use super::ResearchOrchestrator;

/// Lines read from the snippet candidate.
const LOCAL_SNIPPET_LINES: usize = 40;

impl ResearchOrchestrator {
    /// List the root, outline the first source file, read a snippet of the
    /// next candidate, and summarize. Every failed step narrows the conclusion.
    pub(super) async fn run_local(&self, state: &mut RunState) -> DomainResult<ResearchResult> {
        let executor = self.executor();
        let catalog = ToolCatalog::new(false);
        let plan = "Local analysis without a model: list the workspace root, outline the first \
                    source file, then read the beginning of the next candidate file."
            .to_string();
        let query = state.query.clone();
        state.push_step(Stage::Plan, "plan", &query, &plan);
        state.plan = Some(plan);

        let mut notes = vec![format!(
            "Local analysis of {} ({} files in the code tree).",
            state.session.workspace().display(),
            state.tree.files.len()
        )];

        state.check_cancelled()?;
        state.iteration = 1;
        let listing = self
            .local_call(&executor, &catalog, state, ToolName::ListDir, json!({"targetPath": "."}))
            .await;
        notes.push(match listing.status {
            OutcomeStatus::Ok => {
                let entries = listing.model_output.lines().filter(|l| !l.starts_with('(')).count();
                format!("The workspace root has {entries} entries.")
            }
            _ => format!("The workspace root could not be listed: {}.", listing.model_output),
        });

        let first_source = state.tree.source_files().next().map(|file| file.path.clone());
        match first_source {
            Some(first) => {
                state.check_cancelled()?;
                state.iteration += 1;
                let absolute = state.session.workspace().join(&first);
                state.session.add_file(absolute);
                let outline = self
                    .local_call(
                        &executor,
                        &catalog,
                        state,
                        ToolName::ReadSkeleton,
                        json!({"filePath": first}),
                    )
                    .await;
                notes.push(match outline.status {
                    OutcomeStatus::Ok => format!(
                        "The outline of {first} has {} lines.",
                        outline.log_output.lines().count()
                    ),
                    _ => format!("{first} could not be outlined: {}.", outline.model_output),
                });
            }
            None => notes.push("The code tree contains no source files.".to_string()),
        }

        let candidate = Self::local_candidate(state);
        if let Some(candidate) = candidate {
            state.check_cancelled()?;
            state.iteration += 1;
            let snippet = self
                .local_call(
                    &executor,
                    &catalog,
                    state,
                    ToolName::ReadFullCode,
                    json!({"filePath": candidate, "startLine": 1, "endLine": LOCAL_SNIPPET_LINES}),
                )
                .await;
            notes.push(match snippet.status {
                OutcomeStatus::Ok => {
                    let header = snippet.model_output.lines().next().unwrap_or_default();
                    format!("Read {header}.")
                }
                _ => format!("{candidate} could not be read: {}.", snippet.model_output),
            });
        }

        state.iteration += 1;
        let conclusion = notes.join(" ");
        Ok(self
            .assemble_synthesized(state, conclusion, Acceptance::Local)
            .await)
    }

    /// Next unread file worth a snippet: runtime sources first, then the
    /// whitelisted root files the session was seeded with.
    fn local_candidate(state: &mut RunState) -> Option<String> {
        if let Some(candidate) = state.unread_source_candidates(1).into_iter().next() {
            return Some(candidate);
        }
        state
            .tree
            .files
            .iter()
            .map(|file| file.path.clone())
            .find(|path| {
                let absolute = state.session.workspace().join(path);
                state.session.is_discovered(&absolute) && !state.session.was_read(&absolute)
            })
    }

    async fn local_call(
        &self,
        executor: &ToolExecutor<'_>,
        catalog: &ToolCatalog,
        state: &mut RunState,
        tool: ToolName,
        arguments: serde_json::Value,
    ) -> ToolOutcome {
        let call = ToolCall::new(
            format!("local_{}", state.iteration),
            tool.as_str(),
            arguments.to_string(),
        );
        let mut outcomes = executor
            .execute_round(&mut state.session, catalog, std::slice::from_ref(&call))
            .await;
        state.record_outcomes(&outcomes);
        let outcome = outcomes.pop().unwrap_or_else(|| ToolOutcome {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            input: String::new(),
            model_output: format!("tool_error({tool}): call was not executed"),
            log_output: String::new(),
            evidence: Vec::new(),
            status: OutcomeStatus::Error,
        });
        state.emit(ProgressEvent::ToolCall {
            tool: outcome.tool.clone(),
            input: outcome.input.clone(),
        });
        outcome
    }
}
