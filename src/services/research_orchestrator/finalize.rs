//! Evidence-depth remediation, forced finalization, and result assembly.

use chrono::Utc;
use std::path::Path;
use tracing::warn;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    parse_structured_final, Acceptance, ChatMessage, ResearchResult, StructuredFinal,
};
use crate::domain::ports::ModelAdapter;
use crate::services::context_window::{build_round_messages, RoundStatus};
use crate::services::prompts::{evidence_depth_directive, forced_final_prompt, system_prompt};
use crate::services::quality_gate::{evaluate, extract_mermaid_diagrams};
use crate::services::references::{normalize_references, NormalizedReferences};
use crate::services::tool_catalog::ToolCatalog;
use crate::services::tool_executor::ToolExecutor;

use super::llm_loop::LoopExit;
use super::state::RunState;
use super::types::ProgressEvent;
use super::ResearchOrchestrator;

/// Unread candidates named in an evidence-depth directive.
const DIRECTIVE_CANDIDATES: usize = 8;

impl ResearchOrchestrator {
    /// Turn a loop exit into the run's result.
    pub(super) async fn conclude(
        &self,
        model: &dyn ModelAdapter,
        executor: &ToolExecutor<'_>,
        state: &mut RunState,
        exit: LoopExit,
    ) -> DomainResult<ResearchResult> {
        match exit {
            LoopExit::Accepted(payload, acceptance) => {
                Ok(self.assemble_from_payload(state, payload, acceptance).await)
            }
            LoopExit::BudgetExhausted => {
                let conclusion = synthesized_conclusion(
                    state,
                    &format!(
                        "the token budget of {} was exhausted",
                        self.config.max_total_tokens
                    ),
                );
                Ok(self
                    .assemble_synthesized(state, conclusion, Acceptance::BudgetExhausted)
                    .await)
            }
            LoopExit::ModelFailed(reason) => self.force_finalization(model, state, &reason).await,
            LoopExit::RoundsExhausted => {
                if let Some((payload, acceptance)) =
                    self.deepen_evidence(model, executor, state).await?
                {
                    return Ok(self.assemble_from_payload(state, payload, acceptance).await);
                }
                self.force_finalization(model, state, "the round budget was exhausted")
                    .await
            }
        }
    }

    /// Extra read-only rounds while too few source files have been read.
    ///
    /// These rounds do not count against the round budget. A structured
    /// payload returned in them is gated and accepted either way.
    async fn deepen_evidence(
        &self,
        model: &dyn ModelAdapter,
        executor: &ToolExecutor<'_>,
        state: &mut RunState,
    ) -> DomainResult<Option<(StructuredFinal, Acceptance)>> {
        let required = self.config.min_source_reads;
        let rounds = self.config.remediation_rounds;
        let catalog = ToolCatalog::reads_only();

        for round in 1..=rounds {
            let reads = state.session.source_reads();
            if reads >= required {
                break;
            }
            state.check_cancelled()?;
            state.iteration += 1;
            state.emit(ProgressEvent::Round {
                round,
                max_rounds: rounds,
            });
            let candidates = state.unread_source_candidates(DIRECTIVE_CANDIDATES);
            state.decision(format!(
                "evidence-depth remediation {round}/{rounds}: {reads} of {required} source files read"
            ));
            state.history.push(ChatMessage::user(evidence_depth_directive(
                reads,
                required,
                &candidates,
            )));

            let specs = catalog.specs();
            let status = RoundStatus {
                round,
                max_rounds: rounds,
                tokens_used: state.usage.total_tokens,
                token_budget: self.config.max_total_tokens,
                deep_reads: reads,
                tools: &specs,
                previous_tools: &[],
            };
            let messages = build_round_messages(
                &state.history,
                self.config.tail_window,
                &state.evidence,
                &status,
            );
            let response = match self.complete(model, state, messages, specs).await {
                Ok(response) => response,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    warn!(error = %err, "Model request failed during evidence remediation");
                    break;
                }
            };

            if response.has_tool_calls() {
                let calls = response.tool_calls;
                state.history.push(ChatMessage::assistant_tool_calls(
                    response.content.unwrap_or_default(),
                    calls.clone(),
                ));
                let outcomes = executor
                    .execute_round(&mut state.session, &catalog, &calls)
                    .await;
                state.record_outcomes(&outcomes);
                continue;
            }

            let text = response.text_content().trim().to_string();
            if text.is_empty() {
                continue;
            }
            state.history.push(ChatMessage::assistant(text.clone()));
            if let Ok(payload) = parse_structured_final(&text) {
                let normalized = self.final_references(state, Some(&payload)).await;
                let acceptance = if evaluate(&payload, &normalized.stats, &self.config.quality)
                    .passed()
                {
                    Acceptance::GatePassed
                } else {
                    Acceptance::ForcedAcceptance
                };
                state.decision(format!(
                    "report accepted during evidence remediation ({})",
                    acceptance.as_str()
                ));
                return Ok(Some((payload, acceptance)));
            }
        }
        Ok(None)
    }

    /// One request without tools asking for the final report.
    ///
    /// A parseable reply is merged; any other text becomes the conclusion.
    /// When the request fails the result degrades to a synthesized summary.
    async fn force_finalization(
        &self,
        model: &dyn ModelAdapter,
        state: &mut RunState,
        reason: &str,
    ) -> DomainResult<ResearchResult> {
        state.check_cancelled()?;
        state.iteration += 1;
        state.decision(format!("forced finalization: {reason}"));

        let plan = state.plan.clone().unwrap_or_default();
        let evidence = state.evidence_references();
        let messages = vec![
            ChatMessage::system(system_prompt()),
            ChatMessage::user(forced_final_prompt(
                &state.query,
                &plan,
                &state.updates,
                &evidence,
            )),
        ];

        let failure = match self.complete(model, state, messages, Vec::new()).await {
            Ok(response) => {
                let text = response.text_content().trim().to_string();
                if !text.is_empty() {
                    return Ok(match parse_structured_final(&text) {
                        Ok(payload) => {
                            self.assemble_from_payload(
                                state,
                                payload,
                                Acceptance::ForcedFinalization,
                            )
                            .await
                        }
                        Err(_) => {
                            self.assemble_synthesized(
                                state,
                                text,
                                Acceptance::ForcedFinalization,
                            )
                            .await
                        }
                    });
                }
                "the forced finalization reply was empty".to_string()
            }
            Err(err) if err.is_cancelled() => return Err(err),
            Err(err) => {
                warn!(error = %err, "Forced finalization failed");
                format!("{reason}; forced finalization failed: {err}")
            }
        };

        let conclusion = synthesized_conclusion(state, &failure);
        Ok(self
            .assemble_synthesized(state, conclusion, Acceptance::Degraded)
            .await)
    }

    /// Normalized union of the payload citations, tool evidence, and read files.
    pub(super) async fn final_references(
        &self,
        state: &RunState,
        payload: Option<&StructuredFinal>,
    ) -> NormalizedReferences {
        let mut raw = payload.map(StructuredFinal::cited_paths).unwrap_or_default();
        raw.extend(state.evidence_references());
        normalize_references(raw, state.session.workspace(), self.config.max_references).await
    }

    pub(super) async fn assemble_from_payload(
        &self,
        state: &mut RunState,
        payload: StructuredFinal,
        acceptance: Acceptance,
    ) -> ResearchResult {
        let normalized = self.final_references(state, Some(&payload)).await;
        let conclusion = if payload.final_conclusion.trim().is_empty() {
            synthesized_conclusion(state, "the report carried no conclusion")
        } else {
            payload.final_conclusion.trim().to_string()
        };
        state.push_final_step(&conclusion, normalized.references.clone());

        let plan = state
            .plan
            .clone()
            .or_else(|| payload.plan.clone())
            .unwrap_or_default();
        let updates = if payload.updates.is_empty() {
            state.updates.clone()
        } else {
            payload.updates
        };

        ResearchResult {
            query: state.query.clone(),
            started_at: state.started_at,
            finished_at: Utc::now(),
            steps: std::mem::take(&mut state.steps),
            plan,
            updates,
            final_conclusion: conclusion,
            references: normalized.references,
            project_background: payload.project_background.filter(|s| !s.trim().is_empty()),
            technical_overview: payload.technical_overview.filter(|s| !s.trim().is_empty()),
            diagrams: extract_mermaid_diagrams(&payload.diagrams),
            module_summaries: payload.module_summaries,
            architecture_findings: payload.architecture_findings,
            critical_flows: payload.critical_flows,
            risks: payload.risks,
            unknowns: payload.unknowns,
            token_usage: state.usage,
            reference_stats: normalized.stats,
            acceptance,
            run_log: state.run_log_path().map(Path::to_path_buf),
        }
    }

    /// Result without a structured payload; the sections stay empty.
    pub(super) async fn assemble_synthesized(
        &self,
        state: &mut RunState,
        conclusion: String,
        acceptance: Acceptance,
    ) -> ResearchResult {
        let normalized = self.final_references(state, None).await;
        state.push_final_step(&conclusion, normalized.references.clone());
        ResearchResult {
            query: state.query.clone(),
            started_at: state.started_at,
            finished_at: Utc::now(),
            steps: std::mem::take(&mut state.steps),
            plan: state.plan.clone().unwrap_or_default(),
            updates: state.updates.clone(),
            final_conclusion: conclusion,
            references: normalized.references,
            project_background: None,
            technical_overview: None,
            diagrams: Vec::new(),
            module_summaries: module_overview(state),
            architecture_findings: Vec::new(),
            critical_flows: Vec::new(),
            risks: Vec::new(),
            unknowns: vec![match acceptance {
                Acceptance::Local => {
                    "No model was configured; only a local scan of the workspace was made"
                        .to_string()
                }
                other => format!(
                    "The research stopped before a structured report ({})",
                    other.as_str()
                ),
            }],
            token_usage: state.usage,
            reference_stats: normalized.stats,
            acceptance,
            run_log: state.run_log_path().map(Path::to_path_buf),
        }
    }
}

/// Deterministic conclusion built from what the run gathered.
pub(super) fn synthesized_conclusion(state: &RunState, reason: &str) -> String {
    let read: Vec<String> = state
        .session
        .read_files()
        .iter()
        .map(|path| state.session.relative(path))
        .collect();
    let mut conclusion = format!(
        "Research on \"{}\" stopped early because {reason}.",
        state.query
    );
    if let Some(plan) = state.plan.as_deref().filter(|plan| !plan.trim().is_empty()) {
        conclusion.push_str(&format!(" Plan: {}", plan.trim()));
    }
    if read.is_empty() {
        conclusion.push_str(" No files were read.");
    } else {
        conclusion.push_str(&format!(" Files read: {}.", read.join(", ")));
    }
    if let Some(latest) = state.updates.last() {
        conclusion.push_str(&format!(" Last activity: {latest}."));
    }
    conclusion
}

/// One summary line per top-level directory of the code tree.
pub(super) fn module_overview(state: &RunState) -> Vec<String> {
    let mut summaries = Vec::new();
    for dir in state.tree.dirs.iter().filter(|dir| !dir.contains('/')) {
        let prefix = format!("{dir}/");
        let files = state
            .tree
            .files
            .iter()
            .filter(|file| file.path.starts_with(&prefix))
            .count();
        summaries.push(format!("{dir}: {files} files"));
    }
    summaries
}
