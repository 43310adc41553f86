//! Mutable state of one research run.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ChatMessage, CodeTree, ResearchStep, Stage, TokenUsage};
use crate::domain::ports::{RunLog, RunLogKind};
use crate::services::discovery::{hotspot_candidates, DiscoverySession};
use crate::services::references::{classify_reference, Tier};
use crate::services::tool_executor::ToolOutcome;

use super::types::{ProgressCallback, ProgressEvent, ResearchRequest};

/// Longest step output kept verbatim in the step log.
const STEP_OUTPUT_CHARS: usize = 4000;

pub(super) struct RunState {
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub session: DiscoverySession,
    pub tree: CodeTree,
    pub history: Vec<ChatMessage>,
    pub steps: Vec<ResearchStep>,
    /// Current iteration; 0 before the first round.
    pub iteration: u32,
    pub plan: Option<String>,
    /// One line per tool round, in round order.
    pub updates: Vec<String>,
    /// Evidence references from successful tool calls, most recent last.
    pub evidence: Vec<String>,
    pub usage: TokenUsage,
    pub cancel: CancellationToken,
    progress: Option<ProgressCallback>,
    run_log: Option<Arc<dyn RunLog>>,
}

impl RunState {
    pub fn new(request: &ResearchRequest, session: DiscoverySession, tree: CodeTree) -> Self {
        Self {
            query: request.query.clone(),
            started_at: Utc::now(),
            session,
            tree,
            history: Vec::new(),
            steps: Vec::new(),
            iteration: 0,
            plan: None,
            updates: Vec::new(),
            evidence: Vec::new(),
            usage: TokenUsage::default(),
            cancel: request.cancel.clone(),
            progress: request.progress.clone(),
            run_log: request.run_log.clone(),
        }
    }

    pub fn check_cancelled(&self) -> DomainResult<()> {
        if self.cancel.is_cancelled() {
            Err(DomainError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }

    pub fn log(&self, kind: RunLogKind, body: &str) {
        if let Some(run_log) = &self.run_log {
            run_log.record(kind, body);
        }
    }

    pub fn run_log_path(&self) -> Option<&Path> {
        self.run_log.as_ref().and_then(|log| log.path())
    }

    /// Record a controller decision in the run log, the tracing stream and
    /// the progress callback.
    pub fn decision(&self, text: impl Into<String>) {
        let text = text.into();
        info!(iteration = self.iteration, decision = %text, "Research decision");
        self.log(RunLogKind::Decision, &text);
        self.emit(ProgressEvent::Decision(text));
    }

    /// Append a step at the current iteration.
    pub fn push_step(&mut self, stage: Stage, action: &str, input: &str, output: &str) {
        let step = ResearchStep::new(self.iteration, stage, action)
            .with_input(input)
            .with_output(truncate_chars(output, STEP_OUTPUT_CHARS));
        self.steps.push(step);
    }

    pub fn push_final_step(&mut self, conclusion: &str, references: Vec<String>) {
        let step = ResearchStep::new(self.iteration, Stage::Final, "final")
            .with_input(self.query.clone())
            .with_evidence(references)
            .with_output(truncate_chars(conclusion, STEP_OUTPUT_CHARS));
        self.steps.push(step);
    }

    /// Fold the outcomes of a tool round into history, steps, and evidence.
    pub fn record_outcomes(&mut self, outcomes: &[ToolOutcome]) {
        let mut summary = format!("Round {}:", self.iteration);
        for outcome in outcomes {
            self.history.push(ChatMessage::tool_result(
                outcome.call_id.clone(),
                outcome.model_output.clone(),
            ));
            let step = ResearchStep::new(self.iteration, Stage::Update, outcome.tool.clone())
                .with_input(outcome.input.clone())
                .with_evidence(outcome.evidence.clone())
                .with_output(truncate_chars(&outcome.model_output, STEP_OUTPUT_CHARS));
            self.steps.push(step);
            self.log(
                RunLogKind::Tool,
                &format!(
                    "{} {} [{:?}]\n{}",
                    outcome.tool, outcome.input, outcome.status, outcome.log_output
                ),
            );
            self.evidence.extend(outcome.evidence.iter().cloned());
            let _ = write!(summary, " {}({}) {:?};", outcome.tool, outcome.input, outcome.status);
        }
        self.updates.push(summary.trim_end_matches(';').to_string());
    }

    /// Tool evidence followed by every read file, deduplicated in order.
    pub fn evidence_references(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.evidence
            .iter()
            .cloned()
            .chain(
                self.session
                    .read_files()
                    .iter()
                    .map(|path| self.session.relative(path)),
            )
            .filter(|reference| seen.insert(reference.clone()))
            .collect()
    }

    /// Unread runtime source files from the code tree, hotspots first.
    ///
    /// Returned files are marked discovered so the model may read them.
    pub fn unread_source_candidates(&mut self, limit: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let ordered: Vec<String> = hotspot_candidates(&self.tree)
            .into_iter()
            .chain(self.tree.source_files().map(|file| file.path.clone()))
            .filter(|path| seen.insert(path.clone()))
            .collect();

        let mut candidates = Vec::new();
        for relative in ordered {
            if candidates.len() >= limit {
                break;
            }
            if classify_reference(&relative) != Tier::P0 {
                continue;
            }
            let absolute = self.session.workspace().join(&relative);
            if self.session.was_read(&absolute) {
                continue;
            }
            self.session.add_file(absolute);
            candidates.push(relative);
        }
        candidates
    }
}

pub(super) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => format!("{}...", &text[..index]),
        None => text.to_string(),
    }
}
