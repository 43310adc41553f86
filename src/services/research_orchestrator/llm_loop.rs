//! The model-driven tool loop.
//!
//! Each round sends the compacted history plus a fresh status message, then
//! either executes the requested tool calls or interprets the text answer.
//! Controllers applied here:
//! - the first text answer becomes the plan;
//! - prose after the plan is answered with a JSON retry prompt;
//! - `need_more_evidence` payloads get a bounded number of continuations;
//! - the quality gate allows exactly one remediation;
//! - `list_dir` is withdrawn after consecutive list-only rounds;
//! - tool rounds stop once the token budget is crossed.

use tracing::warn;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    parse_structured_final, Acceptance, ChatMessage, ModelRequest, ModelResponse, ResearchResult,
    Stage, StructuredFinal, TokenUsage, ToolName, ToolSpec,
};
use crate::domain::ports::{ModelAdapter, RunLogKind};
use crate::services::context_window::{
    build_round_messages, estimate_messages_tokens, estimate_tokens, RoundStatus,
};
use crate::services::prompts::{
    initial_user_prompt, need_more_evidence_prompt, remediation_prompt, retry_json_prompt,
    system_prompt,
};
use crate::services::quality_gate::{evaluate, GateVerdict};
use crate::services::tool_catalog::ToolCatalog;
use crate::services::tool_executor::{ToolExecutor, ToolOutcome};

use super::state::RunState;
use super::types::ProgressEvent;
use super::ResearchOrchestrator;

/// Consecutive list-only rounds after which `list_dir` is withdrawn.
const LIST_DIR_ONLY_LIMIT: u32 = 2;

/// How the tool loop ended.
pub(super) enum LoopExit {
    Accepted(StructuredFinal, Acceptance),
    BudgetExhausted,
    ModelFailed(String),
    RoundsExhausted,
}

/// Loop-scoped controller state.
struct LoopControl {
    catalog: ToolCatalog,
    list_dir_streak: u32,
    previous_tools: Vec<String>,
    need_more_left: u32,
    remediated: bool,
    /// Payload that failed the gate and awaits its remediation answer.
    pending: Option<StructuredFinal>,
}

impl LoopControl {
    fn new(with_external: bool, need_more_retries: u32) -> Self {
        Self {
            catalog: ToolCatalog::new(with_external),
            list_dir_streak: 0,
            previous_tools: Vec::new(),
            need_more_left: need_more_retries,
            remediated: false,
            pending: None,
        }
    }

    /// A pending payload outranks every non-accepting exit.
    fn exit(&mut self, exit: LoopExit) -> LoopExit {
        match (self.pending.take(), exit) {
            (_, accepted @ LoopExit::Accepted(..)) => accepted,
            (Some(payload), _) => LoopExit::Accepted(payload, Acceptance::ForcedAcceptance),
            (None, exit) => exit,
        }
    }
}

impl ResearchOrchestrator {
    pub(super) async fn run_with_model(
        &self,
        model: &dyn ModelAdapter,
        state: &mut RunState,
    ) -> DomainResult<ResearchResult> {
        state.history = vec![
            ChatMessage::system(system_prompt()),
            ChatMessage::user(initial_user_prompt(&state.query, &state.tree)),
        ];
        let executor = self.executor();
        let exit = self.tool_loop(model, &executor, state).await?;
        self.conclude(model, &executor, state, exit).await
    }

    async fn tool_loop(
        &self,
        model: &dyn ModelAdapter,
        executor: &ToolExecutor<'_>,
        state: &mut RunState,
    ) -> DomainResult<LoopExit> {
        let max_rounds = self.config.max_steps;
        let mut control = LoopControl::new(
            self.analyzer.is_some(),
            self.config.need_more_evidence_retries,
        );

        for round in 1..=max_rounds {
            state.check_cancelled()?;
            state.iteration = round;
            state.emit(ProgressEvent::Round { round, max_rounds });

            let specs = control.catalog.specs();
            let status = RoundStatus {
                round,
                max_rounds,
                tokens_used: state.usage.total_tokens,
                token_budget: self.config.max_total_tokens,
                deep_reads: state.session.source_reads(),
                tools: &specs,
                previous_tools: &control.previous_tools,
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
                    warn!(round, error = %err, "Model request failed");
                    state.decision(format!("model request failed in round {round}: {err}"));
                    return Ok(control.exit(LoopExit::ModelFailed(err.to_string())));
                }
            };

            if response.has_tool_calls() {
                if state.usage.total_tokens >= self.config.max_total_tokens {
                    state.decision(format!(
                        "token budget exhausted: {} of {} tokens used; abandoning tool round {round}",
                        state.usage.total_tokens, self.config.max_total_tokens
                    ));
                    return Ok(control.exit(LoopExit::BudgetExhausted));
                }
                self.tool_round(executor, state, &mut control, response).await;
                continue;
            }

            let text = response.text_content().trim().to_string();
            if let Some(exit) = self.handle_text(state, &mut control, text).await {
                return Ok(exit);
            }
        }

        Ok(control.exit(LoopExit::RoundsExhausted))
    }

    async fn tool_round(
        &self,
        executor: &ToolExecutor<'_>,
        state: &mut RunState,
        control: &mut LoopControl,
        response: ModelResponse,
    ) {
        let calls = response.tool_calls;
        state.history.push(ChatMessage::assistant_tool_calls(
            response.content.unwrap_or_default(),
            calls.clone(),
        ));
        let outcomes = executor
            .execute_round(&mut state.session, &control.catalog, &calls)
            .await;
        for outcome in &outcomes {
            state.emit(ProgressEvent::ToolCall {
                tool: outcome.tool.clone(),
                input: outcome.input.clone(),
            });
        }
        state.record_outcomes(&outcomes);
        Self::observe_round(state, control, &outcomes);
    }

    fn observe_round(state: &RunState, control: &mut LoopControl, outcomes: &[ToolOutcome]) {
        let list_only = !outcomes.is_empty()
            && outcomes
                .iter()
                .all(|outcome| outcome.tool == ToolName::ListDir.as_str());
        control.list_dir_streak = if list_only {
            control.list_dir_streak + 1
        } else {
            0
        };
        if control.list_dir_streak >= LIST_DIR_ONLY_LIMIT
            && control.catalog.contains(ToolName::ListDir)
        {
            control.catalog.remove(ToolName::ListDir);
            state.decision(format!(
                "list_dir withdrawn after {} consecutive list-only rounds",
                control.list_dir_streak
            ));
        }
        control.previous_tools = outcomes.iter().map(|outcome| outcome.tool.clone()).collect();
    }

    /// Interpret a text answer. Returns an exit when the loop should stop.
    async fn handle_text(
        &self,
        state: &mut RunState,
        control: &mut LoopControl,
        text: String,
    ) -> Option<LoopExit> {
        control.previous_tools.clear();
        if text.is_empty() {
            state.push_step(Stage::Update, "empty_response", "", "model returned no content");
            state.history.push(ChatMessage::user(retry_json_prompt()));
            return None;
        }
        state.history.push(ChatMessage::assistant(text.clone()));
        let parsed = parse_structured_final(&text);

        if state.plan.is_none() {
            let plan = match &parsed {
                Ok(payload) => payload
                    .plan
                    .clone()
                    .filter(|plan| !plan.trim().is_empty())
                    .unwrap_or_else(|| "report delivered without a separate plan".to_string()),
                Err(_) => text.clone(),
            };
            let query = state.query.clone();
            state.push_step(Stage::Plan, "plan", &query, &plan);
            state.plan = Some(plan);
            if parsed.is_err() {
                return None;
            }
        }

        match parsed {
            Ok(payload) => self.assess_payload(state, control, payload).await,
            Err(err) => {
                state.push_step(Stage::Update, "retry_json", "", &err.to_string());
                state.history.push(ChatMessage::user(retry_json_prompt()));
                None
            }
        }
    }

    async fn assess_payload(
        &self,
        state: &mut RunState,
        control: &mut LoopControl,
        payload: StructuredFinal,
    ) -> Option<LoopExit> {
        if !payload.is_ready() && control.need_more_left > 0 {
            control.need_more_left -= 1;
            state.push_step(
                Stage::Update,
                "need_more_evidence",
                &payload.next_actions.join("; "),
                &payload.missing_evidence.join("; "),
            );
            state.history.push(ChatMessage::user(need_more_evidence_prompt(
                &payload.missing_evidence,
                &payload.next_actions,
            )));
            return None;
        }

        let normalized = self.final_references(state, Some(&payload)).await;
        let verdict = evaluate(&payload, &normalized.stats, &self.config.quality);
        if control.remediated {
            control.pending = None;
            return Some(match verdict {
                GateVerdict::Passed => {
                    state.decision("quality gate passed after remediation");
                    LoopExit::Accepted(payload, Acceptance::GatePassed)
                }
                GateVerdict::Failed(reason) => {
                    state.decision(format!(
                        "accepting report after its remediation round: {reason}"
                    ));
                    LoopExit::Accepted(payload, Acceptance::ForcedAcceptance)
                }
            });
        }

        match verdict {
            GateVerdict::Passed => {
                state.decision("quality gate passed");
                Some(LoopExit::Accepted(payload, Acceptance::GatePassed))
            }
            GateVerdict::Failed(reason) => {
                control.remediated = true;
                state.push_step(Stage::Update, "quality_gate", "", &reason);
                state.decision(format!("quality gate failed: {reason}"));
                state.history.push(ChatMessage::user(remediation_prompt(&reason)));
                control.pending = Some(payload);
                None
            }
        }
    }

    /// Send one request, honouring cancellation, and account its usage.
    ///
    /// Providers that report no usage are charged an estimate.
    pub(super) async fn complete(
        &self,
        model: &dyn ModelAdapter,
        state: &mut RunState,
        messages: Vec<ChatMessage>,
        tools: Vec<ToolSpec>,
    ) -> DomainResult<ModelResponse> {
        state.check_cancelled()?;
        state.log(
            RunLogKind::Request,
            &serde_json::to_string_pretty(&serde_json::json!({
                "model": model.name(),
                "messages": messages,
                "tools": tools.iter().map(|tool| tool.name.as_str()).collect::<Vec<_>>(),
            }))
            .unwrap_or_default(),
        );
        let prompt_estimate = estimate_messages_tokens(&messages) as u64;
        let request = ModelRequest {
            messages,
            tools,
            max_tokens: self.max_tokens,
        };

        let cancel = state.cancel.clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DomainError::Cancelled),
            response = model.complete(request) => response,
        };
        let mut response = match result {
            Ok(response) => response,
            Err(err) => {
                state.log(RunLogKind::Response, &format!("error: {err}"));
                return Err(err);
            }
        };

        if response.usage.total_tokens == 0 {
            let completion = estimate_tokens(response.text_content())
                + response
                    .tool_calls
                    .iter()
                    .map(|call| estimate_tokens(&call.name) + estimate_tokens(&call.arguments))
                    .sum::<usize>();
            response.usage = TokenUsage::new(prompt_estimate, completion as u64);
        }
        state.usage.add(response.usage);
        state.log(
            RunLogKind::Response,
            &serde_json::to_string_pretty(&serde_json::json!({
                "content": response.content,
                "reasoning": response.reasoning,
                "toolCalls": response.tool_calls,
                "usage": response.usage,
            }))
            .unwrap_or_default(),
        );
        Ok(response)
    }
}
