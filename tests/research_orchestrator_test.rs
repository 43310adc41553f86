//! Integration tests for the research orchestrator
//!
//! Drives full runs against temporary workspaces with a scripted model and
//! checks the controller behaviour visible in requests and results.

mod common;

use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use common::*;
use corawiki::adapters::llm::{ScriptedModel, ScriptedReply};
use corawiki::domain::models::{ResearchConfig, Role, Stage, ToolCall};
use corawiki::domain::ports::RunLogKind;
use corawiki::infrastructure::ResearchLogger;
use corawiki::{Acceptance, DomainError, ProgressEvent, ResearchOrchestrator, ResearchRequest};

const PLAN: &str = "Plan: list src, read the router and the handler, then report.";

#[tokio::test]
async fn test_local_run_without_model() {
    let ws = workspace(&[("src/a.ts", "export function a() { return 1; }\n")]);
    let orchestrator = ResearchOrchestrator::new(test_config(), fs_tools());

    let result = orchestrator
        .run(ResearchRequest::new("What does a do?", ws.path()))
        .await
        .expect("local run succeeds");

    assert_eq!(result.acceptance, Acceptance::Local);
    assert!(result.steps.len() >= 2);
    assert_step_invariants(&result);
    assert!(result.references.iter().any(|r| r == "src/a.ts"));
    assert_eq!(result.token_usage.total_tokens, 0);
    assert_references_exist(&result, &canonical(&ws));
}

#[tokio::test]
async fn test_unconfigured_model_falls_back_to_local() {
    let ws = workspace(&[("src/a.ts", "export const a = 1;\n")]);
    let model = Arc::new(ScriptedModel::unconfigured());
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("q", ws.path()))
        .await
        .unwrap();

    assert_eq!(result.acceptance, Acceptance::Local);
    assert_eq!(model.call_count().await, 0);
}

#[tokio::test]
async fn test_missing_workspace_is_an_error() {
    let orchestrator = ResearchOrchestrator::new(test_config(), fs_tools());
    let err = orchestrator
        .run(ResearchRequest::new("q", "/definitely/not/a/workspace"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::WorkspaceNotFound(_)));
}

#[tokio::test]
async fn test_undiscovered_read_is_guarded() {
    let ws = service_workspace();
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::tool("c1", "read_skeleton", json!({"filePath": "src/router.ts"})),
    ]));
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("How are requests routed?", ws.path()))
        .await
        .unwrap();

    let requests = model.requests().await;
    assert!(requests.len() >= 3);
    let results = tool_results(&requests[2]);
    assert_eq!(results.len(), 1);
    assert!(results[0].starts_with("path_guard_blocked(read_skeleton):"));
    assert!(results[0].contains("call list_dir with targetPath \"src\""));

    let step = result
        .steps
        .iter()
        .find(|step| step.action == "read_skeleton")
        .expect("guarded call recorded as a step");
    assert_eq!(step.stage, Stage::Update);
    assert!(step.evidence.is_empty());
    assert_step_invariants(&result);
}

#[tokio::test]
async fn test_gate_passes_with_reads_and_blocks_duplicates() {
    let ws = service_workspace();
    let refs = [
        "src/main.ts",
        "src/router.ts",
        "src/handler.ts",
        "src/store.ts",
        "src/config.ts",
    ];
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::tool("c1", "list_dir", json!({"targetPath": "src"})),
        ScriptedReply::tools(vec![
            ToolCall::new("c2", "read_full_code", r#"{"filePath":"src/router.ts"}"#),
            ToolCall::new("c3", "read_full_code", r#"{"filePath":"src/router.ts"}"#),
            ToolCall::new("c4", "read_skeleton", r#"{"filePath":"src/handler.ts"}"#),
        ]),
        ScriptedReply::text(good_report(&refs)),
    ]));
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("How are requests routed?", ws.path()))
        .await
        .unwrap();

    assert_eq!(result.acceptance, Acceptance::GatePassed);
    assert_eq!(model.call_count().await, 4);
    assert_eq!(
        result.final_conclusion,
        "Requests enter in main.ts and flow through the router to the store."
    );
    assert_eq!(result.diagrams.len(), 2);

    let requests = model.requests().await;
    let listing = tool_results(&requests[2]);
    assert!(listing[0].contains("src/router.ts ("));
    let reads = tool_results(&requests[3]);
    assert!(reads.iter().any(|r| r.starts_with("src/router.ts lines 1-2 of 2")));
    assert!(reads
        .iter()
        .any(|r| r.starts_with("duplicate_read_blocked(read_full_code):")));

    for reference in refs {
        assert!(result.references.iter().any(|r| r == reference));
    }
    assert!(result.reference_stats.p0_share >= 0.6);
    assert!(result.reference_stats.p2_share <= 0.2);
    assert_references_exist(&result, &canonical(&ws));
    assert_step_invariants(&result);
}

#[tokio::test]
async fn test_failed_gate_gets_one_remediation() {
    let ws = service_workspace();
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::text(r#"{"status":"ready","architectureFindings":[]}"#),
        ScriptedReply::text(
            r#"{"status":"ready","finalConclusion":"Still thin.","architectureFindings":[]}"#,
        ),
    ]));
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("q", ws.path()))
        .await
        .unwrap();

    assert_eq!(result.acceptance, Acceptance::ForcedAcceptance);
    assert_eq!(model.call_count().await, 3);
    assert_eq!(result.final_conclusion, "Still thin.");

    let requests = model.requests().await;
    let prompts = user_messages(&requests[2]);
    let remediation = prompts.last().unwrap();
    assert!(remediation.contains("failed a quality check"));
    assert!(remediation.contains("architectureFindings"));

    let gate_steps: Vec<_> = result
        .steps
        .iter()
        .filter(|step| step.action == "quality_gate")
        .collect();
    assert_eq!(gate_steps.len(), 1);
    assert_step_invariants(&result);
}

#[tokio::test]
async fn test_remediated_report_that_passes_is_gate_passed() {
    let ws = service_workspace();
    let refs = [
        "src/main.ts",
        "src/router.ts",
        "src/handler.ts",
        "src/store.ts",
        "src/config.ts",
    ];
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::tool("c1", "list_dir", json!({"targetPath": "src"})),
        ScriptedReply::tools(vec![
            ToolCall::new("c2", "read_full_code", r#"{"filePath":"src/router.ts"}"#),
            ToolCall::new("c3", "read_skeleton", r#"{"filePath":"src/handler.ts"}"#),
        ]),
        ScriptedReply::text(r#"{"status":"ready","architectureFindings":[]}"#),
        ScriptedReply::text(good_report(&refs)),
    ]));
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("How are requests routed?", ws.path()))
        .await
        .unwrap();

    assert_eq!(result.acceptance, Acceptance::GatePassed);
    assert_eq!(model.call_count().await, 5);
    let gate_steps = result
        .steps
        .iter()
        .filter(|step| step.action == "quality_gate")
        .count();
    assert_eq!(gate_steps, 1);
    assert_references_exist(&result, &canonical(&ws));
    assert_step_invariants(&result);
}

#[tokio::test]
async fn test_prose_after_plan_asks_for_json() {
    let ws = service_workspace();
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::text("The router forwards to the handler."),
        ScriptedReply::text(r#"{"status":"ready","finalConclusion":"Done."}"#),
        ScriptedReply::text(r#"{"status":"ready","finalConclusion":"Done again."}"#),
    ]));
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("q", ws.path()))
        .await
        .unwrap();

    let requests = model.requests().await;
    let retry = user_messages(&requests[2]);
    assert!(retry.last().unwrap().contains("Reply with exactly one JSON object"));
    assert!(result.steps.iter().any(|step| step.action == "retry_json"));
    assert_eq!(result.acceptance, Acceptance::ForcedAcceptance);
    assert_eq!(result.final_conclusion, "Done again.");
}

#[tokio::test]
async fn test_need_more_evidence_continues_the_loop() {
    let ws = service_workspace();
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::text(
            r#"{"status":"need_more_evidence","missingEvidence":["router wiring"],"nextActions":["read src/router.ts"]}"#,
        ),
    ]));
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("q", ws.path()))
        .await
        .unwrap();

    let requests = model.requests().await;
    let prompt = user_messages(&requests[2]).pop().unwrap();
    assert!(prompt.starts_with("Continue gathering evidence."));
    assert!(prompt.contains("Missing evidence you stated: router wiring"));
    assert!(prompt.contains("Planned next actions: read src/router.ts"));
    assert!(result
        .steps
        .iter()
        .any(|step| step.action == "need_more_evidence"));
}

#[tokio::test]
async fn test_round_budget_runs_remediation_then_forced_finalization() {
    let ws = service_workspace();
    let config = ResearchConfig {
        max_steps: 3,
        ..test_config()
    };
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::tool("c1", "list_dir", json!({"targetPath": "."})),
        ScriptedReply::tool("c2", "list_dir", json!({"targetPath": "src"})),
        ScriptedReply::tool("c3", "list_dir", json!({"targetPath": "src"})),
        ScriptedReply::text("I still need to look around."),
        ScriptedReply::text("Almost there."),
        ScriptedReply::text("Requests flow from src/main.ts through the router."),
    ]));
    let orchestrator = orchestrator(config, Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("q", ws.path()))
        .await
        .unwrap();

    let requests = model.requests().await;
    assert_eq!(requests.len(), 6);

    let full_catalog = requests
        .iter()
        .filter(|request| offered_tools(request).iter().any(|t| t == "discover_entrypoints"))
        .count();
    assert_eq!(full_catalog, 3);
    assert!(offered_tools(&requests[1]).iter().any(|t| t == "list_dir"));
    assert!(!offered_tools(&requests[2]).iter().any(|t| t == "list_dir"));
    let withdrawn = tool_results(&requests[3]);
    assert!(withdrawn
        .last()
        .unwrap()
        .starts_with("tool_error(list_dir): not available in this round"));

    for request in &requests[3..5] {
        assert_eq!(
            offered_tools(request),
            vec!["read_skeleton".to_string(), "read_full_code".to_string()]
        );
        let directive = user_messages(request).pop().unwrap();
        assert!(directive.contains("source files have been read"));
    }
    assert!(requests[5].tools.is_empty());

    let status = requests[0].messages.last().unwrap();
    assert_eq!(status.role, Role::System);
    assert!(status.content.contains("round: 1/3"));

    assert_eq!(result.acceptance, Acceptance::ForcedFinalization);
    assert_eq!(
        result.final_conclusion,
        "Requests flow from src/main.ts through the router."
    );
    assert_step_invariants(&result);
}

#[tokio::test]
async fn test_token_budget_stops_tool_rounds() {
    let ws = service_workspace();
    let config = ResearchConfig {
        max_total_tokens: 10,
        ..test_config()
    };
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::tool("c1", "list_dir", json!({"targetPath": "src"})),
    ]));
    let orchestrator = orchestrator(config, Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("q", ws.path()))
        .await
        .unwrap();

    assert_eq!(result.acceptance, Acceptance::BudgetExhausted);
    assert_eq!(model.call_count().await, 2);
    assert!(result.token_usage.total_tokens >= 10);
    assert!(result.final_conclusion.contains("token budget"));
    assert!(!result.steps.iter().any(|step| step.action == "list_dir"));
    assert_step_invariants(&result);
}

#[tokio::test]
async fn test_model_failure_degrades() {
    let ws = service_workspace();
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::fail("connection reset"),
    ]));
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let result = orchestrator
        .run(ResearchRequest::new("How does it start?", ws.path()))
        .await
        .unwrap();

    assert_eq!(result.acceptance, Acceptance::Degraded);
    assert_eq!(model.call_count().await, 3);
    assert!(result
        .final_conclusion
        .starts_with("Research on \"How does it start?\" stopped early because"));
    assert!(result.final_conclusion.contains("connection reset"));
    assert_eq!(result.plan, PLAN);
    assert_step_invariants(&result);
}

#[tokio::test]
async fn test_cancellation_mid_run() {
    let ws = service_workspace();
    let cancel = CancellationToken::new();
    let hook_token = cancel.clone();
    let model = Arc::new(
        ScriptedModel::new(vec![
            ScriptedReply::text(PLAN),
            ScriptedReply::tool("c1", "list_dir", json!({"targetPath": "src"})),
            ScriptedReply::text(good_report(&["src/main.ts"])),
        ])
        .with_hook(Arc::new(move |index: usize| {
            if index == 1 {
                hook_token.cancel();
            }
        })),
    );
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let err = orchestrator
        .run(ResearchRequest::new("q", ws.path()).with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(model.call_count().await, 2);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let ws = service_workspace();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let model = Arc::new(ScriptedModel::new(vec![ScriptedReply::text(PLAN)]));
    let orchestrator = orchestrator(test_config(), Arc::clone(&model));

    let err = orchestrator
        .run(ResearchRequest::new("q", ws.path()).with_cancel(cancel))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::Cancelled));
    assert_eq!(model.call_count().await, 0);
}

#[tokio::test]
async fn test_progress_events_are_reported() {
    let ws = service_workspace();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let orchestrator = ResearchOrchestrator::new(test_config(), fs_tools());

    orchestrator
        .run(
            ResearchRequest::new("q", ws.path()).with_progress(Arc::new(move |event: &ProgressEvent| {
                sink.lock().unwrap().push(event.clone());
            })),
        )
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert!(matches!(events.first(), Some(ProgressEvent::Started { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProgressEvent::TreeLoaded { cached: false, .. })));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::Finished {
            acceptance: Acceptance::Local
        })
    );
}

#[tokio::test]
async fn test_run_log_receives_transcript() {
    let ws = service_workspace();
    let log = Arc::new(MemoryRunLog::default());
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedReply::text(PLAN),
        ScriptedReply::fail("upstream unavailable"),
    ]));
    let orchestrator = orchestrator(test_config(), model);

    let result = orchestrator
        .run(ResearchRequest::new("q", ws.path()).with_run_log(log.clone()))
        .await
        .unwrap();

    let kinds = log.kinds();
    assert!(kinds.contains(&RunLogKind::Request));
    assert!(kinds.contains(&RunLogKind::Response));
    assert!(kinds.contains(&RunLogKind::Decision));
    assert_eq!(kinds.last(), Some(&RunLogKind::Result));
    assert!(result.run_log.is_none());
}

#[tokio::test]
async fn test_research_logger_path_in_result() {
    let ws = service_workspace();
    let logger = ResearchLogger::create(ws.path()).unwrap();
    let orchestrator = ResearchOrchestrator::new(test_config(), fs_tools());

    let result = orchestrator
        .run(ResearchRequest::new("q", ws.path()).with_run_log(Arc::new(logger)))
        .await
        .unwrap();

    let path = result.run_log.clone().expect("run log path recorded");
    assert!(path.starts_with(ws.path().join(".corawiki/logs")));
    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.contains("RESULT"));
    assert!(!result.references.iter().any(|r| r.starts_with(".corawiki")));
}
