//! Common test utilities for integration tests
//!
//! Provides workspace fixtures, report payloads, and port doubles shared
//! across the integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use corawiki::adapters::llm::ScriptedModel;
use corawiki::adapters::workspace::FsWorkspace;
use corawiki::domain::models::{CodeTree, ModelRequest, ResearchConfig, Role, Stage};
use corawiki::domain::ports::{
    DirEntry, DirectorySummary, FileContent, FileDependencies, RunLog, RunLogKind, TreeFilter,
    WorkspaceTools,
};
use corawiki::{DomainResult, ResearchOrchestrator, ResearchResult};

/// Create a workspace containing `files` (relative path, contents).
pub fn workspace(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for (path, body) in files {
        let full = dir.path().join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(full, body).expect("Failed to write fixture file");
    }
    dir
}

/// A small TypeScript service with five runtime source files.
pub fn service_workspace() -> TempDir {
    workspace(&[
        ("src/main.ts", "import { route } from './router';\nroute();\n"),
        ("src/router.ts", "import { handle } from './handler';\nexport function route() { handle(); }\n"),
        ("src/handler.ts", "import { store } from './store';\nexport function handle() { store(); }\n"),
        ("src/store.ts", "export function store() {}\n"),
        ("src/config.ts", "export const port = 8080;\n"),
        ("README.md", "# Service\n"),
    ])
}

pub fn canonical(dir: &TempDir) -> PathBuf {
    std::fs::canonicalize(dir.path()).expect("Failed to canonicalize workspace")
}

/// Research configuration with short loops for tests.
pub fn test_config() -> ResearchConfig {
    ResearchConfig {
        max_steps: 6,
        ..ResearchConfig::default()
    }
}

pub fn fs_tools() -> Arc<FsWorkspace> {
    Arc::new(FsWorkspace::new(&[]).expect("valid globs"))
}

pub fn orchestrator(config: ResearchConfig, model: Arc<ScriptedModel>) -> ResearchOrchestrator {
    ResearchOrchestrator::new(config, fs_tools()).with_model(model)
}

/// A report that satisfies the default quality policy when `refs` are five
/// or more runtime source files.
pub fn good_report(refs: &[&str]) -> String {
    let findings: Vec<_> = (0..3)
        .map(|i| {
            json!({
                "title": format!("Layer {i}"),
                "judgement": format!("Layer {i} owns a distinct responsibility"),
                "evidence": [refs[i % refs.len()]],
            })
        })
        .collect();
    json!({
        "status": "ready",
        "plan": "trace the request path",
        "updates": ["listed src", "read the router"],
        "finalConclusion": "Requests enter in main.ts and flow through the router to the store.",
        "references": refs,
        "architectureFindings": findings,
        "criticalFlows": [{"name": "request", "steps": ["main", "router", "handler"], "evidence": [refs[0]]}],
        "moduleSummaries": ["src: request handling"],
        "risks": [{"risk": "no persistence", "impact": "data loss", "evidence": [refs[0]]}],
        "unknowns": ["deployment topology"],
        "diagrams": [
            "```mermaid\ngraph TD\n  main-->router\n```",
            "sequenceDiagram\n  main->>router: route",
        ],
    })
    .to_string()
}

/// Tool result messages visible in a request.
pub fn tool_results(request: &ModelRequest) -> Vec<String> {
    request
        .messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .map(|message| message.content.clone())
        .collect()
}

/// User messages visible in a request.
pub fn user_messages(request: &ModelRequest) -> Vec<String> {
    request
        .messages
        .iter()
        .filter(|message| message.role == Role::User)
        .map(|message| message.content.clone())
        .collect()
}

pub fn offered_tools(request: &ModelRequest) -> Vec<String> {
    request.tools.iter().map(|tool| tool.name.clone()).collect()
}

/// Steps are ordered PLAN...FINAL with non-decreasing iterations.
pub fn assert_step_invariants(result: &ResearchResult) {
    assert!(!result.steps.is_empty());
    assert_eq!(result.steps.first().map(|s| s.stage), Some(Stage::Plan));
    assert_eq!(result.steps.last().map(|s| s.stage), Some(Stage::Final));
    for pair in result.steps.windows(2) {
        assert!(
            pair[0].iteration <= pair[1].iteration,
            "iterations decrease: {} then {}",
            pair[0].iteration,
            pair[1].iteration
        );
    }
    let finals = result.steps.iter().filter(|s| s.stage == Stage::Final).count();
    assert_eq!(finals, 1, "exactly one FINAL step");
}

/// Every reference names an existing file inside the workspace.
pub fn assert_references_exist(result: &ResearchResult, workspace: &Path) {
    for reference in &result.references {
        let (path, _) = corawiki::services::references::split_reference(reference);
        let full = workspace.join(path);
        assert!(full.is_file(), "reference {reference} does not exist");
        assert!(full.starts_with(workspace));
    }
}

/// Run log that keeps entries in memory.
#[derive(Default)]
pub struct MemoryRunLog {
    entries: Mutex<Vec<(RunLogKind, String)>>,
}

impl MemoryRunLog {
    pub fn entries(&self) -> Vec<(RunLogKind, String)> {
        self.entries.lock().expect("run log lock").clone()
    }

    pub fn kinds(&self) -> Vec<RunLogKind> {
        self.entries().into_iter().map(|(kind, _)| kind).collect()
    }
}

impl RunLog for MemoryRunLog {
    fn path(&self) -> Option<&Path> {
        None
    }

    fn record(&self, kind: RunLogKind, body: &str) {
        self.entries
            .lock()
            .expect("run log lock")
            .push((kind, body.to_string()));
    }
}

/// Filesystem tools that count code tree builds.
pub struct CountingTools {
    inner: FsWorkspace,
    builds: AtomicUsize,
}

impl CountingTools {
    pub fn new() -> Self {
        Self {
            inner: FsWorkspace::new(&[]).expect("valid globs"),
            builds: AtomicUsize::new(0),
        }
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkspaceTools for CountingTools {
    async fn list_dir(&self, dir: &Path) -> DomainResult<Vec<DirEntry>> {
        self.inner.list_dir(dir).await
    }

    async fn read_skeleton(&self, file: &Path) -> DomainResult<String> {
        self.inner.read_skeleton(file).await
    }

    async fn read_full_code(
        &self,
        file: &Path,
        start_line: Option<usize>,
        end_line: Option<usize>,
    ) -> DomainResult<FileContent> {
        self.inner.read_full_code(file, start_line, end_line).await
    }

    async fn discover_entrypoints(&self, root: &Path) -> DomainResult<Vec<PathBuf>> {
        self.inner.discover_entrypoints(root).await
    }

    async fn analyze_dependencies(
        &self,
        files: &[PathBuf],
        workspace: &Path,
    ) -> DomainResult<Vec<FileDependencies>> {
        self.inner.analyze_dependencies(files, workspace).await
    }

    async fn summarize_directory(&self, dir: &Path) -> DomainResult<DirectorySummary> {
        self.inner.summarize_directory(dir).await
    }

    async fn build_code_tree(&self, root: &Path, filter: &TreeFilter) -> DomainResult<CodeTree> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.inner.build_code_tree(root, filter).await
    }
}
