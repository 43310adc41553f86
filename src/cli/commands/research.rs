//! Implementation of the `corawiki research` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::analysis::PythonRunner;
use crate::adapters::llm::OpenAiCompatibleModel;
use crate::adapters::workspace::FsWorkspace;
use crate::cli::output::{output, truncate, CommandOutput, ProgressBarExt, ResearchProgress};
use crate::cli::prompt::ConsoleResolver;
use crate::domain::models::{Acceptance, Config, ResearchResult};
use crate::domain::ports::{AlwaysSkip, FailureResolver, RunLog};
use crate::domain::DomainError;
use crate::infrastructure::{ResearchLogger, TreeCacheStore};
use crate::services::{ResearchOrchestrator, ResearchRequest};

#[derive(Args, Debug)]
pub struct ResearchArgs {
    /// Question to research
    pub query: String,

    /// Workspace root (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    pub workspace: PathBuf,

    /// Override research.max_steps
    #[arg(long)]
    pub max_steps: Option<u32>,

    /// Override research.max_total_tokens
    #[arg(long)]
    pub max_tokens: Option<u64>,

    /// Skip the model and run the local walk only
    #[arg(long)]
    pub local: bool,

    /// Rebuild the code tree instead of using the cache
    #[arg(long)]
    pub no_cache: bool,

    /// Do not write a run log under .corawiki/logs
    #[arg(long)]
    pub no_log: bool,

    /// Offer the external analysis tools regardless of analysis.enabled
    #[arg(long)]
    pub analysis: bool,

    /// Also write the JSON result to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ResearchOutput {
    #[serde(flatten)]
    pub result: ResearchResult,
}

impl CommandOutput for ResearchOutput {
    fn to_human(&self) -> String {
        let result = &self.result;
        let mut lines = vec![
            format!("Research: {}", result.query),
            format!("Acceptance: {}", result.acceptance.as_str()),
            String::new(),
            result.final_conclusion.clone(),
        ];

        if !result.architecture_findings.is_empty() {
            lines.push("\nArchitecture findings:".to_string());
            for finding in &result.architecture_findings {
                lines.push(format!("  - {}: {}", finding.title, truncate(&finding.judgement, 160)));
                lines.push(format!("    evidence: {}", finding.evidence.join(", ")));
            }
        }
        if !result.critical_flows.is_empty() {
            lines.push("\nCritical flows:".to_string());
            for flow in &result.critical_flows {
                lines.push(format!("  - {} ({} steps)", flow.name, flow.steps.len()));
            }
        }
        if !result.risks.is_empty() {
            lines.push("\nRisks:".to_string());
            for risk in &result.risks {
                lines.push(format!("  - {}: {}", risk.risk, truncate(&risk.impact, 120)));
            }
        }
        if !result.unknowns.is_empty() {
            lines.push("\nUnknowns:".to_string());
            lines.extend(result.unknowns.iter().map(|u| format!("  - {u}")));
        }
        if !result.references.is_empty() {
            let stats = &result.reference_stats;
            lines.push(format!(
                "\nReferences ({} total, P0 {:.0}%, P2 {:.0}%):",
                stats.total,
                stats.p0_share * 100.0,
                stats.p2_share * 100.0
            ));
            lines.extend(result.references.iter().map(|r| format!("  - {r}")));
        }

        lines.push(format!(
            "\nTokens: {} ({} prompt, {} completion), steps: {}",
            result.token_usage.total_tokens,
            result.token_usage.prompt_tokens,
            result.token_usage.completion_tokens,
            result.steps.len()
        ));
        if let Some(path) = &result.run_log {
            lines.push(format!("Run log: {}", path.display()));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.result).unwrap_or_default()
    }
}

fn resolve_against(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

fn build_orchestrator(
    config: &Config,
    args: &ResearchArgs,
    workspace: &Path,
    progress: &ResearchProgress,
    json_mode: bool,
) -> Result<ResearchOrchestrator> {
    let mut research = config.research.clone();
    if let Some(max_steps) = args.max_steps {
        research.max_steps = max_steps;
    }
    if let Some(max_tokens) = args.max_tokens {
        research.max_total_tokens = max_tokens;
    }
    let cache_dir = resolve_against(workspace, &research.cache_dir);

    let tools = FsWorkspace::new(&research.exclude_globs)
        .context("Invalid exclude globs")?
        .with_root(workspace);
    let mut orchestrator = ResearchOrchestrator::new(research, Arc::new(tools))
        .with_max_tokens(config.llm.max_tokens);

    if !args.local {
        let model = OpenAiCompatibleModel::new(config.llm.clone())
            .context("Failed to build the model client")?;
        orchestrator = orchestrator.with_model(Arc::new(model));
    }

    if args.analysis || config.analysis.enabled {
        let mut analysis = config.analysis.clone();
        analysis.runner_path = resolve_against(workspace, &analysis.runner_path);
        let resolver: Arc<dyn FailureResolver> = if json_mode {
            Arc::new(AlwaysSkip)
        } else {
            Arc::new(ConsoleResolver::new().with_spinner(progress.spinner().clone()))
        };
        orchestrator = orchestrator.with_analyzer(Arc::new(PythonRunner::new(&analysis)), resolver);
    }

    if !args.no_cache {
        orchestrator = orchestrator.with_cache(Arc::new(TreeCacheStore::new(cache_dir)));
    }
    Ok(orchestrator)
}

pub async fn execute(args: ResearchArgs, config: Config, json_mode: bool) -> Result<()> {
    let workspace = std::fs::canonicalize(&args.workspace)
        .with_context(|| format!("Workspace not found: {}", args.workspace.display()))?;

    let progress = if json_mode {
        ResearchProgress::hidden()
    } else {
        ResearchProgress::new()
    };
    let orchestrator = build_orchestrator(&config, &args, &workspace, &progress, json_mode)?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_token.cancel();
        }
    });

    let mut request = ResearchRequest::new(&args.query, &workspace)
        .with_progress(progress.callback())
        .with_cancel(cancel);
    if !args.no_log {
        match ResearchLogger::create(&workspace) {
            Ok(logger) => {
                let logger: Arc<dyn RunLog> = Arc::new(logger);
                request = request.with_run_log(logger);
            }
            Err(err) => warn!(error = %err, "Run log disabled"),
        }
    }

    let result = match orchestrator.run(request).await {
        Ok(result) => result,
        Err(DomainError::Cancelled) => {
            progress.spinner().finish_warning("Research cancelled");
            anyhow::bail!("Research cancelled");
        }
        Err(err) => {
            progress.spinner().finish_error("Research failed");
            return Err(err).context("Research run failed");
        }
    };

    match result.acceptance {
        Acceptance::GatePassed => progress.spinner().finish_success("Report passed the quality gate"),
        acceptance => progress
            .spinner()
            .finish_warning(format!("Report finished as {}", acceptance.as_str())),
    }
    info!(
        acceptance = result.acceptance.as_str(),
        references = result.references.len(),
        "Research finished"
    );

    if let Some(path) = &args.output {
        let body = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        tokio::fs::write(path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    output(&ResearchOutput { result }, json_mode);
    Ok(())
}
