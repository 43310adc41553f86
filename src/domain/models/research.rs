//! Research run domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::message::TokenUsage;

/// Stage of the research state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Plan,
    Update,
    Final,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "PLAN",
            Self::Update => "UPDATE",
            Self::Final => "FINAL",
        }
    }
}

/// One atomic unit of research activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchStep {
    pub iteration: u32,
    pub stage: Stage,
    pub action: String,
    pub input: String,
    pub evidence: Vec<String>,
    pub output: String,
}

impl ResearchStep {
    pub fn new(iteration: u32, stage: Stage, action: impl Into<String>) -> Self {
        Self {
            iteration,
            stage,
            action: action.into(),
            input: String::new(),
            evidence: Vec::new(),
            output: String::new(),
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// A judged architectural observation with its citations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureFinding {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub judgement: String,
    #[serde(default, deserialize_with = "super::structured::string_or_vec")]
    pub evidence: Vec<String>,
}

/// A named runtime flow through the codebase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalFlow {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "super::structured::string_or_vec")]
    pub steps: Vec<String>,
    #[serde(default, deserialize_with = "super::structured::string_or_vec")]
    pub evidence: Vec<String>,
}

/// A risk with its impact and citations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskItem {
    #[serde(default)]
    pub risk: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default, deserialize_with = "super::structured::string_or_vec")]
    pub evidence: Vec<String>,
}

/// Tier distribution of the final references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceStats {
    pub total: usize,
    pub p0: usize,
    pub p1: usize,
    pub p2: usize,
    /// Raw references discarded as missing, duplicated, or over the cap.
    pub dropped: usize,
    pub p0_share: f64,
    pub p2_share: f64,
}

/// How the terminal FINAL of a run was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Acceptance {
    /// Structured payload passed the quality gate.
    GatePassed,
    /// Structured payload accepted after the single remediation attempt.
    ForcedAcceptance,
    /// Produced by the no-tools forced finalization request.
    ForcedFinalization,
    /// Token budget crossed; conclusion synthesized from gathered evidence.
    BudgetExhausted,
    /// Model unavailable mid-run; conclusion synthesized from gathered evidence.
    Degraded,
    /// Deterministic local walk without a model.
    Local,
}

impl Acceptance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GatePassed => "gate_passed",
            Self::ForcedAcceptance => "forced_acceptance",
            Self::ForcedFinalization => "forced_finalization",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Degraded => "degraded",
            Self::Local => "local",
        }
    }
}

/// The externally visible output of one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<ResearchStep>,
    pub plan: String,
    pub updates: Vec<String>,
    pub final_conclusion: String,
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_overview: Option<String>,
    pub diagrams: Vec<String>,
    pub module_summaries: Vec<String>,
    pub architecture_findings: Vec<ArchitectureFinding>,
    pub critical_flows: Vec<CriticalFlow>,
    pub risks: Vec<RiskItem>,
    pub unknowns: Vec<String>,
    pub token_usage: TokenUsage,
    pub reference_stats: ReferenceStats,
    pub acceptance: Acceptance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_log: Option<PathBuf>,
}

impl ResearchResult {
    /// Number of model-visible research rounds recorded in the step log.
    pub fn last_iteration(&self) -> u32 {
        self.steps.last().map_or(0, |step| step.iteration)
    }
}
