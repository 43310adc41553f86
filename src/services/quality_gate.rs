//! Quality gate for structured reports.

use std::collections::HashSet;

use crate::domain::models::{QualityPolicy, ReferenceStats, StructuredFinal};

/// Mermaid diagram types accepted as the first line of a diagram.
const MERMAID_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "stateDiagram-v2",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
    "mindmap",
    "timeline",
    "gitGraph",
    "C4Context",
    "C4Container",
    "C4Component",
    "quadrantChart",
    "requirementDiagram",
    "block-beta",
    "architecture-beta",
];

/// Outcome of evaluating a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Passed,
    /// First failed check, naming the offending field.
    Failed(String),
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Failed(reason) => Some(reason),
        }
    }
}

fn at_least(field: &str, expected: usize, actual: usize) -> Result<(), String> {
    if actual < expected {
        Err(format!("{field}: expected at least {expected}, got {actual}"))
    } else {
        Ok(())
    }
}

/// Evaluate a payload against the policy.
///
/// `stats` must be computed over the normalized final references.
pub fn evaluate(
    payload: &StructuredFinal,
    stats: &ReferenceStats,
    policy: &QualityPolicy,
) -> GateVerdict {
    match check(payload, stats, policy) {
        Ok(()) => GateVerdict::Passed,
        Err(reason) => GateVerdict::Failed(reason),
    }
}

fn check(
    payload: &StructuredFinal,
    stats: &ReferenceStats,
    policy: &QualityPolicy,
) -> Result<(), String> {
    at_least(
        "architectureFindings",
        policy.min_findings,
        payload.architecture_findings.len(),
    )?;
    at_least("criticalFlows", policy.min_flows, payload.critical_flows.len())?;
    at_least(
        "moduleSummaries",
        policy.min_modules,
        non_blank(&payload.module_summaries),
    )?;
    at_least("risks", policy.min_risks, payload.risks.len())?;
    at_least("unknowns", policy.min_unknowns, non_blank(&payload.unknowns))?;

    if let Some(index) = payload
        .architecture_findings
        .iter()
        .position(|finding| non_blank(&finding.evidence) == 0)
    {
        return Err(format!(
            "architectureFindings[{index}].evidence: every finding must cite at least one file"
        ));
    }
    if let Some(index) = payload
        .critical_flows
        .iter()
        .position(|flow| non_blank(&flow.evidence) == 0)
    {
        return Err(format!(
            "criticalFlows[{index}].evidence: every flow must cite at least one file"
        ));
    }

    at_least("references", policy.min_references, stats.total)?;
    if stats.p0_share + f64::EPSILON < policy.min_p0_share {
        return Err(format!(
            "references: P0 share {:.2} is below the required {:.2}; cite more runtime source files",
            stats.p0_share, policy.min_p0_share
        ));
    }
    if stats.p2_share > policy.max_p2_share + f64::EPSILON {
        return Err(format!(
            "references: P2 share {:.2} exceeds the allowed {:.2}; replace documentation citations with source files",
            stats.p2_share, policy.max_p2_share
        ));
    }

    let mut judgements = HashSet::new();
    for finding in &payload.architecture_findings {
        let normalized = normalize_text(&finding.judgement);
        if !normalized.is_empty() && !judgements.insert(normalized) {
            return Err(format!(
                "architectureFindings: duplicated judgement \"{}\"",
                finding.judgement.trim()
            ));
        }
    }

    at_least(
        "diagrams",
        policy.min_diagrams,
        extract_mermaid_diagrams(&payload.diagrams).len(),
    )?;
    Ok(())
}

fn non_blank(items: &[String]) -> usize {
    items.iter().filter(|item| !item.trim().is_empty()).count()
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Valid Mermaid sources among the raw diagram strings.
///
/// Fenced blocks are extracted when present. A diagram is valid when its first
/// non-empty line starts with a known diagram keyword and a body follows.
pub fn extract_mermaid_diagrams(raw: &[String]) -> Vec<String> {
    let mut diagrams = Vec::new();
    for entry in raw {
        let blocks = fenced_blocks(entry);
        let candidates = if blocks.is_empty() {
            vec![entry.trim().to_string()]
        } else {
            blocks
        };
        for candidate in candidates {
            if is_valid_mermaid(&candidate) {
                diagrams.push(candidate);
            }
        }
    }
    diagrams
}

fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            match current.take() {
                Some(lines) => blocks.push(lines.join("\n").trim().to_string()),
                None => current = Some(Vec::new()),
            }
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    blocks
}

fn is_valid_mermaid(source: &str) -> bool {
    let mut lines = source.lines().map(str::trim).filter(|line| !line.is_empty());
    let Some(first) = lines.next() else {
        return false;
    };
    let keyword = first.split_whitespace().next().unwrap_or_default();
    MERMAID_KEYWORDS.contains(&keyword) && lines.next().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        parse_structured_final, ArchitectureFinding, CriticalFlow, RiskItem,
    };

    fn good_payload() -> StructuredFinal {
        let mut payload = parse_structured_final(r#"{"status":"ready"}"#).unwrap();
        payload.architecture_findings = (0..3)
            .map(|i| ArchitectureFinding {
                title: format!("finding {i}"),
                judgement: format!("judgement {i}"),
                evidence: vec!["src/a.ts".to_string()],
            })
            .collect();
        payload.critical_flows = vec![CriticalFlow {
            name: "startup".into(),
            steps: vec!["main".into()],
            evidence: vec!["src/main.ts".into()],
        }];
        payload.module_summaries = vec!["src: core".into()];
        payload.risks = vec![RiskItem {
            risk: "r".into(),
            impact: "i".into(),
            evidence: vec!["src/a.ts".into()],
        }];
        payload.unknowns = vec!["deployment".into()];
        payload.diagrams = vec![
            "```mermaid\ngraph TD\n  A-->B\n```".into(),
            "sequenceDiagram\n  A->>B: call".into(),
        ];
        payload
    }

    fn good_stats() -> ReferenceStats {
        ReferenceStats {
            total: 5,
            p0: 4,
            p1: 1,
            p2: 0,
            dropped: 0,
            p0_share: 0.8,
            p2_share: 0.0,
        }
    }

    #[test]
    fn test_good_payload_passes() {
        let verdict = evaluate(&good_payload(), &good_stats(), &QualityPolicy::default());
        assert_eq!(verdict, GateVerdict::Passed);
    }

    #[test]
    fn test_empty_findings_fail_naming_field() {
        let payload =
            parse_structured_final(r#"{"status":"ready","architectureFindings":[]}"#).unwrap();
        let verdict = evaluate(&payload, &ReferenceStats::default(), &QualityPolicy::default());
        let reason = verdict.reason().unwrap();
        assert!(reason.contains("architectureFindings"));
        assert_eq!(reason, "architectureFindings: expected at least 3, got 0");
    }

    #[test]
    fn test_finding_without_evidence_fails() {
        let mut payload = good_payload();
        payload.architecture_findings[1].evidence.clear();
        let reason = evaluate(&payload, &good_stats(), &QualityPolicy::default());
        assert!(reason.reason().unwrap().starts_with("architectureFindings[1].evidence"));
    }

    #[test]
    fn test_tier_shares_enforced() {
        let mut stats = good_stats();
        stats.p0_share = 0.4;
        let verdict = evaluate(&good_payload(), &stats, &QualityPolicy::default());
        assert!(verdict.reason().unwrap().contains("P0 share"));

        let mut stats = good_stats();
        stats.p2_share = 0.4;
        let verdict = evaluate(&good_payload(), &stats, &QualityPolicy::default());
        assert!(verdict.reason().unwrap().contains("P2 share"));
    }

    #[test]
    fn test_duplicate_judgements_fail() {
        let mut payload = good_payload();
        payload.architecture_findings[2].judgement = "  JUDGEMENT   0 ".into();
        let verdict = evaluate(&payload, &good_stats(), &QualityPolicy::default());
        assert!(verdict.reason().unwrap().contains("duplicated judgement"));
    }

    #[test]
    fn test_invalid_diagrams_rejected() {
        let mut payload = good_payload();
        payload.diagrams = vec!["graph TD".into(), "not a diagram\nA-->B".into()];
        let verdict = evaluate(&payload, &good_stats(), &QualityPolicy::default());
        assert_eq!(
            verdict.reason(),
            Some("diagrams: expected at least 2, got 0")
        );
    }

    #[test]
    fn test_relaxed_policy() {
        let policy = QualityPolicy {
            min_findings: 0,
            min_flows: 0,
            min_modules: 0,
            min_risks: 0,
            min_unknowns: 0,
            min_references: 0,
            min_p0_share: 0.0,
            max_p2_share: 1.0,
            min_diagrams: 0,
        };
        let payload = parse_structured_final(r#"{"status":"ready"}"#).unwrap();
        assert!(evaluate(&payload, &ReferenceStats::default(), &policy).passed());
    }

    #[test]
    fn test_multiple_fenced_blocks_in_one_entry() {
        let raw = vec!["```mermaid\nflowchart LR\n a-->b\n```\ntext\n```mermaid\npie\n \"a\": 1\n```".to_string()];
        assert_eq!(extract_mermaid_diagrams(&raw).len(), 2);
    }
}
