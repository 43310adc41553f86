//! Structured FINAL payload and its parser.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use super::research::{ArchitectureFinding, CriticalFlow, RiskItem};

/// Readiness declared by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Ready,
    NeedMoreEvidence,
}

/// The JSON report the model emits once it judges its evidence sufficient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredFinal {
    pub status: FinalStatus,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub updates: Vec<String>,
    #[serde(default)]
    pub final_conclusion: String,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub references: Vec<String>,
    #[serde(default)]
    pub project_background: Option<String>,
    #[serde(default)]
    pub technical_overview: Option<String>,
    #[serde(default)]
    pub architecture_findings: Vec<ArchitectureFinding>,
    #[serde(default)]
    pub critical_flows: Vec<CriticalFlow>,
    #[serde(default)]
    pub risks: Vec<RiskItem>,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub unknowns: Vec<String>,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub diagrams: Vec<String>,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub module_summaries: Vec<String>,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub missing_evidence: Vec<String>,
    #[serde(default, deserialize_with = "string_or_vec")]
    pub next_actions: Vec<String>,
}

impl StructuredFinal {
    pub fn is_ready(&self) -> bool {
        self.status == FinalStatus::Ready
    }

    /// Every file path the payload cites, in order of appearance.
    pub fn cited_paths(&self) -> Vec<String> {
        let mut cited = self.references.clone();
        for finding in &self.architecture_findings {
            cited.extend(finding.evidence.iter().cloned());
        }
        for flow in &self.critical_flows {
            cited.extend(flow.evidence.iter().cloned());
        }
        for risk in &self.risks {
            cited.extend(risk.evidence.iter().cloned());
        }
        cited
    }
}

/// Why free text could not be read as a structured payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuredParseError {
    #[error("no JSON object found in model output")]
    NoJsonObject,

    #[error("invalid structured payload: {0}")]
    InvalidPayload(String),
}

/// Extract and parse a structured payload from free-form model output.
///
/// Markdown code fences are stripped, then the text between the first `{`
/// and the last `}` is deserialized.
pub fn parse_structured_final(text: &str) -> Result<StructuredFinal, StructuredParseError> {
    let stripped = strip_code_fences(text);
    let start = stripped.find('{').ok_or(StructuredParseError::NoJsonObject)?;
    let end = stripped.rfind('}').ok_or(StructuredParseError::NoJsonObject)?;
    if end <= start {
        return Err(StructuredParseError::NoJsonObject);
    }
    serde_json::from_str(&stripped[start..=end])
        .map_err(|err| StructuredParseError::InvalidPayload(err.to_string()))
}

fn strip_code_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Accept either a JSON array of strings or a single bare string.
///
/// `null` yields an empty list. Non-string array items are stringified.
pub fn string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(serde_json::Value::String(s)) => vec![s],
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
    })
}
