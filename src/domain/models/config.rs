use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for CoraWiki
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Model endpoint configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Research loop limits and quality policy
    #[serde(default)]
    pub research: ResearchConfig,

    /// Optional external analysis runner
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Base URL, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Inline API key; prefer `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Completion token cap per request
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum number of retry attempts on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl LlmConfig {
    /// Resolve the API key: inline value, then `api_key_env`, then `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "CORAWIKI_API_KEY".to_string()
}

const fn default_timeout_secs() -> u64 {
    120
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_temperature() -> f32 {
    0.2
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Research loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResearchConfig {
    /// Model-driven rounds, excluding remediation and forced finalization
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Soft token budget; crossing it abandons further tool rounds
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: u64,

    /// Globs a file must match to enter the code tree (empty = everything)
    #[serde(default)]
    pub include_globs: Vec<String>,

    /// Globs that exclude files and directories from the code tree
    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,

    /// Age in seconds after which a cached code tree is rebuilt
    #[serde(default = "default_cache_ttl_sec")]
    pub cache_ttl_sec: u64,

    /// Directory holding cached code trees
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Most recent messages kept verbatim during compaction
    #[serde(default = "default_tail_window")]
    pub tail_window: usize,

    /// Line count above which file content is compressed for the model
    #[serde(default = "default_compress_threshold_lines")]
    pub compress_threshold_lines: usize,

    /// Lines retained at the head of compressed content
    #[serde(default = "default_compress_head_lines")]
    pub compress_head_lines: usize,

    /// Lines retained at the tail of compressed content
    #[serde(default = "default_compress_tail_lines")]
    pub compress_tail_lines: usize,

    /// Source reads required before forced finalization skips remediation
    #[serde(default = "default_min_source_reads")]
    pub min_source_reads: usize,

    /// Extra read-only rounds granted when evidence depth is too low
    #[serde(default = "default_remediation_rounds")]
    pub remediation_rounds: u32,

    /// How many `need_more_evidence` replies get a continuation prompt
    #[serde(default = "default_need_more_evidence_retries")]
    pub need_more_evidence_retries: u32,

    /// Cap on final references
    #[serde(default = "default_max_references")]
    pub max_references: usize,

    /// Quality gate thresholds
    #[serde(default)]
    pub quality: QualityPolicy,
}

const fn default_max_steps() -> u32 {
    12
}

const fn default_max_total_tokens() -> u64 {
    200_000
}

fn default_exclude_globs() -> Vec<String> {
    [
        "**/.git/**",
        "**/node_modules/**",
        "**/target/**",
        "**/dist/**",
        "**/build/**",
        "**/.corawiki/**",
        "**/__pycache__/**",
        "**/.venv/**",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

const fn default_cache_ttl_sec() -> u64 {
    3600
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".corawiki/cache")
}

const fn default_tail_window() -> usize {
    16
}

const fn default_compress_threshold_lines() -> usize {
    400
}

const fn default_compress_head_lines() -> usize {
    160
}

const fn default_compress_tail_lines() -> usize {
    80
}

const fn default_min_source_reads() -> usize {
    3
}

const fn default_remediation_rounds() -> u32 {
    2
}

const fn default_need_more_evidence_retries() -> u32 {
    2
}

const fn default_max_references() -> usize {
    40
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_total_tokens: default_max_total_tokens(),
            include_globs: Vec::new(),
            exclude_globs: default_exclude_globs(),
            cache_ttl_sec: default_cache_ttl_sec(),
            cache_dir: default_cache_dir(),
            tail_window: default_tail_window(),
            compress_threshold_lines: default_compress_threshold_lines(),
            compress_head_lines: default_compress_head_lines(),
            compress_tail_lines: default_compress_tail_lines(),
            min_source_reads: default_min_source_reads(),
            remediation_rounds: default_remediation_rounds(),
            need_more_evidence_retries: default_need_more_evidence_retries(),
            max_references: default_max_references(),
            quality: QualityPolicy::default(),
        }
    }
}

/// Thresholds a ready payload must meet to pass the quality gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QualityPolicy {
    #[serde(default = "default_min_findings")]
    pub min_findings: usize,
    #[serde(default = "default_min_one")]
    pub min_flows: usize,
    #[serde(default = "default_min_one")]
    pub min_modules: usize,
    #[serde(default = "default_min_one")]
    pub min_risks: usize,
    #[serde(default = "default_min_one")]
    pub min_unknowns: usize,
    #[serde(default = "default_min_references")]
    pub min_references: usize,
    #[serde(default = "default_min_p0_share")]
    pub min_p0_share: f64,
    #[serde(default = "default_max_p2_share")]
    pub max_p2_share: f64,
    #[serde(default = "default_min_diagrams")]
    pub min_diagrams: usize,
}

const fn default_min_findings() -> usize {
    3
}

const fn default_min_one() -> usize {
    1
}

const fn default_min_references() -> usize {
    5
}

const fn default_min_p0_share() -> f64 {
    0.6
}

const fn default_max_p2_share() -> f64 {
    0.2
}

const fn default_min_diagrams() -> usize {
    2
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            min_findings: default_min_findings(),
            min_flows: default_min_one(),
            min_modules: default_min_one(),
            min_risks: default_min_one(),
            min_unknowns: default_min_one(),
            min_references: default_min_references(),
            min_p0_share: default_min_p0_share(),
            max_p2_share: default_max_p2_share(),
            min_diagrams: default_min_diagrams(),
        }
    }
}

/// External static-analysis runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisConfig {
    /// Offer `extract_import_graph` and `analyze_complexity` to the model
    #[serde(default)]
    pub enabled: bool,

    /// Interpreter used to launch the runner
    #[serde(default = "default_python")]
    pub python: String,

    /// Path to the runner script
    #[serde(default = "default_runner_path")]
    pub runner_path: PathBuf,

    /// Subprocess timeout in seconds
    #[serde(default = "default_analysis_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_runner_path() -> PathBuf {
    PathBuf::from("pytools/runner.py")
}

const fn default_analysis_timeout_secs() -> u64 {
    60
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            python: default_python(),
            runner_path: default_runner_path(),
            timeout_secs: default_analysis_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
