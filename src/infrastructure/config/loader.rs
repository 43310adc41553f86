use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Directory holding project configuration, relative to the project root.
pub const CONFIG_DIR: &str = ".corawiki";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid max_steps: {0}. Must be at least 1")]
    InvalidMaxSteps(u32),

    #[error("Invalid max_total_tokens: {0}. Must be positive")]
    InvalidTokenBudget(u64),

    #[error("llm.{0} cannot be empty")]
    EmptyLlmField(&'static str),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid share research.quality.{0}: {1}. Must be between 0 and 1")]
    InvalidShare(&'static str, f64),

    #[error(
        "Invalid compression: head ({0}) + tail ({1}) lines must be below compress_threshold_lines ({2})"
    )]
    InvalidCompression(usize, usize, usize),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration relative to the current directory.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .corawiki/config.yaml (project config)
    /// 3. .corawiki/local.yaml (local overrides, optional)
    /// 4. Environment variables (CORAWIKI_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Same as [`Self::load`] with the project files looked up under `root`.
    pub fn load_from_dir(root: &Path) -> Result<Config> {
        let dir = root.join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("CORAWIKI_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment overrides still apply.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("CORAWIKI_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let llm = &config.llm;
        if llm.base_url.trim().is_empty() {
            return Err(ConfigError::EmptyLlmField("base_url"));
        }
        if llm.model.trim().is_empty() {
            return Err(ConfigError::EmptyLlmField("model"));
        }
        if llm.initial_backoff_ms >= llm.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                llm.initial_backoff_ms,
                llm.max_backoff_ms,
            ));
        }
        if llm.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "llm.timeout_secs must be positive".to_string(),
            ));
        }

        let research = &config.research;
        if research.max_steps == 0 {
            return Err(ConfigError::InvalidMaxSteps(research.max_steps));
        }
        if research.max_total_tokens == 0 {
            return Err(ConfigError::InvalidTokenBudget(research.max_total_tokens));
        }
        if research.compress_head_lines + research.compress_tail_lines
            >= research.compress_threshold_lines
        {
            return Err(ConfigError::InvalidCompression(
                research.compress_head_lines,
                research.compress_tail_lines,
                research.compress_threshold_lines,
            ));
        }
        if research.max_references == 0 {
            return Err(ConfigError::ValidationFailed(
                "research.max_references must be at least 1".to_string(),
            ));
        }

        let quality = &research.quality;
        for (name, share) in [
            ("min_p0_share", quality.min_p0_share),
            ("max_p2_share", quality.max_p2_share),
        ] {
            if !(0.0..=1.0).contains(&share) {
                return Err(ConfigError::InvalidShare(name, share));
            }
        }

        if config.analysis.enabled && config.analysis.python.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "analysis.python cannot be empty when analysis is enabled".to_string(),
            ));
        }

        Ok(())
    }
}
