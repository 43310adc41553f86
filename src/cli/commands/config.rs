//! Implementation of the `corawiki config` command.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::logging::REDACTED;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,

    /// Project root holding .corawiki/ (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    pub workspace: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Check that the configuration loads and validates
    Validate,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    pub config: Config,
    pub api_key_present: bool,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        let yaml = serde_yaml::to_string(&self.config).unwrap_or_default();
        let key_line = if self.api_key_present {
            "# API key: present"
        } else {
            "# API key: missing (research runs will use the local walk)"
        };
        format!("{key_line}\n{yaml}")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub success: bool,
    pub message: String,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Copy of `config` that is safe to print.
pub fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if shown.llm.api_key.is_some() {
        shown.llm.api_key = Some(REDACTED.to_string());
    }
    shown
}

pub fn execute(args: &ConfigArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => {
            let result = ConfigShowOutput {
                config: redacted(config),
                api_key_present: config.llm.resolve_api_key().is_some(),
            };
            output(&result, json_mode);
        }
        ConfigCommands::Validate => {
            crate::infrastructure::config::ConfigLoader::validate(config)
                .context("Configuration is invalid")?;
            let result = ConfigValidateOutput {
                success: true,
                message: format!(
                    "Configuration is valid (model {} at {})",
                    config.llm.model, config.llm.base_url
                ),
            };
            output(&result, json_mode);
        }
    }
    Ok(())
}
