//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::cli::commands::cache::CacheArgs;
use crate::cli::commands::config::ConfigArgs;
use crate::cli::commands::research::ResearchArgs;

#[derive(Parser, Debug)]
#[command(name = "corawiki")]
#[command(about = "CoraWiki - evidence-grounded code research", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Explicit configuration file (skips .corawiki/config.yaml lookup)
    #[arg(short, long, global = true, env = "CORAWIKI_CONFIG_FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Research a question about a workspace
    Research(ResearchArgs),

    /// Configuration commands
    Config(ConfigArgs),

    /// Code tree cache commands
    Cache(CacheArgs),
}

impl Commands {
    /// Directory whose `.corawiki/` holds the project configuration.
    pub fn project_root(&self) -> &Path {
        match self {
            Self::Research(args) => &args.workspace,
            Self::Cache(args) => args.workspace(),
            Self::Config(args) => &args.workspace,
        }
    }
}
