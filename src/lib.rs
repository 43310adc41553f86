//! CoraWiki - agentic code research
//!
//! CoraWiki drives a tool-calling language model through an unfamiliar
//! workspace and produces an architecture report in which every finding,
//! flow and risk cites the files it was drawn from.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): run models, typed tool inputs, ports
//! - **Service Layer** (`services`): the research orchestrator and its policies
//! - **Adapters** (`adapters`): model clients, filesystem tools, external analysis
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, cache, run log
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use corawiki::adapters::workspace::FsWorkspace;
//! use corawiki::services::{ResearchOrchestrator, ResearchRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let tools = Arc::new(FsWorkspace::new(&[])?);
//!     let orchestrator = ResearchOrchestrator::new(Default::default(), tools);
//!     let result = orchestrator.run(ResearchRequest::new("How does it start?", ".")).await?;
//!     println!("{}", result.final_conclusion);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Acceptance, Config, LlmConfig, LoggingConfig, QualityPolicy, ResearchConfig, ResearchResult,
    ResearchStep, Stage,
};
pub use domain::ports::{
    ExternalAnalyzer, FailureDecision, FailureResolver, ModelAdapter, RunLog, TreeCache,
    WorkspaceTools,
};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{ProgressEvent, ResearchOrchestrator, ResearchRequest};
