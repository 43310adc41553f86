//! Infrastructure layer module
//!
//! This module contains the infrastructure behind the domain ports:
//! - Configuration management (figment)
//! - Logging infrastructure and secret scrubbing
//! - Code tree cache store
//! - Research run log
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod cache_store;
pub mod config;
pub mod logging;
pub mod research_log;

pub use cache_store::TreeCacheStore;
pub use research_log::ResearchLogger;
