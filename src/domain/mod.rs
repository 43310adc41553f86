//! Domain layer for the CoraWiki research orchestrator
//!
//! This module contains the run models, typed tool inputs, the structured
//! report schema, and the port traits adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
