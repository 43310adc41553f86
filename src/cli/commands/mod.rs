//! CLI command implementations.

pub mod cache;
pub mod config;
pub mod research;
