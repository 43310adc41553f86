//! Adapters implementing the domain ports.

pub mod analysis;
pub mod llm;
pub mod workspace;
