//! Workspace adapters.

pub mod fs;

pub use fs::{extract_skeleton, FsWorkspace};
