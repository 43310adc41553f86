//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console formatting
//! - Daily rolling JSON log files
//! - Secret scrubbing, shared with the research run log

pub mod logger;
pub mod secret_scrubbing;

pub use logger::LoggerImpl;
pub use secret_scrubbing::{scrub_secrets, SecretScrubber, REDACTED};
