//! Command-line interface.

pub mod commands;
pub mod output;
pub mod prompt;
pub mod types;

use std::path::Path;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

pub use types::{Cli, Commands};

/// Load configuration for a command: the explicit file when given, otherwise
/// the project files under `root`.
pub fn load_config(explicit: Option<&Path>, root: &Path) -> anyhow::Result<Config> {
    match explicit {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load_from_dir(root),
    }
}

/// Print a command failure and exit with a non-zero status.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": chain,
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", console::style("Error:").red().bold());
    }
    std::process::exit(1);
}
