//! CoraWiki CLI entry point.

use clap::Parser;

use corawiki::cli::{handle_error, load_config, Cli, Commands};
use corawiki::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), cli.command.project_root()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Logging disabled: {err:#}");
            None
        }
    };

    let result = match cli.command {
        Commands::Research(args) => {
            corawiki::cli::commands::research::execute(args, config, cli.json).await
        }
        Commands::Config(args) => corawiki::cli::commands::config::execute(&args, &config, cli.json),
        Commands::Cache(args) => corawiki::cli::commands::cache::execute(args, &config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
