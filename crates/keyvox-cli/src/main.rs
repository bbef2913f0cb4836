//! Keyvox CLI - encrypted vendor credentials and resilient speech synthesis
//!
//! This is the main entry point for the `keyvox` binary, providing commands
//! for managing the credential vault, signing requests and calling speech
//! vendors.

mod cli;
mod config;
mod error;
mod handlers;
mod logging;
mod output;

use cli::{Cli, Commands};
use colored::control;
use config::Config;
use error::Result;
use logging::{timing::Timer, LoggingConfig};
use output::OutputWriter;
use std::process;
use tracing::instrument;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    control::set_override(cli.use_color());

    // Logging settings may come from the config file, so load it first
    let config = Config::load_with_file(cli.config.as_deref());

    let log_guard = match init_logging(&cli, config.as_ref().ok()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{}", error::format_error(&e, control::SHOULD_COLORIZE.should_colorize()));

            if e.should_show_help() {
                eprintln!("\nFor more information, try '--help'");
            }

            // Flush buffered file logs before exiting
            drop(log_guard);
            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
#[instrument(skip_all, fields(command = cli.command.name()))]
async fn run(cli: Cli, config: Config) -> Result<()> {
    let _timer = Timer::new("cli_execution");

    let config = config.with_vault_path(cli.vault.clone());
    config.validate()?;

    let mut output = OutputWriter::new(cli.output, cli.use_color(), cli.quiet, cli.verbosity_level());

    tracing::info!(
        verbosity = cli.verbosity_level(),
        vault = %config.vault.path.display(),
        "Executing command"
    );

    match cli.command {
        Commands::Vault(args) => handlers::handle_vault(args, &config, &mut output).await,
        Commands::Secret(args) => handlers::handle_secret(args, &config, &mut output).await,
        Commands::Sign(args) => handlers::handle_sign(args, &mut output),
        Commands::Synthesize(args) => {
            handlers::handle_synthesize(args, &config, &mut output).await
        }
        Commands::Limits(args) => handlers::handle_limits(args, &config, &mut output),
        Commands::Completions(args) => handlers::handle_completions(args),
    }
}

/// Initialize the logging system
fn init_logging(cli: &Cli, config: Option<&Config>) -> Result<Option<WorkerGuard>> {
    let mut logging_config = LoggingConfig::from_verbosity(cli.verbosity_level());

    if let Some(config) = config {
        logging_config.merge_file_settings(&config.logging, cli.verbosity_level());
    }

    logging_config.merge_with_env();

    // Quiet mode only logs errors
    if cli.quiet {
        logging_config.level = "error".to_string();
        logging_config.console = false;
    }

    logging::init_logging(logging_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["keyvox", "limits"]);
        assert_eq!(cli.verbosity_level(), 0);

        let cli = Cli::parse_from(["keyvox", "-vv", "limits", "openai"]);
        assert_eq!(cli.verbosity_level(), 2);

        let cli = Cli::parse_from(["keyvox", "--quiet", "secret", "list"]);
        assert_eq!(cli.verbosity_level(), 0);
    }
}
