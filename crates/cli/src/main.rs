//! toolrelay CLI, the process entry point.
//!
//! Commands:
//! - `ask`     Send one message; the model may call a tool before answering
//! - `tools`   Print the tool schemas offered to the model
//! - `config`  Show, locate or validate the configuration

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "toolrelay",
    about = "toolrelay: one question, at most one tool call, one answer",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging and print a usage summary
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read configuration from this file instead of ~/.toolrelay/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the model a question
    Ask(commands::ask::AskArgs),

    /// Print the schemas of the built-in tools
    Tools,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Print the config file location
    Path,
    /// Load and validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the answer.
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Ask(args) => commands::ask::run(args, config_path, cli.verbose).await?,
        Commands::Tools => commands::tools::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
        },
    }

    Ok(())
}
