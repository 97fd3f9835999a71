//! stepwire CLI, the demo entry point.
//!
//! Commands:
//! - `run`    : one-shot or interactive run against the configured model
//! - `config` : print a default config file
//! - `check`  : load and validate the config

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "stepwire",
    about = "stepwire: a streaming, tool-calling agent runtime",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent on a message, or interactively when none is given
    Run {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Config file to use instead of ~/.stepwire/config.toml
        #[arg(long)]
        config: Option<PathBuf>,

        /// Agent name
        #[arg(long, default_value = "stepwire")]
        name: String,

        /// System prompt for the agent
        #[arg(long, default_value = commands::run::DEFAULT_SYSTEM_PROMPT)]
        system: String,
    },

    /// Print a default config file
    Config,

    /// Load and validate the configuration
    Check {
        /// Config file to check instead of ~/.stepwire/config.toml
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            message,
            config,
            name,
            system,
        } => {
            let options = commands::run::RunOptions {
                message,
                config,
                name,
                system_prompt: system,
            };
            commands::run::run(options).await?
        }
        Commands::Config => commands::config_cmd::show(),
        Commands::Check { config } => commands::check::run(config.as_deref())?,
    }

    Ok(())
}
