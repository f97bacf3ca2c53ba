//! Forgeloop CLI, the main entry point.
//!
//! Commands:
//! - `chat`      : interactive session (default)
//! - `run`       : plan and execute a single request
//! - `init`      : write a default config file
//! - `status`    : show configuration and knowledge totals
//! - `knowledge` : list stored patterns

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use forgeloop_config::AppConfig;

mod commands;
mod runtime;
mod terminal;

#[derive(Parser)]
#[command(
    name = "forgeloop",
    about = "Forgeloop: plan, execute and learn from coding tasks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.forgeloop/config.toml)
    #[arg(short, long, global = true, env = "FORGELOOP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Chat,

    /// Plan and execute one request, then exit
    Run {
        /// The request to plan
        #[arg(short, long)]
        message: String,

        /// Execute the plan without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show configuration and knowledge totals
    Status,

    /// List stored patterns, best first
    Knowledge {
        /// Only patterns of this type (api_endpoint, data_model, test, ...)
        #[arg(short = 't', long = "type")]
        pattern_type: Option<String>,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)
            .map(|c| c.with_env_overrides(|k| std::env::var(k).ok())),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    // `init` must work even when the existing file does not parse
    if let Some(Commands::Init { force }) = cli.command {
        init_tracing(cli.verbose, "warn");
        return commands::init::run(&config_path, force).await;
    }

    let config = load_config(cli.config.as_deref())?;
    init_tracing(cli.verbose, &config.log_level);

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat::run(&config, cli.verbose).await?,
        Commands::Run { message, yes } => {
            commands::run::run(&config, &message, yes, cli.verbose).await?
        }
        Commands::Init { .. } => {}
        Commands::Status => commands::status::run(&config, &config_path).await?,
        Commands::Knowledge { pattern_type, limit } => {
            commands::knowledge::run(&config, pattern_type.as_deref(), limit).await?
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `--verbose` means debug, else the configured level.
fn init_tracing(verbose: bool, level: &str) {
    let filter = if verbose { "debug" } else { level };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
