use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "termdock")]
#[command(about = "Terminal dock for AI coding agents")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.termdock/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single session headlessly and stream its output to stdout
    Run {
        /// Command to run in the session (defaults to the configured shell)
        #[arg(trailing_var_arg = true)]
        command: Vec<String>,

        /// Working directory for the session
        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Print structured events instead of raw output
        #[arg(long)]
        events: bool,
    },

    /// Initialize a new ~/.termdock/config.toml configuration file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Check which agent CLIs are installed and show the active config
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Some(Commands::Run {
            command,
            cwd,
            events,
        }) => {
            cli::run::run_command(cli.config.as_deref(), command, cwd, events).await?;
        }
        Some(Commands::Init { force }) => {
            cli::init::init_command(cli.config.as_deref(), force)?;
        }
        Some(Commands::Doctor) | None => {
            cli::doctor::doctor_command(cli.config.as_deref())?;
        }
    }

    Ok(())
}
