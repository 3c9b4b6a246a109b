mod commands;

use clap::{Parser, Subcommand};
use commands::*;
use std::path::PathBuf;
use strata_core::{AppConfig, AppConfigTrait};

#[derive(Parser)]
#[command(name = "strata")]
#[command(version, about = "Linearly indexed database migrations with background workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show migration statistics
    Stats,

    /// Show the output of the current or last migration worker
    Progress,

    /// Run all pending migrate phases
    Migrate {
        /// Report per-unit progress
        #[arg(long, short)]
        verbose: bool,
    },

    /// Run all pending migrate and finalize phases
    Finalize {
        /// Report per-unit progress
        #[arg(long, short)]
        verbose: bool,
    },

    /// Revert migrations left in a running state by a failed worker
    Reset,

    /// Serve the migration command endpoint over HTTP
    Serve {
        /// Host to bind the server to (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind the server to (overrides PORT)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Create a new SQL migration file
    New {
        /// Migration name
        name: String,

        /// Migrations directory (overrides MIGRATIONS_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    init_cli_logging(&config)?;
    if !matches!(cli.command, Commands::Serve { .. }) {
        log_config_sources(&config.config_sources());
    }

    match cli.command {
        Commands::Stats => {
            migrate::run_query(&config, "stats", Startup::ReadOnly).await?;
        }
        Commands::Progress => {
            migrate::run_query(&config, "progress", Startup::ReadOnly).await?;
        }
        Commands::Reset => {
            migrate::run_query(&config, "reset", Startup::Initialize).await?;
        }
        Commands::Migrate { verbose } => {
            migrate::run_worker(&config, "migrate", verbose).await?;
        }
        Commands::Finalize { verbose } => {
            migrate::run_worker(&config, "finalize", verbose).await?;
        }
        Commands::Serve { host, port } => {
            serve::run(config, host, port).await?;
        }
        Commands::New { name, dir } => {
            new::create(&config, &name, dir).await?;
        }
    }

    Ok(())
}
