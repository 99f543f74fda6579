//! Magpie - multi-channel conversational agent runtime.
//!
//! Main entry point for the Magpie CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{chat, config, cron, run, serve};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Magpie - multi-channel conversational agent runtime
#[derive(Parser)]
#[command(name = "magpie")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the config file (default: ~/.config/magpie/magpie.toml)
    #[arg(long, global = true, env = "MAGPIE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the configured channels, worker, and scheduler
    Serve(serve::ServeArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// Send a single message and print the response
    Run(run::RunArgs),

    /// Manage cron-scheduled messages
    Cron(cron::CronArgs),

    /// Read or write configuration values
    Config(config::ConfigArgs),

    /// Print the version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console layer plus rotating JSON file layer
    let filter = if cli.verbose {
        "magpie=debug,magpie_agent=debug,magpie_provider=debug,magpie_server=debug,magpie_bus=debug,info"
    } else {
        "magpie=info,magpie_agent=info,magpie_provider=info,magpie_server=info,warn"
    };

    let log_dir = magpie_config::data_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "magpie.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "magpie=debug,magpie_agent=debug,magpie_provider=debug,magpie_server=debug,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        config_path: cli.config,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Cron(args) => cron::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
        Commands::Version => {
            println!("magpie {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
