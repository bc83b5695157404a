mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resilio", version, about = "Self-healing selector cache for browser automation")]
struct Args {
    /// Config file (default: ./resilio.yaml, then ~/.resilio/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect or maintain the selector cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Resolve one action on a live page and print the outcome
    Probe {
        #[arg(long)]
        url: String,
        /// Action key, e.g. login.button
        #[arg(long)]
        action: String,
        /// Launch browser in visible mode (not headless)
        #[arg(long)]
        visible: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Entry counts by origin
    Stats,
    /// Print entries, ranked, optionally for one action
    Show { key: Option<String> },
    /// Drop learned and reasoning entries unused for N days
    Prune {
        #[arg(long)]
        max_age_days: Option<u64>,
    },
    /// Teach a selector for an action
    Add { key: String, selector: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries JSON output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = commands::load_config(args.config.as_deref()).await?;

    match args.command {
        Command::Cache { action } => match action {
            CacheAction::Stats => commands::cache_stats(&config).await,
            CacheAction::Show { key } => commands::cache_show(&config, key.as_deref()).await,
            CacheAction::Prune { max_age_days } => {
                commands::cache_prune(&config, max_age_days).await
            }
            CacheAction::Add { key, selector } => {
                commands::cache_add(&config, &key, &selector).await
            }
        },
        Command::Probe {
            url,
            action,
            visible,
        } => commands::probe(&config, &url, &action, visible).await,
    }
}
