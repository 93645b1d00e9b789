//! Sapling CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "sapling")]
#[command(about = "Incremental, importance-scored code dependency graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the repository and persist the graph
    Index {
        /// Ignore cached fragments and parse every file
        #[arg(short, long)]
        force: bool,
    },
    /// Show the most important nodes of the last index
    Top {
        /// Number of nodes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show file cache statistics
    CacheStats,
    /// Clear the cache
    Clear {
        /// Only drop cache entries older than this many days
        #[arg(long)]
        older_than_days: Option<u64>,
    },
    /// Show version
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("sapling={log_level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Repository root: {}", cli.root.display());

    match cli.command {
        Commands::Index { force } => commands::index(&cli.root, force),
        Commands::Top { limit } => commands::top(&cli.root, limit),
        Commands::CacheStats => commands::cache_stats(&cli.root),
        Commands::Clear { older_than_days } => commands::clear(&cli.root, older_than_days),
        Commands::Version => {
            println!("Sapling v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
