//! # Leadwatch CLI
//!
//! ## Usage
//!
//! ```bash
//! leadwatch --config ./config/leadwatch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `leadwatch init` | Create the SQLite database and schema |
//! | `leadwatch serve` | Start the HTTP API and the monitoring schedule |
//! | `leadwatch run` | Run one monitoring cycle and print its report |
//! | `leadwatch stats` | Show lead counts and breakdowns |
//! | `leadwatch leads` | List analyzed leads |
//! | `leadwatch search <keywords>...` | Ad-hoc search, nothing stored |
//! | `leadwatch purge` | Bulk-delete leads by filter |
//!
//! If the config file does not exist, built-in defaults are used and a
//! warning is logged. Set `RUST_LOG` to change log verbosity.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use leadwatch::config::{self, ConfigOrigin};
use leadwatch::source::{SortMode, TimeWindow};
use leadwatch::{leads_cmd, migrate, runtime, search_cmd, stats};

/// Leadwatch: scheduled search monitoring with LLM lead scoring.
#[derive(Parser)]
#[command(
    name = "leadwatch",
    about = "Scheduled search monitoring with LLM lead scoring",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/leadwatch.toml`. A missing file falls back to
    /// built-in defaults; an unreadable or invalid file is an error.
    #[arg(long, global = true, default_value = "./config/leadwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Start the HTTP API and the monitoring schedule.
    ///
    /// Runs until Ctrl-C, which stops the schedule and closes the database.
    Serve,

    /// Run a single monitoring cycle in the foreground.
    Run,

    /// Show lead counts, analysis coverage, and breakdowns.
    Stats,

    /// List analyzed leads, best first.
    Leads {
        /// Only leads with this workflow status.
        #[arg(long)]
        status: Option<String>,

        /// Only leads scoring at least this much.
        #[arg(long)]
        min_score: Option<u8>,

        #[arg(long, default_value_t = 25)]
        limit: usize,
    },

    /// Search the source for one or more keywords without storing anything.
    Search {
        #[arg(required = true)]
        keywords: Vec<String>,

        #[arg(long, default_value = "all")]
        partition: String,

        /// relevance, hot, top, new, or comments.
        #[arg(long, default_value = "relevance")]
        sort: SortMode,

        /// hour, day, week, month, year, or all.
        #[arg(long, default_value = "all")]
        time: TimeWindow,

        #[arg(long, default_value_t = 25)]
        limit: u32,
    },

    /// Bulk-delete leads matching every given filter.
    ///
    /// At least one filter is required.
    Purge {
        /// Analyzed leads scoring at least this much.
        #[arg(long)]
        min_score: Option<u8>,

        /// Leads whose post is older than this many days.
        #[arg(long)]
        max_age_days: Option<u32>,

        #[arg(long)]
        status: Option<String>,

        /// Only report how many leads would be deleted.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("leadwatch=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (cfg, origin) = config::load_or_default(&cli.config)?;
    if let ConfigOrigin::Fallback(ref path) = origin {
        tracing::info!(path = %path.display(), "using built-in configuration");
    }

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            runtime::run_serve(&cfg).await?;
        }
        Commands::Run => {
            runtime::run_once(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Leads {
            status,
            min_score,
            limit,
        } => {
            leads_cmd::run_leads(&cfg, status, min_score, limit).await?;
        }
        Commands::Search {
            keywords,
            partition,
            sort,
            time,
            limit,
        } => {
            search_cmd::run_search(&cfg, &keywords, &partition, sort, time, limit).await?;
        }
        Commands::Purge {
            min_score,
            max_age_days,
            status,
            dry_run,
        } => {
            leads_cmd::run_purge(&cfg, min_score, max_age_days, status, dry_run).await?;
        }
    }

    Ok(())
}
