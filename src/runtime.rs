//! Process wiring: builds the store, clients, fan-out, and scheduler from a
//! [`Config`], and drives the `serve` and `run` commands.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;

use leadwatch_core::store::LeadStore;

use crate::config::Config;
use crate::fanout::LeadFanout;
use crate::scheduler::{CycleOutcome, Monitor};
use crate::scoring::{build_scorer, Scorer};
use crate::server::{run_server, AppState};
use crate::source::{RedditClient, SourceClient};
use crate::sqlite_store::SqliteLeadStore;

/// Every long-lived component of a running instance.
pub struct App {
    pub store: Arc<SqliteLeadStore>,
    pub monitor: Arc<Monitor>,
    pub fanout: LeadFanout,
    pub source: Arc<dyn SourceClient>,
    pub scorer: Arc<dyn Scorer>,
}

impl App {
    pub async fn build(config: &Config) -> Result<Self> {
        let store = Arc::new(
            SqliteLeadStore::open(config)
                .await
                .with_context(|| format!("Failed to open database {}", config.db.path.display()))?,
        );
        let source: Arc<dyn SourceClient> = Arc::new(RedditClient::new(&config.source)?);
        let scorer = build_scorer(&config.scoring)?;
        let fanout = LeadFanout::new();

        let monitor = Arc::new(Monitor::new(
            source.clone(),
            scorer.clone(),
            store.clone() as Arc<dyn LeadStore>,
            Arc::new(fanout.clone()),
            &config.monitoring,
        ));

        Ok(Self {
            store,
            monitor,
            fanout,
            source,
            scorer,
        })
    }

    pub fn state(&self) -> AppState {
        AppState {
            monitor: self.monitor.clone(),
            store: self.store.clone(),
            source: self.source.clone(),
            scorer: self.scorer.clone(),
            fanout: self.fanout.clone(),
        }
    }
}

/// `leadwatch serve`: API server plus the cron schedule until Ctrl-C.
pub async fn run_serve(config: &Config) -> Result<()> {
    let app = App::build(config).await?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let schedule = app.monitor.spawn_schedule(shutdown_rx);

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
        }
        tracing::info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    };

    run_server(listener, app.state(), shutdown).await?;

    if let Err(e) = schedule.await {
        tracing::warn!(error = %e, "schedule task ended abnormally");
    }
    app.store.close().await;
    tracing::info!("stopped");
    Ok(())
}

/// `leadwatch run`: one cycle in the foreground, then print its report.
pub async fn run_once(config: &Config) -> Result<()> {
    let app = App::build(config).await?;
    let outcome = app.monitor.run_cycle().await;
    app.store.close().await;

    match outcome {
        CycleOutcome::Completed(report) => {
            println!("Cycle completed.");
            println!("  Keywords searched: {}", report.keywords_searched);
            println!("  Keywords failed:   {}", report.keywords_failed);
            println!("  Items fetched:     {}", report.items_fetched);
            println!("  New items:         {}", report.new_items);
            println!("  Analyzed:          {}", report.items_analyzed);
            println!("  Analysis failed:   {}", report.items_failed);
            println!("  Qualifying leads:  {}", report.qualifying_leads);
            if !app.scorer.is_enabled() {
                println!();
                println!("Scoring is disabled; new items were stored without analysis.");
            }
            Ok(())
        }
        CycleOutcome::Skipped => {
            println!("A cycle is already running; nothing to do.");
            Ok(())
        }
    }
}
