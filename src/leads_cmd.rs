//! `leadwatch leads` and `leadwatch purge`.

use anyhow::{bail, Result};

use leadwatch_core::models::{DeleteFilter, LeadFilter, LeadStatus};
use leadwatch_core::store::LeadStore;

use crate::config::Config;
use crate::sqlite_store::SqliteLeadStore;
use crate::stats::format_ts_relative;

/// List analyzed leads, best first.
pub async fn run_leads(
    config: &Config,
    status: Option<String>,
    min_score: Option<u8>,
    limit: usize,
) -> Result<()> {
    let status = status.map(|s| s.parse::<LeadStatus>()).transpose()?;
    let store = SqliteLeadStore::open(config).await?;

    let leads = store
        .query(&LeadFilter {
            status,
            min_score,
            analyzed_only: true,
            limit: Some(limit),
            ..Default::default()
        })
        .await?;

    if leads.is_empty() {
        println!("No leads found.");
        store.close().await;
        return Ok(());
    }

    println!(
        "{:<5} {:<14} {:<10} {:<20} {:<12} TITLE",
        "SCORE", "STATUS", "ID", "PARTITION", "POSTED"
    );
    for lead in &leads {
        println!(
            "{:<5} {:<14} {:<10} {:<20} {:<12} {}",
            lead.score().unwrap_or(0),
            lead.status.as_str(),
            lead.item.id,
            lead.item.partition,
            format_ts_relative(lead.item.created_utc),
            lead.item.title
        );
        if let Some(ref analysis) = lead.analysis {
            if !analysis.recommendation.is_empty() {
                println!("      → {}", analysis.recommendation);
            }
        }
    }
    println!();
    println!("{} lead(s)", leads.len());

    store.close().await;
    Ok(())
}

/// Bulk-delete leads matching all given filters.
pub async fn run_purge(
    config: &Config,
    min_score: Option<u8>,
    max_age_days: Option<u32>,
    status: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let filter = DeleteFilter {
        min_score,
        max_age_days,
        status: status.map(|s| s.parse::<LeadStatus>()).transpose()?,
    };
    if filter.is_empty() {
        bail!("refusing to purge without a filter: pass --min-score, --max-age-days, or --status");
    }

    let store = SqliteLeadStore::open(config).await?;
    if dry_run {
        let count = store.preview_bulk_delete(&filter).await?;
        println!("Would delete {} lead(s).", count);
    } else {
        let deleted = store.bulk_delete(&filter).await?;
        println!("Deleted {} lead(s).", deleted);
    }

    store.close().await;
    Ok(())
}
