//! Database statistics overview.
//!
//! Summarizes what the monitor has collected: lead counts, analysis coverage,
//! average score, the workflow status breakdown, and a per-keyword table.
//! Used by `leadwatch stats`.

use anyhow::Result;
use sqlx::Row;

use leadwatch_core::store::LeadStore;

use crate::config::Config;
use crate::sqlite_store::SqliteLeadStore;

struct KeywordStats {
    keyword: String,
    total: i64,
    analyzed: i64,
    last_ingest_ts: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteLeadStore::open(config).await?;
    let stats = store.stats().await?;
    let breakdown = store.status_breakdown().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Leadwatch — Database Stats");
    println!("==========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Leads:       {}", stats.total);
    println!(
        "  Analyzed:    {} / {} ({}%)",
        stats.analyzed,
        stats.total,
        if stats.total > 0 {
            (stats.analyzed * 100) / stats.total
        } else {
            0
        }
    );
    println!("  Pending:     {}", stats.pending);
    match stats.average_score {
        Some(avg) => println!("  Avg score:   {:.1}", avg),
        None => println!("  Avg score:   -"),
    }

    println!();
    println!("  By status:");
    println!("    new             {}", breakdown.new);
    println!("    contacted       {}", breakdown.contacted);
    println!("    interested      {}", breakdown.interested);
    println!("    not_interested  {}", breakdown.not_interested);
    println!("    converted       {}", breakdown.converted);

    let rows = sqlx::query(
        r#"
        SELECT
            COALESCE(source_keyword, '(none)') AS keyword,
            COUNT(*) AS total,
            SUM(analyzed) AS analyzed,
            MAX(ingested_at) AS last_ingest
        FROM leads
        GROUP BY source_keyword
        ORDER BY total DESC
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    let keyword_stats: Vec<KeywordStats> = rows
        .iter()
        .map(|row| KeywordStats {
            keyword: row.get("keyword"),
            total: row.get("total"),
            analyzed: row.get::<Option<i64>, _>("analyzed").unwrap_or(0),
            last_ingest_ts: row.get("last_ingest"),
        })
        .collect();

    if !keyword_stats.is_empty() {
        println!();
        println!("  By keyword:");
        println!(
            "  {:<28} {:>6} {:>9}   {}",
            "KEYWORD", "LEADS", "ANALYZED", "LAST INGEST"
        );
        println!("  {}", "-".repeat(64));

        for k in &keyword_stats {
            let ingest_display = match k.last_ingest_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<28} {:>6} {:>9}   {}",
                truncate(&k.keyword, 28),
                k.total,
                k.analyzed,
                ingest_display
            );
        }
    }

    println!();

    store.close().await;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
