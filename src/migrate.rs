use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database file and schema. Idempotent.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the `leads` table and its indexes on an open pool.
///
/// One row per item id: item columns, nullable analysis columns, and the
/// workflow columns.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            partition_name TEXT NOT NULL DEFAULT '',
            engagement INTEGER NOT NULL DEFAULT 0,
            comment_count INTEGER NOT NULL DEFAULT 0,
            created_utc INTEGER NOT NULL DEFAULT 0,
            url TEXT NOT NULL DEFAULT '',
            permalink TEXT NOT NULL DEFAULT '',
            source_keyword TEXT,
            ingested_at INTEGER NOT NULL,
            analyzed INTEGER NOT NULL DEFAULT 0,
            ai_score INTEGER,
            ai_reasoning TEXT,
            ai_recommendation TEXT,
            ai_reach TEXT,
            ai_pain_points TEXT,
            ai_urgency TEXT,
            analyzed_at INTEGER,
            lead_status TEXT NOT NULL DEFAULT 'new',
            lead_notes TEXT,
            contacted_at INTEGER,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    for stmt in [
        "CREATE INDEX IF NOT EXISTS idx_leads_analyzed ON leads(analyzed)",
        "CREATE INDEX IF NOT EXISTS idx_leads_ai_score ON leads(ai_score)",
        "CREATE INDEX IF NOT EXISTS idx_leads_source_keyword ON leads(source_keyword)",
        "CREATE INDEX IF NOT EXISTS idx_leads_partition ON leads(partition_name)",
        "CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(lead_status)",
        "CREATE INDEX IF NOT EXISTS idx_leads_created_utc ON leads(created_utc DESC)",
    ] {
        sqlx::query(stmt).execute(pool).await?;
    }

    Ok(())
}
