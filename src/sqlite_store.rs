//! SQLite-backed [`LeadStore`] implementation.
//!
//! All rows live in the single `leads` table created by
//! [`migrate::apply_schema`](crate::migrate::apply_schema). Analysis columns
//! stay `NULL` until the item is scored; pain points are stored as a JSON
//! array string.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use leadwatch_core::models::{
    AnalysisResult, DeleteFilter, Item, Lead, LeadFilter, LeadStatus, Reach, StatusBreakdown,
    StoreStats, Urgency,
};
use leadwatch_core::store::{now_ts, LeadStore};
use leadwatch_core::{LeadError, Result};

use crate::config::Config;
use crate::{db, migrate};

const LEAD_COLUMNS: &str = "id, title, body, author, partition_name, engagement, comment_count, \
    created_utc, url, permalink, source_keyword, ingested_at, analyzed, ai_score, ai_reasoning, \
    ai_recommendation, ai_reach, ai_pain_points, ai_urgency, analyzed_at, lead_status, lead_notes, \
    contacted_at, updated_at";

const INSERT_OR_IGNORE: &str = r#"
    INSERT OR IGNORE INTO leads (
        id, title, body, author, partition_name, engagement, comment_count,
        created_utc, url, permalink, source_keyword, ingested_at, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// SQLite implementation of the [`LeadStore`] trait.
pub struct SqliteLeadStore {
    pool: SqlitePool,
}

impl SqliteLeadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn storage_err(e: sqlx::Error) -> LeadError {
    LeadError::storage(e)
}

fn lead_from_row(row: &SqliteRow) -> Lead {
    let analyzed: i64 = row.get("analyzed");
    let analysis = if analyzed != 0 {
        let score: Option<i64> = row.get("ai_score");
        let pain_points: Option<String> = row.get("ai_pain_points");
        let reach: Option<String> = row.get("ai_reach");
        let urgency: Option<String> = row.get("ai_urgency");
        Some(AnalysisResult {
            score: score.unwrap_or(0).clamp(0, 100) as u8,
            reasoning: row.get::<Option<String>, _>("ai_reasoning").unwrap_or_default(),
            recommendation: row
                .get::<Option<String>, _>("ai_recommendation")
                .unwrap_or_default(),
            reach: reach
                .as_deref()
                .map(Reach::parse_lenient)
                .unwrap_or(Reach::Unknown),
            pain_points: pain_points
                .and_then(|json| serde_json::from_str(&json).ok())
                .unwrap_or_default(),
            urgency: urgency
                .as_deref()
                .map(Urgency::parse_lenient)
                .unwrap_or(Urgency::Medium),
            analyzed_at: row.get::<Option<i64>, _>("analyzed_at").unwrap_or(0),
        })
    } else {
        None
    };

    let status: String = row.get("lead_status");

    Lead {
        item: Item {
            id: row.get("id"),
            title: row.get("title"),
            body: row.get("body"),
            author: row.get("author"),
            partition: row.get("partition_name"),
            engagement: row.get("engagement"),
            comment_count: row.get("comment_count"),
            created_utc: row.get("created_utc"),
            url: row.get("url"),
            permalink: row.get("permalink"),
        },
        source_keyword: row.get("source_keyword"),
        analysis,
        status: status.parse().unwrap_or_default(),
        notes: row.get("lead_notes"),
        contacted_at: row.get("contacted_at"),
        ingested_at: row.get("ingested_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Append the AND-combined delete filters to a `... WHERE 1=1` builder.
fn push_delete_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &DeleteFilter, now: i64) {
    if let Some(min) = filter.min_score {
        qb.push(" AND analyzed = 1 AND ai_score >= ")
            .push_bind(i64::from(min));
    }
    if let Some(cutoff) = filter.age_cutoff(now) {
        qb.push(" AND created_utc < ").push_bind(cutoff);
    }
    if let Some(status) = filter.status {
        qb.push(" AND lead_status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl LeadStore for SqliteLeadStore {
    async fn insert(&self, item: &Item, source_keyword: &str) -> Result<bool> {
        let now = now_ts();
        let result = sqlx::query(INSERT_OR_IGNORE)
            .bind(&item.id)
            .bind(&item.title)
            .bind(&item.body)
            .bind(&item.author)
            .bind(&item.partition)
            .bind(item.engagement)
            .bind(item.comment_count)
            .bind(item.created_utc)
            .bind(&item.url)
            .bind(&item.permalink)
            .bind(source_keyword)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_many(&self, items: &[Item], source_keyword: &str) -> Result<usize> {
        let now = now_ts();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        let mut inserted = 0usize;

        for item in items {
            let result = sqlx::query(INSERT_OR_IGNORE)
                .bind(&item.id)
                .bind(&item.title)
                .bind(&item.body)
                .bind(&item.author)
                .bind(&item.partition)
                .bind(item.engagement)
                .bind(item.comment_count)
                .bind(item.created_utc)
                .bind(&item.url)
                .bind(&item.permalink)
                .bind(source_keyword)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        tx.commit().await.map_err(storage_err)?;
        Ok(inserted)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM leads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(found.is_some())
    }

    async fn get(&self, id: &str) -> Result<Option<Lead>> {
        let row = sqlx::query(&format!("SELECT {} FROM leads WHERE id = ?", LEAD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.as_ref().map(lead_from_row))
    }

    async fn record_analysis(&self, id: &str, analysis: &AnalysisResult) -> Result<bool> {
        let pain_points =
            serde_json::to_string(&analysis.pain_points).map_err(LeadError::storage)?;

        let result = sqlx::query(
            r#"
            UPDATE leads
            SET analyzed = 1,
                ai_score = ?,
                ai_reasoning = ?,
                ai_recommendation = ?,
                ai_reach = ?,
                ai_pain_points = ?,
                ai_urgency = ?,
                analyzed_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(i64::from(analysis.score))
        .bind(&analysis.reasoning)
        .bind(&analysis.recommendation)
        .bind(analysis.reach.as_str())
        .bind(&pain_points)
        .bind(analysis.urgency.as_str())
        .bind(analysis.analyzed_at)
        .bind(now_ts())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            tracing::warn!(id, "analysis for unknown item not recorded");
            return Ok(false);
        }
        Ok(true)
    }

    async fn set_status(&self, id: &str, status: LeadStatus, notes: Option<&str>) -> Result<bool> {
        let now = now_ts();
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET lead_status = ?,
                lead_notes = COALESCE(?, lead_notes),
                contacted_at = CASE
                    WHEN ? = 'contacted' AND contacted_at IS NULL THEN ?
                    ELSE contacted_at
                END,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(status.as_str())
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM leads WHERE 1=1", LEAD_COLUMNS));

        if filter.analyzed_only {
            qb.push(" AND analyzed = 1");
        }
        if let Some(status) = filter.status {
            qb.push(" AND lead_status = ").push_bind(status.as_str());
        }
        if let Some(ref keyword) = filter.source_keyword {
            qb.push(" AND source_keyword = ").push_bind(keyword.clone());
        }
        if let Some(ref partition) = filter.partition {
            qb.push(" AND partition_name = ").push_bind(partition.clone());
        }
        if let Some(min) = filter.min_score {
            qb.push(" AND ai_score >= ").push_bind(i64::from(min));
        }

        if filter.analyzed_only {
            qb.push(" ORDER BY ai_score DESC, created_utc DESC, id ASC");
        } else {
            qb.push(" ORDER BY created_utc DESC, id ASC");
        }

        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.iter().map(lead_from_row).collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN analyzed = 1 THEN 1 ELSE 0 END), 0) AS analyzed,
                AVG(CASE WHEN analyzed = 1 THEN ai_score END) AS avg_score
            FROM leads
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_err)?;

        let total: i64 = row.get("total");
        let analyzed: i64 = row.get("analyzed");
        let average_score: Option<f64> = row.get("avg_score");

        Ok(StoreStats {
            total: total as u64,
            analyzed: analyzed as u64,
            pending: (total - analyzed) as u64,
            average_score,
        })
    }

    async fn status_breakdown(&self) -> Result<StatusBreakdown> {
        let rows = sqlx::query(
            "SELECT lead_status, COUNT(*) AS n FROM leads WHERE analyzed = 1 GROUP BY lead_status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut breakdown = StatusBreakdown::default();
        for row in &rows {
            let status: String = row.get("lead_status");
            let n: i64 = row.get("n");
            match status.parse::<LeadStatus>() {
                Ok(status) => breakdown.add(status, n as u64),
                Err(_) => tracing::warn!(status, "ignoring unknown lead status in breakdown"),
            }
        }
        Ok(breakdown)
    }

    async fn bulk_delete(&self, filter: &DeleteFilter) -> Result<u64> {
        filter.validate()?;
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("DELETE FROM leads WHERE 1=1");
        push_delete_filter(&mut qb, filter, now_ts());

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(result.rows_affected())
    }

    async fn preview_bulk_delete(&self, filter: &DeleteFilter) -> Result<u64> {
        filter.validate()?;
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM leads WHERE 1=1");
        push_delete_filter(&mut qb, filter, now_ts());

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(count as u64)
    }
}
