//! In-memory [`LeadStore`] implementation for tests and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Every operation takes the
//! lock once, so `insert_many` is trivially all-or-nothing.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AnalysisResult, DeleteFilter, Item, Lead, LeadFilter, LeadStatus, StatusBreakdown, StoreStats,
};

use super::{now_ts, LeadStore};

/// In-memory lead store.
pub struct InMemoryLeadStore {
    rows: RwLock<HashMap<String, Lead>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Lead>> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Lead>> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

fn new_lead(item: &Item, source_keyword: &str, now: i64) -> Lead {
    Lead {
        item: item.clone(),
        source_keyword: Some(source_keyword.to_string()),
        analysis: None,
        status: LeadStatus::New,
        notes: None,
        contacted_at: None,
        ingested_at: now,
        updated_at: now,
    }
}

fn matches_query(lead: &Lead, filter: &LeadFilter) -> bool {
    if filter.analyzed_only && !lead.is_analyzed() {
        return false;
    }
    if let Some(status) = filter.status {
        if lead.status != status {
            return false;
        }
    }
    if let Some(ref keyword) = filter.source_keyword {
        if lead.source_keyword.as_deref() != Some(keyword.as_str()) {
            return false;
        }
    }
    if let Some(ref partition) = filter.partition {
        if &lead.item.partition != partition {
            return false;
        }
    }
    if let Some(min) = filter.min_score {
        match lead.score() {
            Some(score) if score >= min => {}
            _ => return false,
        }
    }
    true
}

fn matches_delete(lead: &Lead, filter: &DeleteFilter, now: i64) -> bool {
    if let Some(min) = filter.min_score {
        match lead.score() {
            Some(score) if score >= min => {}
            _ => return false,
        }
    }
    if let Some(cutoff) = filter.age_cutoff(now) {
        if lead.item.created_utc >= cutoff {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if lead.status != status {
            return false;
        }
    }
    true
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn insert(&self, item: &Item, source_keyword: &str) -> Result<bool> {
        let mut rows = self.write();
        if rows.contains_key(&item.id) {
            return Ok(false);
        }
        rows.insert(item.id.clone(), new_lead(item, source_keyword, now_ts()));
        Ok(true)
    }

    async fn insert_many(&self, items: &[Item], source_keyword: &str) -> Result<usize> {
        let now = now_ts();
        let mut rows = self.write();
        let mut inserted = 0;
        for item in items {
            if rows.contains_key(&item.id) {
                continue;
            }
            rows.insert(item.id.clone(), new_lead(item, source_keyword, now));
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read().contains_key(id))
    }

    async fn get(&self, id: &str) -> Result<Option<Lead>> {
        Ok(self.read().get(id).cloned())
    }

    async fn record_analysis(&self, id: &str, analysis: &AnalysisResult) -> Result<bool> {
        let mut rows = self.write();
        match rows.get_mut(id) {
            Some(lead) => {
                lead.analysis = Some(analysis.clone());
                lead.updated_at = now_ts();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_status(&self, id: &str, status: LeadStatus, notes: Option<&str>) -> Result<bool> {
        let now = now_ts();
        let mut rows = self.write();
        let Some(lead) = rows.get_mut(id) else {
            return Ok(false);
        };
        lead.status = status;
        if let Some(notes) = notes {
            lead.notes = Some(notes.to_string());
        }
        if status == LeadStatus::Contacted && lead.contacted_at.is_none() {
            lead.contacted_at = Some(now);
        }
        lead.updated_at = now;
        Ok(true)
    }

    async fn query(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let rows = self.read();
        let mut leads: Vec<Lead> = rows
            .values()
            .filter(|lead| matches_query(lead, filter))
            .cloned()
            .collect();
        drop(rows);

        if filter.analyzed_only {
            leads.sort_by(|a, b| {
                b.score()
                    .cmp(&a.score())
                    .then(b.item.created_utc.cmp(&a.item.created_utc))
                    .then(a.item.id.cmp(&b.item.id))
            });
        } else {
            leads.sort_by(|a, b| {
                b.item
                    .created_utc
                    .cmp(&a.item.created_utc)
                    .then(a.item.id.cmp(&b.item.id))
            });
        }
        if let Some(limit) = filter.limit {
            leads.truncate(limit);
        }
        Ok(leads)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let rows = self.read();
        let total = rows.len() as u64;
        let scores: Vec<u8> = rows.values().filter_map(Lead::score).collect();
        let analyzed = scores.len() as u64;
        let average_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64)
        };
        Ok(StoreStats {
            total,
            analyzed,
            pending: total - analyzed,
            average_score,
        })
    }

    async fn status_breakdown(&self) -> Result<StatusBreakdown> {
        let mut breakdown = StatusBreakdown::default();
        for lead in self.read().values().filter(|l| l.is_analyzed()) {
            breakdown.add(lead.status, 1);
        }
        Ok(breakdown)
    }

    async fn bulk_delete(&self, filter: &DeleteFilter) -> Result<u64> {
        filter.validate()?;
        let now = now_ts();
        let mut rows = self.write();
        let before = rows.len();
        rows.retain(|_, lead| !matches_delete(lead, filter, now));
        Ok((before - rows.len()) as u64)
    }

    async fn preview_bulk_delete(&self, filter: &DeleteFilter) -> Result<u64> {
        filter.validate()?;
        let now = now_ts();
        Ok(self
            .read()
            .values()
            .filter(|lead| matches_delete(lead, filter, now))
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LeadError;
    use crate::models::{Reach, ScoreResult, Urgency};

    fn item(id: &str, created_utc: i64) -> Item {
        Item {
            id: id.to_string(),
            title: format!("post {}", id),
            body: String::new(),
            author: "author".into(),
            partition: "jobs".into(),
            engagement: 1,
            comment_count: 0,
            created_utc,
            url: String::new(),
            permalink: String::new(),
        }
    }

    fn analysis(score: u8) -> AnalysisResult {
        ScoreResult {
            score,
            reasoning: "r".into(),
            recommendation: "rec".into(),
            reach: Reach::Maybe,
            pain_points: vec![],
            urgency: Urgency::Low,
        }
        .analyzed_at(now_ts())
    }

    #[tokio::test]
    async fn test_insert_is_insert_or_ignore() {
        let store = InMemoryLeadStore::new();
        assert!(store.insert(&item("a", 1), "kw").await.unwrap());
        store.record_analysis("a", &analysis(90)).await.unwrap();

        let mut changed = item("a", 1);
        changed.title = "rewritten".into();
        assert!(!store.insert(&changed, "other").await.unwrap());

        let lead = store.get("a").await.unwrap().unwrap();
        assert_eq!(lead.item.title, "post a");
        assert_eq!(lead.source_keyword.as_deref(), Some("kw"));
        assert_eq!(lead.score(), Some(90));
    }

    #[tokio::test]
    async fn test_insert_many_counts_only_new() {
        let store = InMemoryLeadStore::new();
        store.insert(&item("a", 1), "kw").await.unwrap();
        let n = store
            .insert_many(&[item("a", 1), item("b", 2), item("c", 3)], "kw")
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_record_analysis_missing_id() {
        let store = InMemoryLeadStore::new();
        assert!(!store.record_analysis("ghost", &analysis(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_analysis_touches_updated_at() {
        let store = InMemoryLeadStore::new();
        store.insert(&item("a", 1), "kw").await.unwrap();
        if let Some(lead) = store.write().get_mut("a") {
            lead.updated_at = 0;
        }

        let before = now_ts();
        store.record_analysis("a", &analysis(40)).await.unwrap();
        assert!(store.get("a").await.unwrap().unwrap().updated_at >= before);
    }

    #[tokio::test]
    async fn test_contacted_at_set_once() {
        let store = InMemoryLeadStore::new();
        store.insert(&item("a", 1), "kw").await.unwrap();
        store
            .set_status("a", LeadStatus::Contacted, Some("sent DM"))
            .await
            .unwrap();
        let first = store.get("a").await.unwrap().unwrap().contacted_at;
        assert!(first.is_some());

        store.set_status("a", LeadStatus::Interested, None).await.unwrap();
        store.set_status("a", LeadStatus::Contacted, None).await.unwrap();
        let lead = store.get("a").await.unwrap().unwrap();
        assert_eq!(lead.contacted_at, first);
        assert_eq!(lead.notes.as_deref(), Some("sent DM"));
    }

    #[tokio::test]
    async fn test_query_ordering() {
        let store = InMemoryLeadStore::new();
        store
            .insert_many(&[item("old", 10), item("mid", 20), item("new", 30)], "kw")
            .await
            .unwrap();
        store.record_analysis("old", &analysis(80)).await.unwrap();
        store.record_analysis("new", &analysis(80)).await.unwrap();
        store.record_analysis("mid", &analysis(95)).await.unwrap();

        let raw = store.query(&LeadFilter::default()).await.unwrap();
        let ids: Vec<&str> = raw.iter().map(|l| l.item.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let ranked = store
            .query(&LeadFilter {
                analyzed_only: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<&str> = ranked.iter().map(|l| l.item.id.as_str()).collect();
        assert_eq!(ids, vec!["mid", "new", "old"]);
    }

    #[tokio::test]
    async fn test_bulk_delete_min_score() {
        let store = InMemoryLeadStore::new();
        store
            .insert_many(&[item("hi", 1), item("lo", 2), item("raw", 3)], "kw")
            .await
            .unwrap();
        store.record_analysis("hi", &analysis(85)).await.unwrap();
        store.record_analysis("lo", &analysis(40)).await.unwrap();

        let filter = DeleteFilter {
            min_score: Some(80),
            ..Default::default()
        };
        assert_eq!(store.preview_bulk_delete(&filter).await.unwrap(), 1);
        assert_eq!(store.bulk_delete(&filter).await.unwrap(), 1);
        assert!(!store.exists("hi").await.unwrap());
        assert!(store.exists("lo").await.unwrap());
        assert!(store.exists("raw").await.unwrap());
    }

    #[tokio::test]
    async fn test_bulk_delete_rejects_empty_filter() {
        let store = InMemoryLeadStore::new();
        store.insert(&item("a", 1), "kw").await.unwrap();
        let err = store.bulk_delete(&DeleteFilter::default()).await.unwrap_err();
        assert!(matches!(err, LeadError::InvalidArgument(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = InMemoryLeadStore::new();
        store
            .insert_many(&[item("a", 1), item("b", 2), item("c", 3)], "kw")
            .await
            .unwrap();
        store.record_analysis("a", &analysis(60)).await.unwrap();
        store.record_analysis("b", &analysis(80)).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.analyzed, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.average_score, Some(70.0));
    }
}
