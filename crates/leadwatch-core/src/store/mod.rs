//! Storage abstraction for leads.
//!
//! The [`LeadStore`] trait is the only way any component mutates persisted
//! items, analyses, or workflow fields. Backends: SQLite (in the `leadwatch`
//! crate) and [`memory::InMemoryLeadStore`] for tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AnalysisResult, DeleteFilter, Item, Lead, LeadFilter, LeadStatus, StatusBreakdown, StoreStats,
};

/// Durable keyed table of items plus analysis plus workflow status.
///
/// # Operations
///
/// | Method | Semantics |
/// |--------|-----------|
/// | [`insert`](LeadStore::insert) | insert-or-ignore; `true` iff the id was new |
/// | [`insert_many`](LeadStore::insert_many) | same, all-or-nothing |
/// | [`record_analysis`](LeadStore::record_analysis) | overwrite analysis; `false` if id absent |
/// | [`set_status`](LeadStore::set_status) | workflow transition; `false` if id absent |
/// | [`bulk_delete`](LeadStore::bulk_delete) | refuses an empty filter set |
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert an item unless its id is already present. Existing rows are
    /// never touched.
    async fn insert(&self, item: &Item, source_keyword: &str) -> Result<bool>;

    /// Insert a batch atomically, returning how many ids were new.
    ///
    /// A failure partway through rolls the whole batch back.
    async fn insert_many(&self, items: &[Item], source_keyword: &str) -> Result<usize>;

    async fn exists(&self, id: &str) -> Result<bool>;

    async fn get(&self, id: &str) -> Result<Option<Lead>>;

    /// Mark the item analyzed and overwrite any previous analysis.
    async fn record_analysis(&self, id: &str, analysis: &AnalysisResult) -> Result<bool>;

    /// Change the workflow status. `Some(notes)` replaces prior notes, `None`
    /// keeps them. `contacted_at` is stamped only the first time the status
    /// becomes `contacted`.
    async fn set_status(&self, id: &str, status: LeadStatus, notes: Option<&str>) -> Result<bool>;

    async fn query(&self, filter: &LeadFilter) -> Result<Vec<Lead>>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Analyzed rows grouped by workflow status.
    async fn status_breakdown(&self) -> Result<StatusBreakdown>;

    /// Delete rows matching every set filter. Errors with `InvalidArgument`
    /// if no filter is set.
    async fn bulk_delete(&self, filter: &DeleteFilter) -> Result<u64>;

    /// Count what [`bulk_delete`](LeadStore::bulk_delete) would remove.
    async fn preview_bulk_delete(&self, filter: &DeleteFilter) -> Result<u64>;
}

/// Current time in epoch seconds, shared by store implementations.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
