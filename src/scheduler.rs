//! Monitoring scheduler: recurring search-and-analyze cycles.
//!
//! # State Machine
//!
//! ```text
//!   Idle ──(timer fire | manual trigger, CAS succeeds)──▶ CycleRunning
//!    ▲                                                        │
//!    └────────────────(cycle ends, or panics)─────────────────┘
//! ```
//!
//! The Idle → CycleRunning edge is a compare-and-swap on an atomic, so a
//! trigger that arrives while a cycle is running is a logged no-op. The
//! return edge is taken by a drop guard and cannot be skipped.
//!
//! # Cycle Body
//!
//! For each partition, for each keyword (both in configured order, strictly
//! sequential):
//!
//! 1. search the source for the newest items of the lookback window
//! 2. drop ids already in the store; stop here if nothing is new
//! 3. `insert_many` the new items
//! 4. if scoring is enabled, score each new item, record the analysis, and
//!    publish a `NEW_LEAD` event when the score meets `min_score`
//!
//! Courtesy delays separate consecutive keywords and consecutive partitions.
//!
//! Failures stay local. A search or store error in steps 1-3 counts the
//! keyword as failed and the cycle moves on to the next keyword. A failed
//! analysis write leaves that item pending and counts it in `items_failed`.
//! Nothing escapes `run_cycle`.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use leadwatch_core::models::{Item, LeadEvent, StoreStats};
use leadwatch_core::store::{now_ts, LeadStore};
use leadwatch_core::Result;

use crate::config::{ConfigPatch, MonitoringConfig, MonitoringSection};
use crate::fanout::LeadPublisher;
use crate::schedule::Schedule;
use crate::scoring::Scorer;
use crate::source::{SearchOptions, SortMode, SourceClient, TimeWindow};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Re-check interval when the schedule has no upcoming fire time.
const NO_FIRE_RECHECK: Duration = Duration::from_secs(3600);

// ============ Reports ============

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub keywords_searched: u32,
    pub keywords_failed: u32,
    pub items_fetched: u32,
    pub new_items: u32,
    pub items_analyzed: u32,
    /// New items whose analysis could not be recorded; they stay pending.
    pub items_failed: u32,
    pub qualifying_leads: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Another cycle held the guard; nothing was done.
    Skipped,
    Completed(CycleReport),
}

/// Summary of the most recent cycle that actually ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastCycle {
    pub finished_at: i64,
    pub duration_ms: u64,
    pub report: CycleReport,
}

/// Answer to the status query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub cycle_running: bool,
    pub config: MonitoringConfig,
    pub stats: StoreStats,
    pub scoring_enabled: bool,
    pub schedule_enabled: bool,
    pub last_cycle: Option<LastCycle>,
}

// ============ Monitor ============

/// Delays between upstream searches.
#[derive(Debug, Clone, Copy, Default)]
struct Throttle {
    keyword_delay: Duration,
    partition_delay: Duration,
}

pub struct Monitor {
    source: Arc<dyn SourceClient>,
    scorer: Arc<dyn Scorer>,
    store: Arc<dyn LeadStore>,
    publisher: Arc<dyn LeadPublisher>,
    config: RwLock<MonitoringConfig>,
    config_changed: Notify,
    state: AtomicU8,
    last_cycle: Mutex<Option<LastCycle>>,
    throttle: Throttle,
    sort: SortMode,
    time: TimeWindow,
    schedule_enabled: bool,
    run_on_start: bool,
}

/// Returns the scheduler to Idle when the cycle scope ends, panics included.
struct RunGuard<'a>(&'a AtomicU8);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(IDLE, Ordering::Release);
    }
}

impl Monitor {
    pub fn new(
        source: Arc<dyn SourceClient>,
        scorer: Arc<dyn Scorer>,
        store: Arc<dyn LeadStore>,
        publisher: Arc<dyn LeadPublisher>,
        section: &MonitoringSection,
    ) -> Self {
        Self {
            source,
            scorer,
            store,
            publisher,
            config: RwLock::new(section.config.clone()),
            config_changed: Notify::new(),
            state: AtomicU8::new(IDLE),
            last_cycle: Mutex::new(None),
            throttle: Throttle {
                keyword_delay: Duration::from_millis(section.keyword_delay_ms),
                partition_delay: Duration::from_millis(section.partition_delay_ms),
            },
            sort: section.sort,
            time: section.time,
            schedule_enabled: section.schedule_enabled,
            run_on_start: section.run_on_start,
        }
    }


    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    pub fn scoring_enabled(&self) -> bool {
        self.scorer.is_enabled()
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> MonitoringConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge a partial update into the in-memory configuration.
    ///
    /// Invalid patches leave the configuration untouched. Updates apply from
    /// the next cycle and are lost on restart.
    pub fn update_config(&self, patch: &ConfigPatch) -> Result<MonitoringConfig> {
        let next = {
            let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
            let next = config.merged(patch)?;
            *config = next.clone();
            next
        };
        tracing::info!(
            keywords = next.keywords.len(),
            partitions = next.partitions.len(),
            interval = %next.interval,
            min_score = next.min_score,
            "monitoring config updated"
        );
        self.config_changed.notify_waiters();
        Ok(next)
    }

    pub fn last_cycle(&self) -> Option<LastCycle> {
        self.last_cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn status(&self) -> Result<MonitorStatus> {
        Ok(MonitorStatus {
            cycle_running: self.is_running(),
            config: self.config(),
            stats: self.store.stats().await?,
            scoring_enabled: self.scoring_enabled(),
            schedule_enabled: self.schedule_enabled,
            last_cycle: self.last_cycle(),
        })
    }

    /// Run one cycle unless one is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self
            .state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("monitoring cycle already running; trigger ignored");
            return CycleOutcome::Skipped;
        }
        let _guard = RunGuard(&self.state);

        let config = self.config();
        let started = tokio::time::Instant::now();
        tracing::info!(
            partitions = config.partitions.len(),
            keywords = config.keywords.len(),
            "monitoring cycle started"
        );

        let mut report = CycleReport::default();
        self.cycle_body(&config, &mut report).await;
        tracing::info!(
            searched = report.keywords_searched,
            failed = report.keywords_failed,
            new = report.new_items,
            analyzed = report.items_analyzed,
            qualifying = report.qualifying_leads,
            "monitoring cycle completed"
        );

        let record = LastCycle {
            finished_at: now_ts(),
            duration_ms: started.elapsed().as_millis() as u64,
            report: report.clone(),
        };
        *self.last_cycle.lock().unwrap_or_else(PoisonError::into_inner) = Some(record);

        CycleOutcome::Completed(report)
    }

    async fn cycle_body(&self, config: &MonitoringConfig, report: &mut CycleReport) {
        for (pi, partition) in config.partitions.iter().enumerate() {
            if pi > 0 {
                tokio::time::sleep(self.throttle.partition_delay).await;
            }
            for (ki, keyword) in config.keywords.iter().enumerate() {
                if ki > 0 {
                    tokio::time::sleep(self.throttle.keyword_delay).await;
                }
                report.keywords_searched += 1;
                if let Err(e) = self.process_keyword(config, partition, keyword, report).await {
                    report.keywords_failed += 1;
                    tracing::warn!(partition, keyword, error = %e, "keyword failed; moving on");
                }
            }
        }
    }

    /// Search, store, and score one partition x keyword pair.
    ///
    /// An error means the keyword produced nothing further; items already
    /// stored by it stay stored.
    async fn process_keyword(
        &self,
        config: &MonitoringConfig,
        partition: &str,
        keyword: &str,
        report: &mut CycleReport,
    ) -> Result<()> {
        let options = SearchOptions {
            sort: self.sort,
            time: self.time,
            ..SearchOptions::for_partition(partition, config.limit)
        };
        let page = self.source.search(keyword, &options).await?;
        report.items_fetched += page.items.len() as u32;

        let mut fresh: Vec<Item> = Vec::new();
        for item in page.items {
            if !self.store.exists(&item.id).await? {
                fresh.push(item);
            }
        }
        if fresh.is_empty() {
            tracing::debug!(partition, keyword, "no new items");
            return Ok(());
        }

        let inserted = self.store.insert_many(&fresh, keyword).await?;
        report.new_items += inserted as u32;
        tracing::info!(partition, keyword, new = inserted, "stored new items");

        if !self.scorer.is_enabled() {
            return Ok(());
        }

        for item in fresh {
            let analysis = self.scorer.score(&item).await.analyzed_at(now_ts());
            match self.store.record_analysis(&item.id, &analysis).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    report.items_failed += 1;
                    tracing::warn!(id = %item.id, error = %e, "failed to record analysis; item stays pending");
                    continue;
                }
            }
            report.items_analyzed += 1;

            if analysis.score >= config.min_score {
                report.qualifying_leads += 1;
                tracing::info!(id = %item.id, score = analysis.score, "qualifying lead");
                self.publisher.publish(&LeadEvent { item, analysis });
            }
        }
        Ok(())
    }

    /// Request a cycle without waiting for it.
    ///
    /// Returns whether a cycle was already running when the request arrived,
    /// in which case the request is a no-op.
    pub fn trigger(self: &Arc<Self>) -> bool {
        let already_running = self.is_running();
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            monitor.run_cycle().await;
        });
        already_running
    }

    /// Spawn the timer loop.
    ///
    /// Runs an initial cycle when `run_on_start` is set, then fires on the
    /// cron schedule. The interval is re-read every iteration, and a config
    /// update wakes the loop so a new interval takes effect immediately. The
    /// loop ends when `shutdown` becomes true or its sender is dropped; an
    /// in-flight cycle is abandoned at its next suspension point.
    pub fn spawn_schedule(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            if monitor.run_on_start {
                tokio::select! {
                    _ = monitor.run_cycle() => {}
                    _ = stopped(&mut shutdown) => return,
                }
            }

            if !monitor.schedule_enabled {
                tracing::info!("cron schedule disabled; manual triggers only");
                stopped(&mut shutdown).await;
                return;
            }

            loop {
                let interval = monitor.config().interval;
                let wait = Schedule::parse(&interval)
                    .ok()
                    .and_then(|s| s.until_next(Utc::now()));
                let wait = match wait {
                    Some(wait) => {
                        tracing::debug!(interval = %interval, wait_secs = wait.as_secs(), "next cycle scheduled");
                        wait
                    }
                    None => {
                        tracing::warn!(interval = %interval, "schedule has no upcoming fire time");
                        NO_FIRE_RECHECK
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        tokio::select! {
                            _ = monitor.run_cycle() => {}
                            _ = stopped(&mut shutdown) => break,
                        }
                    }
                    _ = monitor.config_changed.notified() => continue,
                    _ = stopped(&mut shutdown) => break,
                }
            }
            tracing::info!("monitoring schedule stopped");
        })
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_guard_resets_state() {
        let state = AtomicU8::new(RUNNING);
        {
            let _guard = RunGuard(&state);
        }
        assert_eq!(state.load(Ordering::Acquire), IDLE);
    }

    #[test]
    fn test_guard_resets_on_panic() {
        let state = AtomicU8::new(RUNNING);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = RunGuard(&state);
            panic!("cycle blew up");
        }));
        assert!(result.is_err());
        assert_eq!(state.load(Ordering::Acquire), IDLE);
    }
}
