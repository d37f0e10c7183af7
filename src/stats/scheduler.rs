//! Rollup Scheduler
//!
//! Periodically re-rolls yesterday and today so the daily rollup table stays
//! current while new analyses keep arriving. Runs alongside manual rollups;
//! the store's date-keyed upsert keeps overlapping runs from duplicating rows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

use super::{StatisticsEngine, StatsResult};

/// Longest accepted interval between runs (one week)
pub const MAX_ROLLUP_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// Outcome of the last scheduled run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollupRun {
    Success { days_rolled: usize },
    Failed { error: String },
}

/// Snapshot of the scheduler for health and admin output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval_secs: u64,
    pub runs: u64,
    pub error_count: u32,
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: Option<RollupRun>,
    pub next_run: Option<DateTime<Utc>>,
}

/// Background task driving `StatisticsEngine::rollup_range`
pub struct RollupScheduler {
    engine: Arc<StatisticsEngine>,
    interval: std::time::Duration,
    enabled: bool,
    running: Arc<RwLock<bool>>,
    status: Arc<RwLock<RollupStatus>>,
    shutdown: Arc<Notify>,
}

impl RollupScheduler {
    pub fn new(engine: Arc<StatisticsEngine>, interval_secs: u64, enabled: bool) -> Self {
        let interval_secs = interval_secs.clamp(1, MAX_ROLLUP_INTERVAL_SECS);
        Self {
            engine,
            interval: std::time::Duration::from_secs(interval_secs),
            enabled,
            running: Arc::new(RwLock::new(false)),
            status: Arc::new(RwLock::new(RollupStatus {
                enabled,
                running: false,
                interval_secs,
                runs: 0,
                error_count: 0,
                last_run: None,
                last_status: None,
                next_run: None,
            })),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn status(&self) -> RollupStatus {
        let mut status = self.status.read().await.clone();
        status.running = *self.running.read().await;
        status
    }

    /// Roll up yesterday and today once
    pub async fn run_once(&self) -> StatsResult<usize> {
        let today = Utc::now().date_naive();
        let result = self
            .engine
            .rollup_range(today - Duration::days(1), today)
            .await
            .map(|rolled| rolled.len());

        let mut status = self.status.write().await;
        let now = Utc::now();
        status.runs += 1;
        status.last_run = Some(now);
        status.next_run = Duration::from_std(self.interval)
            .ok()
            .and_then(|interval| now.checked_add_signed(interval));
        match &result {
            Ok(days_rolled) => {
                status.last_status = Some(RollupRun::Success {
                    days_rolled: *days_rolled,
                });
                status.error_count = 0;
            }
            Err(e) => {
                status.last_status = Some(RollupRun::Failed {
                    error: e.to_string(),
                });
                status.error_count += 1;
            }
        }

        result
    }

    /// Start the scheduler background task
    ///
    /// Returns `None` when the scheduler is disabled in configuration.
    pub async fn start(self: Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if !self.enabled {
            tracing::info!("Rollup scheduler disabled");
            return None;
        }

        *self.running.write().await = true;
        let scheduler = Arc::clone(&self);

        Some(tokio::spawn(async move {
            tracing::info!(
                interval_secs = scheduler.interval.as_secs(),
                "Rollup scheduler started"
            );
            let mut interval = tokio::time::interval(scheduler.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = scheduler.shutdown.notified() => break,
                }

                if !*scheduler.running.read().await {
                    break;
                }

                match scheduler.run_once().await {
                    Ok(days) => tracing::debug!(days_rolled = days, "Scheduled rollup complete"),
                    Err(e) => tracing::error!(error = %e, "Scheduled rollup failed"),
                }
            }

            tracing::info!("Rollup scheduler stopped");
        }))
    }

    /// Stop the scheduler
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Label, MemoryStore, NewAnalysis, RecordStore};

    async fn engine_with_today_record() -> (Arc<dyn RecordStore>, Arc<StatisticsEngine>) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        store
            .create(NewAnalysis::new("Great!", Label::Positive, 0.99))
            .await
            .unwrap();
        let engine = Arc::new(StatisticsEngine::new(Arc::clone(&store)));
        (store, engine)
    }

    #[tokio::test]
    async fn test_run_once_updates_status() {
        let (store, engine) = engine_with_today_record().await;
        let scheduler = RollupScheduler::new(engine, 60, true);

        assert_eq!(scheduler.run_once().await.unwrap(), 1);

        let status = scheduler.status().await;
        assert_eq!(status.runs, 1);
        assert_eq!(
            status.last_status,
            Some(RollupRun::Success { days_rolled: 1 })
        );
        assert!(status.next_run > status.last_run);

        let today = Utc::now().date_naive();
        assert!(store.daily_stat(today).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_interval_is_clamped() {
        let (_store, engine) = engine_with_today_record().await;
        let scheduler = RollupScheduler::new(engine, u64::MAX, true);

        assert_eq!(scheduler.status().await.interval_secs, MAX_ROLLUP_INTERVAL_SECS);
        assert_eq!(scheduler.run_once().await.unwrap(), 1);

        let status = scheduler.status().await;
        let (last, next) = (status.last_run.unwrap(), status.next_run.unwrap());
        assert_eq!((next - last).num_seconds(), MAX_ROLLUP_INTERVAL_SECS as i64);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_does_not_start() {
        let (_store, engine) = engine_with_today_record().await;
        let scheduler = Arc::new(RollupScheduler::new(engine, 60, false));
        assert!(scheduler.clone().start().await.is_none());
        assert!(!scheduler.status().await.running);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (store, engine) = engine_with_today_record().await;
        let scheduler = Arc::new(RollupScheduler::new(engine, 3600, true));

        let handle = scheduler.clone().start().await.unwrap();
        assert!(scheduler.status().await.running);

        // The first interval tick fires immediately
        let today = Utc::now().date_naive();
        for _ in 0..50 {
            if store.daily_stat(today).await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(store.daily_stat(today).await.unwrap().is_some());

        scheduler.stop().await;
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!scheduler.status().await.running);
    }
}
