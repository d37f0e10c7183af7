//! Statistics engine
//!
//! On-demand aggregates, gap-filled timelines and the materialized daily
//! rollup. All day grouping is done on UTC calendar days, for live queries
//! and rollups alike, so the two always agree about which day a record
//! belongs to.

pub mod scheduler;

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::storage::{day_bounds, AnalysisRecord, DailyStat, Label, RecordStore, StorageError};

pub use scheduler::{RollupRun, RollupScheduler, RollupStatus, MAX_ROLLUP_INTERVAL_SECS};

/// Longest span a single `rollup_range` call may cover
pub const MAX_ROLLUP_RANGE_DAYS: i64 = 366;

/// Longest trailing window accepted by the day-count operations
pub const MAX_WINDOW_DAYS: u32 = 36_600;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type StatsResult<T> = Result<T, StatsError>;

/// Aggregate view over a window of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub total_analyses: u64,
    pub positive_count: u64,
    pub negative_count: u64,
    pub positive_percentage: f64,
    pub negative_percentage: f64,
    /// 0.0 when no records contributed
    pub average_score: f64,
    /// 0.0 when no record carried a processing time
    pub average_processing_time_ms: f64,
}

/// Per-day counts, one entry per day of the window, ascending
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub days: u32,
    pub dates: BTreeMap<NaiveDate, u64>,
    pub total: u64,
}

/// Counts and means over a set of records
///
/// Shared by live stats and rollups so both produce identical numbers for
/// the same records.
#[derive(Debug, Default)]
struct Summary {
    total: u64,
    positive: u64,
    negative: u64,
    average_score: Option<f64>,
    average_processing_time: Option<f64>,
}

impl Summary {
    fn of(records: &[AnalysisRecord]) -> Self {
        let mut summary = Summary::default();
        let mut score_sum = 0.0;
        let mut time_sum = 0.0;
        let mut timed = 0u64;

        for record in records {
            summary.total += 1;
            match record.label {
                Label::Positive => summary.positive += 1,
                Label::Negative => summary.negative += 1,
            }
            score_sum += record.score;
            if let Some(ms) = record.processing_time_ms {
                time_sum += ms;
                timed += 1;
            }
        }

        if summary.total > 0 {
            summary.average_score = Some(score_sum / summary.total as f64);
        }
        if timed > 0 {
            summary.average_processing_time = Some(time_sum / timed as f64);
        }
        summary
    }

    fn percentage(&self, count: u64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }
}

/// Aggregates and rollups on top of a `RecordStore`
pub struct StatisticsEngine {
    store: Arc<dyn RecordStore>,
}

impl StatisticsEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Stats over records with `start <= created_at <= end`
    pub async fn compute_stats(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> StatsResult<AnalysisStats> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(StatsError::InvalidRange(format!(
                    "start {} is after end {}",
                    s, e
                )));
            }
        }

        // The store range is half-open at millisecond resolution
        // An end at the last representable instant is the same as no end
        let end_exclusive = end.and_then(|e| e.checked_add_signed(Duration::milliseconds(1)));
        let records = self.store.records_between(start, end_exclusive).await?;
        let summary = Summary::of(&records);

        Ok(AnalysisStats {
            total_analyses: summary.total,
            positive_count: summary.positive,
            negative_count: summary.negative,
            positive_percentage: summary.percentage(summary.positive),
            negative_percentage: summary.percentage(summary.negative),
            average_score: summary.average_score.unwrap_or(0.0),
            average_processing_time_ms: summary.average_processing_time.unwrap_or(0.0),
        })
    }

    /// Stats over the trailing `days` days up to now
    pub async fn compute_stats_for_days(&self, days: u32) -> StatsResult<AnalysisStats> {
        check_window(days)?;
        let start = Duration::try_days(i64::from(days))
            .and_then(|span| Utc::now().checked_sub_signed(span))
            .ok_or_else(|| out_of_range(days))?;
        self.compute_stats(Some(start), None).await
    }

    /// Counts for the trailing `days` calendar days ending today
    pub async fn compute_timeline(&self, days: u32) -> StatsResult<Timeline> {
        self.timeline_ending(days, Utc::now().date_naive()).await
    }

    /// Counts for the `days` calendar days ending on `last` (inclusive)
    pub async fn timeline_ending(&self, days: u32, last: NaiveDate) -> StatsResult<Timeline> {
        check_window(days)?;
        let first = window_start(last, days)?;
        let (_, end) = checked_day_bounds(last)?;
        let mut dates: BTreeMap<NaiveDate, u64> = first
            .iter_days()
            .take(days as usize)
            .map(|day| (day, 0))
            .collect();

        let (start, _) = day_bounds(first);
        let records = self.store.records_between(Some(start), Some(end)).await?;

        let mut total = 0;
        for record in &records {
            if let Some(count) = dates.get_mut(&record.created_at.date_naive()) {
                *count += 1;
                total += 1;
            }
        }

        Ok(Timeline { days, dates, total })
    }

    /// Recompute and upsert the rollup for one UTC day
    ///
    /// Returns `None` without touching the store when the day has no records.
    pub async fn rollup_day(&self, date: NaiveDate) -> StatsResult<Option<DailyStat>> {
        let (start, end) = checked_day_bounds(date)?;
        let records = self.store.records_between(Some(start), Some(end)).await?;
        if records.is_empty() {
            tracing::debug!(%date, "No analyses for day; rollup skipped");
            return Ok(None);
        }

        let summary = Summary::of(&records);
        let now = Utc::now();
        let stat = DailyStat {
            date,
            total_analyses: summary.total,
            positive_count: summary.positive,
            negative_count: summary.negative,
            average_score: summary.average_score,
            average_processing_time: summary.average_processing_time,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.upsert_daily_stat(stat).await?;
        tracing::debug!(%date, total = stored.total_analyses, "Updated daily stats");
        Ok(Some(stored))
    }

    /// Roll up every day in `from..=to`, returning the days that had records
    pub async fn rollup_range(&self, from: NaiveDate, to: NaiveDate) -> StatsResult<Vec<DailyStat>> {
        if from > to {
            return Err(StatsError::InvalidRange(format!(
                "from {} is after to {}",
                from, to
            )));
        }
        let span = (to - from).num_days() + 1;
        if span > MAX_ROLLUP_RANGE_DAYS {
            return Err(StatsError::InvalidRange(format!(
                "range covers {} days (max {})",
                span, MAX_ROLLUP_RANGE_DAYS
            )));
        }

        let mut rolled = Vec::new();
        for date in from.iter_days().take(span as usize) {
            if let Some(stat) = self.rollup_day(date).await? {
                rolled.push(stat);
            }
        }

        tracing::info!(%from, %to, days_rolled = rolled.len(), "Rollup range complete");
        Ok(rolled)
    }

    /// Materialized rollups for the trailing `days` days, ascending
    pub async fn daily_stats(&self, days: u32) -> StatsResult<Vec<DailyStat>> {
        check_window(days)?;
        let today = Utc::now().date_naive();
        let from = window_start(today, days)?;
        Ok(self.store.daily_stats(from, today).await?)
    }
}

fn check_window(days: u32) -> StatsResult<()> {
    if days == 0 || days > MAX_WINDOW_DAYS {
        return Err(StatsError::InvalidRange(format!(
            "days must be between 1 and {}",
            MAX_WINDOW_DAYS
        )));
    }
    Ok(())
}

fn out_of_range(days: u32) -> StatsError {
    StatsError::InvalidRange(format!("a {} day window is out of range", days))
}

/// First day of the `days`-day window ending on `last`
fn window_start(last: NaiveDate, days: u32) -> StatsResult<NaiveDate> {
    last.checked_sub_days(Days::new(u64::from(days) - 1))
        .ok_or_else(|| out_of_range(days))
}

/// `day_bounds`, refusing the last representable date
fn checked_day_bounds(date: NaiveDate) -> StatsResult<(DateTime<Utc>, DateTime<Utc>)> {
    if date.succ_opt().is_none() {
        return Err(StatsError::InvalidRange(format!("{} is out of range", date)));
    }
    Ok(day_bounds(date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, NewAnalysis, SqliteStore};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn engine_with(store: Arc<dyn RecordStore>) -> StatisticsEngine {
        StatisticsEngine::new(store)
    }

    async fn seed(store: &dyn RecordStore, at: DateTime<Utc>, label: Label, score: f64) {
        store
            .create(NewAnalysis::new("seeded", label, score).processing_time(10.0).at(at))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rollup_day_scenario() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let noon = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();

        seed(store.as_ref(), noon, Label::Positive, 0.9).await;
        seed(store.as_ref(), noon + Duration::hours(1), Label::Positive, 0.9).await;
        seed(store.as_ref(), noon + Duration::hours(2), Label::Negative, 0.8).await;
        // Neighbouring days stay out
        seed(store.as_ref(), noon - Duration::days(1), Label::Negative, 0.5).await;
        seed(
            store.as_ref(),
            Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap(),
            Label::Negative,
            0.5,
        )
        .await;

        let engine = engine_with(store);
        let stat = engine.rollup_day(day).await.unwrap().unwrap();

        assert_eq!(stat.total_analyses, 3);
        assert_eq!(stat.positive_count, 2);
        assert_eq!(stat.negative_count, 1);
        assert!((stat.average_score.unwrap() - 0.8667).abs() < 1e-3);
        assert_eq!(stat.average_processing_time, Some(10.0));
    }

    #[tokio::test]
    async fn test_rollup_is_idempotent() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteStore::open(dir.path().join("stats.db")).unwrap());
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        for (i, score) in [0.91, 0.77, 0.63, 0.99].iter().enumerate() {
            let label = if i % 2 == 0 { Label::Positive } else { Label::Negative };
            seed(store.as_ref(), base + Duration::minutes(i as i64), label, *score).await;
        }

        let engine = engine_with(Arc::clone(&store));
        let day = base.date_naive();
        let first = engine.rollup_day(day).await.unwrap().unwrap();
        let second = engine.rollup_day(day).await.unwrap().unwrap();

        assert!(first.same_aggregates(&second));
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(store.daily_stats(day, day).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollup_empty_day_is_noop() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let engine = engine_with(Arc::clone(&store));
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        assert!(engine.rollup_day(day).await.unwrap().is_none());
        assert!(store.daily_stat(day).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_rollups_single_row() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        seed(store.as_ref(), at, Label::Positive, 0.7).await;

        let engine = Arc::new(engine_with(Arc::clone(&store)));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.rollup_day(at.date_naive()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let day = at.date_naive();
        assert_eq!(store.daily_stats(day, day).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timeline_gap_filled() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let today = NaiveDate::from_ymd_opt(2024, 8, 20).unwrap();
        let two_days_ago = Utc.with_ymd_and_hms(2024, 8, 18, 15, 30, 0).unwrap();
        seed(store.as_ref(), two_days_ago, Label::Positive, 0.9).await;
        seed(store.as_ref(), two_days_ago, Label::Negative, 0.6).await;
        // Outside the window
        seed(
            store.as_ref(),
            Utc.with_ymd_and_hms(2024, 8, 17, 23, 59, 59).unwrap(),
            Label::Positive,
            0.9,
        )
        .await;

        let engine = engine_with(store);
        let timeline = engine.timeline_ending(3, today).await.unwrap();

        let entries: Vec<_> = timeline.dates.iter().map(|(d, c)| (*d, *c)).collect();
        assert_eq!(
            entries,
            vec![
                (NaiveDate::from_ymd_opt(2024, 8, 18).unwrap(), 2),
                (NaiveDate::from_ymd_opt(2024, 8, 19).unwrap(), 0),
                (today, 0),
            ]
        );
        assert_eq!(timeline.total, 2);
    }

    #[tokio::test]
    async fn test_timeline_rejects_zero_days() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        assert!(matches!(
            engine.compute_timeline(0).await,
            Err(StatsError::InvalidRange(_))
        ));
        assert_eq!(engine.compute_timeline(30).await.unwrap().dates.len(), 30);
    }

    #[tokio::test]
    async fn test_stats_empty_store() {
        let engine = engine_with(Arc::new(MemoryStore::new()));
        let stats = engine.compute_stats(None, None).await.unwrap();
        assert_eq!(stats.total_analyses, 0);
        assert_eq!(stats.positive_percentage, 0.0);
        assert_eq!(stats.negative_percentage, 0.0);
        assert_eq!(stats.average_score, 0.0);
        assert_eq!(stats.average_processing_time_ms, 0.0);
    }

    #[tokio::test]
    async fn test_stats_window_and_consistency() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let base = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        seed(store.as_ref(), base, Label::Positive, 1.0).await;
        seed(store.as_ref(), base + Duration::days(1), Label::Negative, 0.6).await;
        seed(store.as_ref(), base + Duration::days(2), Label::Positive, 0.8).await;
        store
            .create(NewAnalysis::new("untimed", Label::Positive, 0.9).at(base + Duration::days(2)))
            .await
            .unwrap();

        let engine = engine_with(store);

        let all = engine.compute_stats(None, None).await.unwrap();
        assert_eq!(all.total_analyses, 4);
        assert_eq!(all.positive_count + all.negative_count, all.total_analyses);
        assert!((all.positive_percentage + all.negative_percentage - 100.0).abs() < 1e-9);
        assert_eq!(all.average_processing_time_ms, 10.0);

        // Inclusive end: the record exactly at base + 1 day is counted
        let window = engine
            .compute_stats(Some(base + Duration::hours(1)), Some(base + Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(window.total_analyses, 1);
        assert_eq!(window.negative_count, 1);
        assert!((window.average_score - 0.6).abs() < 1e-12);

        assert!(matches!(
            engine.compute_stats(Some(base), Some(base - Duration::days(1))).await,
            Err(StatsError::InvalidRange(_))
        ));
    }

    #[tokio::test]
    async fn test_rollup_range_and_daily_stats() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let now = Utc::now();
        seed(store.as_ref(), now - Duration::days(2), Label::Positive, 0.9).await;
        seed(store.as_ref(), now, Label::Negative, 0.7).await;

        let engine = engine_with(store);
        let today = now.date_naive();
        let rolled = engine
            .rollup_range(today - Duration::days(3), today)
            .await
            .unwrap();
        assert_eq!(rolled.len(), 2);

        let stats = engine.daily_stats(7).await.unwrap();
        let dates: Vec<_> = stats.iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![today - Duration::days(2), today]);

        assert!(engine.rollup_range(today, today - Duration::days(1)).await.is_err());
        assert!(engine
            .rollup_range(today - Duration::days(400), today)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_oversized_windows_are_rejected() {
        let engine = engine_with(Arc::new(MemoryStore::new()));

        assert!(matches!(
            engine.compute_stats_for_days(u32::MAX).await,
            Err(StatsError::InvalidRange(_))
        ));
        assert!(matches!(
            engine.compute_timeline(u32::MAX).await,
            Err(StatsError::InvalidRange(_))
        ));
        assert!(matches!(
            engine.daily_stats(u32::MAX).await,
            Err(StatsError::InvalidRange(_))
        ));

        // The widest accepted window still works
        let timeline = engine.compute_timeline(MAX_WINDOW_DAYS).await.unwrap();
        assert_eq!(timeline.dates.len(), MAX_WINDOW_DAYS as usize);
        assert!(engine.compute_stats_for_days(MAX_WINDOW_DAYS).await.is_ok());
    }

    #[tokio::test]
    async fn test_calendar_edges_are_rejected() {
        let engine = engine_with(Arc::new(MemoryStore::new()));

        assert!(matches!(
            engine.timeline_ending(7, NaiveDate::MIN).await,
            Err(StatsError::InvalidRange(_))
        ));
        assert!(matches!(
            engine.timeline_ending(1, NaiveDate::MAX).await,
            Err(StatsError::InvalidRange(_))
        ));
        assert!(matches!(
            engine.rollup_day(NaiveDate::MAX).await,
            Err(StatsError::InvalidRange(_))
        ));
    }
}
