//! The `RecordStore` repository seam
//!
//! Orchestration and statistics code only ever talk to `dyn RecordStore`;
//! the engine behind it (SQLite on disk, or memory for tests) is chosen once
//! at start-up by [`open_store`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::memory::MemoryStore;
use crate::storage::sqlite::SqliteStore;
use crate::storage::types::{AnalysisFilter, AnalysisRecord, DailyStat, NewAnalysis};

/// Durable storage and query surface for analysis records and daily rollups
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short engine name for health output and logs
    fn engine(&self) -> &'static str;

    /// Persist a record atomically, assigning id and creation time
    async fn create(&self, record: NewAnalysis) -> StorageResult<AnalysisRecord>;

    /// Fetch a record by id
    async fn get(&self, id: i64) -> StorageResult<AnalysisRecord>;

    /// Filtered records, newest first, with offset pagination
    async fn list(
        &self,
        filter: &AnalysisFilter,
        skip: usize,
        limit: usize,
    ) -> StorageResult<Vec<AnalysisRecord>>;

    /// Total number of records
    async fn count(&self) -> StorageResult<u64>;

    /// Number of records passing a filter
    async fn count_filtered(&self, filter: &AnalysisFilter) -> StorageResult<u64>;

    /// Case-insensitive substring search over `text`, newest first
    async fn search(&self, term: &str, limit: usize) -> StorageResult<Vec<AnalysisRecord>>;

    /// Remove a record; returns whether it existed
    async fn delete(&self, id: i64) -> StorageResult<bool>;

    /// Most recent records
    async fn recent(&self, limit: usize) -> StorageResult<Vec<AnalysisRecord>> {
        self.list(&AnalysisFilter::default(), 0, limit).await
    }

    /// Records with `start <= created_at < end`, oldest first (ties by id)
    async fn records_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AnalysisRecord>>;

    /// Insert or update the rollup for `stat.date` atomically
    ///
    /// An existing row keeps its `created_at`; the stored row is returned.
    async fn upsert_daily_stat(&self, stat: DailyStat) -> StorageResult<DailyStat>;

    /// Rollup for one date, if materialized
    async fn daily_stat(&self, date: NaiveDate) -> StorageResult<Option<DailyStat>>;

    /// Rollups with `from <= date <= to`, ascending
    async fn daily_stats(&self, from: NaiveDate, to: NaiveDate) -> StorageResult<Vec<DailyStat>>;
}

/// Open the store named by a connection string
///
/// Accepts `memory`, `sqlite::memory:`, `sqlite://<path>` or a bare file path.
pub fn open_store(database_url: &str) -> StorageResult<Arc<dyn RecordStore>> {
    let url = database_url.trim();
    if url.is_empty() {
        return Err(StorageError::Config("database_url cannot be empty".to_string()));
    }

    match url {
        "memory" | "memory://" => {
            tracing::info!("Using in-memory record store");
            Ok(Arc::new(MemoryStore::new()))
        }
        "sqlite::memory:" | "sqlite://:memory:" => Ok(Arc::new(SqliteStore::open_in_memory()?)),
        _ => {
            let path = url
                .strip_prefix("sqlite://")
                .or_else(|| url.strip_prefix("sqlite:"))
                .unwrap_or(url);
            tracing::info!(path = %path, "Opening SQLite record store");
            Ok(Arc::new(SqliteStore::open(path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_store_variants() {
        assert_eq!(open_store("memory").unwrap().engine(), "memory");
        assert_eq!(open_store("sqlite::memory:").unwrap().engine(), "sqlite");

        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("a.db").display());
        assert_eq!(open_store(&url).unwrap().engine(), "sqlite");

        let bare = dir.path().join("b.db");
        assert_eq!(open_store(bare.to_str().unwrap()).unwrap().engine(), "sqlite");
    }

    #[test]
    fn test_open_store_empty_url() {
        assert!(matches!(open_store("  "), Err(StorageError::Config(_))));
    }
}
