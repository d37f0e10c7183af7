//! In-memory record store
//!
//! Same contract as the SQLite store, held behind one Tokio `RwLock`.
//! Used for tests and for `database_url = "memory"` runs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::store::RecordStore;
use crate::storage::types::{AnalysisFilter, AnalysisRecord, DailyStat, NewAnalysis};

#[derive(Default)]
struct MemoryState {
    /// Records in insertion (id) order
    records: Vec<AnalysisRecord>,
    next_id: i64,
    stats: BTreeMap<NaiveDate, DailyStat>,
}

/// `RecordStore` backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first, ties broken by id
fn newest_first(records: &mut [AnalysisRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn engine(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, record: NewAnalysis) -> StorageResult<AnalysisRecord> {
        record.validate()?;

        let mut state = self.state.write().await;
        state.next_id += 1;
        let stored = record.into_record(state.next_id, Utc::now());
        state.records.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: i64) -> StorageResult<AnalysisRecord> {
        let state = self.state.read().await;
        state
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StorageError::NotFound(id))
    }

    async fn list(
        &self,
        filter: &AnalysisFilter,
        skip: usize,
        limit: usize,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let state = self.state.read().await;
        let mut matching: Vec<AnalysisRecord> = state
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        newest_first(&mut matching);
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self) -> StorageResult<u64> {
        Ok(self.state.read().await.records.len() as u64)
    }

    async fn count_filtered(&self, filter: &AnalysisFilter) -> StorageResult<u64> {
        let state = self.state.read().await;
        Ok(state.records.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn search(&self, term: &str, limit: usize) -> StorageResult<Vec<AnalysisRecord>> {
        let needle = term.to_lowercase();
        let state = self.state.read().await;
        let mut matching: Vec<AnalysisRecord> = state
            .records
            .iter()
            .filter(|r| r.text.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        newest_first(&mut matching);
        matching.truncate(limit);
        Ok(matching)
    }

    async fn delete(&self, id: i64) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|r| r.id != id);
        Ok(state.records.len() < before)
    }

    async fn records_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let start = start.map(|s| s.timestamp_millis());
        let end = end.map(|e| e.timestamp_millis());
        let state = self.state.read().await;
        let mut matching: Vec<AnalysisRecord> = state
            .records
            .iter()
            .filter(|r| {
                let ts = r.created_at.timestamp_millis();
                start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts < e)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matching)
    }

    async fn upsert_daily_stat(&self, mut stat: DailyStat) -> StorageResult<DailyStat> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.stats.get(&stat.date) {
            stat.created_at = existing.created_at;
        }
        state.stats.insert(stat.date, stat.clone());
        Ok(stat)
    }

    async fn daily_stat(&self, date: NaiveDate) -> StorageResult<Option<DailyStat>> {
        Ok(self.state.read().await.stats.get(&date).cloned())
    }

    async fn daily_stats(&self, from: NaiveDate, to: NaiveDate) -> StorageResult<Vec<DailyStat>> {
        if from > to {
            return Ok(Vec::new());
        }
        let state = self.state.read().await;
        Ok(state.stats.range(from..=to).map(|(_, s)| s.clone()).collect())
    }
}
