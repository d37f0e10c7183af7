//! Analysis orchestration
//!
//! Turns a request (one text or a list) into classifier calls, times them,
//! and records the outcome. Recording is best effort: once classification has
//! succeeded, a storage failure is logged and reported alongside the result
//! but never fails the call.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::classifier::resource::top_prediction;
use crate::classifier::{BatchItem, ClassifierError, ClassifierResource, Prediction};
use crate::storage::{Label, NewAnalysis, RecordStore};

/// Whether the record of an analysis made it to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Persistence {
    Stored { id: i64 },
    Failed { reason: String },
}

impl Persistence {
    pub fn is_stored(&self) -> bool {
        matches!(self, Persistence::Stored { .. })
    }
}

/// Result of classifying one text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleAnalysis {
    pub text: String,
    pub label: Label,
    pub score: f64,
    /// Every label score, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<Prediction>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub analysis: SingleAnalysis,
    pub processing_time_ms: f64,
    pub persistence: Persistence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// One entry per valid input, in input order
    pub results: Vec<BatchItem>,
    pub total_time_ms: f64,
    /// `total_time_ms` spread evenly over the results
    pub per_item_time_ms: f64,
    pub persisted: usize,
    pub persistence_failures: usize,
}

/// Bridges requests to the classifier and the record store
pub struct AnalysisOrchestrator {
    classifier: Arc<ClassifierResource>,
    store: Arc<dyn RecordStore>,
    batch_size: usize,
}

impl AnalysisOrchestrator {
    pub fn new(
        classifier: Arc<ClassifierResource>,
        store: Arc<dyn RecordStore>,
        batch_size: usize,
    ) -> Self {
        Self {
            classifier,
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn classifier(&self) -> &Arc<ClassifierResource> {
        &self.classifier
    }

    /// Classify one text and record it (`is_batch = false`)
    pub async fn analyze_one(
        &self,
        text: &str,
        return_all_scores: bool,
    ) -> Result<AnalysisOutcome, ClassifierError> {
        let classifier = Arc::clone(&self.classifier);
        let input = text.to_string();
        let started = Instant::now();

        let classify = move || -> Result<(Prediction, Option<Vec<Prediction>>), ClassifierError> {
            if return_all_scores {
                let all = classifier.classify_all(&input)?;
                let top = top_prediction(&all)?;
                Ok((top, Some(all)))
            } else {
                let top = classifier.classify(&input)?;
                Ok((Prediction::new(top.label, top.score), None))
            }
        };
        let (top, predictions) = tokio::task::spawn_blocking(classify)
            .await
            .map_err(|e| ClassifierError::Oracle(format!("classification task failed: {}", e)))??;

        let processing_time_ms = elapsed_ms(started);

        let mut record = NewAnalysis::new(text, top.label, top.score)
            .processing_time(processing_time_ms)
            .batch(false);
        if let Some(model) = self.model_name() {
            record = record.model(model);
        }
        let persistence = self.persist(record).await;

        tracing::debug!(
            label = %top.label,
            score = top.score,
            processing_time_ms,
            stored = persistence.is_stored(),
            "Analyzed text"
        );

        Ok(AnalysisOutcome {
            analysis: SingleAnalysis {
                text: text.to_string(),
                label: top.label,
                score: top.score,
                predictions,
            },
            processing_time_ms,
            persistence,
        })
    }

    /// Classify many texts in input order and record each (`is_batch = true`)
    ///
    /// Empty entries are dropped. Each record gets the mean time of the batch
    /// since the oracle exposes no per-item latency.
    pub async fn analyze_many(&self, texts: Vec<String>) -> Result<BatchOutcome, ClassifierError> {
        let classifier = Arc::clone(&self.classifier);
        let batch_size = self.batch_size;
        let started = Instant::now();

        let results = tokio::task::spawn_blocking(move || classifier.classify_batch(&texts, batch_size))
            .await
            .map_err(|e| ClassifierError::Oracle(format!("classification task failed: {}", e)))??;

        let total_time_ms = elapsed_ms(started);
        let per_item_time_ms = if results.is_empty() {
            0.0
        } else {
            total_time_ms / results.len() as f64
        };

        let model = self.model_name();
        let mut persisted = 0;
        let mut persistence_failures = 0;
        for item in &results {
            let mut record = NewAnalysis::new(item.text.clone(), item.label, item.score)
                .processing_time(per_item_time_ms)
                .batch(true);
            if let Some(model) = &model {
                record = record.model(model.clone());
            }
            if self.persist(record).await.is_stored() {
                persisted += 1;
            } else {
                persistence_failures += 1;
            }
        }

        tracing::info!(
            analyzed = results.len(),
            total_time_ms,
            persisted,
            persistence_failures,
            "Batch analyzed"
        );

        Ok(BatchOutcome {
            results,
            total_time_ms,
            per_item_time_ms,
            persisted,
            persistence_failures,
        })
    }

    fn model_name(&self) -> Option<String> {
        self.classifier
            .ready_handle()
            .map(|handle| handle.model_name().to_string())
    }

    async fn persist(&self, record: NewAnalysis) -> Persistence {
        match self.store.create(record).await {
            Ok(stored) => Persistence::Stored { id: stored.id },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to save analysis; returning result anyway");
                Persistence::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierConfig;
    use crate::storage::{
        AnalysisFilter, AnalysisRecord, DailyStat, MemoryStore, StorageError, StorageResult,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, Utc};

    /// A store whose every call fails, standing in for a database outage
    struct DownStore;

    fn down<T>() -> StorageResult<T> {
        Err(StorageError::Database("connection refused".to_string()))
    }

    #[async_trait]
    impl RecordStore for DownStore {
        fn engine(&self) -> &'static str {
            "down"
        }
        async fn create(&self, _record: NewAnalysis) -> StorageResult<AnalysisRecord> {
            down()
        }
        async fn get(&self, _id: i64) -> StorageResult<AnalysisRecord> {
            down()
        }
        async fn list(
            &self,
            _filter: &AnalysisFilter,
            _skip: usize,
            _limit: usize,
        ) -> StorageResult<Vec<AnalysisRecord>> {
            down()
        }
        async fn count(&self) -> StorageResult<u64> {
            down()
        }
        async fn count_filtered(&self, _filter: &AnalysisFilter) -> StorageResult<u64> {
            down()
        }
        async fn search(&self, _term: &str, _limit: usize) -> StorageResult<Vec<AnalysisRecord>> {
            down()
        }
        async fn delete(&self, _id: i64) -> StorageResult<bool> {
            down()
        }
        async fn records_between(
            &self,
            _start: Option<DateTime<Utc>>,
            _end: Option<DateTime<Utc>>,
        ) -> StorageResult<Vec<AnalysisRecord>> {
            down()
        }
        async fn upsert_daily_stat(&self, _stat: DailyStat) -> StorageResult<DailyStat> {
            down()
        }
        async fn daily_stat(&self, _date: NaiveDate) -> StorageResult<Option<DailyStat>> {
            down()
        }
        async fn daily_stats(
            &self,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> StorageResult<Vec<DailyStat>> {
            down()
        }
    }

    fn classifier() -> Arc<ClassifierResource> {
        Arc::new(ClassifierResource::new(ClassifierConfig {
            cache_dir: std::env::temp_dir().join("sentiscope-analysis-tests"),
            ..ClassifierConfig::default()
        }))
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_analyze_one_persists() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = AnalysisOrchestrator::new(classifier(), store.clone(), 8);

        let outcome = orchestrator
            .analyze_one("I love this product!", false)
            .await
            .unwrap();
        assert_eq!(outcome.analysis.label, Label::Positive);
        assert!(outcome.analysis.predictions.is_none());
        assert!(outcome.processing_time_ms >= 0.0);

        let Persistence::Stored { id } = outcome.persistence else {
            panic!("expected the record to be stored");
        };
        let record = store.get(id).await.unwrap();
        assert!(!record.is_batch);
        assert_eq!(record.model_name.as_deref(), Some("sentiscope-lexicon-v1"));
        assert_eq!(record.score, outcome.analysis.score);
    }

    #[tokio::test]
    async fn test_analyze_one_all_scores() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = AnalysisOrchestrator::new(classifier(), store, 8);

        let outcome = orchestrator.analyze_one("Terrible.", true).await.unwrap();
        let predictions = outcome.analysis.predictions.unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(outcome.analysis.label, Label::Negative);
    }

    #[tokio::test]
    async fn test_invalid_input_propagates() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = AnalysisOrchestrator::new(classifier(), store.clone(), 8);

        let err = orchestrator.analyze_one("   ", false).await.unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidInput(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_storage_outage_does_not_fail_classification() {
        let orchestrator = AnalysisOrchestrator::new(classifier(), Arc::new(DownStore), 8);

        let outcome = orchestrator.analyze_one("Great!", false).await.unwrap();
        assert_eq!(outcome.analysis.label, Label::Positive);
        assert!(matches!(outcome.persistence, Persistence::Failed { .. }));

        let batch = orchestrator
            .analyze_many(texts(&["Great!", "Terrible."]))
            .await
            .unwrap();
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.persisted, 0);
        assert_eq!(batch.persistence_failures, 2);
    }

    #[tokio::test]
    async fn test_analyze_many_order_and_records() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = AnalysisOrchestrator::new(classifier(), store.clone(), 2);

        let outcome = orchestrator
            .analyze_many(texts(&["Great!", "", "Terrible.", "  ", "so good"]))
            .await
            .unwrap();

        let order: Vec<_> = outcome.results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(order, vec!["Great!", "Terrible.", "so good"]);
        assert_eq!(outcome.persisted, 3);

        let expected_mean = outcome.total_time_ms / 3.0;
        assert!((outcome.per_item_time_ms - expected_mean).abs() < 1e-9);

        let records = store.list(&AnalysisFilter::new(), 0, 10).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.is_batch));
        assert!(records
            .iter()
            .all(|r| r.processing_time_ms == Some(outcome.per_item_time_ms)));
    }

    #[tokio::test]
    async fn test_analyze_many_errors_propagate() {
        let orchestrator =
            AnalysisOrchestrator::new(classifier(), Arc::new(MemoryStore::new()), 8);

        assert_eq!(
            orchestrator.analyze_many(Vec::new()).await.unwrap_err(),
            ClassifierError::EmptyBatch
        );
        assert_eq!(
            orchestrator
                .analyze_many(texts(&["", " "]))
                .await
                .unwrap_err(),
            ClassifierError::AllInputsInvalid
        );
    }
}
