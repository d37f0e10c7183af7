//! Core data types for the sentiscope record store
//!
//! - `Label`: the fixed sentiment label set
//! - `AnalysisRecord` / `NewAnalysis`: one classification event, stored and pending
//! - `DailyStat`: per-calendar-day rollup keyed by UTC date
//! - `AnalysisFilter`: history filter used by list/count/export

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::storage::error::StorageError;

/// Sentiment label produced by the classifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Positive,
    Negative,
}

impl Label {
    /// Get all labels for iteration
    pub fn all() -> &'static [Label] {
        &[Label::Positive, Label::Negative]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Positive => "POSITIVE",
            Label::Negative => "NEGATIVE",
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Label {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "POSITIVE" => Ok(Label::Positive),
            "NEGATIVE" => Ok(Label::Negative),
            other => Err(StorageError::InvalidRecord(format!(
                "Unknown label: {}. Use POSITIVE or NEGATIVE",
                other
            ))),
        }
    }
}

/// A stored classification event
///
/// Created exactly once after a successful classification and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    /// Monotonically assigned identifier
    pub id: i64,
    /// The analyzed input
    pub text: String,
    pub label: Label,
    /// Confidence in [0, 1]
    pub score: f64,
    /// Assignment time (UTC, millisecond precision)
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processing_time_ms: Option<f64>,
    #[serde(default)]
    pub model_name: Option<String>,
    pub is_batch: bool,
}

/// A record waiting to be written; the store assigns `id` and `created_at`
#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalysis {
    pub text: String,
    pub label: Label,
    pub score: f64,
    pub processing_time_ms: Option<f64>,
    pub model_name: Option<String>,
    pub is_batch: bool,
    /// Explicit creation time for backfills; `None` means "now"
    pub created_at: Option<DateTime<Utc>>,
}

impl NewAnalysis {
    pub fn new(text: impl Into<String>, label: Label, score: f64) -> Self {
        Self {
            text: text.into(),
            label,
            score,
            processing_time_ms: None,
            model_name: None,
            is_batch: false,
            created_at: None,
        }
    }

    /// Builder: set processing time
    pub fn processing_time(mut self, ms: f64) -> Self {
        self.processing_time_ms = Some(ms);
        self
    }

    /// Builder: set model name
    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// Builder: mark as part of a batch request
    pub fn batch(mut self, is_batch: bool) -> Self {
        self.is_batch = is_batch;
        self
    }

    /// Builder: set an explicit creation time
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Check the record invariants before anything is written
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.text.trim().is_empty() {
            return Err(StorageError::InvalidRecord("text cannot be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(StorageError::InvalidRecord(format!(
                "score {} is outside [0, 1]",
                self.score
            )));
        }
        if let Some(ms) = self.processing_time_ms {
            if !ms.is_finite() || ms < 0.0 {
                return Err(StorageError::InvalidRecord(format!(
                    "processing time {} must be a non-negative number",
                    ms
                )));
            }
        }
        Ok(())
    }

    /// Materialize into a stored record
    pub fn into_record(self, id: i64, now: DateTime<Utc>) -> AnalysisRecord {
        let created_at = truncate_millis(self.created_at.unwrap_or(now));
        AnalysisRecord {
            id,
            text: self.text,
            label: self.label,
            score: self.score,
            created_at,
            processing_time_ms: self.processing_time_ms,
            model_name: self.model_name,
            is_batch: self.is_batch,
        }
    }
}

/// Materialized per-day aggregate
///
/// At most one exists per `date`; recomputation updates it in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub total_analyses: u64,
    pub positive_count: u64,
    pub negative_count: u64,
    /// `None` iff no contributing records
    pub average_score: Option<f64>,
    /// `None` iff no contributing record carried a processing time
    pub average_processing_time: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyStat {
    /// Aggregate values only, ignoring bookkeeping timestamps
    pub fn same_aggregates(&self, other: &DailyStat) -> bool {
        self.date == other.date
            && self.total_analyses == other.total_analyses
            && self.positive_count == other.positive_count
            && self.negative_count == other.negative_count
            && self.average_score.map(f64::to_bits) == other.average_score.map(f64::to_bits)
            && self.average_processing_time.map(f64::to_bits)
                == other.average_processing_time.map(f64::to_bits)
    }
}

/// Filter for history queries
///
/// `start` and `end` are both inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisFilter {
    pub label: Option<Label>,
    pub min_score: Option<f64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AnalysisFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: filter by label
    pub fn label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    /// Builder: filter by minimum score
    pub fn min_score(mut self, score: f64) -> Self {
        self.min_score = Some(score);
        self
    }

    /// Builder: records created at or after `start`
    pub fn since(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Builder: records created at or before `end`
    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.min_score.is_none() && self.start.is_none() && self.end.is_none()
    }

    /// Check if a record passes this filter
    pub fn matches(&self, record: &AnalysisRecord) -> bool {
        if let Some(label) = self.label {
            if record.label != label {
                return false;
            }
        }
        if let Some(min) = self.min_score {
            if record.score < min {
                return false;
            }
        }
        // Millisecond comparison, matching the SQLite column
        let created = record.created_at.timestamp_millis();
        if let Some(start) = self.start {
            if created < start.timestamp_millis() {
                return false;
            }
        }
        if let Some(end) = self.end {
            if created > end.timestamp_millis() {
                return false;
            }
        }
        true
    }
}

/// UTC bounds `[00:00, 24:00)` of a calendar day
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN));
    (start, start + Duration::days(1))
}

/// Drop sub-millisecond precision so in-memory and SQLite records agree
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(ts.timestamp_millis())
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
