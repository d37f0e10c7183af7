//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{ModelInfo, Prediction};
use crate::stats::RollupStatus;
use crate::storage::{AnalysisRecord, DailyStat, Label};

// ============================================
// ANALYZE DTOs
// ============================================

/// Single text analysis request
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Text to classify (trimmed before use)
    pub text: String,
    /// Return the score of every label instead of the top one
    #[serde(default)]
    pub return_all_scores: bool,
}

/// Top-label result for one text
#[derive(Debug, Serialize)]
pub struct SentimentResult {
    pub text: String,
    pub label: Label,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// All-label result for one text
#[derive(Debug, Serialize)]
pub struct SentimentResultWithScores {
    pub text: String,
    pub predictions: Vec<Prediction>,
    pub timestamp: DateTime<Utc>,
}

/// Response of `POST /analyze`; the shape depends on `return_all_scores`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Single(SentimentResult),
    WithScores(SentimentResultWithScores),
}

/// Batch analysis request
#[derive(Debug, Deserialize)]
pub struct BatchAnalyzeRequest {
    pub texts: Vec<String>,
    /// Accepted for symmetry with `/analyze`; batch results carry the top label
    #[serde(default)]
    pub return_all_scores: bool,
}

/// Batch analysis response
#[derive(Debug, Serialize)]
pub struct BatchAnalyzeResponse {
    /// Number of valid texts classified
    pub total_analyzed: usize,
    /// Results in request order, empty texts dropped
    pub results: Vec<SentimentResult>,
    /// Wall-clock time of the whole batch
    pub processing_time_ms: f64,
}

// ============================================
// HEALTH / MODEL DTOs
// ============================================

/// Service description served at the root path
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub message: &'static str,
    pub version: &'static str,
    pub health: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Full health status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy", "degraded" (storage down) or "unhealthy" (classifier not ready)
    pub status: String,
    pub model_loaded: bool,
    pub model_info: Option<ModelInfo>,
    /// Classifier lifecycle state
    pub classifier: String,
    /// "ok" or "error"
    pub storage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollup: Option<RollupStatus>,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

/// What the service can do with the loaded model
#[derive(Debug, Serialize)]
pub struct Capabilities {
    pub single_analysis: bool,
    pub batch_analysis: bool,
    pub return_all_scores: bool,
    pub max_batch_size: usize,
    pub max_text_length: usize,
}

/// Response of `GET /model-info`
#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model: ModelInfo,
    pub state: String,
    pub labels: Vec<Label>,
    pub capabilities: Capabilities,
}

// ============================================
// HISTORY DTOs
// ============================================

/// Query parameters for paginated history
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// POSITIVE or NEGATIVE
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub min_score: Option<f64>,
    /// ISO 8601, YYYY-MM-DD or relative like "now-7d"
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

/// One page of history
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Records matching the filter across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub analyses: Vec<AnalysisRecord>,
}

/// Query parameters for text search
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    50
}

/// Query parameters for the most recent records
#[derive(Debug, Deserialize)]
pub struct RecentParams {
    #[serde(default = "default_recent_limit")]
    pub limit: u32,
}

fn default_recent_limit() -> u32 {
    10
}

/// Response of `DELETE /analyses/:id`
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub id: i64,
    pub deleted: bool,
}

// ============================================
// STATS DTOs
// ============================================

/// Query parameters for `GET /stats`
#[derive(Debug, Deserialize)]
pub struct StatsParams {
    /// Limit to the trailing N days
    #[serde(default)]
    pub days: Option<u32>,
}

/// Query parameters for `GET /stats/timeline`
#[derive(Debug, Deserialize)]
pub struct TimelineParams {
    #[serde(default = "default_timeline_days")]
    pub days: u32,
}

fn default_timeline_days() -> u32 {
    7
}

/// Query parameters for `GET /stats/daily`
#[derive(Debug, Deserialize)]
pub struct DailyStatsParams {
    #[serde(default = "default_daily_days")]
    pub days: u32,
}

fn default_daily_days() -> u32 {
    30
}

/// Materialized rollups
#[derive(Debug, Serialize)]
pub struct DailyStatsResponse {
    pub days: u32,
    pub stats: Vec<DailyStat>,
}

/// Body of `POST /stats/rollup`
///
/// Either a single `date`, a `from`/`to` range, or nothing for today.
#[derive(Debug, Default, Deserialize)]
pub struct RollupRequest {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

/// Result of a manual rollup
#[derive(Debug, Serialize)]
pub struct RollupResponse {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Days that had records and were upserted
    pub days_rolled: usize,
    pub stats: Vec<DailyStat>,
}

// ============================================
// EXPORT DTOs
// ============================================

/// Export query parameters
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    /// Output format: csv or ndjson
    #[serde(default = "default_export_format")]
    pub format: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub min_score: Option<f64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

fn default_export_format() -> String {
    "csv".to_string()
}
