//! History Routes
//!
//! Paginated, filtered and searchable access to stored analyses.
//!
//! - GET /api/v1/history - Paginated history
//! - GET /api/v1/search - Case-insensitive text search
//! - GET /api/v1/recent - Most recent analyses
//! - GET /api/v1/analyses/:id - One analysis
//! - DELETE /api/v1/analyses/:id - Remove one analysis

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;

use crate::api::dto::{
    DeleteResponse, HistoryParams, HistoryResponse, RecentParams, SearchParams,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::storage::{AnalysisFilter, AnalysisRecord, Label};

/// Largest `limit` accepted by search and recent
const MAX_LIMIT: u32 = 100;

/// GET /api/v1/history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<HistoryResponse>> {
    if params.page < 1 {
        return Err(ApiError::Validation("page must be at least 1".to_string()));
    }
    if params.page_size < 1 || params.page_size > state.config.max_page_size {
        return Err(ApiError::Validation(format!(
            "page_size must be between 1 and {}",
            state.config.max_page_size
        )));
    }

    let filter = build_filter(
        params.label.as_deref(),
        params.min_score,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    )?;

    let skip = (params.page as usize - 1) * params.page_size as usize;
    let analyses = state
        .store
        .list(&filter, skip, params.page_size as usize)
        .await?;
    let total = state.store.count_filtered(&filter).await?;

    Ok(Json(HistoryResponse {
        total,
        page: params.page,
        page_size: params.page_size,
        analyses,
    }))
}

/// GET /api/v1/search
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<AnalysisRecord>>> {
    let term = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::Validation("q is required".to_string()))?;
    let limit = validate_limit(params.limit)?;

    Ok(Json(state.store.search(term, limit).await?))
}

/// GET /api/v1/recent
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> ApiResult<Json<Vec<AnalysisRecord>>> {
    let limit = validate_limit(params.limit)?;
    Ok(Json(state.store.recent(limit).await?))
}

/// GET /api/v1/analyses/:id
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AnalysisRecord>> {
    Ok(Json(state.store.get(id).await?))
}

/// DELETE /api/v1/analyses/:id
pub async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    if !state.store.delete(id).await? {
        return Err(ApiError::NotFound(format!("analysis {}", id)));
    }

    tracing::info!(id, "Deleted analysis");
    Ok(Json(DeleteResponse { id, deleted: true }))
}

fn validate_limit(limit: u32) -> ApiResult<usize> {
    if limit < 1 || limit > MAX_LIMIT {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    Ok(limit as usize)
}

/// Build a record filter from raw query parameters
pub(crate) fn build_filter(
    label: Option<&str>,
    min_score: Option<f64>,
    start: Option<&str>,
    end: Option<&str>,
) -> ApiResult<AnalysisFilter> {
    let mut filter = AnalysisFilter::new();

    if let Some(label) = label.filter(|l| !l.trim().is_empty()) {
        let label: Label = label
            .parse()
            .map_err(|e: crate::storage::StorageError| ApiError::Validation(e.to_string()))?;
        filter = filter.label(label);
    }

    if let Some(min) = min_score {
        if !(0.0..=1.0).contains(&min) {
            return Err(ApiError::Validation(
                "min_score must be between 0 and 1".to_string(),
            ));
        }
        filter = filter.min_score(min);
    }

    if let Some(start) = start {
        filter = filter.since(parse_timestamp(start)?);
    }
    if let Some(end) = end {
        filter = filter.until(parse_timestamp(end)?);
    }
    if let (Some(s), Some(e)) = (filter.start, filter.end) {
        if s > e {
            return Err(ApiError::Validation(
                "start_date must not be after end_date".to_string(),
            ));
        }
    }

    Ok(filter)
}

/// Parse "now", "now-<n><h|d|w|m>", RFC 3339 or YYYY-MM-DD (UTC midnight)
pub(crate) fn parse_timestamp(s: &str) -> ApiResult<DateTime<Utc>> {
    let s = s.trim();

    if s.starts_with("now") {
        let now = Utc::now();
        if s == "now" {
            return Ok(now);
        }

        let re = regex::Regex::new(r"^now-(\d+)([hdwm])$")
            .map_err(|_| ApiError::Internal("Regex error".to_string()))?;

        if let Some(caps) = re.captures(s) {
            let amount: i64 = caps[1]
                .parse()
                .map_err(|_| ApiError::Validation("Invalid number".to_string()))?;

            let offset = match &caps[2] {
                "h" => Duration::try_hours(amount),
                "d" => Duration::try_days(amount),
                "w" => Duration::try_weeks(amount),
                "m" => Duration::try_days(amount.saturating_mul(30)),
                _ => None,
            }
            .ok_or_else(|| ApiError::Validation(format!("Offset out of range: {}", s)))?;

            return now
                .checked_sub_signed(offset)
                .ok_or_else(|| ApiError::Validation(format!("Offset out of range: {}", s)));
        }

        return Err(ApiError::Validation(format!("Cannot parse time: {}", s)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    Err(ApiError::Validation(format!("Cannot parse timestamp: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("2024-03-10").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2024-03-10T12:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 10, 10, 30, 0).unwrap()
        );

        let week_ago = parse_timestamp("now-7d").unwrap();
        let expected = Utc::now() - Duration::days(7);
        assert!((week_ago - expected).num_seconds().abs() < 5);

        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_timestamp("now-3y").is_err());
    }

    #[test]
    fn test_parse_timestamp_huge_offset() {
        for input in ["now-99999999999d", "now-9999999999999w", "now-9223372036854775807m"] {
            match parse_timestamp(input) {
                Err(ApiError::Validation(_)) => {}
                other => panic!("{} parsed as {:?}", input, other),
            }
        }
        assert!(build_filter(None, None, Some("now-99999999999d"), None).is_err());

        // The last calendar day has no following midnight
        let last_day = NaiveDate::MAX.format("%Y-%m-%d").to_string();
        assert_eq!(parse_timestamp(&last_day).unwrap().date_naive(), NaiveDate::MAX);
    }

    #[test]
    fn test_build_filter() {
        let filter = build_filter(Some("positive"), Some(0.5), None, None).unwrap();
        assert_eq!(filter.label, Some(Label::Positive));
        assert_eq!(filter.min_score, Some(0.5));

        assert!(build_filter(Some("NEUTRAL"), None, None, None).is_err());
        assert!(build_filter(None, Some(1.5), None, None).is_err());
        assert!(build_filter(None, None, Some("2024-02-01"), Some("2024-01-01")).is_err());
        assert!(build_filter(None, None, None, None).unwrap().is_empty());
    }
}
