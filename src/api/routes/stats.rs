//! Statistics Routes
//!
//! - GET /api/v1/stats - Aggregates, optionally over the trailing N days
//! - GET /api/v1/stats/timeline - Gap-filled per-day counts
//! - GET /api/v1/stats/daily - Materialized daily rollups
//! - POST /api/v1/stats/rollup - Recompute rollups now

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{
    DailyStatsParams, DailyStatsResponse, RollupRequest, RollupResponse, StatsParams,
    TimelineParams,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::stats::{AnalysisStats, Timeline};

const MAX_STATS_DAYS: u32 = 365;
const MAX_TIMELINE_DAYS: u32 = 90;

/// GET /api/v1/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsParams>,
) -> ApiResult<Json<AnalysisStats>> {
    let stats = match params.days {
        Some(days) => {
            check_days(days, MAX_STATS_DAYS)?;
            state.stats.compute_stats_for_days(days).await?
        }
        None => state.stats.compute_stats(None, None).await?,
    };
    Ok(Json(stats))
}

/// GET /api/v1/stats/timeline
pub async fn get_timeline(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TimelineParams>,
) -> ApiResult<Json<Timeline>> {
    check_days(params.days, MAX_TIMELINE_DAYS)?;
    Ok(Json(state.stats.compute_timeline(params.days).await?))
}

/// GET /api/v1/stats/daily
pub async fn get_daily_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DailyStatsParams>,
) -> ApiResult<Json<DailyStatsResponse>> {
    check_days(params.days, MAX_STATS_DAYS)?;
    let stats = state.stats.daily_stats(params.days).await?;
    Ok(Json(DailyStatsResponse {
        days: params.days,
        stats,
    }))
}

/// POST /api/v1/stats/rollup
///
/// Body is optional; an empty body rolls up today.
pub async fn trigger_rollup(
    State(state): State<Arc<AppState>>,
    body: Option<Json<RollupRequest>>,
) -> ApiResult<Json<RollupResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let today = Utc::now().date_naive();

    let (from, to) = match (req.date, req.from, req.to) {
        (Some(date), None, None) => (date, date),
        (None, from, to) => (from.unwrap_or(today), to.unwrap_or(today)),
        _ => {
            return Err(ApiError::Validation(
                "Use either date or from/to, not both".to_string(),
            ))
        }
    };

    let stats = state.stats.rollup_range(from, to).await?;
    tracing::info!(%from, %to, days_rolled = stats.len(), "Manual rollup");

    Ok(Json(RollupResponse {
        from,
        to,
        days_rolled: stats.len(),
        stats,
    }))
}

fn check_days(days: u32, max: u32) -> ApiResult<()> {
    if days < 1 || days > max {
        return Err(ApiError::Validation(format!(
            "days must be between 1 and {}",
            max
        )));
    }
    Ok(())
}
