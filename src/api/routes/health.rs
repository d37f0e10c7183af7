//! Health Routes
//!
//! Health check endpoints for monitoring and orchestration probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (classifier ready)
//! - GET /health and GET /api/v1/health - Full health status
//! - GET /api/v1/model-info - Model description
//! - GET / - Service name, version and endpoint list
//!
//! None of these ever fail; problems are reported in the body.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{Capabilities, HealthResponse, ModelInfoResponse, ServiceInfo};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::classifier::ResourceState;

/// Routes listed by the root endpoint
const ENDPOINTS: &[&str] = &[
    "POST /api/v1/analyze",
    "POST /api/v1/batch-analyze",
    "GET /api/v1/model-info",
    "GET /api/v1/history",
    "GET /api/v1/search",
    "GET /api/v1/recent",
    "GET /api/v1/analyses/:id",
    "DELETE /api/v1/analyses/:id",
    "GET /api/v1/export",
    "GET /api/v1/stats",
    "GET /api/v1/stats/timeline",
    "GET /api/v1/stats/daily",
    "POST /api/v1/stats/rollup",
    "GET /api/v1/health",
    "GET /health/live",
    "GET /health/ready",
];

/// GET /
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "sentiscope",
        message: "Sentiment analysis API",
        version: env!("CARGO_PKG_VERSION"),
        health: "/api/v1/health",
        endpoints: ENDPOINTS.to_vec(),
    })
}

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Returns 200 once the classifier is ready to serve.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.classifier.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with component details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let classifier_state = state.classifier.state();
    let model_loaded = classifier_state == ResourceState::Ready;
    let model_info = if model_loaded {
        state.classifier.describe().ok()
    } else {
        None
    };

    let storage_ok = check_storage_health(&state).await;

    let status = match (model_loaded, storage_ok) {
        (true, true) => "healthy",
        (true, false) => "degraded",
        (false, _) => "unhealthy",
    };

    let rollup = match &state.scheduler {
        Some(scheduler) => Some(scheduler.status().await),
        None => None,
    };

    Json(HealthResponse {
        status: status.to_string(),
        model_loaded,
        model_info,
        classifier: classifier_state.to_string(),
        storage: if storage_ok { "ok" } else { "error" }.to_string(),
        rollup,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

/// GET /api/v1/model-info
pub async fn model_info(State(state): State<Arc<AppState>>) -> ApiResult<Json<ModelInfoResponse>> {
    let model = state.classifier.describe()?;
    let labels = match state.classifier.ready_handle() {
        Some(handle) => handle.labels().to_vec(),
        None => crate::storage::Label::all().to_vec(),
    };

    Ok(Json(ModelInfoResponse {
        model,
        state: state.classifier.state().to_string(),
        labels,
        capabilities: Capabilities {
            single_analysis: true,
            batch_analysis: true,
            return_all_scores: true,
            max_batch_size: state.config.max_batch_size,
            max_text_length: state.config.max_text_length,
        },
    }))
}

/// A cheap count proves the store answers
async fn check_storage_health(state: &AppState) -> bool {
    match state.store.count().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, engine = state.store.engine(), "Storage health check failed");
            false
        }
    }
}
