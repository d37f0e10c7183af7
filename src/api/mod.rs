//! Sentiscope REST API
//!
//! HTTP API layer for Sentiscope, built with Axum.
//!
//! # Endpoints
//!
//! ## Analysis
//! - `POST /api/v1/analyze` - Classify one text
//! - `POST /api/v1/batch-analyze` - Classify a list of texts
//! - `GET /api/v1/model-info` - Model description
//!
//! ## History
//! - `GET /api/v1/history` - Paginated, filtered history
//! - `GET /api/v1/search` - Text search
//! - `GET /api/v1/recent` - Most recent analyses
//! - `GET /api/v1/analyses/:id` - One analysis
//! - `DELETE /api/v1/analyses/:id` - Delete an analysis
//! - `GET /api/v1/export` - CSV / NDJSON export
//!
//! ## Statistics
//! - `GET /api/v1/stats` - Aggregates
//! - `GET /api/v1/stats/timeline` - Gap-filled per-day counts
//! - `GET /api/v1/stats/daily` - Materialized daily rollups
//! - `POST /api/v1/stats/rollup` - Recompute rollups
//!
//! ## Health
//! - `GET /` - Service name, version and endpoint list
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health`, `GET /api/v1/health` - Full health status
//!
//! # Example
//!
//! ```rust,no_run
//! use sentiscope::api::{serve, ApiConfig, AppState};
//! use sentiscope::classifier::{ClassifierConfig, ClassifierResource};
//! use sentiscope::storage::open_store;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let classifier = Arc::new(ClassifierResource::new(ClassifierConfig::default()));
//!     classifier.initialize()?;
//!     let store = open_store("sqlite://./sentiscope.db")?;
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(classifier, store, config.clone());
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{ApiConfig, AppState};

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

/// Request bodies above this are rejected before parsing (1 MB)
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Analysis routes
        .route("/analyze", post(routes::analyze::analyze))
        .route("/batch-analyze", post(routes::analyze::batch_analyze))
        .route("/model-info", get(routes::health::model_info))
        .route("/health", get(routes::health::full_health))
        // History routes
        .route("/history", get(routes::history::get_history))
        .route("/search", get(routes::history::search))
        .route("/recent", get(routes::history::recent))
        .route(
            "/analyses/:id",
            get(routes::history::get_analysis).delete(routes::history::delete_analysis),
        )
        // Export routes
        .route("/export", get(routes::export::export_data))
        // Statistics routes
        .route("/stats", get(routes::stats::get_stats))
        .route("/stats/timeline", get(routes::stats::get_timeline))
        .route("/stats/daily", get(routes::stats::get_daily_stats))
        .route("/stats/rollup", post(routes::stats::trigger_rollup))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config.cors_origins);

    // Create shared state
    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(routes::health::service_info))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(middleware::from_fn(process_time))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// Permissive when no origins are configured, otherwise an allow-list
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}

/// Adds `x-process-time-ms` to every response
async fn process_time(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}", elapsed_ms)) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-process-time-ms"), value);
    }
    response
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Sentiscope API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Sentiscope API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
