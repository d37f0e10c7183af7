//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::analysis::AnalysisOrchestrator;
use crate::classifier::ClassifierResource;
use crate::stats::{RollupScheduler, StatisticsEngine};
use crate::storage::RecordStore;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// The process-wide classifier
    pub classifier: Arc<ClassifierResource>,
    /// Classify-then-record pipeline
    pub orchestrator: Arc<AnalysisOrchestrator>,
    /// Record store for history, search and export
    pub store: Arc<dyn RecordStore>,
    /// Aggregates and rollups
    pub stats: Arc<StatisticsEngine>,
    /// Background rollup job, when one was started
    pub scheduler: Option<Arc<RollupScheduler>>,
    /// API configuration
    pub config: Arc<ApiConfig>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    /// Wire the orchestrator and statistics engine around a classifier and store
    pub fn new(
        classifier: Arc<ClassifierResource>,
        store: Arc<dyn RecordStore>,
        config: ApiConfig,
    ) -> Self {
        let batch_size = classifier.config().batch_size;
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            Arc::clone(&classifier),
            Arc::clone(&store),
            batch_size,
        ));
        let stats = Arc::new(StatisticsEngine::new(Arc::clone(&store)));

        Self {
            classifier,
            orchestrator,
            store,
            stats,
            scheduler: None,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Attach the rollup scheduler so its status shows up in health output
    pub fn with_scheduler(mut self, scheduler: Arc<RollupScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,
    /// Longest accepted text, in characters
    pub max_text_length: usize,
    /// Most texts accepted by one batch request
    pub max_batch_size: usize,
    /// Largest history page
    pub max_page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            max_text_length: 5000,
            max_batch_size: 100,
            max_page_size: 100,
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&crate::config::ApiConfig> for ApiConfig {
    fn from(config: &crate::config::ApiConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            cors_origins: config.cors_origins.clone(),
            max_text_length: config.max_text_length,
            max_batch_size: config.max_batch_size,
            max_page_size: config.max_page_size,
        }
    }
}
