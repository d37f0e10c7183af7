//! # Sentiscope
//!
//! Sentiment classification service. Every outcome is recorded, and the
//! recorded history backs searches, statistics and daily rollups.
//!
//! ## Features
//!
//! - **Single process-wide classifier**: initialized once, shared by every request
//! - **Best-effort recording**: analyses succeed even when storage is down
//! - **History and search**: filtered, paginated views over past analyses
//! - **Statistics**: windowed aggregates, per-day timelines and idempotent daily rollups
//!
//! ## Modules
//!
//! - [`classifier`]: Classifier resource and the built-in lexicon model
//! - [`analysis`]: Classify-then-record orchestration
//! - [`storage`]: Record store trait with SQLite and in-memory engines
//! - [`stats`]: Statistics engine and background rollup scheduler
//! - [`api`]: REST API server with Axum
//! - [`config`]: File and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sentiscope::analysis::AnalysisOrchestrator;
//! use sentiscope::classifier::{ClassifierConfig, ClassifierResource};
//! use sentiscope::storage::open_store;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = open_store("memory")?;
//!     let classifier = Arc::new(ClassifierResource::new(ClassifierConfig::default()));
//!     classifier.initialize()?;
//!
//!     let orchestrator = AnalysisOrchestrator::new(classifier, store, 8);
//!     let outcome = orchestrator.analyze_one("What a great day", false).await?;
//!
//!     println!("{} ({:.4})", outcome.analysis.label, outcome.analysis.score);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod api;
pub mod classifier;
pub mod config;
pub mod stats;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    open_store, AnalysisFilter, AnalysisRecord, DailyStat, Label, NewAnalysis, RecordStore,
    StorageError, StorageResult,
};

pub use classifier::{
    ClassifierConfig, ClassifierError, ClassifierResource, DeviceSelection, ModelInfo,
    ResourceState,
};

pub use analysis::{AnalysisOrchestrator, AnalysisOutcome, BatchOutcome, Persistence};

pub use stats::{
    AnalysisStats, RollupScheduler, RollupStatus, StatisticsEngine, StatsError, Timeline,
};

pub use api::{build_router, serve, ApiConfig, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig, RollupConfig, StorageConfig};
