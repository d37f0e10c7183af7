//! Sentiscope record storage
//!
//! - **types**: Data model (AnalysisRecord, DailyStat, Label, AnalysisFilter)
//! - **store**: The `RecordStore` repository trait and `open_store`
//! - **sqlite**: Durable SQLite engine
//! - **memory**: In-memory engine for tests and ephemeral runs
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   AnalysisOrchestrator → RecordStore::create (best effort)
//!   StatisticsEngine     → RecordStore::upsert_daily_stat (ON CONFLICT(date))
//!
//! Read Path:
//!   History / Search / Export → RecordStore::list | search | count_filtered
//!   StatisticsEngine          → RecordStore::records_between
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use sentiscope::storage::{open_store, AnalysisFilter, Label, NewAnalysis};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = open_store("sqlite://./sentiscope.db")?;
//!
//!     store.create(NewAnalysis::new("Great!", Label::Positive, 0.99)).await?;
//!
//!     let positives = store
//!         .list(&AnalysisFilter::new().label(Label::Positive), 0, 20)
//!         .await?;
//!     println!("{} positive analyses", positives.len());
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{open_store, RecordStore};
pub use types::{day_bounds, AnalysisFilter, AnalysisRecord, DailyStat, Label, NewAnalysis};
