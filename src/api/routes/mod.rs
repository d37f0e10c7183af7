//! API Routes
//!
//! Route handlers organized by functionality.

pub mod analyze;
pub mod export;
pub mod health;
pub mod history;
pub mod stats;
