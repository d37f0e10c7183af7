//! The classifier oracle seam
//!
//! An oracle maps text to a score per label. Everything about how it does
//! that (weights, tokenization, hardware) stays behind this trait.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::Label;

/// One label with its confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub score: f64,
}

impl Prediction {
    pub fn new(label: Label, score: f64) -> Self {
        Self { label, score }
    }
}

/// Errors raised by an oracle implementation
#[derive(Error, Debug)]
pub enum OracleError {
    /// The oracle could not be constructed (missing or malformed resources)
    #[error("Failed to load model: {0}")]
    Load(String),

    /// A single inference call failed
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// External text classification capability
pub trait SentimentOracle: Send + Sync {
    /// Identifier of the model version in use
    fn model_name(&self) -> &str;

    /// The label set this oracle can emit
    fn labels(&self) -> &[Label] {
        Label::all()
    }

    /// Score every input, returning one full label distribution per text,
    /// in input order
    fn predict(&self, texts: &[String]) -> Result<Vec<Vec<Prediction>>, OracleError>;

    /// Whether the oracle can run on an accelerator
    fn supports_accelerator(&self) -> bool {
        false
    }

    /// Whether `predict` may be called from several threads at once
    fn is_thread_safe(&self) -> bool {
        true
    }
}
