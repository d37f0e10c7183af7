//! Sentiment classification
//!
//! - **oracle**: The `SentimentOracle` trait every model implements
//! - **lexicon**: Built-in deterministic word-polarity oracle
//! - **resource**: The lazily-initialized, process-wide `ClassifierResource`
//!
//! # Example
//!
//! ```rust,no_run
//! use sentiscope::classifier::{ClassifierConfig, ClassifierResource};
//!
//! let classifier = ClassifierResource::new(ClassifierConfig::default());
//! let result = classifier.classify("I love this product!").unwrap();
//! println!("{} ({:.4})", result.label, result.score);
//! ```

pub mod lexicon;
pub mod oracle;
pub mod resource;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::storage::Label;

pub use lexicon::LexiconOracle;
pub use oracle::{OracleError, Prediction, SentimentOracle};
pub use resource::{ClassifierHandle, ClassifierResource, OracleLoader, ResourceState};

/// Classification errors
///
/// Cloneable so an initialization failure can be kept and handed to every
/// later caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Text list cannot be empty")]
    EmptyBatch,

    #[error("No valid texts provided")]
    AllInputsInvalid,

    #[error("Classifier has not been initialized")]
    NotInitialized,

    #[error("Classifier unavailable: {0}")]
    Unavailable(String),

    #[error("Classifier error: {0}")]
    Oracle(String),
}

/// Top label for one text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: Label,
    pub score: f64,
}

/// One classified entry of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    pub text: String,
    pub label: Label,
    pub score: f64,
}

/// Static description of the loaded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub device: DeviceClass,
    pub cache_dir: String,
}

/// Requested device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSelection {
    #[default]
    Auto,
    Cpu,
    #[serde(alias = "cuda", alias = "gpu")]
    Accelerator,
}

impl DeviceSelection {
    /// Pick the concrete device given what the oracle can do
    pub fn resolve(self, accelerator_available: bool) -> DeviceClass {
        match self {
            DeviceSelection::Cpu => DeviceClass::Cpu,
            DeviceSelection::Auto | DeviceSelection::Accelerator if accelerator_available => {
                DeviceClass::Accelerator
            }
            DeviceSelection::Auto | DeviceSelection::Accelerator => DeviceClass::Cpu,
        }
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelection::Auto => write!(f, "auto"),
            DeviceSelection::Cpu => write!(f, "cpu"),
            DeviceSelection::Accelerator => write!(f, "accelerator"),
        }
    }
}

impl FromStr for DeviceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(DeviceSelection::Auto),
            "cpu" => Ok(DeviceSelection::Cpu),
            "accelerator" | "cuda" | "gpu" => Ok(DeviceSelection::Accelerator),
            other => Err(format!(
                "unknown device '{}' (expected auto, cpu or accelerator)",
                other
            )),
        }
    }
}

/// Device the classifier actually runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Accelerator,
    Cpu,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Accelerator => write!(f, "accelerator"),
            DeviceClass::Cpu => write!(f, "cpu"),
        }
    }
}

/// Classifier configuration (the `[classifier]` config section)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Model identifier reported with every stored analysis
    pub model_name: String,
    /// Where model resources (e.g. `lexicon.toml`) are looked up
    pub cache_dir: PathBuf,
    pub device: DeviceSelection,
    /// Texts per oracle call in batch classification
    pub batch_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_name: "sentiscope-lexicon-v1".to_string(),
            cache_dir: PathBuf::from("./models"),
            device: DeviceSelection::Auto,
            batch_size: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parsing() {
        assert_eq!("auto".parse::<DeviceSelection>().unwrap(), DeviceSelection::Auto);
        assert_eq!("CPU".parse::<DeviceSelection>().unwrap(), DeviceSelection::Cpu);
        assert_eq!(
            "cuda".parse::<DeviceSelection>().unwrap(),
            DeviceSelection::Accelerator
        );
        assert!("tpu".parse::<DeviceSelection>().is_err());
    }

    #[test]
    fn test_device_resolution() {
        assert_eq!(DeviceSelection::Auto.resolve(true), DeviceClass::Accelerator);
        assert_eq!(DeviceSelection::Auto.resolve(false), DeviceClass::Cpu);
        assert_eq!(DeviceSelection::Cpu.resolve(true), DeviceClass::Cpu);
        assert_eq!(DeviceSelection::Accelerator.resolve(false), DeviceClass::Cpu);
    }

    #[test]
    fn test_config_from_toml() {
        let config: ClassifierConfig =
            toml::from_str("device = \"gpu\"\nbatch_size = 16\n").unwrap();
        assert_eq!(config.device, DeviceSelection::Accelerator);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.model_name, "sentiscope-lexicon-v1");
    }
}
