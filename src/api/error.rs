//! API Error Types
//!
//! Maps every lower-layer failure onto a stable error code and an HTTP
//! status. Storage and oracle internals are logged, not returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::stats::StatsError;
use crate::storage::StorageError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Classifier not ready or failed to load
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(String),

    /// Classifier loaded but the oracle call failed
    #[error("Classifier error: {0}")]
    ClassifierFailed(String),

    /// Read-path storage failure
    #[error("Storage error: {0}")]
    Persistence(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ClassifierUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ClassifierFailed(_)
            | ApiError::Persistence(_)
            | ApiError::Internal(_)
            | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ClassifierUnavailable(_) | ApiError::ClassifierFailed(_) => {
                "CLASSIFIER_UNAVAILABLE"
            }
            ApiError::Persistence(_) => "PERSISTENCE_ERROR",
            ApiError::Internal(_) | ApiError::Io(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to hand to clients
    fn public_message(&self) -> String {
        match self {
            ApiError::Validation(_) | ApiError::NotFound(_) => self.to_string(),
            ApiError::ClassifierUnavailable(_) => {
                "The sentiment classifier is not available".to_string()
            }
            ApiError::ClassifierFailed(_) => "Error processing request".to_string(),
            ApiError::Persistence(_) => "Error reading analysis data".to_string(),
            ApiError::Internal(_) | ApiError::Io(_) => "An unexpected error occurred".to_string(),
        }
    }
}

impl From<ClassifierError> for ApiError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::InvalidInput(_)
            | ClassifierError::EmptyBatch
            | ClassifierError::AllInputsInvalid => ApiError::Validation(err.to_string()),
            ClassifierError::NotInitialized | ClassifierError::Unavailable(_) => {
                ApiError::ClassifierUnavailable(err.to_string())
            }
            ClassifierError::Oracle(_) => ApiError::ClassifierFailed(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => ApiError::NotFound(format!("analysis {}", id)),
            other => ApiError::Persistence(other.to_string()),
        }
    }
}

impl From<StatsError> for ApiError {
    fn from(err: StatsError) -> Self {
        match err {
            StatsError::InvalidRange(msg) => ApiError::Validation(msg),
            StatsError::Storage(e) => e.into(),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::warn!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.public_message(),
            },
            request_id,
            timestamp: Utc::now(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
