//! Analyze Routes
//!
//! - POST /api/v1/analyze - Classify one text
//! - POST /api/v1/batch-analyze - Classify up to `max_batch_size` texts

use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{
    AnalyzeRequest, AnalyzeResponse, BatchAnalyzeRequest, BatchAnalyzeResponse, SentimentResult,
    SentimentResultWithScores,
};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// POST /api/v1/analyze
///
/// Classification succeeds even when the record cannot be saved.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let text = validate_text(&req.text, state.config.max_text_length)?;

    let outcome = state
        .orchestrator
        .analyze_one(text, req.return_all_scores)
        .await?;

    let analysis = outcome.analysis;
    let timestamp = Utc::now();
    let response = match analysis.predictions {
        Some(predictions) => AnalyzeResponse::WithScores(SentimentResultWithScores {
            text: analysis.text,
            predictions,
            timestamp,
        }),
        None => AnalyzeResponse::Single(SentimentResult {
            text: analysis.text,
            label: analysis.label,
            score: analysis.score,
            timestamp,
        }),
    };

    Ok(Json(response))
}

/// POST /api/v1/batch-analyze
///
/// Empty entries are dropped; results keep the order of the remaining texts.
pub async fn batch_analyze(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchAnalyzeRequest>,
) -> ApiResult<Json<BatchAnalyzeResponse>> {
    let texts = validate_batch(req.texts, &state)?;

    let outcome = state.orchestrator.analyze_many(texts).await?;

    let timestamp = Utc::now();
    let results: Vec<SentimentResult> = outcome
        .results
        .into_iter()
        .map(|item| SentimentResult {
            text: item.text,
            label: item.label,
            score: item.score,
            timestamp,
        })
        .collect();

    Ok(Json(BatchAnalyzeResponse {
        total_analyzed: results.len(),
        results,
        processing_time_ms: (outcome.total_time_ms * 100.0).round() / 100.0,
    }))
}

/// Trim and bound a single text
fn validate_text(text: &str, max_length: usize) -> ApiResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation(
            "Text cannot be empty or only whitespace".to_string(),
        ));
    }
    let length = trimmed.chars().count();
    if length > max_length {
        return Err(ApiError::Validation(format!(
            "Text is {} characters; maximum is {}",
            length, max_length
        )));
    }
    Ok(trimmed)
}

/// Bound the batch and trim every entry, keeping empty ones for the classifier to drop
fn validate_batch(texts: Vec<String>, state: &AppState) -> ApiResult<Vec<String>> {
    if texts.is_empty() {
        return Err(ApiError::Validation("Text list cannot be empty".to_string()));
    }
    if texts.len() > state.config.max_batch_size {
        return Err(ApiError::Validation(format!(
            "Batch of {} texts exceeds maximum of {}",
            texts.len(),
            state.config.max_batch_size
        )));
    }

    let trimmed: Vec<String> = texts.iter().map(|t| t.trim().to_string()).collect();
    if trimmed.iter().all(String::is_empty) {
        return Err(ApiError::Validation(
            "At least one text must be non-empty".to_string(),
        ));
    }
    if let Some((index, text)) = trimmed
        .iter()
        .enumerate()
        .find(|(_, t)| t.chars().count() > state.config.max_text_length)
    {
        return Err(ApiError::Validation(format!(
            "Text at index {} is {} characters; maximum is {}",
            index,
            text.chars().count(),
            state.config.max_text_length
        )));
    }

    Ok(trimmed)
}
