//! Export Routes
//!
//! Data export endpoint for backup and offline analysis.
//!
//! - GET /api/v1/export - Filtered history as CSV or NDJSON

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::ExportParams;
use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::history::build_filter;
use crate::api::state::AppState;
use crate::storage::{AnalysisFilter, AnalysisRecord, RecordStore};

/// Records fetched from the store per page while exporting
const EXPORT_PAGE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExportFormat {
    Csv,
    Ndjson,
}

impl ExportFormat {
    fn parse(s: &str) -> ApiResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "ndjson" | "jsonl" => Ok(ExportFormat::Ndjson),
            other => Err(ApiError::Validation(format!(
                "Unknown export format '{}'. Use csv or ndjson",
                other
            ))),
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv",
            ExportFormat::Ndjson => "application/x-ndjson",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Ndjson => "ndjson",
        }
    }
}

/// GET /api/v1/export
///
/// Export every record matching the history filters, newest first.
pub async fn export_data(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let format = ExportFormat::parse(&params.format)?;
    let filter = build_filter(
        params.label.as_deref(),
        params.min_score,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    )?;

    let records = fetch_all(state.store.as_ref(), &filter).await?;

    let body = match format {
        ExportFormat::Csv => format_csv(&records)?,
        ExportFormat::Ndjson => format_ndjson(&records)?,
    };

    tracing::info!(records = records.len(), format = format.extension(), "Exported analyses");

    let filename = format!(
        "sentiscope_export_{}.{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        format.extension()
    );

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(body),
    )
        .into_response())
}

/// Page through the store until the filter is exhausted
async fn fetch_all(
    store: &dyn RecordStore,
    filter: &AnalysisFilter,
) -> ApiResult<Vec<AnalysisRecord>> {
    let mut records = Vec::new();
    loop {
        let page = store.list(filter, records.len(), EXPORT_PAGE).await?;
        let done = page.len() < EXPORT_PAGE;
        records.extend(page);
        if done {
            return Ok(records);
        }
    }
}

/// Format as CSV with a header row
fn format_csv(records: &[AnalysisRecord]) -> ApiResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            "id",
            "created_at",
            "label",
            "score",
            "processing_time_ms",
            "model_name",
            "is_batch",
            "text",
        ])
        .map_err(|e| ApiError::Internal(format!("CSV write failed: {}", e)))?;

    for record in records {
        writer
            .write_record([
                record.id.to_string(),
                record.created_at.to_rfc3339(),
                record.label.to_string(),
                record.score.to_string(),
                record
                    .processing_time_ms
                    .map(|ms| ms.to_string())
                    .unwrap_or_default(),
                record.model_name.clone().unwrap_or_default(),
                record.is_batch.to_string(),
                record.text.clone(),
            ])
            .map_err(|e| ApiError::Internal(format!("CSV write failed: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ApiError::Internal(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| ApiError::Internal(format!("CSV encoding: {}", e)))
}

/// Format as newline-delimited JSON
fn format_ndjson(records: &[AnalysisRecord]) -> ApiResult<String> {
    let mut ndjson = String::new();
    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| ApiError::Internal(format!("JSON encoding: {}", e)))?;
        ndjson.push_str(&line);
        ndjson.push('\n');
    }
    Ok(ndjson)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Label;
    use chrono::TimeZone;

    fn record(id: i64, text: &str) -> AnalysisRecord {
        AnalysisRecord {
            id,
            text: text.to_string(),
            label: Label::Positive,
            score: 0.75,
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            processing_time_ms: None,
            model_name: Some("m".to_string()),
            is_batch: false,
        }
    }

    #[test]
    fn test_csv_quotes_text() {
        let csv = format_csv(&[record(1, "Great, \"really\" great")]).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("id,created_at,label"));
        assert_eq!(
            lines.next().unwrap(),
            "1,2024-01-02T03:04:05+00:00,POSITIVE,0.75,,m,false,\"Great, \"\"really\"\" great\""
        );
    }

    #[test]
    fn test_ndjson_one_line_per_record() {
        let out = format_ndjson(&[record(1, "a"), record(2, "b")]).unwrap();
        assert_eq!(out.lines().count(), 2);
        let first: AnalysisRecord = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(first.id, 1);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(ExportFormat::parse("CSV").unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse("jsonl").unwrap(), ExportFormat::Ndjson);
        assert!(ExportFormat::parse("xml").is_err());
    }
}
