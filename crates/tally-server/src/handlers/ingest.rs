//! Incremental ingestion handler

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::Value;
use tracing::info;

use crate::{AppError, AppState};
use tally_core::ingest::Ingestor;
use tally_core::models::IngestReport;

/// POST /api/ingest - Append a batch of raw extraction records
///
/// Accepts a JSON array of records. Existing data is kept; records that
/// fail are listed in the report.
pub async fn ingest_records(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<Json<IngestReport>, AppError> {
    let Value::Array(records) = body else {
        return Err(AppError::bad_request("Expected a JSON array of records"));
    };

    let report = Ingestor::new(&state.db)
        .ingest_incremental(&records)
        .map_err(AppError::from_core)?;

    info!(
        received = records.len(),
        created = report.created_count,
        failed = report.errors.len(),
        "Ingested batch"
    );
    Ok(Json(report))
}
