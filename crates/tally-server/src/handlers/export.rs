//! Delimited-text export handlers

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Response, StatusCode},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;

use crate::{AppError, AppState};
use tally_core::analytics::Analytics;
use tally_core::export::{self, ExportKind, InvoiceExportOptions, DEFAULT_EXPORT_LIMIT};

/// Query parameters for invoice export
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceExportQuery {
    /// Exact stored status
    pub status: Option<String>,
    /// Created on or after (YYYY-MM-DD or RFC 3339)
    pub start_date: Option<String>,
    /// Created on or before (YYYY-MM-DD covers the whole day, or RFC 3339)
    pub end_date: Option<String>,
    pub limit: Option<String>,
}

/// Parse a bound; a bare date expands to the start or end of that day
fn parse_bound(name: &str, value: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::bad_request(&format!("Invalid {} (use YYYY-MM-DD): {}", name, value))
    })?;
    let time = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| AppError::bad_request(&format!("Invalid {}: {}", name, value)))
}

impl InvoiceExportQuery {
    pub fn into_options(self) -> Result<InvoiceExportOptions, AppError> {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());

        let from = non_empty(self.start_date)
            .map(|s| parse_bound("startDate", &s, false))
            .transpose()?;
        let to = non_empty(self.end_date)
            .map(|s| parse_bound("endDate", &s, true))
            .transpose()?;
        let limit = match non_empty(self.limit) {
            None => DEFAULT_EXPORT_LIMIT,
            Some(s) => match s.trim().parse::<i64>() {
                Ok(n) if n >= 1 => n,
                _ => return Err(AppError::bad_request(&format!("Invalid limit: {}", s))),
            },
        };

        Ok(InvoiceExportOptions {
            status: non_empty(self.status),
            from,
            to,
            limit,
        })
    }
}

fn csv_response(kind: ExportKind, body: String) -> Result<Response<Body>, AppError> {
    let filename = export::export_filename(kind, Utc::now());
    info!(
        kind = %kind,
        rows = body.lines().count().saturating_sub(1),
        "Exported CSV"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from(body))
        .map_err(|e| AppError::internal(&e.to_string()))
}

/// GET /api/export/invoices/csv - Invoice export, newest first
pub async fn export_invoices_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InvoiceExportQuery>,
) -> Result<Response<Body>, AppError> {
    let options = params.into_options()?;
    let csv = export::invoices_csv(&state.db, &options).map_err(AppError::from_core)?;
    csv_response(ExportKind::Invoices, csv)
}

/// GET /api/export/vendors/csv - Vendor rollup export
pub async fn export_vendors_csv(
    State(state): State<Arc<AppState>>,
) -> Result<Response<Body>, AppError> {
    let analytics = Analytics::new(&state.db, state.analytics.clone());
    let csv = export::vendors_csv(&analytics).map_err(AppError::from_core)?;
    csv_response(ExportKind::Vendors, csv)
}

/// GET /api/export/analytics/csv - Monthly summary export
pub async fn export_analytics_csv(
    State(state): State<Arc<AppState>>,
) -> Result<Response<Body>, AppError> {
    let analytics = Analytics::new(&state.db, state.analytics.clone());
    let csv = export::analytics_csv(&analytics, Utc::now()).map_err(AppError::from_core)?;
    csv_response(ExportKind::Analytics, csv)
}
