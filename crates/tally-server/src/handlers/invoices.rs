//! Invoice list and detail handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::debug;

use crate::{AppError, AppState};
use tally_core::analytics::Analytics;
use tally_core::models::{InvoiceDetail, InvoicePage, InvoiceQuery, SortField, SortOrder};

/// Query parameters for listing invoices
///
/// Numbers arrive as text so a malformed value becomes a JSON 400 rather
/// than an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    /// Matches vendor name, invoice number or file name
    pub search: Option<String>,
    pub status: Option<String>,
    pub vendor: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

fn parse_number(name: &str, value: Option<&str>, default: i64) -> Result<i64, AppError> {
    match value.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| AppError::bad_request(&format!("Invalid {}: {}", name, s))),
    }
}

impl InvoiceListParams {
    /// Validate parameters into a store query
    pub fn into_query(self) -> Result<InvoiceQuery, AppError> {
        let defaults = InvoiceQuery::default();

        let sort_by = match self.sort_by.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s.parse::<SortField>().map_err(|e| AppError::bad_request(&e))?,
            None => defaults.sort_by,
        };
        let sort_order = match self.sort_order.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => s.parse::<SortOrder>().map_err(|e| AppError::bad_request(&e))?,
            None => defaults.sort_order,
        };

        Ok(InvoiceQuery {
            page: parse_number("page", self.page.as_deref(), defaults.page)?,
            limit: parse_number("limit", self.limit.as_deref(), defaults.limit)?,
            search: self.search,
            status: self.status.filter(|s| !s.is_empty()),
            vendor: self.vendor.filter(|s| !s.is_empty()),
            sort_by,
            sort_order,
        })
    }
}

/// GET /api/invoices - Paginated, filtered, sorted invoice list
pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InvoiceListParams>,
) -> Result<Json<InvoicePage>, AppError> {
    let query = params.into_query()?;
    debug!(?query, "Listing invoices");

    let page = Analytics::new(&state.db, state.analytics.clone())
        .list_invoices(&query)
        .map_err(AppError::from_core)?;
    Ok(Json(page))
}

/// GET /api/invoices/:id - Invoice with all related records
pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceDetail>, AppError> {
    let detail = Analytics::new(&state.db, state.analytics.clone())
        .invoice_detail(&id)
        .map_err(AppError::from_core)?;
    Ok(Json(detail))
}
