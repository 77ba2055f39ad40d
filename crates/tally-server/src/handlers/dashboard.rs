//! Dashboard handlers: summary cards, trends, rollups and forecast

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::{AppError, AppState};
use tally_core::analytics::Analytics;
use tally_core::models::{
    CategorySpend, DashboardStats, MonthlyTrend, OutflowBucket, VendorSpend,
};

/// Number of vendors on the top-vendors chart
const TOP_VENDOR_COUNT: usize = 10;

fn analytics(state: &AppState) -> Analytics<'_> {
    Analytics::new(&state.db, state.analytics.clone())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
}

/// GET /health - Liveness probe
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
    })
}

/// GET /api/stats - Summary cards
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardStats>, AppError> {
    let stats = analytics(&state)
        .summary(Utc::now())
        .map_err(AppError::from_core)?;
    Ok(Json(stats))
}

/// GET /api/invoice-trends - Twelve-month volume and spend
pub async fn get_invoice_trends(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MonthlyTrend>>, AppError> {
    let trends = analytics(&state)
        .monthly_trends(Utc::now())
        .map_err(AppError::from_core)?;
    Ok(Json(trends))
}

/// GET /api/vendors - Spend per vendor
pub async fn get_vendors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VendorSpend>>, AppError> {
    let vendors = analytics(&state)
        .vendor_spend()
        .map_err(AppError::from_core)?;
    Ok(Json(vendors))
}

/// GET /api/vendors/top10 - Highest-spend vendors
pub async fn get_top_vendors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VendorSpend>>, AppError> {
    let vendors = analytics(&state)
        .top_vendors(TOP_VENDOR_COUNT)
        .map_err(AppError::from_core)?;
    Ok(Json(vendors))
}

/// GET /api/category-spend - Spend per category
pub async fn get_category_spend(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CategorySpend>>, AppError> {
    let categories = analytics(&state)
        .category_spend()
        .map_err(AppError::from_core)?;
    Ok(Json(categories))
}

/// GET /api/cash-outflow - Expected outflow by due date
pub async fn get_cash_outflow(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OutflowBucket>>, AppError> {
    let buckets = analytics(&state)
        .cash_outflow(Utc::now())
        .map_err(AppError::from_core)?;
    Ok(Json(buckets))
}
