//! Tally Web Server
//!
//! Axum-based REST API for the Tally invoice analytics dashboard.
//!
//! - Spend analytics, invoice listing and detail
//! - Delimited-text exports served as attachments
//! - Pass-through chat endpoint to the natural-language query service
//! - Restrictive CORS policy and sanitized error responses

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use tally_core::analytics::AnalyticsConfig;
use tally_core::chat::{ChatGateway, ChatService};
use tally_core::db::Database;

mod handlers;

/// Environment variable with comma-separated CORS origins
pub const ALLOWED_ORIGINS_ENV: &str = "TALLY_ALLOWED_ORIGINS";

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Read allowed origins from `TALLY_ALLOWED_ORIGINS`
    pub fn from_env() -> Self {
        Self {
            allowed_origins: std::env::var(ALLOWED_ORIGINS_ENV)
                .map(|s| parse_origins(&s))
                .unwrap_or_default(),
        }
    }
}

/// Split a comma-separated origin list, dropping blanks
pub fn parse_origins(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub config: ServerConfig,
    pub analytics: AnalyticsConfig,
    pub chat: Arc<dyn ChatService>,
}

impl AppState {
    /// Build state with the chat gateway and analytics settings taken from the environment
    pub fn from_env(db: Database, config: ServerConfig) -> anyhow::Result<Self> {
        let chat = ChatGateway::from_env()?;
        info!(url = %chat.base_url(), "Chat service configured");

        let analytics = AnalyticsConfig::from_env();
        info!(trend_status = %analytics.trend_status, "Analytics configured");

        Ok(Self {
            db,
            config,
            analytics,
            chat: Arc::new(chat),
        })
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();
    let state = Arc::new(state);

    let api_routes = Router::new()
        // Dashboard
        .route("/stats", get(handlers::get_stats))
        .route("/invoice-trends", get(handlers::get_invoice_trends))
        .route("/vendors", get(handlers::get_vendors))
        .route("/vendors/top10", get(handlers::get_top_vendors))
        .route("/category-spend", get(handlers::get_category_spend))
        .route("/cash-outflow", get(handlers::get_cash_outflow))
        // Invoices
        .route("/invoices", get(handlers::list_invoices))
        .route("/invoices/:id", get(handlers::get_invoice))
        // Chat
        .route("/chat-with-data", post(handlers::chat_with_data))
        // Export
        .route("/export/invoices/csv", get(handlers::export_invoices_csv))
        .route("/export/vendors/csv", get(handlers::export_vendors_csv))
        .route("/export/analytics/csv", get(handlers::export_analytics_csv))
        // Ingestion
        .route("/ingest", post(handlers::ingest_records));

    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16, config: ServerConfig) -> anyhow::Result<()> {
    if config.allowed_origins.is_empty() {
        warn!("No CORS origins configured; cross-origin dashboard requests will be refused");
    }

    let state = AppState::from_env(db, config)?;
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn bad_gateway(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a core error onto a status; only unexpected failures are hidden
    pub fn from_core(err: tally_core::Error) -> Self {
        use tally_core::Error;
        match err {
            Error::InvalidData(msg) => Self::bad_request(&msg),
            Error::NotFound(msg) => Self::not_found(&msg),
            Error::Chat(msg) => Self::bad_gateway(&msg),
            other => Self::from(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
