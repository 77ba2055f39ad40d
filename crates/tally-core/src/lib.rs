//! Tally Core Library
//!
//! Shared functionality for the Tally invoice analytics service:
//! - Typed view of raw extraction records and their normalization
//! - Status canonicalization
//! - Database access and migrations behind the `InvoiceStore` trait
//! - Ingestion of record batches (reseed or append)
//! - Spend analytics, invoice listings and delimited-text export
//! - Gateway to the external natural-language query service

pub mod analytics;
pub mod chat;
pub mod db;
pub mod error;
pub mod export;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod raw;
pub mod status;
pub mod store;

/// Test utilities: in-memory store and mock chat server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use analytics::{percent_change, Analytics, AnalyticsConfig};
pub use chat::{ChatGateway, ChatGatewayConfig, ChatReply, ChatRequest, ChatService};
pub use db::Database;
pub use error::{Error, Result};
pub use export::{export_filename, ExportKind, InvoiceExportOptions};
pub use ingest::Ingestor;
pub use normalize::normalize;
pub use status::{canonicalize, InvoiceStatus};
pub use store::{InvoiceStore, WriteMode};
