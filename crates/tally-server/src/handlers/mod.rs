//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod chat;
pub mod dashboard;
pub mod export;
pub mod ingest;
pub mod invoices;

// Re-export all handlers for use in router
pub use chat::*;
pub use dashboard::*;
pub use export::*;
pub use ingest::*;
pub use invoices::*;
