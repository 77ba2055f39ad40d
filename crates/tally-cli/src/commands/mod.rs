//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Database setup (init) and shared utilities (open_db)
//! - `seed` - Loading raw extraction records
//! - `reports` - Dashboard stats and analytics reports
//! - `invoices` - Invoice listing
//! - `export` - CSV exports
//! - `serve` - Web server command

pub mod core;
pub mod export;
pub mod invoices;
pub mod reports;
pub mod seed;
pub mod serve;

// Re-export command functions for main.rs
pub use core::*;
pub use export::*;
pub use invoices::*;
pub use reports::*;
pub use seed::*;
pub use serve::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
