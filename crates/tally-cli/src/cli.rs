//! CLI argument definitions using clap
//!
//! The command implementations live in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Tally - Invoice spend analytics
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Invoice ingestion and spend analytics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tally.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TALLY_DB_KEY environment variable with your passphrase.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Load raw extraction records from a JSON file
    ///
    /// Without --append the store is cleared first.
    Seed {
        /// JSON file holding an array of extraction records
        #[arg(short, long)]
        file: PathBuf,

        /// Keep existing data and skip records already stored
        #[arg(long)]
        append: bool,
    },

    /// Show headline dashboard statistics
    Stats,

    /// Print an analytics report
    Report {
        #[arg(value_enum)]
        kind: ReportKind,
    },

    /// List invoices
    Invoices {
        /// Match vendor name, invoice number or file name
        #[arg(short, long)]
        search: Option<String>,

        /// Exact stored status (e.g. PENDING, COMPLETED)
        #[arg(long)]
        status: Option<String>,

        /// Exact vendor name
        #[arg(long)]
        vendor: Option<String>,

        #[arg(long, default_value = "1")]
        page: i64,

        /// Rows per page (max 100)
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Export data as CSV
    Export {
        #[arg(value_enum)]
        kind: ExportTarget,

        /// Output file (prints to stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Comma-separated CORS origins (falls back to TALLY_ALLOWED_ORIGINS)
        #[arg(long)]
        allowed_origins: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    /// Invoice counts and spend for the last 12 months
    Trends,
    /// Spend per vendor
    Vendors,
    /// Spend per category
    Categories,
    /// Upcoming payments by due date
    Forecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportTarget {
    Invoices,
    Vendors,
    Analytics,
}

impl From<ExportTarget> for tally_core::ExportKind {
    fn from(target: ExportTarget) -> Self {
        match target {
            ExportTarget::Invoices => Self::Invoices,
            ExportTarget::Vendors => Self::Vendors,
            ExportTarget::Analytics => Self::Analytics,
        }
    }
}
