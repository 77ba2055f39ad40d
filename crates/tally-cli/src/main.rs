//! Tally CLI - Invoice spend analytics
//!
//! Usage:
//!   tally init                     Initialize database
//!   tally seed --file data.json    Load extraction records
//!   tally report trends            Print a report
//!   tally serve --port 3000        Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Seed { file, append } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_seed(&db, &file, append).map(|_| ())
        }
        Commands::Stats => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_stats(&db)
        }
        Commands::Report { kind } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match kind {
                ReportKind::Trends => commands::cmd_report_trends(&db),
                ReportKind::Vendors => commands::cmd_report_vendors(&db),
                ReportKind::Categories => commands::cmd_report_categories(&db),
                ReportKind::Forecast => commands::cmd_report_forecast(&db),
            }
        }
        Commands::Invoices {
            search,
            status,
            vendor,
            page,
            limit,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_invoices(&db, search, status, vendor, page, limit).map(|_| ())
        }
        Commands::Export { kind, output } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_export(&db, kind.into(), output.as_deref())
        }
        Commands::Serve {
            port,
            host,
            allowed_origins,
        } => {
            commands::cmd_serve(
                &cli.db,
                &host,
                port,
                allowed_origins.as_deref(),
                cli.no_encrypt,
            )
            .await
        }
    }
}
