//! CSV export command

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tally_core::analytics::{Analytics, AnalyticsConfig};
use tally_core::db::Database;
use tally_core::export::{self, ExportKind, InvoiceExportOptions};

/// Render the requested export as CSV text
pub fn render_export(db: &Database, kind: ExportKind) -> Result<String> {
    let analytics = Analytics::new(db, AnalyticsConfig::from_env());
    let csv = export::render(&analytics, kind, &InvoiceExportOptions::default(), Utc::now())?;
    Ok(csv)
}

pub fn cmd_export(db: &Database, kind: ExportKind, output: Option<&Path>) -> Result<()> {
    let csv = render_export(db, kind)?;

    match output {
        Some(path) => {
            std::fs::write(path, &csv)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let rows = csv.lines().count().saturating_sub(1);
            eprintln!("✅ Exported {} {} rows to {}", rows, kind, path.display());
        }
        None => print!("{}", csv),
    }

    Ok(())
}
