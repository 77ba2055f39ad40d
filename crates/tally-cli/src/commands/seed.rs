//! Seed command: load raw extraction records from a JSON file

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tally_core::db::Database;
use tally_core::ingest::Ingestor;
use tally_core::models::IngestReport;

/// Read a JSON array of records from disk
pub fn read_records(file: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", file.display()))?;

    match value {
        Value::Array(records) => Ok(records),
        _ => bail!("{} must contain a JSON array of records", file.display()),
    }
}

pub fn cmd_seed(db: &Database, file: &Path, append: bool) -> Result<IngestReport> {
    let records = read_records(file)?;

    if append {
        println!("📥 Appending {} records from {}...", records.len(), file.display());
    } else {
        println!(
            "📥 Loading {} records from {} (existing data will be replaced)...",
            records.len(),
            file.display()
        );
    }

    let ingestor = Ingestor::new(db);
    let report = if append {
        ingestor.ingest_incremental(&records)
    } else {
        ingestor.ingest(&records)
    }
    .context("Ingestion failed")?;

    print_report(&report);
    Ok(report)
}

fn print_report(report: &IngestReport) {
    println!();
    println!("   Organizations: {}", report.organizations);
    println!("   Departments:   {}", report.departments);
    println!("   Users:         {}", report.users);
    println!("   Invoices:      {}", report.created_count);

    if !report.errors.is_empty() {
        println!();
        println!("   ⚠️  {} records skipped:", report.errors.len());
        for err in &report.errors {
            println!(
                "      {} - {}",
                err.record_id.as_deref().unwrap_or("(no id)"),
                err.message
            );
        }
    }

    println!();
    println!("✅ Seed complete");
}
