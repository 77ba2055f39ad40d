//! Invoice listing command

use anyhow::Result;
use tally_core::analytics::{Analytics, AnalyticsConfig};
use tally_core::db::Database;
use tally_core::models::{InvoicePage, InvoiceQuery};

use super::truncate;

pub fn cmd_invoices(
    db: &Database,
    search: Option<String>,
    status: Option<String>,
    vendor: Option<String>,
    page: i64,
    limit: i64,
) -> Result<InvoicePage> {
    let query = InvoiceQuery {
        page,
        limit,
        search,
        status,
        vendor,
        ..Default::default()
    };
    let result = Analytics::new(db, AnalyticsConfig::from_env()).list_invoices(&query)?;

    println!();
    println!(
        "🧾 Invoices (page {} of {}, {} total)",
        result.pagination.page,
        result.pagination.total_pages.max(1),
        result.pagination.total_count
    );
    println!("   ─────────────────────────────────────────────────────────────");

    if result.invoices.is_empty() {
        println!("   No invoices found.");
        return Ok(result);
    }

    println!(
        "   {:10} │ {:24} │ {:14} │ {:>12} │ {:10}",
        "Date", "Vendor", "Number", "Amount", "Status"
    );
    println!("   ───────────┼──────────────────────────┼────────────────┼──────────────┼───────────");
    for invoice in &result.invoices {
        let date = invoice
            .invoice_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   {:10} │ {:24} │ {:14} │ {:>8.2} {:3} │ {}",
            date,
            truncate(&invoice.vendor_name, 24),
            truncate(&invoice.invoice_number, 14),
            invoice.amount,
            invoice.currency,
            invoice.status
        );
    }

    Ok(result)
}
