//! Stats and report command implementations

use anyhow::Result;
use chrono::Utc;
use tally_core::analytics::{Analytics, AnalyticsConfig};
use tally_core::db::Database;

use super::truncate;

fn analytics(db: &Database) -> Analytics<'_> {
    Analytics::new(db, AnalyticsConfig::from_env())
}

fn format_change(change: f64) -> String {
    if change > 0.0 {
        format!("▲ {:.1}%", change)
    } else if change < 0.0 {
        format!("▼ {:.1}%", change.abs())
    } else {
        "  0.0%".to_string()
    }
}

pub fn cmd_stats(db: &Database) -> Result<()> {
    let stats = analytics(db).summary(Utc::now())?;

    println!();
    println!("📊 Tally Dashboard");
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Total spend ({}):        {:>12.2}  {}",
        stats.total_spend.period,
        stats.total_spend.value,
        format_change(stats.total_spend.percent_change)
    );
    println!(
        "   Invoices processed ({}): {:>12}  {}",
        stats.total_invoices_processed.period,
        stats.total_invoices_processed.value,
        format_change(stats.total_invoices_processed.percent_change)
    );
    println!(
        "   Documents uploaded ({}): {:>12}  {}",
        stats.documents_uploaded.period,
        stats.documents_uploaded.value,
        format_change(stats.documents_uploaded.percent_change)
    );
    println!(
        "   Average invoice ({}):    {:>12.2}  {}",
        stats.average_invoice_value.period,
        stats.average_invoice_value.value,
        format_change(stats.average_invoice_value.percent_change)
    );

    Ok(())
}

pub fn cmd_report_trends(db: &Database) -> Result<()> {
    let analytics = analytics(db);
    let trends = analytics.monthly_trends(Utc::now())?;

    println!();
    println!(
        "📈 Invoice Trends (status '{}')",
        analytics.config().trend_status
    );
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   {:10} │ {:>6} │ {:>12}", "Month", "Count", "Spend");
    println!("   ───────────┼────────┼─────────────");

    for point in &trends {
        println!(
            "   {:10} │ {:>6} │ {:>12.2}",
            format!("{} {}", point.month, point.year),
            point.invoice_count,
            point.total_spend
        );
    }

    let total_count: i64 = trends.iter().map(|p| p.invoice_count).sum();
    let total_spend: rust_decimal::Decimal = trends.iter().map(|p| p.total_spend).sum();
    println!("   ───────────┼────────┼─────────────");
    println!("   {:10} │ {:>6} │ {:>12.2}", "Total", total_count, total_spend);

    Ok(())
}

pub fn cmd_report_vendors(db: &Database) -> Result<()> {
    let vendors = analytics(db).vendor_spend()?;

    println!();
    println!("🏪 Spend by Vendor");
    println!("   ─────────────────────────────────────────────────────────────");

    if vendors.is_empty() {
        println!("   No vendor spend recorded.");
        return Ok(());
    }

    println!("   {:30} │ {:>12} │ {:>5}", "Vendor", "Spend", "Count");
    println!("   ───────────────────────────────┼──────────────┼───────");
    for vendor in &vendors {
        println!(
            "   {:30} │ {:>12.2} │ {:>5}",
            truncate(&vendor.vendor_name, 30),
            vendor.total_spend,
            vendor.invoice_count
        );
    }

    Ok(())
}

pub fn cmd_report_categories(db: &Database) -> Result<()> {
    let categories = analytics(db).category_spend()?;

    println!();
    println!("🏷️  Spend by Category");
    println!("   ─────────────────────────────────────────────────────────────");

    if categories.is_empty() {
        println!("   No category spend recorded.");
        return Ok(());
    }

    println!("   {:30} │ {:>12} │ {:>5}", "Category", "Spend", "Count");
    println!("   ───────────────────────────────┼──────────────┼───────");
    for category in &categories {
        println!(
            "   {:30} │ {:>12.2} │ {:>5}",
            truncate(&category.category, 30),
            category.total_spend,
            category.invoice_count
        );
    }

    Ok(())
}

pub fn cmd_report_forecast(db: &Database) -> Result<()> {
    let buckets = analytics(db).cash_outflow(Utc::now())?;

    println!();
    println!("💸 Cash Outflow Forecast (by due date)");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   {:12} │ {:>12} │ {:>5}", "Due in", "Amount", "Count");
    println!("   ─────────────┼──────────────┼───────");
    for bucket in &buckets {
        println!(
            "   {:12} │ {:>12.2} │ {:>5}",
            bucket.period, bucket.amount, bucket.invoice_count
        );
    }

    Ok(())
}
