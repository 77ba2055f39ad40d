//! Integration tests for tally-core
//!
//! These tests exercise the full ingest → store → analytics → export workflow
//! against a real SQLite database.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tally_core::{
    analytics::{Analytics, AnalyticsConfig},
    db::Database,
    export::{self, ExportKind, InvoiceExportOptions},
    ingest::Ingestor,
    models::{InvoiceQuery, SortField, SortOrder, SpendWindow},
    status::InvoiceStatus,
    Error,
};

/// Helper to build one extraction record in the pipeline's export shape
fn record(
    id: &str,
    status: &str,
    created: &str,
    vendor: &str,
    total: &str,
    invoice_date: &str,
    due_date: &str,
) -> Value {
    json!({
        "_id": id,
        "name": format!("{}.pdf", id),
        "filePath": format!("uploads/{}.pdf", id),
        "fileSize": {"$numberLong": "20480"},
        "fileType": "application/pdf",
        "status": status,
        "organizationId": "6630a1b2c3d4e5f6a7b8c9d0",
        "departmentId": "6630a1b2c3d4e5f6a7b8c9d1",
        "uploadedById": "6630a1b2c3d4e5f6a7b8c9d2",
        "isValidatedByHuman": false,
        "createdAt": {"$date": created},
        "updatedAt": {"$date": created},
        "metadata": {"modelUsed": "extractor-v2", "totalTokens": 1200, "confidence": 0.93},
        "extractedData": {"llmData": {
            "vendor": {"value": {"vendorName": {"value": vendor}}},
            "invoice": {"value": {
                "invoiceId": {"value": format!("RE-{}", id)},
                "invoiceDate": {"value": invoice_date}
            }},
            "payment": {"value": {"dueDate": {"value": due_date}}},
            "summary": {"value": {
                "invoiceTotal": {"value": total},
                "totalTax": {"value": "0"},
                "currencySymbol": {"value": "EUR"}
            }}
        }}
    })
}

/// Five invoices around a fixed "now" of 2025-06-15, plus one unreadable record
fn dataset() -> Vec<Value> {
    vec![
        record("a1", "processed", "2025-06-02T10:00:00.000Z", "Acme GmbH", "100.00", "2025-06-01", "2025-06-20"),
        record("a2", "processed", "2025-05-20T10:00:00.000Z", "Acme GmbH", "50.00", "2025-05-18", "2025-07-01"),
        record("b1", "pending", "2025-06-10T10:00:00.000Z", "Bolt AG", "200.00", "2025-06-09", "2025-06-16"),
        record("c1", "failed", "2025-04-01T10:00:00.000Z", "Cargo Ltd", "75.25", "2025-03-30", "2025-06-18"),
        record("d1", "uploaded", "2024-08-01T10:00:00.000Z", "Delta SA", "-30.00", "2024-03-05", "2025-09-01"),
        json!({"_id": "broken", "name": "no-parents.pdf"}),
    ]
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
}

fn seeded() -> Database {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let report = Ingestor::new(&db).ingest(&dataset()).expect("Ingest failed");
    assert_eq!(report.created_count, 5);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].record_id.as_deref(), Some("broken"));
    db
}

// =============================================================================
// Ingestion
// =============================================================================

#[test]
fn test_ingest_normalizes_into_store() {
    let db = seeded();
    assert_eq!(db.invoice_count().unwrap(), 5);
    assert_eq!(db.user_count().unwrap(), 1);

    let detail = db.invoice_detail("d1").unwrap().unwrap();
    assert_eq!(detail.invoice.status, InvoiceStatus::Pending);
    assert_eq!(detail.invoice.file_size, 20480);
    assert_eq!(detail.organization_name, "Organization a7b8c9d0");
    assert_eq!(detail.metadata.unwrap().total_tokens, Some(1200));

    let extracted = detail.extracted_data.unwrap();
    assert_eq!(extracted.total_amount, Some(dec!(30.00)));
    assert!(extracted.is_credit);
}

#[test]
fn test_reseed_is_idempotent() {
    let db = seeded();
    let analytics = Analytics::new(&db, AnalyticsConfig::default());
    let before = analytics.vendor_spend().unwrap();

    let report = Ingestor::new(&db).ingest(&dataset()).unwrap();
    assert_eq!(report.created_count, 5);
    assert_eq!(db.invoice_count().unwrap(), 5);

    let after = analytics.vendor_spend().unwrap();
    assert_eq!(after, before);
    let total: Decimal = after.iter().map(|v| v.total_spend).sum();
    assert_eq!(total, dec!(455.25));
}

// =============================================================================
// Analytics
// =============================================================================

#[test]
fn test_summary_cards() {
    let db = seeded();
    let stats = Analytics::new(&db, AnalyticsConfig::default())
        .summary(now())
        .unwrap();

    assert_eq!(stats.total_spend.value, dec!(455.25));
    assert_eq!(stats.total_spend.period, "YTD");

    // a1 and a2 are COMPLETED
    assert_eq!(stats.total_invoices_processed.value, 2);

    // June has a1 and b1, May has a2
    assert_eq!(stats.documents_uploaded.value, 2);
    assert_eq!(stats.documents_uploaded.percent_change, 100.0);
}

#[test]
fn test_trends_use_configured_status() {
    let db = seeded();

    let legacy = Analytics::new(&db, AnalyticsConfig::default())
        .monthly_trends(now())
        .unwrap();
    assert_eq!(legacy.len(), 12);
    assert!(legacy.iter().all(|t| t.invoice_count == 0));

    let june = legacy.last().unwrap();
    assert_eq!((june.month.as_str(), june.year), ("Jun", 2025));
    assert_eq!(june.total_spend, dec!(300.00));

    let canonical = Analytics::new(
        &db,
        AnalyticsConfig {
            trend_status: "COMPLETED".to_string(),
        },
    )
    .monthly_trends(now())
    .unwrap();
    assert_eq!(canonical.last().unwrap().invoice_count, 1);
}

#[test]
fn test_vendor_and_category_rollups() {
    let db = seeded();
    let analytics = Analytics::new(&db, AnalyticsConfig::default());

    let vendors = analytics.vendor_spend().unwrap();
    let names: Vec<_> = vendors.iter().map(|v| v.vendor_name.as_str()).collect();
    assert_eq!(names, vec!["Bolt AG", "Acme GmbH", "Cargo Ltd", "Delta SA"]);
    assert_eq!(vendors[1].invoice_count, 2);
    assert_eq!(analytics.top_vendors(2).unwrap().len(), 2);

    let categories = analytics.category_spend().unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].category, "Operations");
    assert_eq!(categories[0].invoice_count, 5);
}

#[test]
fn test_cash_outflow_buckets() {
    let db = seeded();
    let buckets = Analytics::new(&db, AnalyticsConfig::default())
        .cash_outflow(now())
        .unwrap();

    let labels: Vec<_> = buckets.iter().map(|b| b.period.as_str()).collect();
    assert_eq!(labels, vec!["0-7 days", "8-30 days", "31-60 days", "60+ days"]);

    // b1 due in 1 day, a1 in 5; c1 is FAILED and excluded
    assert_eq!(buckets[0].amount, dec!(300.00));
    assert_eq!(buckets[0].invoice_count, 2);
    assert_eq!(buckets[1].amount, dec!(50.00));
    assert_eq!(buckets[3].amount, dec!(30.00));
}

#[test]
fn test_listing_through_analytics() {
    let db = seeded();
    let analytics = Analytics::new(&db, AnalyticsConfig::default());

    let page = analytics
        .list_invoices(&InvoiceQuery {
            limit: 500,
            sort_by: SortField::TotalAmount,
            sort_order: SortOrder::Desc,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.pagination.limit, 100);
    assert_eq!(page.invoices[0].id, "b1");

    let err = analytics
        .list_invoices(&InvoiceQuery {
            page: 0,
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidData(_)));

    assert!(matches!(
        analytics.invoice_detail("nope").unwrap_err(),
        Error::NotFound(_)
    ));
}

// =============================================================================
// Export
// =============================================================================

#[test]
fn test_invoice_export_csv() {
    let db = seeded();
    let analytics = Analytics::new(&db, AnalyticsConfig::default());

    let options = InvoiceExportOptions {
        status: Some("COMPLETED".to_string()),
        ..Default::default()
    };
    let csv = export::render(&analytics, ExportKind::Invoices, &options, now()).unwrap();
    let lines: Vec<_> = csv.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("\"Invoice ID\",\"Invoice Number\""));
    assert!(lines[1].starts_with("\"a1\",\"RE-a1\",\"Acme GmbH\",\"2025-06-01\""));
    assert!(lines[1].ends_with("\"User a7b8c9d2\",\"2025-06-02\""));
    assert!(!csv.ends_with('\n'));
}

#[test]
fn test_vendor_and_analytics_export_csv() {
    let db = seeded();
    let analytics = Analytics::new(&db, AnalyticsConfig::default());
    let options = InvoiceExportOptions::default();

    let vendors = export::render(&analytics, ExportKind::Vendors, &options, now()).unwrap();
    let lines: Vec<_> = vendors.lines().collect();
    assert_eq!(
        lines[0],
        "\"Vendor Name\",\"Total Invoices\",\"Total Spend\",\"Total Tax\""
    );
    assert_eq!(lines[1], "\"Bolt AG\",\"1\",\"200.00\",\"0.00\"");

    let monthly = export::render(&analytics, ExportKind::Analytics, &options, now()).unwrap();
    let lines: Vec<_> = monthly.lines().collect();
    // d1's invoice date is more than a year back
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[1], "\"2025-06\",\"2\",\"300.00\"");
    assert_eq!(lines[3], "\"2025-03\",\"1\",\"75.25\"");
}

#[test]
fn test_export_without_data_is_header_only() {
    let db = Database::in_memory().unwrap();
    let analytics = Analytics::new(&db, AnalyticsConfig::default());
    let csv = export::render(
        &analytics,
        ExportKind::Invoices,
        &InvoiceExportOptions::default(),
        now(),
    )
    .unwrap();
    assert_eq!(csv.lines().count(), 1);
    assert!(db.spend_rows(&SpendWindow::all()).unwrap().is_empty());
}
