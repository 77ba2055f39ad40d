//! Delimited-text export for invoices, vendor rollups and monthly summaries
//!
//! Every field is quoted, embedded quotes are doubled, rows are separated by
//! a single `\n` and there is no trailing newline. Zero rows still produce
//! the header line.

use chrono::{DateTime, Utc};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::Serialize;
use serde_json::Value;

use crate::analytics::Analytics;
use crate::error::{Error, Result};
use crate::models::{InvoiceExportRow, MonthlySummary, VendorSpend};
use crate::store::InvoiceStore;

/// Default row cap for invoice exports
pub const DEFAULT_EXPORT_LIMIT: i64 = 1000;

const NOT_AVAILABLE: &str = "N/A";

/// A named column: header text plus the serialized field it reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportColumn {
    pub header: &'static str,
    pub field: &'static str,
}

const fn col(header: &'static str, field: &'static str) -> ExportColumn {
    ExportColumn { header, field }
}

pub const INVOICE_COLUMNS: &[ExportColumn] = &[
    col("Invoice ID", "id"),
    col("Invoice Number", "invoice_number"),
    col("Vendor Name", "vendor_name"),
    col("Invoice Date", "invoice_date"),
    col("Due Date", "due_date"),
    col("Total Amount", "total_amount"),
    col("Currency", "currency"),
    col("Category", "category"),
    col("Status", "status"),
    col("Uploaded By", "uploaded_by"),
    col("Created At", "created_at"),
];

pub const VENDOR_COLUMNS: &[ExportColumn] = &[
    col("Vendor Name", "vendor_name"),
    col("Total Invoices", "invoice_count"),
    col("Total Spend", "total_spend"),
    col("Total Tax", "total_tax"),
];

pub const ANALYTICS_COLUMNS: &[ExportColumn] = &[
    col("Month", "month"),
    col("Invoice Count", "invoice_count"),
    col("Total Amount", "total_amount"),
];

/// What to export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Invoices,
    Vendors,
    Analytics,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invoices => "invoices",
            Self::Vendors => "vendors",
            Self::Analytics => "analytics",
        }
    }
}

impl std::str::FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "invoices" => Ok(Self::Invoices),
            "vendors" => Ok(Self::Vendors),
            "analytics" => Ok(Self::Analytics),
            _ => Err(format!("Unknown export kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ExportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Options for invoice export
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceExportOptions {
    /// Exact stored status
    pub status: Option<String>,
    /// Created at or after (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// Created at or before (inclusive)
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl Default for InvoiceExportOptions {
    fn default() -> Self {
        Self {
            status: None,
            from: None,
            to: None,
            limit: DEFAULT_EXPORT_LIMIT,
        }
    }
}

/// `{kind}_{unix_millis}.csv`
pub fn export_filename(kind: ExportKind, now: DateTime<Utc>) -> String {
    format!("{}_{}.csv", kind.as_str(), now.timestamp_millis())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render rows as always-quoted delimited text in the given column order
pub fn to_delimited_text<T: Serialize>(rows: &[T], columns: &[ExportColumn]) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(columns.iter().map(|c| c.header))?;

    for row in rows {
        let value = serde_json::to_value(row)?;
        let record: Vec<String> = columns
            .iter()
            .map(|c| cell(value.get(c.field)))
            .collect();
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    let mut text = String::from_utf8(bytes)
        .map_err(|e| Error::InvalidData(format!("Export is not valid UTF-8: {}", e)))?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

#[derive(Serialize)]
struct InvoiceCsvRow {
    id: String,
    invoice_number: String,
    vendor_name: String,
    invoice_date: String,
    due_date: String,
    total_amount: String,
    currency: String,
    category: String,
    status: String,
    uploaded_by: String,
    created_at: String,
}

impl From<&InvoiceExportRow> for InvoiceCsvRow {
    fn from(row: &InvoiceExportRow) -> Self {
        let or_na = |s: &Option<String>| {
            s.clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        let date_or_na = |d: &Option<chrono::NaiveDate>| {
            d.map(|d| d.to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };

        Self {
            id: row.id.clone(),
            invoice_number: or_na(&row.invoice_number),
            vendor_name: or_na(&row.vendor_name),
            invoice_date: date_or_na(&row.invoice_date),
            due_date: date_or_na(&row.due_date),
            total_amount: row.total_amount.unwrap_or_default().to_string(),
            currency: row
                .currency
                .clone()
                .unwrap_or_else(|| crate::normalize::DEFAULT_CURRENCY.to_string()),
            category: row
                .category
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "Uncategorized".to_string()),
            status: row.status.to_string(),
            uploaded_by: or_na(&row.uploaded_by),
            created_at: row.created_at.date_naive().to_string(),
        }
    }
}

#[derive(Serialize)]
struct VendorCsvRow {
    vendor_name: String,
    invoice_count: String,
    total_spend: String,
    total_tax: String,
}

impl From<&VendorSpend> for VendorCsvRow {
    fn from(v: &VendorSpend) -> Self {
        Self {
            vendor_name: v.vendor_name.clone(),
            invoice_count: v.invoice_count.to_string(),
            total_spend: format!("{:.2}", v.total_spend),
            total_tax: format!("{:.2}", v.total_tax),
        }
    }
}

#[derive(Serialize)]
struct MonthlyCsvRow {
    month: String,
    invoice_count: String,
    total_amount: String,
}

impl From<&MonthlySummary> for MonthlyCsvRow {
    fn from(m: &MonthlySummary) -> Self {
        Self {
            month: m.month.clone(),
            invoice_count: m.invoice_count.to_string(),
            total_amount: format!("{:.2}", m.total_amount),
        }
    }
}

pub fn invoices_csv(store: &dyn InvoiceStore, options: &InvoiceExportOptions) -> Result<String> {
    let rows: Vec<InvoiceCsvRow> = store
        .export_invoices(options)?
        .iter()
        .map(InvoiceCsvRow::from)
        .collect();
    to_delimited_text(&rows, INVOICE_COLUMNS)
}

pub fn vendors_csv(analytics: &Analytics) -> Result<String> {
    let rows: Vec<VendorCsvRow> = analytics
        .vendor_spend()?
        .iter()
        .map(VendorCsvRow::from)
        .collect();
    to_delimited_text(&rows, VENDOR_COLUMNS)
}

pub fn analytics_csv(analytics: &Analytics, now: DateTime<Utc>) -> Result<String> {
    let rows: Vec<MonthlyCsvRow> = analytics
        .monthly_summary(now)?
        .iter()
        .map(MonthlyCsvRow::from)
        .collect();
    to_delimited_text(&rows, ANALYTICS_COLUMNS)
}

/// Render any export kind
pub fn render(
    analytics: &Analytics,
    kind: ExportKind,
    options: &InvoiceExportOptions,
    now: DateTime<Utc>,
) -> Result<String> {
    match kind {
        ExportKind::Invoices => invoices_csv(analytics.store(), options),
        ExportKind::Vendors => vendors_csv(analytics),
        ExportKind::Analytics => analytics_csv(analytics, now),
    }
}
