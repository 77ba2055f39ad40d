//! Domain models for Tally

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::status::InvoiceStatus;

// ============================================================================
// Tenancy
// ============================================================================

/// Root of tenancy; owns departments and users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
    pub organization_id: String,
}

/// User roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            _ => Err(format!("Unknown user role: {}", s)),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub organization_id: String,
}

// ============================================================================
// Invoices and their children
// ============================================================================

/// An uploaded invoice document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    /// Display name (usually the original file name)
    pub name: String,
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub status: InvoiceStatus,
    pub organization_id: String,
    pub department_id: String,
    pub uploaded_by_id: String,
    pub assigned_to_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub is_validated_by_human: bool,
    pub analytics_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provenance of the AI extraction run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceMetadata {
    pub model_used: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    /// Processing time as reported by the pipeline
    pub processing_time: Option<f64>,
    pub confidence: Option<f64>,
    pub ai_response_base_url: Option<String>,
}

/// Fields extracted from the document by the AI pipeline
///
/// Monetary values are magnitudes. `is_credit` records whether the source
/// invoice total was negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    pub vendor_name: Option<String>,
    pub vendor_address: Option<String>,
    pub vendor_email: Option<String>,
    pub vendor_phone: Option<String>,
    pub vendor_tax_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub is_credit: bool,
    pub currency: String,
    pub payment_terms: Option<String>,
    pub payment_method: Option<String>,
    pub category: Option<String>,
    pub validated_by: Option<String>,
}

/// Human-corrected invoice fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedData {
    pub vendor_name: Option<String>,
    pub vendor_address: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub total_amount: Option<Decimal>,
    pub currency: String,
    pub category: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
    pub tax_rate: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
}

/// A recorded payment against an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub amount: Decimal,
    pub payment_date: Option<NaiveDate>,
    pub method: Option<String>,
    pub reference: Option<String>,
}

/// Everything the normalizer produces for one raw record
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBundle {
    pub invoice: Invoice,
    pub metadata: Option<InvoiceMetadata>,
    pub extracted: Option<ExtractedData>,
    pub line_items: Vec<LineItem>,
    pub validated: Option<ValidatedData>,
}

// ============================================================================
// Ingestion results
// ============================================================================

/// A record that could not be ingested
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    /// Source `_id`, when it could be read
    pub record_id: Option<String>,
    pub message: String,
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub created_count: usize,
    pub organizations: usize,
    pub departments: usize,
    pub users: usize,
    pub errors: Vec<RecordError>,
}

// ============================================================================
// Analytics
// ============================================================================

/// Read model the aggregation engine works from: one row per invoice
#[derive(Debug, Clone, PartialEq)]
pub struct SpendRow {
    pub invoice_id: String,
    pub status: InvoiceStatus,
    pub created_at: DateTime<Utc>,
    /// `None` when the invoice has no extracted data
    pub figures: Option<SpendFigures>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpendFigures {
    pub vendor_name: Option<String>,
    pub category: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
}

/// Lower and upper bounds applied to spend rows before aggregation
///
/// Unset bounds are open. A date bound excludes rows that lack that date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpendWindow {
    pub created_from: Option<DateTime<Utc>>,
    pub invoice_from: Option<NaiveDate>,
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
}

impl SpendWindow {
    /// No bounds at all
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(&self, row: &SpendRow) -> bool {
        if self.created_from.is_some_and(|from| row.created_at < from) {
            return false;
        }
        let figures = row.figures.as_ref();
        let invoice_date = figures.and_then(|f| f.invoice_date);
        let due_date = figures.and_then(|f| f.due_date);

        if let Some(from) = self.invoice_from {
            if !invoice_date.is_some_and(|d| d >= from) {
                return false;
            }
        }
        if let Some(from) = self.due_from {
            if !due_date.is_some_and(|d| d >= from) {
                return false;
            }
        }
        if let Some(to) = self.due_to {
            if !due_date.is_some_and(|d| d <= to) {
                return false;
            }
        }
        true
    }
}

/// A dashboard card value with its period-over-period change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatMetric<T> {
    pub value: T,
    /// Percentage change against the comparison period (0 when the base is zero)
    #[serde(rename = "change")]
    pub percent_change: f64,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_spend: StatMetric<Decimal>,
    pub total_invoices_processed: StatMetric<i64>,
    pub documents_uploaded: StatMetric<i64>,
    pub average_invoice_value: StatMetric<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrend {
    /// Short month name, e.g. "Jan"
    pub month: String,
    pub year: i32,
    pub invoice_count: i64,
    pub total_spend: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSpend {
    pub vendor_name: String,
    pub total_spend: Decimal,
    pub invoice_count: i64,
    /// Summed tax, used by the vendor export
    #[serde(skip)]
    pub total_tax: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySpend {
    pub category: String,
    pub total_spend: Decimal,
    pub invoice_count: i64,
}

/// One due-date bucket of the cash outflow forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutflowBucket {
    pub period: String,
    pub amount: Decimal,
    pub invoice_count: i64,
}

/// Month-level totals by invoice date (analytics export)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySummary {
    /// `YYYY-MM`
    pub month: String,
    pub invoice_count: i64,
    pub total_amount: Decimal,
}

// ============================================================================
// Invoice listing
// ============================================================================

/// Fields the invoice list may be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    ProcessedAt,
    Name,
    Status,
    FileSize,
    VendorName,
    InvoiceNumber,
    InvoiceDate,
    DueDate,
    TotalAmount,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "createdAt",
            Self::UpdatedAt => "updatedAt",
            Self::ProcessedAt => "processedAt",
            Self::Name => "name",
            Self::Status => "status",
            Self::FileSize => "fileSize",
            Self::VendorName => "vendorName",
            Self::InvoiceNumber => "invoiceNumber",
            Self::InvoiceDate => "invoiceDate",
            Self::DueDate => "dueDate",
            Self::TotalAmount => "totalAmount",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "createdAt" | "created_at" => Ok(Self::CreatedAt),
            "updatedAt" | "updated_at" => Ok(Self::UpdatedAt),
            "processedAt" | "processed_at" => Ok(Self::ProcessedAt),
            "name" => Ok(Self::Name),
            "status" => Ok(Self::Status),
            "fileSize" | "file_size" => Ok(Self::FileSize),
            "vendorName" | "vendor_name" => Ok(Self::VendorName),
            "invoiceNumber" | "invoice_number" => Ok(Self::InvoiceNumber),
            "invoiceDate" | "invoice_date" => Ok(Self::InvoiceDate),
            "dueDate" | "due_date" => Ok(Self::DueDate),
            "totalAmount" | "total_amount" | "amount" => Ok(Self::TotalAmount),
            _ => Err(format!("Unsupported sort field: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!("Invalid sort order: {} (use asc or desc)", s)),
        }
    }
}

/// Filters, sort and page for the invoice list
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceQuery {
    /// 1-based page number
    pub page: i64,
    pub limit: i64,
    /// Case-insensitive match on vendor name, invoice number or invoice name
    pub search: Option<String>,
    /// Exact stored status
    pub status: Option<String>,
    /// Exact vendor name
    pub vendor: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for InvoiceQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            search: None,
            status: None,
            vendor: None,
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl InvoiceQuery {
    /// Rows skipped before this page, or `None` when the page lies past
    /// the addressable range
    pub fn offset(&self) -> Option<i64> {
        self.page
            .checked_sub(1)
            .and_then(|skipped| skipped.checked_mul(self.limit))
    }
}

/// One row of the invoice list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListItem {
    pub id: String,
    pub name: String,
    pub vendor_name: String,
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub currency: String,
    pub status: InvoiceStatus,
    pub category: String,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
    pub is_validated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total_count: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total_count: i64) -> Self {
        let total_pages = if limit > 0 {
            (total_count + limit - 1) / limit
        } else {
            0
        };
        Self {
            page,
            limit,
            total_count,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePage {
    pub invoices: Vec<InvoiceListItem>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploaderInfo {
    pub email: String,
    pub name: String,
}

/// Full invoice view with every related record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub extracted_data: Option<ExtractedData>,
    pub validated_data: Option<ValidatedData>,
    pub metadata: Option<InvoiceMetadata>,
    pub line_items: Vec<LineItem>,
    pub payments: Vec<Payment>,
    pub uploaded_by: UploaderInfo,
    pub department_name: String,
    pub organization_name: String,
}

// ============================================================================
// Export rows
// ============================================================================

/// An invoice joined with its extracted data and uploader, for export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceExportRow {
    pub id: String,
    pub invoice_number: Option<String>,
    pub vendor_name: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub total_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub category: Option<String>,
    pub status: InvoiceStatus,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}
