//! Invoice filter builder for constructing dynamic SQL queries
//!
//! Shared by the invoice list (page + count) and the invoice export.

use chrono::{DateTime, Utc};

use super::{format_datetime, LOWER_FN};
use crate::models::{InvoiceQuery, SortField, SortOrder};

/// Joins every filter and sort column can reference
pub const INVOICE_JOINS: &str = "LEFT JOIN extracted_data e ON e.invoice_id = i.id \
     LEFT JOIN users u ON u.id = i.uploaded_by_id";

/// Builder for invoice WHERE / ORDER BY clauses
///
/// The lifetime `'query` ties string filters to the request that owns them.
#[derive(Default)]
pub struct InvoiceFilter<'query> {
    pub status: Option<&'query str>,
    pub vendor: Option<&'query str>,
    pub search: Option<&'query str>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
}

/// Result of building a filter - contains SQL components and parameters
pub struct FilterResult {
    /// WHERE clause including "WHERE" keyword (empty if no conditions)
    pub where_clause: String,
    /// ORDER BY clause including "ORDER BY" keyword
    pub order_clause: String,
    /// Parameters for the query (boxed for rusqlite compatibility)
    pub params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl<'query> InvoiceFilter<'query> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a list query (status, vendor, search, sort)
    pub fn from_query(query: &'query InvoiceQuery) -> Self {
        Self::new()
            .status(query.status.as_deref())
            .vendor(query.vendor.as_deref())
            .search(query.search.as_deref())
            .sort(query.sort_by, query.sort_order)
    }

    /// Exact stored status
    pub fn status(mut self, status: Option<&'query str>) -> Self {
        self.status = status;
        self
    }

    /// Exact vendor name
    pub fn vendor(mut self, vendor: Option<&'query str>) -> Self {
        self.vendor = vendor;
        self
    }

    /// Case-insensitive substring over vendor name, invoice number and invoice name
    pub fn search(mut self, query: Option<&'query str>) -> Self {
        self.search = query;
        self
    }

    /// Inclusive creation-time window
    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_field = field;
        self.sort_order = order;
        self
    }

    /// Build the filter components
    pub fn build(self) -> FilterResult {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = self.status.filter(|s| !s.is_empty()) {
            conditions.push("i.status = ?".to_string());
            params.push(Box::new(status.to_string()));
        }

        if let Some(vendor) = self.vendor.filter(|s| !s.is_empty()) {
            conditions.push("e.vendor_name = ?".to_string());
            params.push(Box::new(vendor.to_string()));
        }

        if let Some(q) = self.search {
            if !q.trim().is_empty() {
                conditions.push(format!(
                    "({f}(e.vendor_name) LIKE ? ESCAPE '\\' \
                      OR {f}(e.invoice_number) LIKE ? ESCAPE '\\' \
                      OR {f}(i.name) LIKE ? ESCAPE '\\')",
                    f = LOWER_FN
                ));
                let pattern = format!("%{}%", escape_like(&q.trim().to_lowercase()));
                params.push(Box::new(pattern.clone()));
                params.push(Box::new(pattern.clone()));
                params.push(Box::new(pattern));
            }
        }

        if let Some(from) = self.created_from {
            conditions.push("i.created_at >= ?".to_string());
            params.push(Box::new(format_datetime(&from)));
        }

        if let Some(to) = self.created_to {
            conditions.push("i.created_at <= ?".to_string());
            params.push(Box::new(format_datetime(&to)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let order_column = match self.sort_field {
            SortField::CreatedAt => "i.created_at",
            SortField::UpdatedAt => "i.updated_at",
            SortField::ProcessedAt => "i.processed_at",
            SortField::Name => "i.name",
            SortField::Status => "i.status",
            SortField::FileSize => "i.file_size",
            SortField::VendorName => "e.vendor_name",
            SortField::InvoiceNumber => "e.invoice_number",
            SortField::InvoiceDate => "e.invoice_date",
            SortField::DueDate => "e.due_date",
            SortField::TotalAmount => "CAST(e.total_amount AS REAL)",
        };
        let order_clause = format!(
            "ORDER BY {} {}, i.id ASC",
            order_column,
            self.sort_order.as_sql()
        );

        FilterResult {
            where_clause,
            order_clause,
            params,
        }
    }
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl FilterResult {
    /// Build a COUNT query
    pub fn build_count_query(&self) -> String {
        format!(
            "SELECT COUNT(*) FROM invoices i {} {}",
            INVOICE_JOINS, self.where_clause
        )
    }

    /// Get parameter references for query execution
    pub fn params_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// Take the parameters to append pagination params
    pub fn into_params(self) -> Vec<Box<dyn rusqlite::ToSql>> {
        self.params
    }
}
