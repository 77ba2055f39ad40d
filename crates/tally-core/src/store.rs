//! Storage seam between ingestion/analytics and the persistence layer
//!
//! `db::Database` is the SQLite implementation. Tests can swap in
//! `test_utils::MemoryStore`.

use crate::db::Database;
use crate::error::Result;
use crate::export::InvoiceExportOptions;
use crate::models::{
    Department, InvoiceDetail, InvoiceExportRow, InvoicePage, InvoiceQuery, NormalizedBundle,
    Organization, SpendRow, SpendWindow, User,
};

/// How parent records are written during ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Plain insert; an existing id is an error
    Create,
    /// Skip silently when the id already exists
    IfMissing,
}

pub trait InvoiceStore: Send + Sync {
    /// Delete everything, children before parents
    fn clear_all(&self) -> Result<()>;

    fn user_count(&self) -> Result<i64>;

    /// Returns true when a row was written
    fn insert_organization(&self, org: &Organization, mode: WriteMode) -> Result<bool>;

    fn insert_department(&self, dept: &Department, mode: WriteMode) -> Result<bool>;

    fn insert_user(&self, user: &User, mode: WriteMode) -> Result<bool>;

    /// Write an invoice and all of its children atomically
    fn insert_bundle(&self, bundle: &NormalizedBundle) -> Result<()>;

    /// One row per invoice inside `window` with its extracted figures,
    /// oldest first
    fn spend_rows(&self, window: &SpendWindow) -> Result<Vec<SpendRow>>;

    fn list_invoices(&self, query: &InvoiceQuery) -> Result<InvoicePage>;

    fn invoice_detail(&self, id: &str) -> Result<Option<InvoiceDetail>>;

    /// Invoices for export, newest first
    fn export_invoices(&self, options: &InvoiceExportOptions) -> Result<Vec<InvoiceExportRow>>;
}

impl InvoiceStore for Database {
    fn clear_all(&self) -> Result<()> {
        Database::clear_all(self)
    }

    fn user_count(&self) -> Result<i64> {
        Database::user_count(self)
    }

    fn insert_organization(&self, org: &Organization, mode: WriteMode) -> Result<bool> {
        Database::insert_organization(self, org, mode)
    }

    fn insert_department(&self, dept: &Department, mode: WriteMode) -> Result<bool> {
        Database::insert_department(self, dept, mode)
    }

    fn insert_user(&self, user: &User, mode: WriteMode) -> Result<bool> {
        Database::insert_user(self, user, mode)
    }

    fn insert_bundle(&self, bundle: &NormalizedBundle) -> Result<()> {
        Database::insert_bundle(self, bundle)
    }

    fn spend_rows(&self, window: &SpendWindow) -> Result<Vec<SpendRow>> {
        Database::spend_rows(self, window)
    }

    fn list_invoices(&self, query: &InvoiceQuery) -> Result<InvoicePage> {
        Database::list_invoices(self, query)
    }

    fn invoice_detail(&self, id: &str) -> Result<Option<InvoiceDetail>> {
        Database::invoice_detail(self, id)
    }

    fn export_invoices(&self, options: &InvoiceExportOptions) -> Result<Vec<InvoiceExportRow>> {
        Database::export_invoices(self, options)
    }
}
