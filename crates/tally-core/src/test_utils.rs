//! Test utilities for tally-core
//!
//! - [`MemoryStore`]: an in-memory [`InvoiceStore`] for exercising ingestion
//!   and analytics without SQLite
//! - [`MockChatServer`]: a local stand-in for the natural-language query service

use std::cmp::Ordering;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::export::InvoiceExportOptions;
use crate::models::*;
use crate::store::{InvoiceStore, WriteMode};

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Default)]
struct MemoryData {
    organizations: Vec<Organization>,
    departments: Vec<Department>,
    users: Vec<User>,
    bundles: Vec<NormalizedBundle>,
}

/// Vector-backed store with the same semantics as the SQLite store
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> Result<MutexGuard<'_, MemoryData>> {
        self.data
            .lock()
            .map_err(|_| Error::InvalidData("Failed to acquire memory store lock".into()))
    }

    pub fn invoice_count(&self) -> usize {
        self.data().map(|d| d.bundles.len()).unwrap_or(0)
    }

    pub fn users(&self) -> Vec<User> {
        self.data().map(|d| d.users.clone()).unwrap_or_default()
    }

    pub fn departments(&self) -> Vec<Department> {
        self.data().map(|d| d.departments.clone()).unwrap_or_default()
    }

    pub fn organizations(&self) -> Vec<Organization> {
        self.data()
            .map(|d| d.organizations.clone())
            .unwrap_or_default()
    }
}

fn insert_unique<T: Clone>(
    rows: &mut Vec<T>,
    row: &T,
    id: impl Fn(&T) -> &str,
    mode: WriteMode,
    kind: &str,
) -> Result<bool> {
    if rows.iter().any(|r| id(r) == id(row)) {
        return match mode {
            WriteMode::IfMissing => Ok(false),
            WriteMode::Create => Err(Error::InvalidData(format!(
                "Duplicate {} id: {}",
                kind,
                id(row)
            ))),
        };
    }
    rows.push(row.clone());
    Ok(true)
}

fn compare_by(a: &NormalizedBundle, b: &NormalizedBundle, field: SortField) -> Ordering {
    let (ea, eb) = (a.extracted.as_ref(), b.extracted.as_ref());
    match field {
        SortField::CreatedAt => a.invoice.created_at.cmp(&b.invoice.created_at),
        SortField::UpdatedAt => a.invoice.updated_at.cmp(&b.invoice.updated_at),
        SortField::ProcessedAt => a.invoice.processed_at.cmp(&b.invoice.processed_at),
        SortField::Name => a.invoice.name.cmp(&b.invoice.name),
        SortField::Status => a.invoice.status.as_str().cmp(b.invoice.status.as_str()),
        SortField::FileSize => a.invoice.file_size.cmp(&b.invoice.file_size),
        SortField::VendorName => ea
            .and_then(|e| e.vendor_name.as_deref())
            .cmp(&eb.and_then(|e| e.vendor_name.as_deref())),
        SortField::InvoiceNumber => ea
            .and_then(|e| e.invoice_number.as_deref())
            .cmp(&eb.and_then(|e| e.invoice_number.as_deref())),
        SortField::InvoiceDate => ea
            .and_then(|e| e.invoice_date)
            .cmp(&eb.and_then(|e| e.invoice_date)),
        SortField::DueDate => ea.and_then(|e| e.due_date).cmp(&eb.and_then(|e| e.due_date)),
        SortField::TotalAmount => ea
            .and_then(|e| e.total_amount)
            .cmp(&eb.and_then(|e| e.total_amount)),
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

impl InvoiceStore for MemoryStore {
    fn clear_all(&self) -> Result<()> {
        *self.data()? = MemoryData::default();
        Ok(())
    }

    fn user_count(&self) -> Result<i64> {
        Ok(self.data()?.users.len() as i64)
    }

    fn insert_organization(&self, org: &Organization, mode: WriteMode) -> Result<bool> {
        let mut data = self.data()?;
        insert_unique(&mut data.organizations, org, |o| &o.id, mode, "organization")
    }

    fn insert_department(&self, dept: &Department, mode: WriteMode) -> Result<bool> {
        let mut data = self.data()?;
        if !data.organizations.iter().any(|o| o.id == dept.organization_id) {
            return Err(Error::InvalidData(format!(
                "Unknown organization: {}",
                dept.organization_id
            )));
        }
        insert_unique(&mut data.departments, dept, |d| &d.id, mode, "department")
    }

    fn insert_user(&self, user: &User, mode: WriteMode) -> Result<bool> {
        let mut data = self.data()?;
        if !data.organizations.iter().any(|o| o.id == user.organization_id) {
            return Err(Error::InvalidData(format!(
                "Unknown organization: {}",
                user.organization_id
            )));
        }
        insert_unique(&mut data.users, user, |u| &u.id, mode, "user")
    }

    fn insert_bundle(&self, bundle: &NormalizedBundle) -> Result<()> {
        let mut data = self.data()?;
        let inv = &bundle.invoice;

        if data.bundles.iter().any(|b| b.invoice.id == inv.id) {
            return Err(Error::InvalidData(format!("Duplicate invoice id: {}", inv.id)));
        }
        if !data.organizations.iter().any(|o| o.id == inv.organization_id) {
            return Err(Error::InvalidData(format!(
                "Unknown organization: {}",
                inv.organization_id
            )));
        }
        if !data.departments.iter().any(|d| d.id == inv.department_id) {
            return Err(Error::InvalidData(format!(
                "Unknown department: {}",
                inv.department_id
            )));
        }
        let known_user = |id: &str| data.users.iter().any(|u| u.id == id);
        if !known_user(&inv.uploaded_by_id)
            || inv.assigned_to_id.as_deref().is_some_and(|id| !known_user(id))
        {
            return Err(Error::InvalidData(format!("Unknown user on invoice {}", inv.id)));
        }

        data.bundles.push(bundle.clone());
        Ok(())
    }

    fn spend_rows(&self, window: &SpendWindow) -> Result<Vec<SpendRow>> {
        let data = self.data()?;
        let mut rows: Vec<SpendRow> = data
            .bundles
            .iter()
            .map(|b| SpendRow {
                invoice_id: b.invoice.id.clone(),
                status: b.invoice.status.clone(),
                created_at: b.invoice.created_at,
                figures: b.extracted.as_ref().map(|e| SpendFigures {
                    vendor_name: e.vendor_name.clone(),
                    category: e.category.clone(),
                    invoice_date: e.invoice_date,
                    due_date: e.due_date,
                    total_amount: e.total_amount,
                    tax_amount: e.tax_amount,
                }),
            })
            .filter(|row| window.contains(row))
            .collect();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.invoice_id.cmp(&b.invoice_id))
        });
        Ok(rows)
    }

    fn list_invoices(&self, query: &InvoiceQuery) -> Result<InvoicePage> {
        let data = self.data()?;
        let search = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let mut matches: Vec<&NormalizedBundle> = data
            .bundles
            .iter()
            .filter(|b| {
                query
                    .status
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map_or(true, |s| b.invoice.status.as_str() == s)
            })
            .filter(|b| {
                query.vendor.as_deref().filter(|s| !s.is_empty()).map_or(true, |v| {
                    b.extracted.as_ref().and_then(|e| e.vendor_name.as_deref()) == Some(v)
                })
            })
            .filter(|b| {
                search.as_deref().map_or(true, |q| {
                    let e = b.extracted.as_ref();
                    contains_ci(e.and_then(|e| e.vendor_name.as_deref()), q)
                        || contains_ci(e.and_then(|e| e.invoice_number.as_deref()), q)
                        || contains_ci(Some(&b.invoice.name), q)
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            let ord = compare_by(a, b, query.sort_by);
            let ord = match query.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            ord.then_with(|| a.invoice.id.cmp(&b.invoice.id))
        });

        let total_count = matches.len() as i64;
        let invoices = matches
            .into_iter()
            .skip(query.offset().map_or(usize::MAX, |o| o.max(0) as usize))
            .take(query.limit.max(0) as usize)
            .map(|b| {
                let e = b.extracted.as_ref();
                InvoiceListItem {
                    id: b.invoice.id.clone(),
                    name: b.invoice.name.clone(),
                    vendor_name: e
                        .and_then(|e| e.vendor_name.clone())
                        .unwrap_or_else(|| "Unknown".to_string()),
                    invoice_number: e
                        .and_then(|e| e.invoice_number.clone())
                        .unwrap_or_else(|| "N/A".to_string()),
                    invoice_date: e.and_then(|e| e.invoice_date),
                    due_date: e.and_then(|e| e.due_date),
                    amount: e.and_then(|e| e.total_amount).unwrap_or_default(),
                    currency: e
                        .map(|e| e.currency.clone())
                        .unwrap_or_else(|| "EUR".to_string()),
                    status: b.invoice.status.clone(),
                    category: e
                        .and_then(|e| e.category.clone())
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or_else(|| "Uncategorized".to_string()),
                    uploaded_by: data
                        .users
                        .iter()
                        .find(|u| u.id == b.invoice.uploaded_by_id)
                        .map(|u| u.email.clone())
                        .unwrap_or_default(),
                    created_at: b.invoice.created_at,
                    is_validated: b.invoice.is_validated_by_human,
                }
            })
            .collect();

        Ok(InvoicePage {
            invoices,
            pagination: Pagination::new(query.page, query.limit, total_count),
        })
    }

    fn invoice_detail(&self, id: &str) -> Result<Option<InvoiceDetail>> {
        let data = self.data()?;
        let Some(b) = data.bundles.iter().find(|b| b.invoice.id == id) else {
            return Ok(None);
        };

        let uploader = data.users.iter().find(|u| u.id == b.invoice.uploaded_by_id);
        let name_of = |items: &[(String, String)], key: &str| {
            items
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };
        let departments: Vec<(String, String)> = data
            .departments
            .iter()
            .map(|d| (d.id.clone(), d.name.clone()))
            .collect();
        let organizations: Vec<(String, String)> = data
            .organizations
            .iter()
            .map(|o| (o.id.clone(), o.name.clone()))
            .collect();

        Ok(Some(InvoiceDetail {
            invoice: b.invoice.clone(),
            extracted_data: b.extracted.clone(),
            validated_data: b.validated.clone(),
            metadata: b.metadata.clone(),
            line_items: b.line_items.clone(),
            payments: Vec::new(),
            uploaded_by: UploaderInfo {
                email: uploader.map(|u| u.email.clone()).unwrap_or_default(),
                name: uploader.map(|u| u.name.clone()).unwrap_or_default(),
            },
            department_name: name_of(&departments, &b.invoice.department_id),
            organization_name: name_of(&organizations, &b.invoice.organization_id),
        }))
    }

    fn export_invoices(&self, options: &InvoiceExportOptions) -> Result<Vec<InvoiceExportRow>> {
        let data = self.data()?;
        let mut matches: Vec<&NormalizedBundle> = data
            .bundles
            .iter()
            .filter(|b| {
                options
                    .status
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map_or(true, |s| b.invoice.status.as_str() == s)
            })
            .filter(|b| options.from.map_or(true, |from| b.invoice.created_at >= from))
            .filter(|b| options.to.map_or(true, |to| b.invoice.created_at <= to))
            .collect();

        matches.sort_by(|a, b| {
            b.invoice
                .created_at
                .cmp(&a.invoice.created_at)
                .then_with(|| a.invoice.id.cmp(&b.invoice.id))
        });

        Ok(matches
            .into_iter()
            .take(options.limit.max(0) as usize)
            .map(|b| {
                let e = b.extracted.as_ref();
                InvoiceExportRow {
                    id: b.invoice.id.clone(),
                    invoice_number: e.and_then(|e| e.invoice_number.clone()),
                    vendor_name: e.and_then(|e| e.vendor_name.clone()),
                    invoice_date: e.and_then(|e| e.invoice_date),
                    due_date: e.and_then(|e| e.due_date),
                    total_amount: e.and_then(|e| e.total_amount),
                    currency: e.map(|e| e.currency.clone()),
                    category: e.and_then(|e| e.category.clone()),
                    status: b.invoice.status.clone(),
                    uploaded_by: data
                        .users
                        .iter()
                        .find(|u| u.id == b.invoice.uploaded_by_id)
                        .map(|u| u.name.clone()),
                    created_at: b.invoice.created_at,
                }
            })
            .collect())
    }
}

// ============================================================================
// Mock chat service
// ============================================================================

#[derive(Default)]
struct MockChatState {
    response: Option<Value>,
    fail: bool,
    queries: Vec<String>,
}

type SharedState = Arc<tokio::sync::Mutex<MockChatState>>;

/// Mock natural-language query service for tests
pub struct MockChatServer {
    addr: SocketAddr,
    state: SharedState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockChatServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        let state: SharedState = Arc::default();
        let app = Router::new()
            .route("/api/query", post(handle_query))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Body returned for every subsequent query
    pub async fn set_response(&self, response: Value) {
        self.state.lock().await.response = Some(response);
    }

    /// Make every subsequent query fail with a 500
    pub async fn set_failure(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    /// Queries received so far, in order
    pub async fn received_queries(&self) -> Vec<String> {
        self.state.lock().await.queries.clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockChatServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn handle_query(
    State(state): State<SharedState>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut state = state.lock().await;
    let query = body
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    state.queries.push(query.clone());

    if state.fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "model unavailable"})),
        );
    }

    let response = state.response.clone().unwrap_or_else(|| {
        json!({
            "sql": "SELECT COUNT(*) FROM invoices",
            "results": [{"count": 0}],
            "explanation": format!("Answer for: {}", query),
            "conversation_id": "mock-conversation"
        })
    });
    (StatusCode::OK, Json(response))
}
