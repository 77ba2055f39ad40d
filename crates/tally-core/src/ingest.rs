//! Ingestion orchestrator
//!
//! Turns a batch of raw extraction records into stored invoices. A full
//! ingest reseeds the store; `ingest_incremental` appends. Record-level
//! failures are collected in the report and never abort the batch.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{Department, IngestReport, Organization, RecordError, User, UserRole};
use crate::normalize::normalize;
use crate::raw::RawRecord;
use crate::store::{InvoiceStore, WriteMode};

/// Local parts for generated user emails, assigned round-robin
const PLACEHOLDER_EMAILS: &[&str] = &[
    "admin@tally.local",
    "finance@tally.local",
    "user@tally.local",
    "validator@tally.local",
];

/// Last eight characters of an id, used in display names
fn short_id(id: &str) -> &str {
    let start = id
        .char_indices()
        .rev()
        .nth(7)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &id[start..]
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

/// Parent ids referenced by a batch, each list in first-seen order
#[derive(Debug, Default)]
struct Parents {
    organizations: Vec<String>,
    /// (department id, first organization seen with it)
    departments: Vec<(String, String)>,
    users: Vec<String>,
}

impl Parents {
    fn collect(records: &[RawRecord]) -> Self {
        let mut parents = Self::default();
        for record in records {
            push_unique(&mut parents.organizations, &record.organization_id);
            if !parents
                .departments
                .iter()
                .any(|(id, _)| id == &record.department_id)
            {
                parents
                    .departments
                    .push((record.department_id.clone(), record.organization_id.clone()));
            }
            push_unique(&mut parents.users, &record.uploaded_by_id);
            if let Some(assignee) = record.assigned_to_id.as_deref().filter(|s| !s.is_empty()) {
                push_unique(&mut parents.users, assignee);
            }
        }
        parents
    }
}

pub struct Ingestor<'a> {
    store: &'a dyn InvoiceStore,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a dyn InvoiceStore) -> Self {
        Self { store }
    }

    /// Replace the store's contents with the given batch
    pub fn ingest(&self, values: &[Value]) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let records = parse_records(values, &mut report);
        let parents = Parents::collect(&records);

        info!(
            records = records.len(),
            organizations = parents.organizations.len(),
            departments = parents.departments.len(),
            users = parents.users.len(),
            "Reseeding store"
        );

        self.store.clear_all()?;
        self.write_parents(&parents, WriteMode::Create, true, &mut report)?;
        self.write_invoices(&records, &mut report);

        info!(
            created = report.created_count,
            failed = report.errors.len(),
            "Ingestion complete"
        );
        Ok(report)
    }

    /// Append a batch without clearing; parents are created only if missing
    pub fn ingest_incremental(&self, values: &[Value]) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let records = parse_records(values, &mut report);
        let parents = Parents::collect(&records);
        let first_run = self.store.user_count()? == 0;

        self.write_parents(&parents, WriteMode::IfMissing, first_run, &mut report)?;
        self.write_invoices(&records, &mut report);

        info!(
            created = report.created_count,
            failed = report.errors.len(),
            "Incremental ingestion complete"
        );
        Ok(report)
    }

    fn write_parents(
        &self,
        parents: &Parents,
        mode: WriteMode,
        admin_first: bool,
        report: &mut IngestReport,
    ) -> Result<()> {
        for org_id in &parents.organizations {
            let org = Organization {
                id: org_id.clone(),
                name: format!("Organization {}", short_id(org_id)),
            };
            if self.store.insert_organization(&org, mode)? {
                report.organizations += 1;
            }
        }

        for (dept_id, org_id) in &parents.departments {
            let dept = Department {
                id: dept_id.clone(),
                name: format!("Department {}", short_id(dept_id)),
                organization_id: org_id.clone(),
            };
            if self.store.insert_department(&dept, mode)? {
                report.departments += 1;
            }
        }

        let Some(home_org) = parents.organizations.first() else {
            return Ok(());
        };

        for (index, user_id) in parents.users.iter().enumerate() {
            let short = short_id(user_id);
            let role = if admin_first && index == 0 {
                UserRole::Admin
            } else {
                UserRole::User
            };
            let user = User {
                id: user_id.clone(),
                email: format!(
                    "{}_{}",
                    short,
                    PLACEHOLDER_EMAILS[index % PLACEHOLDER_EMAILS.len()]
                ),
                name: format!("User {}", short),
                role,
                organization_id: home_org.clone(),
            };
            if self.store.insert_user(&user, mode)? {
                report.users += 1;
            }
        }

        Ok(())
    }

    fn write_invoices(&self, records: &[RawRecord], report: &mut IngestReport) {
        for record in records {
            let result = normalize(record).and_then(|bundle| self.store.insert_bundle(&bundle));
            match result {
                Ok(()) => {
                    debug!(id = %record.id, "Stored invoice");
                    report.created_count += 1;
                }
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Skipping invoice");
                    report.errors.push(RecordError {
                        record_id: Some(record.id.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

fn parse_records(values: &[Value], report: &mut IngestReport) -> Vec<RawRecord> {
    values
        .iter()
        .filter_map(|value| match RawRecord::from_json(value) {
            Ok(record) => Some(record),
            Err(e) => {
                let record_id = RawRecord::peek_id(value);
                warn!(id = ?record_id, error = %e, "Skipping unreadable record");
                report.errors.push(RecordError {
                    record_id,
                    message: e.to_string(),
                });
                None
            }
        })
        .collect()
}
