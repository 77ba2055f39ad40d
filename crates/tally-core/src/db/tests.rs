//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InvoiceExportOptions;
    use crate::normalize::normalize;
    use crate::raw::RawRecord;
    use crate::status::InvoiceStatus;
    use crate::store::WriteMode;
    use chrono::TimeZone;
    use rusqlite::params;
    use rust_decimal_macros::dec;
    use serde_json::{json, Value};

    fn seed_parents(db: &Database) {
        db.insert_organization(
            &Organization {
                id: "org-1".into(),
                name: "Organization org-1".into(),
            },
            WriteMode::Create,
        )
        .unwrap();
        db.insert_department(
            &Department {
                id: "dept-1".into(),
                name: "Department dept-1".into(),
                organization_id: "org-1".into(),
            },
            WriteMode::Create,
        )
        .unwrap();
        db.insert_user(
            &User {
                id: "user-1".into(),
                email: "user-1_admin@tally.local".into(),
                name: "User user-1".into(),
                role: UserRole::Admin,
                organization_id: "org-1".into(),
            },
            WriteMode::Create,
        )
        .unwrap();
    }

    fn raw(id: &str, status: &str, created: &str) -> Value {
        json!({
            "_id": id,
            "name": format!("{}.pdf", id),
            "fileSize": {"$numberLong": "1024"},
            "status": status,
            "organizationId": "org-1",
            "departmentId": "dept-1",
            "uploadedById": "user-1",
            "createdAt": {"$date": created},
            "updatedAt": {"$date": created}
        })
    }

    fn with_extracted(mut record: Value, vendor: &str, number: &str, total: &str) -> Value {
        record["extractedData"] = json!({"llmData": {
            "vendor": {"value": {"vendorName": {"value": vendor}}},
            "invoice": {"value": {
                "invoiceId": {"value": number},
                "invoiceDate": {"value": "2025-02-10"}
            }},
            "summary": {"value": {"invoiceTotal": {"value": total}, "totalTax": {"value": "19.00"}}},
            "lineItems": {"value": {"items": {"value": [
                {"description": {"value": "Paper"}, "quantity": {"value": 2}, "totalPrice": {"value": 50}},
                {"name": {"value": "Toner"}, "totalPrice": {"value": 49}}
            ]}}}
        }});
        record
    }

    fn bundle(record: Value) -> NormalizedBundle {
        normalize(&RawRecord::from_json(&record).unwrap()).unwrap()
    }

    fn seeded_db() -> Database {
        let db = Database::in_memory().unwrap();
        seed_parents(&db);
        for record in [
            with_extracted(
                raw("inv-a", "processed", "2025-03-01T09:00:00.000Z"),
                "Acme GmbH",
                "RE-100",
                "119.00",
            ),
            with_extracted(
                raw("inv-b", "pending", "2025-03-02T09:00:00.000Z"),
                "Bolt_AG",
                "RE-200",
                "-40.50",
            ),
            raw("inv-c", "failed", "2025-03-03T09:00:00.000Z"),
        ] {
            db.insert_bundle(&bundle(record)).unwrap();
        }
        db
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.invoice_count().unwrap(), 0);
        assert_eq!(db.user_count().unwrap(), 0);
    }

    #[test]
    fn test_schema_has_expected_tables() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
                 ('organizations', 'departments', 'users', 'invoices', 'invoice_metadata', \
                  'extracted_data', 'validated_data', 'line_items', 'payments')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }

    #[test]
    fn test_write_modes() {
        let db = Database::in_memory().unwrap();
        seed_parents(&db);

        let org = Organization {
            id: "org-1".into(),
            name: "Again".into(),
        };
        assert!(db.insert_organization(&org, WriteMode::Create).is_err());
        assert!(!db.insert_organization(&org, WriteMode::IfMissing).unwrap());

        let users = db.list_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, UserRole::Admin);
        assert_eq!(db.list_departments().unwrap()[0].organization_id, "org-1");
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let db = Database::in_memory().unwrap();
        seed_parents(&db);

        let mut record = raw("inv-x", "processed", "2025-03-01T09:00:00.000Z");
        record["departmentId"] = json!("dept-missing");
        assert!(db.insert_bundle(&bundle(record)).is_err());
        assert_eq!(db.invoice_count().unwrap(), 0);
    }

    #[test]
    fn test_bundle_is_atomic() {
        let db = Database::in_memory().unwrap();
        seed_parents(&db);

        let first = bundle(with_extracted(
            raw("inv-a", "processed", "2025-03-01T09:00:00.000Z"),
            "Acme",
            "1",
            "10",
        ));
        db.insert_bundle(&first).unwrap();
        assert!(db.insert_bundle(&first).is_err());

        let conn = db.conn().unwrap();
        let extracted: i64 = conn
            .query_row("SELECT COUNT(*) FROM extracted_data", [], |row| row.get(0))
            .unwrap();
        let items: i64 = conn
            .query_row("SELECT COUNT(*) FROM line_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(extracted, 1);
        assert_eq!(items, 2);
    }

    #[test]
    fn test_clear_all() {
        let db = seeded_db();
        db.clear_all().unwrap();
        assert_eq!(db.invoice_count().unwrap(), 0);
        assert_eq!(db.user_count().unwrap(), 0);
        assert!(db.list_departments().unwrap().is_empty());
    }

    #[test]
    fn test_list_defaults_and_placeholders() {
        let db = seeded_db();
        let page = db.list_invoices(&InvoiceQuery::default()).unwrap();

        assert_eq!(page.pagination.total_count, 3);
        assert_eq!(page.pagination.total_pages, 1);
        let ids: Vec<_> = page.invoices.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["inv-c", "inv-b", "inv-a"]);

        let bare = &page.invoices[0];
        assert_eq!(bare.vendor_name, "Unknown");
        assert_eq!(bare.invoice_number, "N/A");
        assert_eq!(bare.amount, dec!(0));
        assert_eq!(bare.currency, "EUR");
        assert_eq!(bare.category, "Uncategorized");
        assert_eq!(bare.status, InvoiceStatus::Failed);
        assert_eq!(bare.uploaded_by, "user-1_admin@tally.local");

        let credit = &page.invoices[1];
        assert_eq!(credit.amount, dec!(40.50));
        assert_eq!(credit.category, "Operations");
    }

    #[test]
    fn test_list_filters() {
        let db = seeded_db();

        let query = InvoiceQuery {
            status: Some("COMPLETED".into()),
            ..Default::default()
        };
        let page = db.list_invoices(&query).unwrap();
        assert_eq!(page.invoices.len(), 1);
        assert_eq!(page.invoices[0].id, "inv-a");

        let query = InvoiceQuery {
            search: Some("re-2".into()),
            ..Default::default()
        };
        assert_eq!(db.list_invoices(&query).unwrap().invoices[0].id, "inv-b");

        let query = InvoiceQuery {
            vendor: Some("acme gmbh".into()),
            ..Default::default()
        };
        assert_eq!(db.list_invoices(&query).unwrap().pagination.total_count, 0);
    }

    #[test]
    fn test_search_wildcards_are_literal() {
        let db = seeded_db();

        let query = InvoiceQuery {
            search: Some("_".into()),
            ..Default::default()
        };
        let page = db.list_invoices(&query).unwrap();
        assert_eq!(page.pagination.total_count, 1);
        assert_eq!(page.invoices[0].vendor_name, "Bolt_AG");

        let query = InvoiceQuery {
            search: Some("%".into()),
            ..Default::default()
        };
        assert_eq!(db.list_invoices(&query).unwrap().pagination.total_count, 0);
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let db = Database::in_memory().unwrap();
        seed_parents(&db);
        db.insert_bundle(&bundle(with_extracted(
            raw("inv-m", "processed", "2025-03-01T09:00:00.000Z"),
            "Müller GmbH",
            "RE-ÄÖ-1",
            "10.00",
        )))
        .unwrap();

        for term in ["MÜLLER", "müller", "re-äö"] {
            let query = InvoiceQuery {
                search: Some(term.into()),
                ..Default::default()
            };
            let page = db.list_invoices(&query).unwrap();
            assert_eq!(page.pagination.total_count, 1, "{}", term);
        }
    }

    #[test]
    fn test_list_sort_and_paging() {
        let db = seeded_db();

        let query = InvoiceQuery {
            sort_by: SortField::TotalAmount,
            sort_order: SortOrder::Asc,
            ..Default::default()
        };
        let ids: Vec<_> = db
            .list_invoices(&query)
            .unwrap()
            .invoices
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["inv-c", "inv-b", "inv-a"]);

        let query = InvoiceQuery {
            page: 2,
            limit: 2,
            ..Default::default()
        };
        let page = db.list_invoices(&query).unwrap();
        assert_eq!(page.invoices.len(), 1);
        assert_eq!(page.invoices[0].id, "inv-a");
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn test_invoice_detail() {
        let db = seeded_db();
        {
            let conn = db.conn().unwrap();
            conn.execute(
                "INSERT INTO payments (invoice_id, amount, payment_date, method, reference)
                 VALUES (?, ?, ?, ?, ?)",
                params!["inv-a", "119.00", "2025-03-10", "bank_transfer", "PAY-1"],
            )
            .unwrap();
        }

        let detail = db.invoice_detail("inv-a").unwrap().unwrap();
        assert_eq!(detail.invoice.file_size, 1024);
        assert_eq!(detail.organization_name, "Organization org-1");
        assert_eq!(detail.department_name, "Department dept-1");
        assert_eq!(detail.uploaded_by.name, "User user-1");

        let extracted = detail.extracted_data.unwrap();
        assert_eq!(extracted.total_amount, Some(dec!(119.00)));
        assert!(!extracted.is_credit);

        let items: Vec<_> = detail
            .line_items
            .iter()
            .map(|li| li.description.as_str())
            .collect();
        assert_eq!(items, vec!["Paper", "Toner"]);
        assert_eq!(detail.payments.len(), 1);
        assert_eq!(detail.payments[0].amount, dec!(119.00));

        assert!(db.invoice_detail("missing").unwrap().is_none());
    }

    #[test]
    fn test_credit_flag_roundtrip() {
        let db = seeded_db();
        let detail = db.invoice_detail("inv-b").unwrap().unwrap();
        let extracted = detail.extracted_data.unwrap();
        assert!(extracted.is_credit);
        assert_eq!(extracted.total_amount, Some(dec!(40.50)));
    }

    #[test]
    fn test_spend_rows() {
        let db = seeded_db();
        let rows = db.spend_rows(&SpendWindow::all()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].invoice_id, "inv-a");
        assert!(rows[2].figures.is_none());

        let figures = rows[0].figures.as_ref().unwrap();
        assert_eq!(figures.vendor_name.as_deref(), Some("Acme GmbH"));
        assert_eq!(figures.tax_amount, Some(dec!(19.00)));
    }

    #[test]
    fn test_spend_rows_window() {
        let db = seeded_db();
        let ids = |window: SpendWindow| -> Vec<String> {
            db.spend_rows(&window)
                .unwrap()
                .into_iter()
                .map(|r| r.invoice_id)
                .collect()
        };

        let created = SpendWindow {
            created_from: Some(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()),
            ..SpendWindow::all()
        };
        assert_eq!(ids(created), vec!["inv-b", "inv-c"]);

        // inv-c has no extracted data, so any date bound drops it
        let invoiced = SpendWindow {
            invoice_from: NaiveDate::from_ymd_opt(2025, 2, 10),
            ..SpendWindow::all()
        };
        assert_eq!(ids(invoiced), vec!["inv-a", "inv-b"]);

        let later = SpendWindow {
            invoice_from: NaiveDate::from_ymd_opt(2025, 2, 11),
            ..SpendWindow::all()
        };
        assert!(ids(later).is_empty());

        // No seeded invoice carries a due date
        let due = SpendWindow {
            due_to: NaiveDate::from_ymd_opt(2030, 1, 1),
            ..SpendWindow::all()
        };
        assert!(ids(due).is_empty());
    }

    #[test]
    fn test_export_invoices() {
        let db = seeded_db();

        let rows = db.export_invoices(&InvoiceExportOptions::default()).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["inv-c", "inv-b", "inv-a"]);
        assert_eq!(rows[0].uploaded_by.as_deref(), Some("User user-1"));

        let options = InvoiceExportOptions {
            from: Some(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2025, 3, 2, 23, 59, 59).unwrap()),
            ..Default::default()
        };
        let rows = db.export_invoices(&options).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "inv-b");

        let options = InvoiceExportOptions {
            limit: 1,
            ..Default::default()
        };
        assert_eq!(db.export_invoices(&options).unwrap().len(), 1);
    }

    #[test]
    fn test_datetime_storage_format() {
        let dt = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let text = format_datetime(&dt);
        assert_eq!(text, "2025-03-01 09:00:00.000");
        assert_eq!(parse_datetime(&text), dt);
    }

    #[test]
    fn test_derive_key_is_stable() {
        let a = derive_key("correct horse").unwrap();
        let b = derive_key("correct horse").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, derive_key("battery staple").unwrap());
    }
}
