//! Invoice bundle writes and invoice reads (list, detail, export)

use rusqlite::{params, OptionalExtension, Transaction};
use tracing::debug;

use super::invoice_filter::{InvoiceFilter, INVOICE_JOINS};
use super::{
    decimal_text, format_datetime, parse_date, parse_datetime, parse_decimal, Database,
};
use crate::error::{Error, Result};
use crate::export::InvoiceExportOptions;
use crate::models::*;
use crate::status::InvoiceStatus;

const UNKNOWN_VENDOR: &str = "Unknown";
const NO_INVOICE_NUMBER: &str = "N/A";
const UNCATEGORIZED: &str = "Uncategorized";

impl Database {
    /// Write an invoice with its metadata, extracted/validated data and line items
    ///
    /// Everything lands in one transaction: a failure leaves no partial invoice.
    pub fn insert_bundle(&self, bundle: &NormalizedBundle) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        Self::insert_invoice_row(&tx, &bundle.invoice)?;
        let id = &bundle.invoice.id;

        if let Some(ref md) = bundle.metadata {
            tx.execute(
                "INSERT INTO invoice_metadata (invoice_id, model_used, prompt_tokens, completion_tokens,
                                               total_tokens, processing_time, confidence, ai_response_base_url)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    md.model_used,
                    md.prompt_tokens,
                    md.completion_tokens,
                    md.total_tokens,
                    md.processing_time,
                    md.confidence,
                    md.ai_response_base_url
                ],
            )?;
        }

        if let Some(ref ed) = bundle.extracted {
            Self::insert_extracted_row(&tx, id, ed)?;
        }

        for (position, item) in bundle.line_items.iter().enumerate() {
            tx.execute(
                "INSERT INTO line_items (invoice_id, position, description, quantity, unit_price,
                                         amount, tax_rate, tax_amount)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    position as i64,
                    item.description,
                    item.quantity.to_string(),
                    item.unit_price.to_string(),
                    item.amount.to_string(),
                    decimal_text(&item.tax_rate),
                    decimal_text(&item.tax_amount)
                ],
            )?;
        }

        if let Some(ref vd) = bundle.validated {
            tx.execute(
                "INSERT INTO validated_data (invoice_id, vendor_name, vendor_address, invoice_number,
                                             invoice_date, due_date, subtotal, tax_amount, total_amount,
                                             currency, category, status)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    vd.vendor_name,
                    vd.vendor_address,
                    vd.invoice_number,
                    vd.invoice_date.map(|d| d.to_string()),
                    vd.due_date.map(|d| d.to_string()),
                    decimal_text(&vd.subtotal),
                    decimal_text(&vd.tax_amount),
                    decimal_text(&vd.total_amount),
                    vd.currency,
                    vd.category,
                    vd.status
                ],
            )?;
        }

        tx.commit()?;
        debug!(invoice_id = %id, line_items = bundle.line_items.len(), "Inserted invoice bundle");
        Ok(())
    }

    fn insert_invoice_row(tx: &Transaction, inv: &Invoice) -> Result<()> {
        tx.execute(
            "INSERT INTO invoices (id, name, file_path, file_size, file_type, status, organization_id,
                                   department_id, uploaded_by_id, assigned_to_id, assigned_at,
                                   is_validated_by_human, analytics_id, processed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                inv.id,
                inv.name,
                inv.file_path,
                inv.file_size,
                inv.file_type,
                inv.status.as_str(),
                inv.organization_id,
                inv.department_id,
                inv.uploaded_by_id,
                inv.assigned_to_id,
                inv.assigned_at.as_ref().map(format_datetime),
                inv.is_validated_by_human,
                inv.analytics_id,
                inv.processed_at.as_ref().map(format_datetime),
                format_datetime(&inv.created_at),
                format_datetime(&inv.updated_at)
            ],
        )?;
        Ok(())
    }

    fn insert_extracted_row(tx: &Transaction, invoice_id: &str, ed: &ExtractedData) -> Result<()> {
        tx.execute(
            "INSERT INTO extracted_data (invoice_id, vendor_name, vendor_address, vendor_email, vendor_phone,
                                         vendor_tax_id, customer_name, customer_address, invoice_number,
                                         invoice_date, due_date, subtotal, tax_amount, total_amount, is_credit,
                                         currency, payment_terms, payment_method, category, validated_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                invoice_id,
                ed.vendor_name,
                ed.vendor_address,
                ed.vendor_email,
                ed.vendor_phone,
                ed.vendor_tax_id,
                ed.customer_name,
                ed.customer_address,
                ed.invoice_number,
                ed.invoice_date.map(|d| d.to_string()),
                ed.due_date.map(|d| d.to_string()),
                decimal_text(&ed.subtotal),
                decimal_text(&ed.tax_amount),
                decimal_text(&ed.total_amount),
                ed.is_credit,
                ed.currency,
                ed.payment_terms,
                ed.payment_method,
                ed.category,
                ed.validated_by
            ],
        )?;
        Ok(())
    }

    /// Paginated, filtered, sorted invoice list
    pub fn list_invoices(&self, query: &InvoiceQuery) -> Result<InvoicePage> {
        let conn = self.conn()?;
        let filter = InvoiceFilter::from_query(query).build();

        let total_count: i64 = conn.query_row(
            &filter.build_count_query(),
            filter.params_refs().as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            r#"
            SELECT i.id, i.name, e.vendor_name, e.invoice_number, e.invoice_date, e.due_date,
                   e.total_amount, e.currency, i.status, e.category, COALESCE(u.email, ''),
                   i.created_at, i.is_validated_by_human
            FROM invoices i
            {}
            {}
            {}
            LIMIT ? OFFSET ?
            "#,
            INVOICE_JOINS, filter.where_clause, filter.order_clause
        );

        let mut params = filter.into_params();
        params.push(Box::new(query.limit));
        let offset = query
            .offset()
            .ok_or_else(|| Error::InvalidData(format!("page {} is out of range", query.page)))?;
        params.push(Box::new(offset));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let invoices = stmt
            .query_map(params_refs.as_slice(), |row| {
                let status: String = row.get(8)?;
                let created_at: String = row.get(11)?;
                Ok(InvoiceListItem {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    vendor_name: row
                        .get::<_, Option<String>>(2)?
                        .unwrap_or_else(|| UNKNOWN_VENDOR.to_string()),
                    invoice_number: row
                        .get::<_, Option<String>>(3)?
                        .unwrap_or_else(|| NO_INVOICE_NUMBER.to_string()),
                    invoice_date: parse_date(row.get(4)?),
                    due_date: parse_date(row.get(5)?),
                    amount: parse_decimal(row.get(6)?).unwrap_or_default(),
                    currency: row
                        .get::<_, Option<String>>(7)?
                        .unwrap_or_else(|| crate::normalize::DEFAULT_CURRENCY.to_string()),
                    status: InvoiceStatus::from_stored(&status),
                    category: row
                        .get::<_, Option<String>>(9)?
                        .filter(|c| !c.trim().is_empty())
                        .unwrap_or_else(|| UNCATEGORIZED.to_string()),
                    uploaded_by: row.get(10)?,
                    created_at: parse_datetime(&created_at),
                    is_validated: row.get(12)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!(
            total = total_count,
            page = query.page,
            returned = invoices.len(),
            "Listed invoices"
        );

        Ok(InvoicePage {
            invoices,
            pagination: Pagination::new(query.page, query.limit, total_count),
        })
    }

    /// Single invoice with every related record
    pub fn invoice_detail(&self, id: &str) -> Result<Option<InvoiceDetail>> {
        let conn = self.conn()?;

        let head = conn
            .query_row(
                r#"
                SELECT i.id, i.name, i.file_path, i.file_size, i.file_type, i.status, i.organization_id,
                       i.department_id, i.uploaded_by_id, i.assigned_to_id, i.assigned_at,
                       i.is_validated_by_human, i.analytics_id, i.processed_at, i.created_at, i.updated_at,
                       u.email, u.name, d.name, o.name
                FROM invoices i
                JOIN users u ON u.id = i.uploaded_by_id
                JOIN departments d ON d.id = i.department_id
                JOIN organizations o ON o.id = i.organization_id
                WHERE i.id = ?
                "#,
                params![id],
                |row| {
                    let status: String = row.get(5)?;
                    let assigned_at: Option<String> = row.get(10)?;
                    let processed_at: Option<String> = row.get(13)?;
                    let created_at: String = row.get(14)?;
                    let updated_at: String = row.get(15)?;
                    let invoice = Invoice {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        file_path: row.get(2)?,
                        file_size: row.get(3)?,
                        file_type: row.get(4)?,
                        status: InvoiceStatus::from_stored(&status),
                        organization_id: row.get(6)?,
                        department_id: row.get(7)?,
                        uploaded_by_id: row.get(8)?,
                        assigned_to_id: row.get(9)?,
                        assigned_at: assigned_at.as_deref().map(parse_datetime),
                        is_validated_by_human: row.get(11)?,
                        analytics_id: row.get(12)?,
                        processed_at: processed_at.as_deref().map(parse_datetime),
                        created_at: parse_datetime(&created_at),
                        updated_at: parse_datetime(&updated_at),
                    };
                    let uploader = UploaderInfo {
                        email: row.get(16)?,
                        name: row.get(17)?,
                    };
                    Ok((invoice, uploader, row.get::<_, String>(18)?, row.get::<_, String>(19)?))
                },
            )
            .optional()?;

        let Some((invoice, uploaded_by, department_name, organization_name)) = head else {
            return Ok(None);
        };

        let metadata = conn
            .query_row(
                "SELECT model_used, prompt_tokens, completion_tokens, total_tokens, processing_time,
                        confidence, ai_response_base_url
                 FROM invoice_metadata WHERE invoice_id = ?",
                params![id],
                |row| {
                    Ok(InvoiceMetadata {
                        model_used: row.get(0)?,
                        prompt_tokens: row.get(1)?,
                        completion_tokens: row.get(2)?,
                        total_tokens: row.get(3)?,
                        processing_time: row.get(4)?,
                        confidence: row.get(5)?,
                        ai_response_base_url: row.get(6)?,
                    })
                },
            )
            .optional()?;

        let extracted_data = conn
            .query_row(
                "SELECT vendor_name, vendor_address, vendor_email, vendor_phone, vendor_tax_id,
                        customer_name, customer_address, invoice_number, invoice_date, due_date,
                        subtotal, tax_amount, total_amount, is_credit, currency, payment_terms,
                        payment_method, category, validated_by
                 FROM extracted_data WHERE invoice_id = ?",
                params![id],
                |row| {
                    Ok(ExtractedData {
                        vendor_name: row.get(0)?,
                        vendor_address: row.get(1)?,
                        vendor_email: row.get(2)?,
                        vendor_phone: row.get(3)?,
                        vendor_tax_id: row.get(4)?,
                        customer_name: row.get(5)?,
                        customer_address: row.get(6)?,
                        invoice_number: row.get(7)?,
                        invoice_date: parse_date(row.get(8)?),
                        due_date: parse_date(row.get(9)?),
                        subtotal: parse_decimal(row.get(10)?),
                        tax_amount: parse_decimal(row.get(11)?),
                        total_amount: parse_decimal(row.get(12)?),
                        is_credit: row.get(13)?,
                        currency: row.get(14)?,
                        payment_terms: row.get(15)?,
                        payment_method: row.get(16)?,
                        category: row.get(17)?,
                        validated_by: row.get(18)?,
                    })
                },
            )
            .optional()?;

        let validated_data = conn
            .query_row(
                "SELECT vendor_name, vendor_address, invoice_number, invoice_date, due_date, subtotal,
                        tax_amount, total_amount, currency, category, status
                 FROM validated_data WHERE invoice_id = ?",
                params![id],
                |row| {
                    Ok(ValidatedData {
                        vendor_name: row.get(0)?,
                        vendor_address: row.get(1)?,
                        invoice_number: row.get(2)?,
                        invoice_date: parse_date(row.get(3)?),
                        due_date: parse_date(row.get(4)?),
                        subtotal: parse_decimal(row.get(5)?),
                        tax_amount: parse_decimal(row.get(6)?),
                        total_amount: parse_decimal(row.get(7)?),
                        currency: row.get(8)?,
                        category: row.get(9)?,
                        status: row.get(10)?,
                    })
                },
            )
            .optional()?;

        let mut stmt = conn.prepare(
            "SELECT description, quantity, unit_price, amount, tax_rate, tax_amount
             FROM line_items WHERE invoice_id = ? ORDER BY position",
        )?;
        let line_items = stmt
            .query_map(params![id], |row| {
                Ok(LineItem {
                    description: row.get(0)?,
                    quantity: parse_decimal(row.get(1)?).unwrap_or_default(),
                    unit_price: parse_decimal(row.get(2)?).unwrap_or_default(),
                    amount: parse_decimal(row.get(3)?).unwrap_or_default(),
                    tax_rate: parse_decimal(row.get(4)?),
                    tax_amount: parse_decimal(row.get(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT id, amount, payment_date, method, reference
             FROM payments WHERE invoice_id = ? ORDER BY id",
        )?;
        let payments = stmt
            .query_map(params![id], |row| {
                Ok(Payment {
                    id: row.get(0)?,
                    amount: parse_decimal(row.get(1)?).unwrap_or_default(),
                    payment_date: parse_date(row.get(2)?),
                    method: row.get(3)?,
                    reference: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(InvoiceDetail {
            invoice,
            extracted_data,
            validated_data,
            metadata,
            line_items,
            payments,
            uploaded_by,
            department_name,
            organization_name,
        }))
    }

    /// Invoices joined with extracted data and uploader, newest first
    pub fn export_invoices(&self, options: &InvoiceExportOptions) -> Result<Vec<InvoiceExportRow>> {
        let conn = self.conn()?;
        let filter = InvoiceFilter::new()
            .status(options.status.as_deref())
            .created_between(options.from, options.to)
            .build();

        let sql = format!(
            r#"
            SELECT i.id, e.invoice_number, e.vendor_name, e.invoice_date, e.due_date, e.total_amount,
                   e.currency, e.category, i.status, u.name, i.created_at
            FROM invoices i
            {}
            {}
            {}
            LIMIT ?
            "#,
            INVOICE_JOINS, filter.where_clause, filter.order_clause
        );

        let mut params = filter.into_params();
        params.push(Box::new(options.limit));
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                let status: String = row.get(8)?;
                let created_at: String = row.get(10)?;
                Ok(InvoiceExportRow {
                    id: row.get(0)?,
                    invoice_number: row.get(1)?,
                    vendor_name: row.get(2)?,
                    invoice_date: parse_date(row.get(3)?),
                    due_date: parse_date(row.get(4)?),
                    total_amount: parse_decimal(row.get(5)?),
                    currency: row.get(6)?,
                    category: row.get(7)?,
                    status: InvoiceStatus::from_stored(&status),
                    uploaded_by: row.get(9)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
