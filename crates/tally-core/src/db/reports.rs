//! Read models for spend analytics

use super::{format_datetime, parse_date, parse_datetime, parse_decimal, Database};
use crate::error::Result;
use crate::models::{SpendFigures, SpendRow, SpendWindow};
use crate::status::InvoiceStatus;

impl Database {
    /// Invoices inside `window` with their extracted figures, oldest first
    pub fn spend_rows(&self, window: &SpendWindow) -> Result<Vec<SpendRow>> {
        let mut conditions = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(from) = window.created_from {
            conditions.push("i.created_at >= ?");
            params.push(format_datetime(&from));
        }
        if let Some(from) = window.invoice_from {
            conditions.push("e.invoice_date >= ?");
            params.push(from.to_string());
        }
        if let Some(from) = window.due_from {
            conditions.push("e.due_date >= ?");
            params.push(from.to_string());
        }
        if let Some(to) = window.due_to {
            conditions.push("e.due_date <= ?");
            params.push(to.to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT i.id, i.status, i.created_at,
                   e.id, e.vendor_name, e.category, e.invoice_date, e.due_date,
                   e.total_amount, e.tax_amount
            FROM invoices i
            LEFT JOIN extracted_data e ON e.invoice_id = i.id
            {}
            ORDER BY i.created_at, i.id
            "#,
            where_clause
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                let status: String = row.get(1)?;
                let created_at: String = row.get(2)?;
                let extracted_id: Option<i64> = row.get(3)?;

                let figures = match extracted_id {
                    Some(_) => Some(SpendFigures {
                        vendor_name: row.get(4)?,
                        category: row.get(5)?,
                        invoice_date: parse_date(row.get(6)?),
                        due_date: parse_date(row.get(7)?),
                        total_amount: parse_decimal(row.get(8)?),
                        tax_amount: parse_decimal(row.get(9)?),
                    }),
                    None => None,
                };

                Ok(SpendRow {
                    invoice_id: row.get(0)?,
                    status: InvoiceStatus::from_stored(&status),
                    created_at: parse_datetime(&created_at),
                    figures,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
