//! Turn raw extraction records into relational rows
//!
//! Pure function of its input: no store access, no clock. Monetary figures
//! are stored as magnitudes; the sign of the invoice total survives as
//! `ExtractedData::is_credit`.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{
    ExtractedData, Invoice, InvoiceMetadata, LineItem, NormalizedBundle, ValidatedData,
};
use crate::raw::{self, leaf, unwrap, RawExtracted, RawLineItem, RawMetadata, RawRecord, RawValidated};
use crate::status::canonicalize;

pub const DEFAULT_CURRENCY: &str = "EUR";
pub const DEFAULT_CATEGORY: &str = "Operations";
const DEFAULT_VALIDATED_STATUS: &str = "validated";
const DEFAULT_LINE_DESCRIPTION: &str = "Item";

/// Normalize one raw record
///
/// Fails only when a required top-level field is unusable (the creation or
/// update timestamp, or a malformed file size). Bad extraction leaves are
/// dropped, never fatal.
pub fn normalize(record: &RawRecord) -> Result<NormalizedBundle> {
    let invoice = normalize_invoice(record)?;
    let metadata = record.metadata.as_ref().map(normalize_metadata);

    let (extracted, line_items) = match &record.extracted_data {
        Some(ed) => (Some(normalize_extracted(ed)), normalize_line_items(ed)),
        None => (None, Vec::new()),
    };

    let validated = record.validated_data.as_ref().map(normalize_validated);

    Ok(NormalizedBundle {
        invoice,
        metadata,
        extracted,
        line_items,
        validated,
    })
}

fn normalize_invoice(record: &RawRecord) -> Result<Invoice> {
    let created_at = raw::timestamp(&record.created_at).ok_or_else(|| {
        Error::InvalidData(format!("Invalid createdAt: {}", record.created_at))
    })?;
    let updated_at = raw::timestamp(&record.updated_at).ok_or_else(|| {
        Error::InvalidData(format!("Invalid updatedAt: {}", record.updated_at))
    })?;

    let file_size = match &record.file_size {
        None | Some(Value::Null) => 0,
        Some(v) => raw::integer(v)
            .ok_or_else(|| Error::InvalidData(format!("Invalid fileSize: {}", v)))?,
    };

    Ok(Invoice {
        id: record.id.clone(),
        name: record.name.clone(),
        file_path: record.file_path.clone().unwrap_or_default(),
        file_size,
        file_type: record.file_type.clone().unwrap_or_default(),
        status: canonicalize(&record.status),
        organization_id: record.organization_id.clone(),
        department_id: record.department_id.clone(),
        uploaded_by_id: record.uploaded_by_id.clone(),
        assigned_to_id: record.assigned_to_id.clone().filter(|s| !s.is_empty()),
        assigned_at: record.assigned_at.as_ref().and_then(raw::timestamp),
        is_validated_by_human: record.is_validated_by_human,
        analytics_id: record.analytics_id.clone().filter(|s| !s.is_empty()),
        processed_at: record.processed_at.as_ref().and_then(raw::timestamp),
        created_at,
        updated_at,
    })
}

fn normalize_metadata(md: &RawMetadata) -> InvoiceMetadata {
    InvoiceMetadata {
        model_used: md.model_used.as_ref().and_then(raw::text),
        prompt_tokens: md.prompt_tokens.as_ref().and_then(raw::integer),
        completion_tokens: md.completion_tokens.as_ref().and_then(raw::integer),
        total_tokens: md.total_tokens.as_ref().and_then(raw::integer),
        processing_time: md.processing_time.as_ref().and_then(raw::float),
        confidence: md.confidence.as_ref().and_then(raw::float),
        ai_response_base_url: md.ai_response_base_url.as_ref().and_then(raw::text),
    }
}

fn text(field: &Option<raw::Leaf>) -> Option<String> {
    leaf(field).and_then(raw::text)
}

fn magnitude(field: &Option<raw::Leaf>) -> Option<Decimal> {
    leaf(field).and_then(raw::decimal).map(|d| d.abs())
}

fn date(field: &Option<raw::Leaf>) -> Option<chrono::NaiveDate> {
    leaf(field).and_then(raw::date)
}

fn normalize_extracted(ed: &RawExtracted) -> ExtractedData {
    let llm = ed.llm_data.as_ref();
    let vendor = llm.and_then(|l| unwrap(&l.vendor)).cloned().unwrap_or_default();
    let customer = llm.and_then(|l| unwrap(&l.customer)).cloned().unwrap_or_default();
    let invoice = llm.and_then(|l| unwrap(&l.invoice)).cloned().unwrap_or_default();
    let payment = llm.and_then(|l| unwrap(&l.payment)).cloned().unwrap_or_default();
    let summary = llm.and_then(|l| unwrap(&l.summary)).cloned().unwrap_or_default();

    let signed_total = leaf(&summary.invoice_total).and_then(raw::decimal);

    ExtractedData {
        vendor_name: text(&vendor.vendor_name),
        vendor_address: text(&vendor.vendor_address),
        vendor_email: text(&vendor.vendor_email),
        vendor_phone: text(&vendor.vendor_phone),
        vendor_tax_id: text(&vendor.vendor_tax_id),
        customer_name: text(&customer.customer_name),
        customer_address: text(&customer.customer_address),
        invoice_number: text(&invoice.invoice_id),
        invoice_date: date(&invoice.invoice_date),
        due_date: date(&payment.due_date),
        subtotal: magnitude(&summary.sub_total),
        tax_amount: magnitude(&summary.total_tax),
        total_amount: signed_total.map(|d| d.abs()),
        is_credit: signed_total.is_some_and(|d| d.is_sign_negative() && !d.is_zero()),
        currency: text(&summary.currency_symbol).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        payment_terms: text(&payment.payment_terms),
        payment_method: text(&payment.payment_method),
        category: Some(DEFAULT_CATEGORY.to_string()),
        validated_by: None,
    }
}

fn normalize_line_items(ed: &RawExtracted) -> Vec<LineItem> {
    let items = ed
        .llm_data
        .as_ref()
        .and_then(|l| unwrap(&l.line_items))
        .and_then(|group| unwrap(&group.items));

    match items {
        Some(items) => items.iter().map(normalize_line_item).collect(),
        None => Vec::new(),
    }
}

fn normalize_line_item(item: &RawLineItem) -> LineItem {
    LineItem {
        description: text(&item.description)
            .or_else(|| text(&item.name))
            .unwrap_or_else(|| DEFAULT_LINE_DESCRIPTION.to_string()),
        quantity: magnitude(&item.quantity).unwrap_or(Decimal::ONE),
        unit_price: magnitude(&item.unit_price).unwrap_or(Decimal::ZERO),
        amount: magnitude(&item.total_price)
            .or_else(|| magnitude(&item.amount))
            .unwrap_or(Decimal::ZERO),
        tax_rate: leaf(&item.tax_rate).and_then(raw::decimal),
        tax_amount: magnitude(&item.tax_amount),
    }
}

fn normalize_validated(vd: &RawValidated) -> ValidatedData {
    let text = |v: &Option<Value>| v.as_ref().and_then(raw::text);
    let magnitude = |v: &Option<Value>| v.as_ref().and_then(raw::decimal).map(|d| d.abs());
    let date = |v: &Option<Value>| v.as_ref().and_then(raw::date);

    ValidatedData {
        vendor_name: text(&vd.vendor_name),
        vendor_address: text(&vd.vendor_address),
        invoice_number: text(&vd.invoice_number),
        invoice_date: date(&vd.invoice_date),
        due_date: date(&vd.due_date),
        subtotal: magnitude(&vd.subtotal),
        tax_amount: magnitude(&vd.tax_amount),
        total_amount: magnitude(&vd.total_amount),
        currency: text(&vd.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        category: text(&vd.category),
        status: text(&vd.status).unwrap_or_else(|| DEFAULT_VALIDATED_STATUS.to_string()),
    }
}
