//! Typed view of the raw extraction records
//!
//! The upstream pipeline exports one JSON document per invoice. Most leaf
//! values sit inside a `{"value": ...}` wrapper at arbitrary depth, and the
//! top-level timestamps and sizes use Mongo-style `$date` / `$numberLong`
//! wrappers. This module deserializes that shape with serde and provides the
//! coercions the normalizer needs. Nothing here fails on a bad leaf: a value
//! that cannot be coerced is simply absent.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Error, Result};

/// A `{"value": ...}` wrapper around an extracted field
#[derive(Debug, Clone, Deserialize)]
pub struct Wrapped<T> {
    pub value: Option<T>,
}

impl<T> Default for Wrapped<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

/// Read through a wrapper
///
/// A missing wrapper, a `null` value and a wrapper without a `value` key all
/// come back as `None`.
pub fn unwrap<T>(field: &Option<Wrapped<T>>) -> Option<&T> {
    field.as_ref().and_then(|w| w.value.as_ref())
}

/// A wrapped leaf whose JSON type is not known up front
pub type Leaf = Wrapped<Value>;

/// Read a wrapped leaf, treating JSON `null` like an absent value
pub fn leaf(field: &Option<Leaf>) -> Option<&Value> {
    unwrap(field).filter(|v| !v.is_null())
}

/// Deserialize an optional field, treating a value of the wrong shape as absent
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let flag: Option<bool> = lenient(deserializer)?;
    Ok(flag.unwrap_or(false))
}

/// Deserialize an optional object, mapping `{}`, `null` and non-objects to `None`
fn non_empty<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    match value {
        Some(Value::Object(map)) if !map.is_empty() => {
            Ok(serde_json::from_value(Value::Object(map)).ok())
        }
        _ => Ok(None),
    }
}

/// Line items wrapper; a non-array value is absent and non-object entries are dropped
fn lenient_items<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Wrapped<Vec<RawLineItem>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let wrapper: Option<Leaf> = lenient(deserializer)?;
    let items = match wrapper.and_then(|w| w.value) {
        Some(Value::Array(items)) => items,
        _ => return Ok(None),
    };
    let items = items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    Ok(Some(Wrapped { value: Some(items) }))
}

// ============================================================================
// Record tree
// ============================================================================

/// One invoice document as exported by the extraction pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub file_path: Option<String>,
    #[serde(default)]
    pub file_size: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub status: String,
    pub organization_id: String,
    pub department_id: String,
    pub uploaded_by_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub assigned_to_id: Option<String>,
    #[serde(default)]
    pub assigned_at: Option<Value>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_validated_by_human: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub analytics_id: Option<String>,
    pub created_at: Value,
    pub updated_at: Value,
    #[serde(default)]
    pub processed_at: Option<Value>,
    #[serde(default, deserialize_with = "non_empty")]
    pub metadata: Option<RawMetadata>,
    #[serde(default, deserialize_with = "non_empty")]
    pub extracted_data: Option<RawExtracted>,
    #[serde(default, deserialize_with = "non_empty")]
    pub validated_data: Option<RawValidated>,
}

impl RawRecord {
    /// Parse a record, reporting which field made it unreadable
    pub fn from_json(value: &Value) -> Result<Self> {
        Self::deserialize(value).map_err(|e| Error::InvalidData(e.to_string()))
    }

    /// The `_id` of a record that may not otherwise deserialize
    pub fn peek_id(value: &Value) -> Option<String> {
        match value.get("_id")? {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(String::from),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    #[serde(default)]
    pub model_used: Option<Value>,
    #[serde(default)]
    pub prompt_tokens: Option<Value>,
    #[serde(default)]
    pub completion_tokens: Option<Value>,
    #[serde(default)]
    pub total_tokens: Option<Value>,
    #[serde(default)]
    pub processing_time: Option<Value>,
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub ai_response_base_url: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExtracted {
    #[serde(default, deserialize_with = "lenient")]
    pub llm_data: Option<LlmData>,
}

/// The model's structured answer, grouped by section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmData {
    #[serde(default, deserialize_with = "lenient")]
    pub vendor: Option<Wrapped<VendorGroup>>,
    #[serde(default, deserialize_with = "lenient")]
    pub customer: Option<Wrapped<CustomerGroup>>,
    #[serde(default, deserialize_with = "lenient")]
    pub invoice: Option<Wrapped<InvoiceGroup>>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment: Option<Wrapped<PaymentGroup>>,
    #[serde(default, deserialize_with = "lenient")]
    pub summary: Option<Wrapped<SummaryGroup>>,
    #[serde(default, deserialize_with = "lenient")]
    pub line_items: Option<Wrapped<LineItemsGroup>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorGroup {
    #[serde(default, deserialize_with = "lenient")]
    pub vendor_name: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub vendor_address: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub vendor_email: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub vendor_phone: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub vendor_tax_id: Option<Leaf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerGroup {
    #[serde(default, deserialize_with = "lenient")]
    pub customer_name: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub customer_address: Option<Leaf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceGroup {
    #[serde(default, deserialize_with = "lenient")]
    pub invoice_id: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub invoice_date: Option<Leaf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentGroup {
    #[serde(default, deserialize_with = "lenient")]
    pub due_date: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_terms: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub payment_method: Option<Leaf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryGroup {
    #[serde(default, deserialize_with = "lenient")]
    pub sub_total: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_tax: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub invoice_total: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub currency_symbol: Option<Leaf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LineItemsGroup {
    #[serde(default, deserialize_with = "lenient_items")]
    pub items: Option<Wrapped<Vec<RawLineItem>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLineItem {
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub quantity: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub unit_price: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub total_price: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub amount: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub tax_rate: Option<Leaf>,
    #[serde(default, deserialize_with = "lenient")]
    pub tax_amount: Option<Leaf>,
}

/// Human-corrected fields; flat, no value wrappers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawValidated {
    #[serde(default)]
    pub vendor_name: Option<Value>,
    #[serde(default)]
    pub vendor_address: Option<Value>,
    #[serde(default)]
    pub invoice_number: Option<Value>,
    #[serde(default)]
    pub invoice_date: Option<Value>,
    #[serde(default)]
    pub due_date: Option<Value>,
    #[serde(default)]
    pub subtotal: Option<Value>,
    #[serde(default)]
    pub tax_amount: Option<Value>,
    #[serde(default)]
    pub total_amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub status: Option<Value>,
}

// ============================================================================
// Coercions
// ============================================================================

/// Non-empty text; numbers are rendered, everything else is absent
pub fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Exact decimal from a JSON number or numeric string
///
/// Numbers are parsed from their textual form so `12.34` stays `12.34`
/// rather than picking up binary float noise.
pub fn decimal(value: &Value) -> Option<Decimal> {
    let s = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => strip_grouping(s.trim())?,
        Value::Object(map) => {
            return map
                .get("$numberDecimal")
                .or_else(|| map.get("$numberLong"))
                .and_then(decimal)
        }
        _ => return None,
    };
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .ok()
}

/// Remove thousands separators from `1,234.56`-style text
///
/// A comma counts as a separator only between groups of exactly three digits
/// with a `.` fraction present. Anything else with a comma (`12,50`, `1,250`)
/// is ambiguous and yields `None`.
fn strip_grouping(s: &str) -> Option<String> {
    if !s.contains(',') {
        return Some(s.to_string());
    }
    let (int_part, fraction) = s.split_once('.')?;
    let all_digits = |g: &str| !g.is_empty() && g.chars().all(|c| c.is_ascii_digit());

    let mut groups = int_part.split(',');
    let head = groups.next()?;
    let head_digits = head.strip_prefix(['-', '+']).unwrap_or(head);
    if !all_digits(head_digits) || head_digits.len() > 3 {
        return None;
    }

    let mut out = head.to_string();
    for group in groups {
        if group.len() != 3 || !all_digits(group) {
            return None;
        }
        out.push_str(group);
    }
    Some(format!("{}.{}", out, fraction))
}

pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map.get("$numberLong").and_then(integer),
        _ => None,
    }
}

pub fn float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Instant from an RFC 3339 string, a naive timestamp (taken as UTC), a bare
/// date (midnight UTC), epoch milliseconds, or a `$date` wrapper
pub fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s.trim()),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => map.get("$date").and_then(timestamp).or_else(|| {
            map.get("$numberLong")
                .and_then(integer)
                .and_then(DateTime::from_timestamp_millis)
        }),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Calendar date from any of the accepted date or timestamp shapes
pub fn date(value: &Value) -> Option<NaiveDate> {
    if let Value::String(s) = value {
        let s = s.trim();
        for fmt in DATE_FORMATS {
            if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
                return Some(d);
            }
        }
    }
    timestamp(value).map(|dt| dt.date_naive())
}
