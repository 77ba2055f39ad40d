//! Dashboard aggregation engine
//!
//! Loads one [`SpendRow`] per invoice through the store and computes every
//! metric in exact decimal. Time-bounded metrics pass a [`SpendWindow`] so
//! the store only returns rows that can land in the result. Each time-dependent operation takes the
//! reference instant explicitly so results do not depend on the wall clock.
//!
//! Shared policy: a percent change against a zero base is 0, and a sum over
//! no rows is 0.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::*;
use crate::status::InvoiceStatus;
use crate::store::InvoiceStore;

/// Environment variable overriding the monthly-trend status filter
pub const TREND_STATUS_ENV: &str = "TALLY_TREND_STATUS";

/// Status the monthly trend series has always counted
pub const LEGACY_TREND_STATUS: &str = "processed";

/// Largest page the invoice list will return
pub const MAX_PAGE_SIZE: i64 = 100;

const UNCATEGORIZED: &str = "Uncategorized";

/// Cash outflow buckets: label and inclusive day-offset range from today
const OUTFLOW_BUCKETS: [(&str, i64, i64); 4] = [
    ("0-7 days", 0, 7),
    ("8-30 days", 8, 30),
    ("31-60 days", 31, 60),
    ("60+ days", 61, 365),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsConfig {
    /// Stored status counted by `monthly_trends`, compared exactly
    pub trend_status: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            trend_status: LEGACY_TREND_STATUS.to_string(),
        }
    }
}

impl AnalyticsConfig {
    /// Read overrides from the environment
    pub fn from_env() -> Self {
        match std::env::var(TREND_STATUS_ENV) {
            Ok(status) if !status.trim().is_empty() => Self {
                trend_status: status.trim().to_string(),
            },
            _ => Self::default(),
        }
    }
}

/// Percentage change from `base` to `current`; 0 when the base is zero
pub fn percent_change(current: Decimal, base: Decimal) -> f64 {
    if base.is_zero() {
        return 0.0;
    }
    ((current - base) / base * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0)
}

/// First instant of the month `offset` months away from (year, month)
fn month_start(year: i32, month: u32, offset: i32) -> DateTime<Utc> {
    let index = year * 12 + month as i32 - 1 + offset;
    let (y, m) = (index.div_euclid(12), index.rem_euclid(12) as u32 + 1);
    Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// The same calendar day `months` months earlier, clamped to the month's end
fn months_before(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(chrono::Months::new(months))
        .unwrap_or(date)
}

fn average(values: impl Iterator<Item = Decimal>) -> Decimal {
    let (sum, count) = values.fold((Decimal::ZERO, 0i64), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        Decimal::ZERO
    } else {
        sum / Decimal::from(count)
    }
}

pub struct Analytics<'a> {
    store: &'a dyn InvoiceStore,
    config: AnalyticsConfig,
}

impl<'a> Analytics<'a> {
    pub fn new(store: &'a dyn InvoiceStore, config: AnalyticsConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &'a dyn InvoiceStore {
        self.store
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// The four dashboard cards
    pub fn summary(&self, now: DateTime<Utc>) -> Result<DashboardStats> {
        let rows = self.store.spend_rows(&SpendWindow::all())?;
        let today = now.date_naive();
        let trailing_start = now - Duration::days(30);
        let trailing_start_date = today - Duration::days(30);
        let prior_year = now.year() - 1;

        let figures = || rows.iter().filter_map(|r| r.figures.as_ref());

        // Total spend vs the prior calendar year (by invoice date)
        let total_spend: Decimal = figures().filter_map(|f| f.total_amount).sum();
        let prior_year_spend: Decimal = figures()
            .filter(|f| f.invoice_date.is_some_and(|d| d.year() == prior_year))
            .filter_map(|f| f.total_amount)
            .sum();

        // Completed invoices all-time vs those created in the trailing 30 days
        let completed = rows
            .iter()
            .filter(|r| r.status == InvoiceStatus::Completed);
        let completed_total = completed.clone().count() as i64;
        let completed_recent = completed.filter(|r| r.created_at >= trailing_start).count() as i64;

        // Uploads this calendar month vs the previous one
        let this_month = month_start(now.year(), now.month(), 0);
        let next_month = month_start(now.year(), now.month(), 1);
        let last_month = month_start(now.year(), now.month(), -1);
        let uploaded_this_month = rows
            .iter()
            .filter(|r| r.created_at >= this_month && r.created_at < next_month)
            .count() as i64;
        let uploaded_last_month = rows
            .iter()
            .filter(|r| r.created_at >= last_month && r.created_at < this_month)
            .count() as i64;

        // Average invoice value all-time vs invoices dated in the trailing 30 days
        let average_all = average(figures().filter_map(|f| f.total_amount));
        let average_recent = average(
            figures()
                .filter(|f| {
                    f.invoice_date
                        .is_some_and(|d| d >= trailing_start_date && d <= today)
                })
                .filter_map(|f| f.total_amount),
        );

        debug!(
            invoices = rows.len(),
            %total_spend,
            completed_total,
            uploaded_this_month,
            "Computed dashboard summary"
        );

        Ok(DashboardStats {
            total_spend: StatMetric {
                value: total_spend,
                percent_change: percent_change(total_spend, prior_year_spend),
                period: "YTD".to_string(),
            },
            total_invoices_processed: StatMetric {
                value: completed_total,
                percent_change: percent_change(
                    Decimal::from(completed_total),
                    Decimal::from(completed_recent),
                ),
                period: "from last month".to_string(),
            },
            documents_uploaded: StatMetric {
                value: uploaded_this_month,
                percent_change: percent_change(
                    Decimal::from(uploaded_this_month),
                    Decimal::from(uploaded_last_month),
                ),
                period: "this month".to_string(),
            },
            average_invoice_value: StatMetric {
                value: average_all,
                percent_change: percent_change(average_all, average_recent),
                period: "from last month".to_string(),
            },
        })
    }

    /// Twelve calendar months ending with the current one, oldest first
    pub fn monthly_trends(&self, now: DateTime<Utc>) -> Result<Vec<MonthlyTrend>> {
        let window = SpendWindow {
            created_from: Some(month_start(now.year(), now.month(), -11)),
            ..SpendWindow::all()
        };
        let rows = self.store.spend_rows(&window)?;

        let trends = (0..12)
            .rev()
            .map(|back| {
                let start = month_start(now.year(), now.month(), -back);
                let end = month_start(now.year(), now.month(), -back + 1);
                let in_month: Vec<&SpendRow> = rows
                    .iter()
                    .filter(|r| r.created_at >= start && r.created_at < end)
                    .collect();

                MonthlyTrend {
                    month: start.format("%b").to_string(),
                    year: start.year(),
                    invoice_count: in_month
                        .iter()
                        .filter(|r| r.status.as_str() == self.config.trend_status)
                        .count() as i64,
                    total_spend: in_month
                        .iter()
                        .filter_map(|r| r.figures.as_ref().and_then(|f| f.total_amount))
                        .sum(),
                }
            })
            .collect();

        Ok(trends)
    }

    /// Spend per named vendor, highest first (ties by name)
    pub fn vendor_spend(&self) -> Result<Vec<VendorSpend>> {
        let rows = self.store.spend_rows(&SpendWindow::all())?;
        let mut by_vendor: BTreeMap<&str, VendorSpend> = BTreeMap::new();

        for f in rows.iter().filter_map(|r| r.figures.as_ref()) {
            let Some(name) = f.vendor_name.as_deref() else {
                continue;
            };
            let entry = by_vendor.entry(name).or_insert_with(|| VendorSpend {
                vendor_name: name.to_string(),
                total_spend: Decimal::ZERO,
                invoice_count: 0,
                total_tax: Decimal::ZERO,
            });
            entry.total_spend += f.total_amount.unwrap_or_default();
            entry.total_tax += f.tax_amount.unwrap_or_default();
            entry.invoice_count += 1;
        }

        let mut vendors: Vec<VendorSpend> = by_vendor.into_values().collect();
        // BTreeMap order is by name, so a stable sort keeps name order on ties
        vendors.sort_by(|a, b| b.total_spend.cmp(&a.total_spend));
        Ok(vendors)
    }

    pub fn top_vendors(&self, n: usize) -> Result<Vec<VendorSpend>> {
        let mut vendors = self.vendor_spend()?;
        vendors.truncate(n);
        Ok(vendors)
    }

    /// Spend per category; blank categories are reported as "Uncategorized"
    pub fn category_spend(&self) -> Result<Vec<CategorySpend>> {
        let rows = self.store.spend_rows(&SpendWindow::all())?;
        let mut by_category: BTreeMap<String, CategorySpend> = BTreeMap::new();

        for f in rows.iter().filter_map(|r| r.figures.as_ref()) {
            let Some(category) = f.category.as_deref() else {
                continue;
            };
            let label = if category.trim().is_empty() {
                UNCATEGORIZED.to_string()
            } else {
                category.to_string()
            };
            let entry = by_category
                .entry(label.clone())
                .or_insert_with(|| CategorySpend {
                    category: label,
                    total_spend: Decimal::ZERO,
                    invoice_count: 0,
                });
            entry.total_spend += f.total_amount.unwrap_or_default();
            entry.invoice_count += 1;
        }

        let mut categories: Vec<CategorySpend> = by_category.into_values().collect();
        categories.sort_by(|a, b| b.total_spend.cmp(&a.total_spend));
        Ok(categories)
    }

    /// Expected outflow by due date in four fixed buckets from today
    ///
    /// Only invoices still payable count. Past due dates and dates more than
    /// a year out fall into no bucket.
    pub fn cash_outflow(&self, now: DateTime<Utc>) -> Result<Vec<OutflowBucket>> {
        let today = now.date_naive();
        let window = SpendWindow {
            due_from: Some(today + Duration::days(OUTFLOW_BUCKETS[0].1)),
            due_to: Some(today + Duration::days(OUTFLOW_BUCKETS[OUTFLOW_BUCKETS.len() - 1].2)),
            ..SpendWindow::all()
        };
        let rows = self.store.spend_rows(&window)?;

        let mut buckets: Vec<OutflowBucket> = OUTFLOW_BUCKETS
            .iter()
            .map(|(label, _, _)| OutflowBucket {
                period: label.to_string(),
                amount: Decimal::ZERO,
                invoice_count: 0,
            })
            .collect();

        for row in rows.iter().filter(|r| r.status.is_payable()) {
            let Some(f) = row.figures.as_ref() else {
                continue;
            };
            let Some(due) = f.due_date else {
                continue;
            };
            let offset = (due - today).num_days();

            if let Some(idx) = OUTFLOW_BUCKETS
                .iter()
                .position(|(_, lo, hi)| offset >= *lo && offset <= *hi)
            {
                buckets[idx].amount += f.total_amount.unwrap_or_default();
                buckets[idx].invoice_count += 1;
            }
        }

        Ok(buckets)
    }

    /// Month-level totals by invoice date over the trailing twelve months, newest first
    pub fn monthly_summary(&self, now: DateTime<Utc>) -> Result<Vec<MonthlySummary>> {
        let cutoff = months_before(now.date_naive(), 12);
        let window = SpendWindow {
            invoice_from: Some(cutoff),
            ..SpendWindow::all()
        };
        let rows = self.store.spend_rows(&window)?;
        let mut by_month: BTreeMap<String, MonthlySummary> = BTreeMap::new();

        for f in rows.iter().filter_map(|r| r.figures.as_ref()) {
            let Some(date) = f.invoice_date.filter(|d| *d >= cutoff) else {
                continue;
            };
            let key = date.format("%Y-%m").to_string();
            let entry = by_month
                .entry(key.clone())
                .or_insert_with(|| MonthlySummary {
                    month: key,
                    invoice_count: 0,
                    total_amount: Decimal::ZERO,
                });
            entry.invoice_count += 1;
            entry.total_amount += f.total_amount.unwrap_or_default();
        }

        Ok(by_month.into_values().rev().collect())
    }

    /// Validate paging and delegate the list query to the store
    pub fn list_invoices(&self, query: &InvoiceQuery) -> Result<InvoicePage> {
        if query.page < 1 {
            return Err(Error::InvalidData(format!(
                "page must be at least 1, got {}",
                query.page
            )));
        }
        if query.limit < 1 {
            return Err(Error::InvalidData(format!(
                "limit must be at least 1, got {}",
                query.limit
            )));
        }

        let mut query = query.clone();
        query.limit = query.limit.min(MAX_PAGE_SIZE);
        if query.offset().is_none() {
            return Err(Error::InvalidData(format!(
                "page {} is out of range",
                query.page
            )));
        }
        query.search = query.search.filter(|s| !s.trim().is_empty());
        self.store.list_invoices(&query)
    }

    pub fn invoice_detail(&self, id: &str) -> Result<InvoiceDetail> {
        self.store
            .invoice_detail(id)?
            .ok_or_else(|| Error::NotFound(format!("Invoice {}", id)))
    }
}
