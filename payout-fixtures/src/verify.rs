//! Read-side verification of persisted fixtures.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::info;
use rust_decimal::prelude::*;
use serde::{Deserialize, Deserializer};

use crate::error::VerificationQueryError;
use crate::order::{OrderStatus, ORDER_TYPE};

/// How many records the report lists verbatim
pub const SAMPLE_SIZE: usize = 5;

/// Which persisted rows to look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFilter {
    pub type_tag: String,
    pub order_no_prefix: Option<String>,
}

impl Default for OrderFilter {
    fn default() -> Self {
        OrderFilter {
            type_tag: ORDER_TYPE.to_owned(),
            order_no_prefix: None,
        }
    }
}

impl OrderFilter {
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.order_no_prefix = Some(prefix.into());
        self
    }
}

/// The subset of a persisted row the verifier reads back
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PayoutRecord {
    #[serde(default)]
    pub order_no: String,
    pub status: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub commission: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Anything persisted fixtures can be read back from
pub trait RecordSource {
    /// # Errors
    /// Errors when the query fails or returns rows that cannot be decoded
    fn fetch(&self, filter: &OrderFilter) -> Result<Vec<PayoutRecord>, VerificationQueryError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub min: Decimal,
    pub avg: Decimal,
    pub max: Decimal,
    pub sum: Decimal,
}

impl Summary {
    fn from_values(values: impl IntoIterator<Item = Decimal>) -> Option<Summary> {
        let mut values = values.into_iter();
        let first = values.next()?;
        let (mut min, mut max, mut sum, mut n) = (first, first, first, 1_u64);
        for value in values {
            min = min.min(value);
            max = max.max(value);
            sum += value;
            n += 1;
        }
        Some(Summary {
            min,
            avg: (sum / Decimal::from(n)).round_dp(2),
            max,
            sum,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayoutStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Sum of `amount` per status
    pub amount_by_status: BTreeMap<String, Decimal>,
    pub by_payment_method: BTreeMap<String, usize>,
    /// Rows with a null or empty payment method
    pub missing_method: usize,
    pub amount: Option<Summary>,
    pub commission: Option<Summary>,
    /// Rows where `expires_at` is not after `created_at`
    pub inverted_expiry: usize,
    /// The first [`SAMPLE_SIZE`] records in source order
    pub samples: Vec<PayoutRecord>,
}

impl PayoutStats {
    #[must_use]
    pub fn from_records(records: &[PayoutRecord]) -> Self {
        let mut stats = PayoutStats {
            total: records.len(),
            ..PayoutStats::default()
        };
        for record in records {
            *stats.by_status.entry(record.status.clone()).or_default() += 1;
            *stats
                .amount_by_status
                .entry(record.status.clone())
                .or_default() += record.amount;
            match record.payment_method.as_deref() {
                Some(method) if !method.is_empty() => {
                    *stats
                        .by_payment_method
                        .entry(method.to_owned())
                        .or_default() += 1;
                }
                _ => stats.missing_method += 1,
            }
            if let (Some(created_at), Some(expires_at)) = (record.created_at, record.expires_at) {
                if expires_at <= created_at {
                    stats.inverted_expiry += 1;
                }
            }
        }
        stats.amount = Summary::from_values(records.iter().map(|r| r.amount));
        stats.commission = Summary::from_values(records.iter().filter_map(|r| r.commission));
        stats.samples = records.iter().take(SAMPLE_SIZE).cloned().collect();
        stats
    }

    #[must_use]
    pub fn total_amount(&self) -> Decimal {
        self.amount.map_or(Decimal::ZERO, |s| s.sum)
    }

    #[must_use]
    pub fn total_commission(&self) -> Decimal {
        self.commission.map_or(Decimal::ZERO, |s| s.sum)
    }

    /// Amount still waiting to be claimed
    #[must_use]
    pub fn pending_amount(&self) -> Decimal {
        self.amount_by_status
            .get(OrderStatus::Pending.as_str())
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Fraction of records with `status`, 0 when there are none.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn status_share(&self, status: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.by_status.get(status).copied().unwrap_or(0) as f64 / self.total as f64
    }
}

/// Fetches the rows selected by `filter` and summarises them.
///
/// # Errors
/// Propagates the source's query error, without retrying
pub fn verify<S: RecordSource + ?Sized>(
    source: &S,
    filter: &OrderFilter,
) -> Result<PayoutStats, VerificationQueryError> {
    let records = source.fetch(filter)?;
    info!(
        "Fetched {} `{}` records (prefix {:?})",
        records.len(),
        filter.type_tag,
        filter.order_no_prefix
    );
    Ok(PayoutStats::from_records(&records))
}

impl fmt::Display for PayoutStats {
    #[allow(clippy::cast_precision_loss)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let percent = |count: usize| {
            if self.total == 0 {
                0.0
            } else {
                count as f64 / self.total as f64 * 100.0
            }
        };

        writeln!(f, "Total payout tasks: {}", self.total)?;
        writeln!(f)?;
        writeln!(f, "Status distribution:")?;
        for (status, count) in &self.by_status {
            writeln!(f, "  {}: {} ({:.1}%)", status, count, percent(*count))?;
        }
        writeln!(f)?;
        writeln!(f, "Payment method distribution:")?;
        for (method, count) in &self.by_payment_method {
            writeln!(f, "  {}: {} ({:.1}%)", method, count, percent(*count))?;
        }
        writeln!(
            f,
            "  (No payment method): {} ({:.1}%)",
            self.missing_method,
            percent(self.missing_method)
        )?;
        for (label, summary) in [("Amount", self.amount), ("Commission", self.commission)] {
            writeln!(f)?;
            match summary {
                Some(s) => {
                    writeln!(f, "{} range: ${:.2} - ${:.2}", label, s.min, s.max)?;
                    writeln!(f, "Average {}: ${:.2}", label.to_lowercase(), s.avg)?;
                    writeln!(f, "Total {}: ${:.2}", label.to_lowercase(), s.sum)?;
                }
                None => writeln!(f, "{} range: n/a", label)?,
            }
        }
        writeln!(f, "Pending amount: ${:.2}", self.pending_amount())?;
        if !self.samples.is_empty() {
            writeln!(f)?;
            writeln!(f, "Sample records:")?;
            for (i, record) in self.samples.iter().enumerate() {
                writeln!(
                    f,
                    "  {}. {} - {} - ${:.2} - {}",
                    i + 1,
                    record.order_no,
                    record.status,
                    record.amount,
                    record.payment_method.as_deref().unwrap_or("(none)")
                )?;
            }
        }
        if self.inverted_expiry > 0 {
            writeln!(f)?;
            writeln!(
                f,
                "Records expiring at or before creation: {}",
                self.inverted_expiry
            )?;
        }
        Ok(())
    }
}

/// Parses RFC 3339, or a zone-less timestamp taken as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) => parse_timestamp(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("bad timestamp `{}`", value))),
        None => Ok(None),
    }
}
