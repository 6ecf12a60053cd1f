use std::fmt;
use std::io;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::PaymentMethod;
use crate::error::FixtureError;

/// Type tag carried by every fixture this crate produces
pub const ORDER_TYPE: &str = "payout";
pub const NUM_DECIMAL_PLACES: u32 = 2;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Claimed,
    Completed,
    Expired,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Claimed,
        OrderStatus::Completed,
        OrderStatus::Expired,
        OrderStatus::Cancelled,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Claimed => "claimed",
            OrderStatus::Completed => "completed",
            OrderStatus::Expired => "expired",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One synthetic payout order, flat enough to be a table row as is.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OrderFixture {
    pub(crate) order_no: String,
    #[serde(rename = "type")]
    pub(crate) order_type: &'static str,
    pub(crate) amount: Decimal,
    pub(crate) commission: Decimal,
    pub(crate) status: OrderStatus,
    pub(crate) payment_method: PaymentMethod,
    pub(crate) payment_account: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) expires_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl OrderFixture {
    #[must_use]
    pub fn order_no(&self) -> &str {
        &self.order_no
    }

    #[must_use]
    pub fn order_type(&self) -> &'static str {
        self.order_type
    }

    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    #[must_use]
    pub fn commission(&self) -> Decimal {
        self.commission
    }

    #[must_use]
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    #[must_use]
    pub fn payment_method(&self) -> &PaymentMethod {
        &self.payment_method
    }

    #[must_use]
    pub fn payment_account(&self) -> &str {
        &self.payment_account
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// Writes `fixtures` as CSV with a header row, one fixture per record.
///
/// # Errors
/// Errors when a record cannot be serialized or the writer fails
pub fn write_csv<W: io::Write>(fixtures: &[OrderFixture], writer: W) -> Result<(), FixtureError> {
    let mut writer = csv::WriterBuilder::new().from_writer(writer);
    for fixture in fixtures {
        writer.serialize(fixture)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixture() -> OrderFixture {
        let created_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        OrderFixture {
            order_no: "TEST000000000007".to_owned(),
            order_type: ORDER_TYPE,
            amount: Decimal::new(123_456, 2),
            commission: Decimal::new(1_235, 2),
            status: OrderStatus::Claimed,
            payment_method: PaymentMethod::CashApp,
            payment_account: "$cashapp_42".to_owned(),
            created_at,
            expires_at: created_at + chrono::Duration::minutes(30),
            updated_at: created_at,
        }
    }

    #[test]
    fn test_status_tags() {
        let tags: Vec<&str> = OrderStatus::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            tags,
            vec!["pending", "claimed", "completed", "expired", "cancelled"]
        );
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn test_fixture_json_shape() {
        let value = serde_json::to_value(fixture()).unwrap();
        assert_eq!(value["order_no"], "TEST000000000007");
        assert_eq!(value["type"], "payout");
        assert_eq!(value["status"], "claimed");
        assert_eq!(value["payment_method"], "cash_app");
        assert_eq!(value["payment_account"], "$cashapp_42");
        assert_eq!(value["amount"], "1234.56");
        assert_eq!(value["commission"], "12.35");
        assert_eq!(value["expires_at"], "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_write_csv() {
        let mut out = Vec::new();
        write_csv(&[fixture(), fixture()], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("order_no,type,amount,commission,status,payment_method,payment_account,created_at,expires_at,updated_at")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("TEST000000000007,payout,1234.56,12.35,claimed,cash_app,$cashapp_42,"));
        assert_eq!(lines.count(), 1);
    }
}
