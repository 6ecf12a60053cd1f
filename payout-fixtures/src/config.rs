use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::account::{PaymentMethod, UnknownMethodPolicy};
use crate::error::{ConfigurationError, FixtureError};
use crate::order::OrderStatus;

pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Wide enough for any `usize` sequence index
pub const MAX_ORDER_NO_WIDTH: usize = 32;
/// About a thousand years
pub const MAX_LOOKBACK_DAYS: u32 = 365_000;

/// Everything the order generator and the row sink need to know, apart from
/// the record count and the random source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub amount_min: Decimal,
    pub amount_max: Decimal,
    pub rate_min: f64,
    pub rate_max: f64,
    pub status_weights: BTreeMap<OrderStatus, f64>,
    pub payment_methods: Vec<PaymentMethod>,
    pub order_no_prefix: String,
    pub order_no_width: usize,
    /// `created_at` falls at most this many days before "now"
    pub lookback_days: u32,
    pub expiry_minutes: u32,
    /// Rows per commit in row-by-row mode
    pub batch_size: usize,
    pub unknown_method_policy: UnknownMethodPolicy,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let status_weights = OrderStatus::ALL
            .into_iter()
            .zip([0.5, 0.2, 0.2, 0.08, 0.02])
            .collect();
        GeneratorConfig {
            amount_min: Decimal::ONE_HUNDRED,
            amount_max: Decimal::new(10_000, 0),
            rate_min: 0.005,
            rate_max: 0.02,
            status_weights,
            payment_methods: PaymentMethod::KNOWN.to_vec(),
            order_no_prefix: "TEST".to_owned(),
            order_no_width: 12,
            lookback_days: 30,
            expiry_minutes: 30,
            batch_size: DEFAULT_BATCH_SIZE,
            unknown_method_policy: UnknownMethodPolicy::Empty,
        }
    }
}

impl GeneratorConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    ///
    /// # Errors
    /// Errors when the file cannot be opened or is not valid JSON
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// # Errors
    /// Errors with the first violated field
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.amount_cents()?;

        let rate_in_unit = |r: f64| (0.0..=1.0).contains(&r);
        if !rate_in_unit(self.rate_min) || !rate_in_unit(self.rate_max) || self.rate_min >= self.rate_max
        {
            return Err(ConfigurationError::InvalidRateRange {
                min: self.rate_min,
                max: self.rate_max,
            });
        }

        self.weights()?;

        if self.payment_methods.is_empty() {
            return Err(ConfigurationError::NoPaymentMethods);
        }
        if self.unknown_method_policy == UnknownMethodPolicy::Reject {
            if let Some(unknown) = self.payment_methods.iter().find(|m| !m.is_known()) {
                return Err(ConfigurationError::UnknownPaymentMethod(
                    unknown.as_str().to_owned(),
                ));
            }
        }

        if self.order_no_width > MAX_ORDER_NO_WIDTH {
            return Err(ConfigurationError::PadWidthTooLarge {
                width: self.order_no_width,
                max: MAX_ORDER_NO_WIDTH,
            });
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ConfigurationError::InvalidLookback {
                days: self.lookback_days,
                max: MAX_LOOKBACK_DAYS,
            });
        }
        if self.expiry_minutes == 0 {
            return Err(ConfigurationError::InvalidExpiry);
        }
        if self.batch_size == 0 {
            return Err(ConfigurationError::InvalidBatchSize);
        }
        Ok(())
    }

    /// The amount range as whole cents, `(low, high)` inclusive.
    pub(crate) fn amount_cents(&self) -> Result<(i64, i64), ConfigurationError> {
        let invalid = || ConfigurationError::InvalidAmountRange {
            min: self.amount_min,
            max: self.amount_max,
        };
        if self.amount_min <= Decimal::ZERO || self.amount_min >= self.amount_max {
            return Err(invalid());
        }
        let low = (self.amount_min * Decimal::ONE_HUNDRED)
            .ceil()
            .to_i64()
            .ok_or_else(invalid)?;
        let high = (self.amount_max * Decimal::ONE_HUNDRED)
            .floor()
            .to_i64()
            .ok_or_else(invalid)?;
        if low > high {
            return Err(invalid());
        }
        Ok((low, high))
    }

    /// Status weights in [`OrderStatus::ALL`] order, scaled to sum to 1.
    pub(crate) fn weights(&self) -> Result<Vec<f64>, ConfigurationError> {
        let mut weights = Vec::with_capacity(OrderStatus::ALL.len());
        for status in OrderStatus::ALL {
            let weight = *self
                .status_weights
                .get(&status)
                .ok_or(ConfigurationError::MissingStatusWeight(status))?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigurationError::InvalidStatusWeight { status, weight });
            }
            weights.push(weight);
        }
        let total: f64 = weights.iter().sum();
        if !total.is_finite() {
            return Err(ConfigurationError::StatusWeightsOverflow);
        }
        if total <= 0.0 {
            return Err(ConfigurationError::ZeroStatusWeights);
        }
        Ok(weights.into_iter().map(|weight| weight / total).collect())
    }
}
