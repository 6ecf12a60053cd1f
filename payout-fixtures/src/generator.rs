use chrono::{DateTime, Duration, Timelike, Utc};
use log::{debug, info};
use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::Rng;
use rust_decimal::prelude::*;

use crate::config::GeneratorConfig;
use crate::error::ConfigurationError;
use crate::order::{OrderFixture, OrderStatus, NUM_DECIMAL_PLACES, ORDER_TYPE};

const MICROS_PER_DAY: i64 = 86_400_000_000;
const PROGRESS_EVERY: usize = 100;

/// Produces batches of [`OrderFixture`]s from a validated [`GeneratorConfig`].
///
/// Generation is pure: the caller supplies both the random source and the
/// "now" every timestamp is derived from, so a seeded rng and a fixed `now`
/// always give the same batch.
#[derive(Debug, Clone)]
pub struct OrderGenerator {
    config: GeneratorConfig,
    statuses: WeightedIndex<f64>,
    amount_cents: (i64, i64),
    max_rate: Decimal,
}

impl OrderGenerator {
    /// # Errors
    /// Errors when `config` fails [`GeneratorConfig::validate`]
    pub fn new(config: GeneratorConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let statuses = WeightedIndex::new(config.weights()?)
            .map_err(|e| match e {
                WeightedError::AllWeightsZero | WeightedError::NoItem => {
                    ConfigurationError::ZeroStatusWeights
                }
                _ => ConfigurationError::StatusWeightsOverflow,
            })?;
        let amount_cents = config.amount_cents()?;
        let max_rate = Decimal::from_f64(config.rate_max).ok_or(
            ConfigurationError::InvalidRateRange {
                min: config.rate_min,
                max: config.rate_max,
            },
        )?;
        Ok(OrderGenerator {
            config,
            statuses,
            amount_cents,
            max_rate,
        })
    }

    #[must_use]
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generates `count` fixtures with order numbers `0..count`.
    ///
    /// # Errors
    /// Errors when `count` is zero, the configured order number width
    /// cannot hold `count - 1`, or `now` is so close to the ends of the
    /// calendar that a derived timestamp cannot be represented
    pub fn generate<R: Rng + ?Sized>(
        &self,
        count: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<Vec<OrderFixture>, ConfigurationError> {
        if count == 0 {
            return Err(ConfigurationError::InvalidCount);
        }
        let max_index = count - 1;
        if max_index.to_string().len() > self.config.order_no_width {
            return Err(ConfigurationError::PadWidthTooSmall {
                width: self.config.order_no_width,
                max_index,
            });
        }

        // Timestamps are rendered with microsecond precision downstream.
        let now = now
            .with_nanosecond(now.nanosecond() / 1_000 * 1_000)
            .unwrap_or(now);
        let mut fixtures = Vec::with_capacity(count);
        for index in 0..count {
            fixtures.push(self.fixture(index, now, rng)?);
            if (index + 1) % PROGRESS_EVERY == 0 {
                info!("Generated {}/{} fixtures", index + 1, count);
            }
        }
        Ok(fixtures)
    }

    fn fixture<R: Rng + ?Sized>(
        &self,
        index: usize,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<OrderFixture, ConfigurationError> {
        let config = &self.config;

        let (low, high) = self.amount_cents;
        let amount = Decimal::new(rng.gen_range(low..=high), NUM_DECIMAL_PLACES);
        let rate = rng.gen_range(config.rate_min..=config.rate_max);
        let commission = self.commission(amount, rate);

        let status = OrderStatus::ALL[self.statuses.sample(rng)];

        let payment_method =
            config.payment_methods[rng.gen_range(0..config.payment_methods.len())].clone();
        let payment_account = payment_method.generate_account(rng).unwrap_or_else(|| {
            debug!("No account template for `{}`", payment_method);
            String::new()
        });

        // fits in i64 since lookback_days <= MAX_LOOKBACK_DAYS
        let lookback = i64::from(config.lookback_days) * MICROS_PER_DAY;
        let created_at = now
            .checked_sub_signed(Duration::microseconds(rng.gen_range(0..=lookback)))
            .ok_or(ConfigurationError::TimestampOutOfRange(now))?;
        let expires_at = created_at
            .checked_add_signed(Duration::minutes(i64::from(config.expiry_minutes)))
            .ok_or(ConfigurationError::TimestampOutOfRange(now))?;

        Ok(OrderFixture {
            order_no: format!(
                "{}{:0width$}",
                config.order_no_prefix,
                index,
                width = config.order_no_width
            ),
            order_type: ORDER_TYPE,
            amount,
            commission,
            status,
            payment_method,
            payment_account,
            created_at,
            expires_at,
            updated_at: now,
        })
    }

    /// `amount * rate` to the cent, never above `amount * rate_max`.
    fn commission(&self, amount: Decimal, rate: f64) -> Decimal {
        let rate = Decimal::from_f64(rate).unwrap_or(Decimal::ZERO);
        let rounded = (amount * rate)
            .round_dp_with_strategy(NUM_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
        let cap = (amount * self.max_rate)
            .round_dp_with_strategy(NUM_DECIMAL_PLACES, RoundingStrategy::ToZero);
        rounded.min(cap)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::account::PaymentMethod;
    use crate::config::{MAX_LOOKBACK_DAYS, MAX_ORDER_NO_WIDTH};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap()
    }

    fn generate(config: GeneratorConfig, count: usize, seed: u64) -> Vec<OrderFixture> {
        let mut rng = StdRng::seed_from_u64(seed);
        OrderGenerator::new(config)
            .unwrap()
            .generate(count, now(), &mut rng)
            .unwrap()
    }

    #[test]
    fn test_count_and_unique_order_numbers() {
        for count in [1, 2, 99, 500] {
            let fixtures = generate(GeneratorConfig::default(), count, 1);
            assert_eq!(fixtures.len(), count);
            let order_nos: HashSet<&str> = fixtures.iter().map(OrderFixture::order_no).collect();
            assert_eq!(order_nos.len(), count);
        }
        let fixtures = generate(GeneratorConfig::default(), 3, 1);
        assert_eq!(fixtures[0].order_no(), "TEST000000000000");
        assert_eq!(fixtures[2].order_no(), "TEST000000000002");
    }

    #[test]
    fn test_zero_count() {
        let generator = OrderGenerator::new(GeneratorConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            generator.generate(0, now(), &mut rng),
            Err(ConfigurationError::InvalidCount)
        );
    }

    #[test]
    fn test_pad_width_too_small() {
        let config = GeneratorConfig {
            order_no_prefix: "ORD".to_owned(),
            order_no_width: 2,
            ..GeneratorConfig::default()
        };
        let generator = OrderGenerator::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(generator.generate(100, now(), &mut rng).is_ok());
        assert_eq!(
            generator.generate(101, now(), &mut rng),
            Err(ConfigurationError::PadWidthTooSmall {
                width: 2,
                max_index: 100
            })
        );
    }

    #[test]
    fn test_invalid_config_is_rejected_before_generation() {
        let config = GeneratorConfig {
            payment_methods: vec![],
            ..GeneratorConfig::default()
        };
        assert_eq!(
            OrderGenerator::new(config).unwrap_err(),
            ConfigurationError::NoPaymentMethods
        );
    }

    #[test]
    fn test_same_seed_same_batch() {
        let a = generate(GeneratorConfig::default(), 50, 42);
        let b = generate(GeneratorConfig::default(), 50, 42);
        let c = generate(GeneratorConfig::default(), 50, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_amount_and_commission_bounds() {
        let config = GeneratorConfig::default();
        let max_rate = Decimal::from_f64(config.rate_max).unwrap();
        for fixture in generate(config.clone(), 2_000, 3) {
            let amount = fixture.amount();
            let commission = fixture.commission();
            assert!(amount >= config.amount_min && amount <= config.amount_max);
            assert_eq!(amount, amount.round_dp(2));
            assert!(commission >= Decimal::ZERO);
            assert!(commission <= amount * max_rate);
            assert_eq!(commission, commission.round_dp(2));
        }
    }

    #[test]
    fn test_commission_is_capped_at_max_rate() {
        let generator = OrderGenerator::new(GeneratorConfig::default()).unwrap();
        // 0.02 * 100.25 = 2.005 would round up to 2.01
        let amount = Decimal::new(10_025, 2);
        assert_eq!(generator.commission(amount, 0.02), Decimal::new(200, 2));
        assert_eq!(generator.commission(amount, 0.01), Decimal::new(100, 2));
    }

    #[test]
    fn test_timestamps() {
        let config = GeneratorConfig::default();
        let lookback = Duration::days(i64::from(config.lookback_days));
        for fixture in generate(config, 1_000, 4) {
            assert_eq!(
                fixture.expires_at(),
                fixture.created_at() + Duration::minutes(30)
            );
            assert!(fixture.expires_at() > fixture.created_at());
            assert!(fixture.created_at() <= now());
            assert!(fixture.created_at() >= now() - lookback);
            assert_eq!(fixture.updated_at(), now());
        }
    }

    #[test]
    fn test_accounts_follow_methods() {
        for fixture in generate(GeneratorConfig::default(), 1_000, 5) {
            assert!(fixture
                .payment_method()
                .matches_account(fixture.payment_account()));
            assert_eq!(fixture.order_type(), "payout");
        }
    }

    #[test]
    fn test_unknown_method_gets_empty_account() {
        let config = GeneratorConfig {
            payment_methods: vec![PaymentMethod::from("crypto")],
            ..GeneratorConfig::default()
        };
        for fixture in generate(config, 20, 6) {
            assert_eq!(fixture.payment_method().as_str(), "crypto");
            assert_eq!(fixture.payment_account(), "");
        }
    }

    #[test]
    fn test_single_status_weight() {
        let mut config = GeneratorConfig::default();
        for (status, weight) in &mut config.status_weights {
            *weight = if *status == OrderStatus::Expired { 1.0 } else { 0.0 };
        }
        assert!(generate(config, 200, 7)
            .iter()
            .all(|f| f.status() == OrderStatus::Expired));
    }

    #[test]
    fn test_zero_lookback_pins_created_at() {
        let config = GeneratorConfig {
            lookback_days: 0,
            expiry_minutes: 45,
            ..GeneratorConfig::default()
        };
        for fixture in generate(config, 10, 8) {
            assert_eq!(fixture.created_at(), now());
            assert_eq!(fixture.expires_at(), now() + Duration::minutes(45));
        }
    }

    #[test]
    fn test_widest_order_numbers() {
        let config = GeneratorConfig {
            order_no_prefix: "W".to_owned(),
            order_no_width: MAX_ORDER_NO_WIDTH,
            ..GeneratorConfig::default()
        };
        let fixtures = generate(config, 3, 9);
        assert_eq!(fixtures[2].order_no().len(), 1 + MAX_ORDER_NO_WIDTH);
        assert!(fixtures[2].order_no().ends_with("0002"));

        let config = GeneratorConfig {
            order_no_width: 70_000,
            ..GeneratorConfig::default()
        };
        assert_eq!(
            OrderGenerator::new(config).unwrap_err(),
            ConfigurationError::PadWidthTooLarge {
                width: 70_000,
                max: MAX_ORDER_NO_WIDTH
            }
        );
    }

    #[test]
    fn test_lookback_limits() {
        let config = GeneratorConfig {
            lookback_days: u32::MAX,
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            OrderGenerator::new(config).unwrap_err(),
            ConfigurationError::InvalidLookback { days: u32::MAX, .. }
        ));

        let config = GeneratorConfig {
            lookback_days: MAX_LOOKBACK_DAYS,
            ..GeneratorConfig::default()
        };
        let oldest = now() - Duration::days(i64::from(MAX_LOOKBACK_DAYS));
        for fixture in generate(config, 200, 10) {
            assert!(fixture.created_at() >= oldest);
            assert!(fixture.created_at() <= now());
        }
    }

    #[test]
    fn test_now_at_the_end_of_time() {
        let config = GeneratorConfig {
            lookback_days: 0,
            ..GeneratorConfig::default()
        };
        let generator = OrderGenerator::new(config).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let now = DateTime::<Utc>::MAX_UTC;
        assert!(matches!(
            generator.generate(1, now, &mut rng),
            Err(ConfigurationError::TimestampOutOfRange(_))
        ));
    }

    #[test]
    fn test_now_is_truncated_to_micros() {
        let now = now() + Duration::nanoseconds(123_456_789);
        let generator = OrderGenerator::new(GeneratorConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(12);
        let fixtures = generator.generate(1, now, &mut rng).unwrap();
        assert_eq!(fixtures[0].updated_at().nanosecond(), 123_456_000);
    }
}
