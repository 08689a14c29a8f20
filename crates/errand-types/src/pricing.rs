//! Errand pricing.
//!
//! Every amount is an exact decimal with at most two fractional digits and is
//! persisted as integer cents, so `total_price` is always the exact sum of its
//! parts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest tip accepted on a single errand.
const MAX_TIP_CENTS: i64 = 10_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("{0} must not be negative")]
    Negative(&'static str),

    #[error("{0} must have at most two decimal places")]
    TooPrecise(&'static str),

    #[error("{0} is too large")]
    TooLarge(&'static str),

    #[error("service rate must be between 0 and 1")]
    InvalidRate,
}

/// Platform pricing constants, injected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    base_price: Decimal,
    delivery_charge: Decimal,
    service_rate: Decimal,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            base_price: Decimal::new(10_000, 2),
            delivery_charge: Decimal::new(5_000, 2),
            service_rate: Decimal::new(5, 2),
        }
    }
}

/// Price breakdown frozen onto an errand at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_price: Decimal,
    pub service_charge: Decimal,
    pub delivery_charge: Decimal,
    pub tip: Decimal,
    pub total_price: Decimal,
}

impl Pricing {
    pub fn new(
        base_price: Decimal,
        delivery_charge: Decimal,
        service_rate: Decimal,
    ) -> Result<Self, PricingError> {
        check_amount("base price", base_price)?;
        check_amount("delivery charge", delivery_charge)?;
        if service_rate < Decimal::ZERO || service_rate > Decimal::ONE {
            return Err(PricingError::InvalidRate);
        }
        Ok(Self {
            base_price,
            delivery_charge,
            service_rate,
        })
    }

    pub fn base_price(&self) -> Decimal {
        self.base_price
    }

    pub fn delivery_charge(&self) -> Decimal {
        self.delivery_charge
    }

    pub fn service_rate(&self) -> Decimal {
        self.service_rate
    }

    /// Price an errand for the given tip. The service charge is the service
    /// rate applied to the base price, rounded half away from zero to cents.
    pub fn quote(&self, tip: Decimal) -> Result<PriceBreakdown, PricingError> {
        check_amount("tip", tip)?;
        if decimal_to_cents(tip)? > MAX_TIP_CENTS {
            return Err(PricingError::TooLarge("tip"));
        }

        let service_charge = (self.base_price * self.service_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let total_price = self.base_price + service_charge + self.delivery_charge + tip;

        Ok(PriceBreakdown {
            base_price: self.base_price,
            service_charge,
            delivery_charge: self.delivery_charge,
            tip,
            total_price,
        })
    }
}

impl PriceBreakdown {
    pub fn from_cents(base: i64, service: i64, delivery: i64, tip: i64, total: i64) -> Self {
        Self {
            base_price: cents_to_decimal(base),
            service_charge: cents_to_decimal(service),
            delivery_charge: cents_to_decimal(delivery),
            tip: cents_to_decimal(tip),
            total_price: cents_to_decimal(total),
        }
    }

    /// `[base, service, delivery, tip, total]` in cents.
    pub fn to_cents(&self) -> Result<[i64; 5], PricingError> {
        Ok([
            decimal_to_cents(self.base_price)?,
            decimal_to_cents(self.service_charge)?,
            decimal_to_cents(self.delivery_charge)?,
            decimal_to_cents(self.tip)?,
            decimal_to_cents(self.total_price)?,
        ])
    }
}

pub fn cents_to_decimal(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn decimal_to_cents(amount: Decimal) -> Result<i64, PricingError> {
    (amount * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
        .ok_or(PricingError::TooLarge("amount"))
}

fn check_amount(field: &'static str, amount: Decimal) -> Result<(), PricingError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(PricingError::Negative(field));
    }
    if amount.normalize().scale() > 2 {
        return Err(PricingError::TooPrecise(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quote_with_tip() {
        let quote = Pricing::default().quote(Decimal::new(20, 0)).unwrap();
        assert_eq!(quote.base_price, Decimal::new(100, 0));
        assert_eq!(quote.service_charge, Decimal::new(5, 0));
        assert_eq!(quote.delivery_charge, Decimal::new(50, 0));
        assert_eq!(quote.total_price, Decimal::new(175, 0));
    }

    #[test]
    fn test_total_is_exact_sum() {
        let pricing = Pricing::new(
            Decimal::new(12_345, 2),
            Decimal::new(3_999, 2),
            Decimal::new(75, 3),
        )
        .unwrap();

        for tip_cents in [0, 1, 99, 250, 1_001, 123_456] {
            let q = pricing.quote(Decimal::new(tip_cents, 2)).unwrap();
            assert_eq!(
                q.total_price,
                q.base_price + q.service_charge + q.delivery_charge + q.tip
            );
            assert!(q.service_charge.scale() <= 2);
        }
    }

    #[test]
    fn test_service_charge_rounds_half_away_from_zero() {
        // 0.05 * 0.50 = 0.025 -> 0.03
        let pricing = Pricing::new(Decimal::new(50, 2), Decimal::ZERO, Decimal::new(5, 2)).unwrap();
        let q = pricing.quote(Decimal::ZERO).unwrap();
        assert_eq!(q.service_charge, Decimal::new(3, 2));
    }

    #[test]
    fn test_rejects_bad_tips() {
        let pricing = Pricing::default();
        assert_eq!(
            pricing.quote(Decimal::new(-1, 0)),
            Err(PricingError::Negative("tip"))
        );
        assert_eq!(
            pricing.quote(Decimal::new(1_005, 3)),
            Err(PricingError::TooPrecise("tip"))
        );
        assert_eq!(
            pricing.quote(Decimal::new(100_000_001, 0)),
            Err(PricingError::TooLarge("tip"))
        );
        // trailing zeros are not extra precision
        assert!(pricing.quote(Decimal::new(20_500, 3)).is_ok());
    }

    #[test]
    fn test_invalid_rate() {
        assert_eq!(
            Pricing::new(Decimal::ONE, Decimal::ONE, Decimal::new(2, 0)),
            Err(PricingError::InvalidRate)
        );
    }

    #[test]
    fn test_cents_conversion() {
        let q = Pricing::default().quote(Decimal::new(2_050, 2)).unwrap();
        let [base, service, delivery, tip, total] = q.to_cents().unwrap();
        assert_eq!((base, service, delivery, tip, total), (10_000, 500, 5_000, 2_050, 17_550));
        assert_eq!(PriceBreakdown::from_cents(base, service, delivery, tip, total), q);
    }
}
