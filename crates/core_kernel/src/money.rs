//! Money with precise decimal arithmetic
//!
//! All monetary values use rust_decimal; native floating point never touches
//! a balance. Intermediate arithmetic keeps full precision and only `settle`
//! (or the operations documented as settling) rounds, to 2 fractional digits
//! with half-up rounding.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use thiserror::Error;

/// Number of fractional digits a settled amount carries.
pub const SCALE: u32 = 2;

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Overflow during calculation")]
    Overflow,
}

/// A monetary amount
///
/// Comparison is exact: two amounts are equal only when their decimal values
/// are numerically equal, with no epsilon tolerance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Creates a new Money value, keeping the full precision of the input
    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates Money from an integer amount in cents
    pub fn from_minor(minor_units: i64) -> Self {
        Self(Decimal::new(minor_units, SCALE))
    }

    /// The zero amount
    pub fn zero() -> Self {
        Self(dec!(0))
    }

    /// Returns the underlying decimal amount
    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Returns true if the amount is strictly negative
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Returns the absolute value
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Rounds to 2 fractional digits, half-up
    ///
    /// This is the only rounding step: callers settle once, at the point a
    /// value becomes an output (a quoted price, an item total, a balance).
    pub fn settle(&self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Checked addition
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Checked subtraction
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }

    /// Multiplies by a scalar, keeping full precision
    pub fn multiply(&self, factor: Decimal) -> Self {
        Self(self.0 * factor)
    }

    /// Applies a percentage markup and settles the result
    ///
    /// `Money::new(dec!(10.33)).markup(Rate::from_percentage(dec!(17.50)))`
    /// yields 12.14 (10.33 × 1.175 = 12.13775, half-up).
    pub fn markup(&self, rate: Rate) -> Self {
        self.multiply(Decimal::ONE + rate.as_decimal()).settle()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Mul<Decimal> for Money {
    type Output = Self;

    fn mul(self, factor: Decimal) -> Self {
        self.multiply(factor)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// A percentage rate (tax rate, markup percentage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// The rate as a decimal (e.g., 0.10 for 10%)
    value: Decimal,
}

impl Rate {
    /// Creates a rate from a decimal value (e.g., 0.10 for 10%)
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Creates a rate from a percentage (e.g., 10.0 for 10%)
    pub fn from_percentage(percentage: Decimal) -> Self {
        Self {
            value: percentage / dec!(100),
        }
    }

    /// Returns the rate as a decimal
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Returns the rate as a percentage
    pub fn as_percentage(&self) -> Decimal {
        self.value * dec!(100)
    }

    /// Applies this rate to an amount and settles the result
    pub fn apply(&self, money: &Money) -> Money {
        money.multiply(self.value).settle()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.as_percentage())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let m = Money::new(dec!(100.50));
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(10050);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(dec!(100.00));
        let b = Money::new(dec!(50.00));

        assert_eq!((a + b).amount(), dec!(150.00));
        assert_eq!((a - b).amount(), dec!(50.00));
    }

    #[test]
    fn test_settle_rounds_half_up() {
        assert_eq!(Money::new(dec!(2.898)).settle().amount(), dec!(2.90));
        assert_eq!(Money::new(dec!(2.894)).settle().amount(), dec!(2.89));
        assert_eq!(Money::new(dec!(12.13775)).settle().amount(), dec!(12.14));
    }

    #[test]
    fn test_settle_half_up_on_negative() {
        assert_eq!(Money::new(dec!(-2.895)).settle().amount(), dec!(-2.90));
    }

    #[test]
    fn test_rate_application() {
        let rate = Rate::from_percentage(dec!(10.0));
        let amount = Money::new(dec!(28.98));

        assert_eq!(rate.apply(&amount).amount(), dec!(2.90));
    }

    #[test]
    fn test_markup() {
        let base = Money::new(dec!(10.33));
        let marked = base.markup(Rate::from_percentage(dec!(17.50)));

        assert_eq!(marked.amount(), dec!(12.14));
    }

    #[test]
    fn test_exact_comparison() {
        assert_eq!(Money::new(dec!(12.14)), Money::new(dec!(12.140)));
        assert!(Money::new(dec!(12.15)) > Money::new(dec!(12.14)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn credit_then_debit_round_trips(
            start in -1_000_000_000i64..1_000_000_000i64,
            delta in 1i64..1_000_000_000i64
        ) {
            let balance = Money::from_minor(start);
            let amount = Money::from_minor(delta);

            prop_assert_eq!((balance + amount) - amount, balance);
        }

        #[test]
        fn settle_is_idempotent(minor in -1_000_000_000i64..1_000_000_000i64) {
            let m = Money::from_minor(minor);
            prop_assert_eq!(m.settle(), m.settle().settle());
        }

        #[test]
        fn addition_is_associative(
            a in -1_000_000i64..1_000_000i64,
            b in -1_000_000i64..1_000_000i64,
            c in -1_000_000i64..1_000_000i64
        ) {
            let ma = Money::from_minor(a);
            let mb = Money::from_minor(b);
            let mc = Money::from_minor(c);

            prop_assert_eq!((ma + mb) + mc, ma + (mb + mc));
        }
    }
}
