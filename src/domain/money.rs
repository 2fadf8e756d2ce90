use crate::error::LedgerError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Number of minor units in one major unit (cents per dollar).
pub const MINOR_UNITS: i64 = 100;

/// A signed monetary amount held as an integer count of minor units.
///
/// Every balance, delta and payout amount in the ledger is a `Money`, so sums over
/// many ledger entries are exact. Conversion from `Decimal` input refuses sub-cent
/// precision instead of silently rounding it away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Self = Self(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Converts a decimal major-unit amount (e.g. `10.25`) into minor units.
    pub fn from_decimal(value: Decimal) -> Result<Self, LedgerError> {
        let scaled = value
            .checked_mul(Decimal::from(MINOR_UNITS))
            .ok_or_else(|| {
                LedgerError::ValidationError(format!("Amount {value} is out of range"))
            })?;
        if !scaled.fract().is_zero() {
            return Err(LedgerError::ValidationError(format!(
                "Amount {value} has more than two decimal places"
            )));
        }
        scaled
            .to_i64()
            .map(Self)
            .ok_or_else(|| LedgerError::ValidationError(format!("Amount {value} is out of range")))
    }

    /// Multiplies by `rate`, rounding half away from zero to whole minor units.
    pub fn apply_rate(self, rate: Decimal) -> Result<Self, LedgerError> {
        let product = self
            .to_decimal()
            .checked_mul(rate)
            .ok_or(LedgerError::InvalidAmount(self))?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self::from_decimal(product)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = MINOR_UNITS as u64;
        write!(f, "{sign}{}.{:02}", abs / units, abs % units)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = LedgerError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.to_decimal()
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// Identifies a seller account whose balance the ledger tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SellerId(pub u32);

impl fmt::Display for SellerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The user who triggered a mutation. `None` wherever an actor is optional means
/// the system acted on its own (scheduler, order webhook).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(250);
        assert_eq!(a + b, Money::from_minor(1250));
        assert_eq!(a - b, Money::from_minor(750));
        assert_eq!(-b, Money::from_minor(-250));
        let total: Money = [a, b, -b].into_iter().sum();
        assert_eq!(total, a);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_minor(1000).to_string(), "10.00");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-12.34");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_from_decimal() {
        assert_eq!(Money::from_decimal(dec!(10.25)).unwrap(), Money::from_minor(1025));
        assert_eq!(Money::from_decimal(dec!(3)).unwrap(), Money::from_minor(300));
        assert_eq!(Money::from_decimal(dec!(-0.5)).unwrap(), Money::from_minor(-50));
        assert!(matches!(
            Money::from_decimal(dec!(0.001)),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_apply_rate_rounds_half_away_from_zero() {
        assert_eq!(
            Money::from_minor(10000).apply_rate(dec!(0.10)).unwrap(),
            Money::from_minor(1000)
        );
        // 0.15 * 0.5 = 0.075 -> 0.08
        assert_eq!(
            Money::from_minor(15).apply_rate(dec!(0.5)).unwrap(),
            Money::from_minor(8)
        );
        // 33.33 * 0.333 = 11.09889 -> 11.10
        assert_eq!(
            Money::from_minor(3333).apply_rate(dec!(0.333)).unwrap(),
            Money::from_minor(1110)
        );
    }

    #[test]
    fn test_checked_ops() {
        assert!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)).is_none());
        assert_eq!(
            Money::from_minor(5).checked_sub(Money::from_minor(7)),
            Some(Money::from_minor(-2))
        );
    }
}
