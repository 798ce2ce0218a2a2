//! Value Objects for the purchase lifecycle

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Line item quantity, never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Result<Self, QuantityError> {
        self.0.checked_add(other.0).map(Self).ok_or(QuantityError::Overflow)
    }
    /// `None` when the product does not fit in a `Decimal`.
    pub fn times(&self, unit_price: Decimal) -> Option<Decimal> { unit_price.checked_mul(Decimal::from(self.0)) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> u32 { q.0 }
}

#[derive(Debug, Clone)] pub enum QuantityError { Zero, Overflow }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "Quantity must be at least 1"),
            Self::Overflow => write!(f, "Quantity is too large"),
        }
    }
}

/// Integer star rating between 1 and 5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn new(value: i64) -> Result<Self, RatingError> {
        if !(Self::MIN..=Self::MAX).contains(&value) { return Err(RatingError::OutOfRange(value)); }
        Ok(Self(value as u8))
    }
    pub fn value(&self) -> u8 { self.0 }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 { r.0 }
}

#[derive(Debug, Clone)] pub enum RatingError { OutOfRange(i64) }
impl std::error::Error for RatingError {}
impl fmt::Display for RatingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::OutOfRange(v) => write!(f, "Rating must be an integer between 1 and 5, got {v}") }
    }
}

/// Converts a major-unit amount (rupees, dollars) to the gateway's smallest unit.
///
/// Rounds half away from zero, so `149.995` becomes `15000`.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// A status enum whose legal moves are listed as data.
///
/// `TRANSITIONS` maps every state to the states it may move to next; a state
/// mapped to an empty slice is terminal.
pub trait Lifecycle: Copy + Eq + fmt::Display + 'static {
    const TRANSITIONS: &'static [(Self, &'static [Self])];

    fn allowed_next(self) -> &'static [Self] {
        Self::TRANSITIONS.iter().find(|(from, _)| *from == self).map(|(_, next)| *next).unwrap_or(&[])
    }

    fn can_become(self, next: Self) -> bool { self.allowed_next().contains(&next) }

    fn is_terminal(self) -> bool { self.allowed_next().is_empty() }

    fn states() -> Vec<Self> { Self::TRANSITIONS.iter().map(|(s, _)| *s).collect() }

    /// Comma separated list of the allowed next states, or `none`.
    fn describe_next(self) -> String {
        let next = self.allowed_next();
        if next.is_empty() { return "none".to_string(); }
        next.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_quantity() {
        assert!(Quantity::new(0).is_err());
        let q = Quantity::new(2).unwrap().add(Quantity::new(3).unwrap()).unwrap();
        assert_eq!(q.value(), 5);
        assert!(Quantity::new(u32::MAX).unwrap().add(q).is_err());
    }
    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(5).unwrap().value(), 5);
        assert!(serde_json::from_str::<Rating>("7").is_err());
    }
    #[test]
    fn test_minor_units() {
        assert_eq!(to_minor_units(Decimal::new(15000, 0)), Some(1_500_000));
        assert_eq!(to_minor_units(Decimal::new(1999, 2)), Some(1999));
        assert_eq!(to_minor_units(Decimal::new(149995, 3)), Some(15000));
        assert_eq!(to_minor_units(Decimal::MAX), None);
        assert_eq!(to_minor_units(Decimal::new(i64::MAX, 0)), None);
    }
    #[test]
    fn test_times_overflow() {
        let q = Quantity::new(3).unwrap();
        assert_eq!(q.times(Decimal::new(250, 2)), Some(Decimal::new(750, 2)));
        assert_eq!(Quantity::new(u32::MAX).unwrap().times(Decimal::MAX), None);
    }
}
