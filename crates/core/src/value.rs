//! Fixed-point monetary value.

use core::iter::Sum;
use core::ops::{Add, Mul};
use serde::{Deserialize, Serialize};

const SCALE: u64 = 100;

/// Monetary value in hundredths of a unit.
///
/// Integer arithmetic keeps running totals exact across any sequence of
/// additions and removals.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(u64);

impl Value {
    pub const ZERO: Value = Value(0);

    /// Convert a decimal amount, rounding to the nearest hundredth.
    ///
    /// Negative, NaN and infinite inputs map to zero.
    pub fn from_units(units: f64) -> Self {
        if !units.is_finite() || units <= 0.0 {
            return Self::ZERO;
        }
        Self((units * SCALE as f64).round() as u64)
    }

    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    pub const fn hundredths(&self) -> u64 {
        self.0
    }

    pub fn as_units(&self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, rhs: Value) -> Value {
        Value(self.0.saturating_sub(rhs.0))
    }
}

impl Add for Value {
    type Output = Value;

    fn add(self, rhs: Value) -> Value {
        Value(self.0.saturating_add(rhs.0))
    }
}

impl Mul<u64> for Value {
    type Output = Value;

    fn mul(self, rhs: u64) -> Value {
        Value(self.0.saturating_mul(rhs))
    }
}

impl Sum for Value {
    fn sum<I: Iterator<Item = Value>>(iter: I) -> Value {
        iter.fold(Value::ZERO, Add::add)
    }
}

impl core::fmt::Display for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / SCALE, self.0 % SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_decimal_units() {
        assert_eq!(Value::from_units(10.0).hundredths(), 1000);
        assert_eq!(Value::from_units(0.125).hundredths(), 13);
        assert_eq!(Value::from_units(-3.0), Value::ZERO);
        assert_eq!(Value::from_units(f64::NAN), Value::ZERO);
    }

    #[test]
    fn fractional_totals_return_to_zero() {
        let unit = Value::from_units(0.1);
        let mut total = Value::ZERO;
        for _ in 0..10 {
            total = total + unit;
        }
        assert_eq!(total, Value::from_units(1.0));
        for _ in 0..10 {
            total = total.saturating_sub(unit);
        }
        assert!(total.is_zero());
    }

    #[test]
    fn displays_two_decimals() {
        assert_eq!(Value::from_hundredths(2005).to_string(), "20.05");
        assert_eq!((Value::from_units(2.5) * 3).to_string(), "7.50");
    }
}
