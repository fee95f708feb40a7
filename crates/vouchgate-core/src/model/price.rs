use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A non-negative amount in minor units (cents), printed with two decimals.
///
/// The currency is whatever the operator sells in; vouchgate only sums it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Price(i64);

impl Price {
    pub const ZERO: Self = Self(0);

    pub fn from_cents(cents: i64) -> Result<Self, CoreError> {
        if cents < 0 {
            return Err(CoreError::validation("price cannot be negative"));
        }
        Ok(Self(cents))
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    /// Sum, saturating rather than wrapping on absurd totals.
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Price {
    type Err = CoreError;

    /// Accepts `10`, `10.5` and `10.50`; more than two decimals is an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = || CoreError::validation(format!("invalid price: {s:?}"));
        let (whole, frac) = raw.split_once('.').unwrap_or((raw, ""));
        if whole.is_empty()
            || !whole.chars().all(|c| c.is_ascii_digit())
            || frac.len() > 2
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };
        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for Price {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Price> for String {
    fn from(price: Price) -> Self {
        price.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_forms() {
        assert_eq!("10".parse::<Price>().unwrap().cents(), 1000);
        assert_eq!("10.5".parse::<Price>().unwrap().cents(), 1050);
        assert_eq!("0.05".parse::<Price>().unwrap().cents(), 5);
    }

    #[test]
    fn rejects_bad_amounts() {
        for raw in ["", "-1", "1.234", "ten", ".5"] {
            assert!(raw.parse::<Price>().is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn displays_two_decimals() {
        assert_eq!(Price::from_cents(2500).unwrap().to_string(), "25.00");
        assert_eq!(Price::from_cents(7).unwrap().to_string(), "0.07");
    }
}
