//! Credit amounts.
//!
//! Credits are metered in hundredths so fractional charges (a scene
//! regeneration costs half a credit) stay exact. Amounts serialize as plain
//! JSON numbers (`4.5`) and are persisted as integer hundredths.

use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of stored units per whole credit.
pub const UNITS_PER_CREDIT: u64 = 100;

/// A non-negative credit amount with 1/100 credit precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Credits(u64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    /// Create from raw hundredths of a credit.
    pub const fn from_hundredths(hundredths: u64) -> Self {
        Self(hundredths)
    }

    /// Create from a whole number of credits.
    pub const fn whole(credits: u64) -> Self {
        Self(credits * UNITS_PER_CREDIT)
    }

    /// Convert from a decimal amount, rounding to the nearest hundredth.
    ///
    /// Returns `None` for negative, NaN or infinite input.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(Self((value * UNITS_PER_CREDIT as f64).round() as u64))
    }

    /// Raw hundredths of a credit.
    pub const fn hundredths(&self) -> u64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / UNITS_PER_CREDIT as f64
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        self.0.checked_sub(other.0).map(Credits)
    }

    pub fn saturating_add(self, other: Credits) -> Credits {
        Credits(self.0.saturating_add(other.0))
    }

    /// Multiply a unit price by a quantity.
    pub fn times(self, quantity: u32) -> Credits {
        Credits(self.0.saturating_mul(quantity as u64))
    }
}

impl Add for Credits {
    type Output = Credits;

    fn add(self, rhs: Credits) -> Credits {
        self.saturating_add(rhs)
    }
}

impl Sum for Credits {
    fn sum<I: Iterator<Item = Credits>>(iter: I) -> Credits {
        iter.fold(Credits::ZERO, Add::add)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNITS_PER_CREDIT;
        let frac = self.0 % UNITS_PER_CREDIT;
        if frac == 0 {
            write!(f, "{}", whole)
        } else if frac % 10 == 0 {
            write!(f, "{}.{}", whole, frac / 10)
        } else {
            write!(f, "{}.{:02}", whole, frac)
        }
    }
}

impl Serialize for Credits {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Credits {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Credits::from_f64(value)
            .ok_or_else(|| serde::de::Error::custom("credit amounts must be non-negative numbers"))
    }
}

impl JsonSchema for Credits {
    fn schema_name() -> String {
        "Credits".to_string()
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        f64::json_schema(gen)
    }
}
