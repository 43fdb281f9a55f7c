use ethers::types::U256;
use ethers::utils::format_units;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::FlowError;

/// A token quantity in base units.
///
/// Backed by `U256`, so it is non-negative by construction and never holds a
/// fractional base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(pub U256);

impl Amount {
    pub fn zero() -> Self {
        Amount(U256::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Parse holder input as a base-unit integer.
    ///
    /// Only ASCII digits are accepted (surrounding whitespace is ignored):
    /// signs, decimal points and exponents are rejected rather than rounded.
    pub fn parse(input: &str) -> Result<Self, FlowError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(FlowError::InvalidAmount("amount is empty".to_string()));
        }
        if let Some(bad) = trimmed.chars().find(|c| !c.is_ascii_digit()) {
            return Err(FlowError::InvalidAmount(format!(
                "unexpected character {bad:?} in {trimmed:?}"
            )));
        }
        U256::from_dec_str(trimmed)
            .map(Amount)
            .map_err(|_| FlowError::AmountOverflow)
    }

    /// Convert a purchase amount into the stable asset's base units.
    ///
    /// `unit_price` is the number of whole stable units charged per base
    /// unit of the purchase amount. Only the stable asset's decimals take
    /// part in the scaling.
    pub fn scale_to_stable(&self, unit_price: u64, stable_decimals: u8) -> Result<U256, FlowError> {
        U256::from(10u8)
            .checked_pow(U256::from(stable_decimals))
            .and_then(|factor| self.0.checked_mul(U256::from(unit_price))?.checked_mul(factor))
            .ok_or(FlowError::AmountOverflow)
    }

    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Render with a decimal point placed `decimals` digits from the right.
    pub fn format(&self, decimals: u8) -> String {
        format_units(self.0, decimals as u32).unwrap_or_else(|_| self.0.to_string())
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Amount(U256::from(v))
    }
}

impl From<U256> for Amount {
    fn from(v: U256) -> Self {
        Amount(v)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s)
    }
}

// Decimal strings on the wire; `U256`'s own serde form is hex.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Amount::parse(&raw).map_err(serde::de::Error::custom)
    }
}
