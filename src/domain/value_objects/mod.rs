//! Value Objects for checkout pricing

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Round a monetary amount to cents, midpoint away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// An amount in a currency, for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {:.2}", self.currency, round2(self.amount)) }
}

/// Line quantity, always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> Self { q.0 }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "quantity must be at least 1") }
}

/// Reference to the product a line was built from.
///
/// Serialized as the plain product id, or the literal `"custom"` for
/// ad-hoc lines entered by staff.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProductRef {
    Catalog(String),
    Custom,
}

impl ProductRef {
    pub const CUSTOM: &'static str = "custom";

    pub fn is_custom(&self) -> bool { matches!(self, Self::Custom) }
    pub fn as_str(&self) -> &str {
        match self { Self::Catalog(id) => id, Self::Custom => Self::CUSTOM }
    }
}

impl From<String> for ProductRef {
    fn from(value: String) -> Self {
        if value == Self::CUSTOM { Self::Custom } else { Self::Catalog(value) }
    }
}

impl From<ProductRef> for String {
    fn from(value: ProductRef) -> Self {
        match value { ProductRef::Catalog(id) => id, ProductRef::Custom => ProductRef::CUSTOM.to_string() }
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round2_midpoint() {
        assert_eq!(round2(dec!(1.005)), dec!(1.01));
        assert_eq!(round2(dec!(2.344)), dec!(2.34));
    }

    #[test]
    fn test_money_display_pads_cents() {
        assert_eq!(Money::new(dec!(64), "USD").to_string(), "USD 64.00");
        assert_eq!(Money::new(dec!(141.6), "BDT").to_string(), "BDT 141.60");
    }

    #[test]
    fn test_quantity_rejects_zero() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("3").unwrap().value(), 3);
    }

    #[test]
    fn test_product_ref_custom_tag() {
        assert_eq!(serde_json::to_string(&ProductRef::Custom).unwrap(), "\"custom\"");
        assert_eq!(serde_json::from_str::<ProductRef>("\"p1\"").unwrap(), ProductRef::Catalog("p1".into()));
        assert!(serde_json::from_str::<ProductRef>("\"custom\"").unwrap().is_custom());
    }
}
