//! Product snapshots carried inside carts

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The slice of a catalog product that travels with a cart entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A concrete variant picked on the product page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSelection {
    pub variant_id: String,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

impl ProductSnapshot {
    /// Unit price for this product, with the variant's own price taking precedence.
    pub fn effective_price(&self, variant: Option<&VariantSelection>) -> Decimal {
        variant.and_then(|v| v.price).unwrap_or(self.price)
    }

    /// Stock ceiling for this product; `None` means untracked.
    pub fn effective_stock(&self, variant: Option<&VariantSelection>) -> Option<u32> {
        variant.and_then(|v| v.stock).or(self.stock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tee() -> ProductSnapshot {
        ProductSnapshot { id: "p1".into(), name: "Tee".into(), price: dec!(20), stock: Some(10), sku: None, image: None }
    }

    #[test]
    fn test_variant_overrides_price_and_stock() {
        let variant = VariantSelection {
            variant_id: "v1".into(), name: "XL".into(), attributes: BTreeMap::from([("size".into(), "XL".into())]),
            sku: Some("TEE-XL".into()), price: Some(dec!(24.5)), stock: Some(2),
        };
        let product = tee();
        assert_eq!(product.effective_price(Some(&variant)), dec!(24.5));
        assert_eq!(product.effective_stock(Some(&variant)), Some(2));
        assert_eq!(product.effective_price(None), dec!(20));
    }

    #[test]
    fn test_variant_without_price_falls_back() {
        let variant = VariantSelection {
            variant_id: "v2".into(), name: "Blue".into(), attributes: BTreeMap::new(),
            sku: None, price: None, stock: None,
        };
        assert_eq!(tee().effective_price(Some(&variant)), dec!(20));
        assert_eq!(tee().effective_stock(Some(&variant)), Some(10));
    }

    #[test]
    fn test_accepts_mongo_style_id() {
        let p: ProductSnapshot = serde_json::from_str(r#"{"_id":"abc","name":"Mug","price":15}"#).unwrap();
        assert_eq!(p.id, "abc");
        assert_eq!(p.price, dec!(15));
    }
}
