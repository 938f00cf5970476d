//! Cart Aggregate
//!
//! One shape serves both the server-persisted cart and the guest cart blob kept
//! in client storage, so either source normalizes to the same [`LineItem`]s.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::order::LineItem;
use crate::domain::aggregates::product::{ProductSnapshot, VariantSelection};
use crate::domain::value_objects::{ProductRef, Quantity};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub items: Vec<CartEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartEntry {
    pub product: ProductSnapshot,
    pub quantity: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantSelection>,
    /// Unit price locked by the server when the item was added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
}

impl CartEntry {
    pub fn new(product: ProductSnapshot, variant: Option<VariantSelection>, quantity: Quantity) -> Self {
        Self { product, quantity, variant, price: None }
    }

    pub fn variant_id(&self) -> Option<&str> { self.variant.as_ref().map(|v| v.variant_id.as_str()) }

    pub fn unit_price(&self) -> Decimal {
        self.price.unwrap_or_else(|| self.product.effective_price(self.variant.as_ref()))
    }

    fn same_line(&self, product_id: &str, variant_id: Option<&str>) -> bool {
        self.product.id == product_id && self.variant_id() == variant_id
    }

    pub fn to_line_item(&self) -> LineItem {
        LineItem::new(ProductRef::Catalog(self.product.id.clone()), self.product.name.clone(), self.unit_price(), self.quantity)
            .with_variant(self.variant.clone())
    }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[CartEntry] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Total units across all lines, as shown on the cart badge.
    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.quantity.value()).sum() }

    pub fn subtotal(&self) -> Decimal { self.items.iter().map(|i| i.unit_price() * Decimal::from(i.quantity.value())).sum() }

    pub fn line_items(&self) -> Vec<LineItem> { self.items.iter().map(CartEntry::to_line_item).collect() }

    /// Adds an entry, merging with an existing line for the same product and variant.
    pub fn add_item(&mut self, item: CartEntry) -> Result<(), CartError> {
        let product_id = item.product.id.clone();
        let variant_id = item.variant_id().map(str::to_owned);
        let stock = item.product.effective_stock(item.variant.as_ref());
        match self.items.iter_mut().find(|i| i.same_line(&product_id, variant_id.as_deref())) {
            Some(existing) => {
                let wanted = existing.quantity.add(item.quantity);
                check_stock(stock, wanted)?;
                existing.quantity = wanted;
            }
            None => {
                check_stock(stock, item.quantity)?;
                self.items.push(item);
            }
        }
        Ok(())
    }

    /// Sets the quantity of a line; zero removes it.
    pub fn update_quantity(&mut self, product_id: &str, variant_id: Option<&str>, quantity: u32) -> Result<(), CartError> {
        let Ok(quantity) = Quantity::new(quantity) else { return self.remove_item(product_id, variant_id) };
        let item = self.items.iter_mut().find(|i| i.same_line(product_id, variant_id)).ok_or(CartError::ItemNotFound)?;
        check_stock(item.product.effective_stock(item.variant.as_ref()), quantity)?;
        item.quantity = quantity;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str, variant_id: Option<&str>) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| !i.same_line(product_id, variant_id));
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); }
}

fn check_stock(stock: Option<u32>, wanted: Quantity) -> Result<(), CartError> {
    match stock {
        Some(available) if wanted.value() > available => Err(CartError::InsufficientStock { available }),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InsufficientStock { available: u32 } }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::InsufficientStock { available } => write!(f, "Only {available} left in stock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn widget(stock: Option<u32>) -> ProductSnapshot {
        ProductSnapshot { id: "P1".into(), name: "Widget".into(), price: dec!(10), stock, sku: Some("W1".into()), image: None }
    }

    fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new();
        cart.add_item(CartEntry::new(widget(None), None, qty(2))).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.subtotal(), dec!(20));
        cart.add_item(CartEntry::new(widget(None), None, qty(1))).unwrap();
        assert_eq!(cart.items()[0].quantity.value(), 3); // Merged
        assert_eq!(cart.item_count(), 3);
        cart.update_quantity("P1", None, 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_variants_are_separate_lines() {
        let mut cart = Cart::new();
        let red = VariantSelection {
            variant_id: "red".into(), name: "Red".into(), attributes: BTreeMap::from([("color".into(), "red".into())]),
            sku: None, price: Some(dec!(12)), stock: None,
        };
        cart.add_item(CartEntry::new(widget(None), None, qty(1))).unwrap();
        cart.add_item(CartEntry::new(widget(None), Some(red), qty(2))).unwrap();
        assert_eq!(cart.items().len(), 2);
        assert_eq!(cart.subtotal(), dec!(34));
        let lines = cart.line_items();
        assert_eq!(lines[1].unit_price(), dec!(12));
        assert_eq!(lines[1].line_total(), dec!(24));
    }

    #[test]
    fn test_stock_limits_merge() {
        let mut cart = Cart::new();
        cart.add_item(CartEntry::new(widget(Some(3)), None, qty(2))).unwrap();
        let err = cart.add_item(CartEntry::new(widget(Some(3)), None, qty(2))).unwrap_err();
        assert_eq!(err, CartError::InsufficientStock { available: 3 });
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_locked_price_wins() {
        let mut entry = CartEntry::new(widget(None), None, qty(1));
        entry.price = Some(dec!(9.5));
        assert_eq!(entry.unit_price(), dec!(9.5));
    }

    #[test]
    fn test_guest_blob_shape() {
        let cart: Cart = serde_json::from_str(
            r#"{"items":[{"product":{"_id":"p1","name":"Mug","price":15},"quantity":3}]}"#,
        ).unwrap();
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.line_items()[0].line_total(), dec!(45));
    }

    #[test]
    fn test_remove_missing_item() {
        let mut cart = Cart::new();
        assert_eq!(cart.remove_item("nope", None), Err(CartError::ItemNotFound));
    }
}
