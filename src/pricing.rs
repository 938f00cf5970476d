//! Order totals.
//!
//! Both order screens share one calculation but price shipping differently:
//! the customer checkout charges a fixed fee per delivery zone, while the admin
//! order form charges a flat fee that drops to zero above a subtotal
//! threshold. Tax is a fixed 8% in both.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::order::LineItem;
use crate::domain::value_objects::round2;

/// 8%
pub const TAX_RATE: Decimal = Decimal::from_parts(8, 0, 0, false, 2);
pub const ADMIN_SHIPPING_FEE: Decimal = Decimal::from_parts(10, 0, 0, false, 0);
/// Admin orders ship free once the subtotal is strictly above this.
pub const ADMIN_FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
pub const INSIDE_REGION_FEE: Decimal = Decimal::from_parts(60, 0, 0, false, 0);
pub const OUTSIDE_REGION_FEE: Decimal = Decimal::from_parts(120, 0, 0, false, 0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShippingZone {
    #[default]
    InsideRegion,
    OutsideRegion,
}

impl ShippingZone {
    pub fn fee(self) -> Decimal {
        match self { Self::InsideRegion => INSIDE_REGION_FEE, Self::OutsideRegion => OUTSIDE_REGION_FEE }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShippingRule {
    /// Same fee whatever the subtotal.
    Flat(Decimal),
    /// `fee` unless the subtotal is strictly greater than `threshold`.
    FreeOver { threshold: Decimal, fee: Decimal },
}

impl ShippingRule {
    pub fn fee_for(&self, subtotal: Decimal) -> Decimal {
        match *self {
            Self::Flat(fee) => fee,
            Self::FreeOver { threshold, fee } => if subtotal > threshold { Decimal::ZERO } else { fee },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    pub tax_rate: Decimal,
    pub shipping: ShippingRule,
}

impl PricingPolicy {
    pub fn admin() -> Self {
        Self { tax_rate: TAX_RATE, shipping: ShippingRule::FreeOver { threshold: ADMIN_FREE_SHIPPING_THRESHOLD, fee: ADMIN_SHIPPING_FEE } }
    }

    pub fn checkout(zone: ShippingZone) -> Self {
        Self { tax_rate: TAX_RATE, shipping: ShippingRule::Flat(zone.fee()) }
    }

    /// Prices `items` under this policy. Shipping is decided from the subtotal first.
    pub fn quote<'a>(&self, items: impl IntoIterator<Item = &'a LineItem>, discount: Decimal) -> OrderTotals {
        let Some(subtotal) = subtotal_of(items) else { return OrderTotals::default() };
        totals_from_subtotal(subtotal, self.shipping.fee_for(subtotal), self.tax_rate, discount)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Totals for `items` with an already chosen shipping fee.
///
/// No items means all zeros, shipping included. The discount is clamped to
/// `[0, subtotal + tax + shipping]` so the total never goes negative.
pub fn compute_totals<'a>(
    items: impl IntoIterator<Item = &'a LineItem>,
    shipping_fee: Decimal,
    tax_rate: Decimal,
    discount: Decimal,
) -> OrderTotals {
    match subtotal_of(items) {
        Some(subtotal) => totals_from_subtotal(subtotal, shipping_fee, tax_rate, discount),
        None => OrderTotals::default(),
    }
}

fn subtotal_of<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> Option<Decimal> {
    items.into_iter().fold(None, |acc: Option<Decimal>, item| Some(acc.unwrap_or_default() + item.line_total())).map(round2)
}

fn totals_from_subtotal(subtotal: Decimal, shipping_fee: Decimal, tax_rate: Decimal, discount: Decimal) -> OrderTotals {
    let tax = round2(subtotal * tax_rate);
    let shipping = round2(shipping_fee);
    let gross = subtotal + tax + shipping;
    let discount = round2(discount.max(Decimal::ZERO).min(gross));
    OrderTotals { subtotal, tax, shipping, discount, total: round2(gross - discount) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{ProductRef, Quantity};
    use rust_decimal_macros::dec;

    fn line(price: Decimal, qty: u32) -> LineItem {
        LineItem::new(ProductRef::Catalog("p".into()), "Item", price, Quantity::new(qty).unwrap())
    }

    #[test]
    fn test_totals_are_idempotent() {
        let items = vec![line(dec!(19.99), 3), line(dec!(0.333), 7), LineItem::custom("Fee", dec!(1.1), Quantity::ONE)];
        let first = compute_totals(&items, dec!(10), TAX_RATE, dec!(2.5));
        let second = compute_totals(&items, dec!(10), TAX_RATE, dec!(2.5));
        assert_eq!(first, second);
        assert_eq!(first.total.serialize(), second.total.serialize());
    }

    #[test]
    fn test_subtotal_includes_custom_items() {
        let items = vec![line(dec!(12.5), 2), LineItem::custom("Engraving", dec!(7.25), Quantity::new(3).unwrap())];
        let totals = compute_totals(&items, Decimal::ZERO, TAX_RATE, Decimal::ZERO);
        assert_eq!(totals.subtotal, dec!(25) + dec!(21.75));
    }

    #[test]
    fn test_empty_is_all_zero() {
        let none: Vec<LineItem> = Vec::new();
        assert_eq!(compute_totals(&none, dec!(120), TAX_RATE, dec!(5)), OrderTotals::default());
        assert_eq!(PricingPolicy::checkout(ShippingZone::OutsideRegion).quote(&none, Decimal::ZERO), OrderTotals::default());
    }

    #[test]
    fn test_shipping_policies_diverge() {
        let items = vec![line(dec!(60), 1)];
        assert_eq!(PricingPolicy::admin().quote(&items, Decimal::ZERO).shipping, Decimal::ZERO);
        let inside = PricingPolicy::checkout(ShippingZone::InsideRegion).quote(&items, Decimal::ZERO);
        assert_eq!(inside.shipping, INSIDE_REGION_FEE);
        assert!(inside.shipping > Decimal::ZERO);
    }

    #[test]
    fn test_admin_threshold_is_strict() {
        let totals = PricingPolicy::admin().quote(&[line(dec!(25), 2)], Decimal::ZERO);
        assert_eq!(totals, OrderTotals { subtotal: dec!(50), tax: dec!(4), shipping: dec!(10), discount: dec!(0), total: dec!(64) });
    }

    #[test]
    fn test_checkout_outside_zone_ignores_subtotal() {
        let totals = PricingPolicy::checkout(ShippingZone::OutsideRegion).quote(&[line(dec!(1000), 1)], Decimal::ZERO);
        assert_eq!(totals.tax, dec!(80));
        assert_eq!(totals.shipping, dec!(120));
        assert_eq!(totals.total, dec!(1200));
    }

    #[test]
    fn test_discount_is_clamped() {
        let items = vec![line(dec!(10), 1)];
        let totals = compute_totals(&items, dec!(5), TAX_RATE, dec!(100));
        assert_eq!(totals.discount, dec!(15.8));
        assert_eq!(totals.total, Decimal::ZERO);
        let negative = compute_totals(&items, dec!(5), TAX_RATE, dec!(-3));
        assert_eq!(negative.discount, Decimal::ZERO);
        assert_eq!(negative.total, dec!(15.8));
    }
}
