//! Draft Order Aggregate
//!
//! A [`DraftOrder`] is the working order assembled on the checkout page or the
//! admin "create order" form. It is submitted once through
//! [`crate::submission::OrderSubmitter`]; a failed submission leaves it intact
//! for another attempt.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};
use crate::domain::aggregates::product::VariantSelection;
use crate::domain::value_objects::{ProductRef, Quantity};
use crate::pricing::{OrderTotals, PricingPolicy, ShippingZone};

/// One priced line of an order. `line_total` is always derived from price and quantity.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    product_ref: ProductRef,
    name: String,
    unit_price: Decimal,
    quantity: Quantity,
    line_total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<VariantSelection>,
}

impl LineItem {
    pub fn new(product_ref: ProductRef, name: impl Into<String>, unit_price: Decimal, quantity: Quantity) -> Self {
        let mut item = Self { product_ref, name: name.into(), unit_price, quantity, line_total: Decimal::ZERO, variant: None };
        item.recompute();
        item
    }

    /// Ad-hoc line with no catalog product behind it.
    pub fn custom(name: impl Into<String>, unit_price: Decimal, quantity: Quantity) -> Self {
        Self::new(ProductRef::Custom, name, unit_price, quantity)
    }

    pub fn with_variant(mut self, variant: Option<VariantSelection>) -> Self { self.variant = variant; self }

    pub fn product_ref(&self) -> &ProductRef { &self.product_ref }
    pub fn name(&self) -> &str { &self.name }
    pub fn unit_price(&self) -> Decimal { self.unit_price }
    pub fn quantity(&self) -> Quantity { self.quantity }
    pub fn line_total(&self) -> Decimal { self.line_total }
    pub fn variant(&self) -> Option<&VariantSelection> { self.variant.as_ref() }
    pub fn is_custom(&self) -> bool { self.product_ref.is_custom() }

    pub fn set_quantity(&mut self, quantity: Quantity) { self.quantity = quantity; self.recompute(); }
    pub fn set_unit_price(&mut self, unit_price: Decimal) { self.unit_price = unit_price; self.recompute(); }

    fn recompute(&mut self) { self.line_total = self.unit_price * Decimal::from(self.quantity.value()); }
}

/// Where an order ships (or bills) to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AddressRef {
    /// An address already in the customer's address book.
    Saved { id: String },
    Inline(InlineAddress),
}

impl AddressRef {
    pub fn saved(id: impl Into<String>) -> Self { Self::Saved { id: id.into() } }
    pub fn is_saved(&self) -> bool { matches!(self, Self::Saved { .. }) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InlineAddress {
    #[serde(default)]
    #[validate(custom = "non_blank")]
    pub name: String,
    #[serde(default)]
    #[validate(custom = "non_blank")]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email)]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(custom = "non_blank")]
    pub address: String,
    #[serde(default)]
    #[validate(custom = "non_blank")]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default)]
    #[validate(custom = "non_blank")]
    pub country: String,
}

impl InlineAddress {
    /// Names of fields that fail validation, sorted.
    pub fn invalid_fields(&self) -> Vec<&'static str> { self.fields_where(|_| true) }

    /// Required fields left blank, sorted.
    pub fn missing_fields(&self) -> Vec<&'static str> { self.fields_where(|code| code == REQUIRED) }

    /// Fields that are filled in but malformed (e.g. email), sorted.
    pub fn malformed_fields(&self) -> Vec<&'static str> { self.fields_where(|code| code != REQUIRED) }

    fn fields_where(&self, keep: impl Fn(&str) -> bool) -> Vec<&'static str> {
        let Err(errors) = self.validate() else { return Vec::new() };
        let mut fields: Vec<_> = errors
            .field_errors()
            .into_iter()
            .filter(|(_, errs)| errs.iter().any(|e| keep(&*e.code)))
            .map(|(field, _)| field)
            .collect();
        fields.sort_unstable();
        fields
    }
}

const REQUIRED: &str = "required";

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() { return Err(ValidationError::new(REQUIRED)); }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
    Card,
    BankTransfer,
    MobileBanking,
}

/// Which screen produced the draft; decides shipping policy and invoicing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "camelCase")]
pub enum OrderFlow {
    Checkout { zone: ShippingZone },
    Admin,
}

impl OrderFlow {
    pub fn pricing(&self) -> PricingPolicy {
        match self { Self::Checkout { zone } => PricingPolicy::checkout(*zone), Self::Admin => PricingPolicy::admin() }
    }
    pub fn is_admin(&self) -> bool { matches!(self, Self::Admin) }
}

#[derive(Clone, Debug)]
pub struct DraftOrder {
    flow: OrderFlow,
    items: Vec<LineItem>,
    custom_items: Vec<LineItem>,
    shipping_address: AddressRef,
    billing_address: Option<AddressRef>,
    payment_method: PaymentMethod,
    notes: Option<String>,
    contact_email: Option<String>,
    discount: Decimal,
    create_invoice: bool,
    currency: String,
    idempotency_key: Uuid,
    cached_totals: Option<OrderTotals>,
}

impl DraftOrder {
    fn create(flow: OrderFlow, shipping_address: AddressRef, payment_method: PaymentMethod, currency: &str) -> Self {
        Self {
            flow, items: vec![], custom_items: vec![], shipping_address, billing_address: None, payment_method,
            notes: None, contact_email: None, discount: Decimal::ZERO, create_invoice: false,
            currency: currency.to_string(), idempotency_key: Uuid::new_v4(), cached_totals: None,
        }
    }

    /// Customer checkout over items resolved from the cart.
    pub fn checkout(items: Vec<LineItem>, zone: ShippingZone, shipping_address: AddressRef, payment_method: PaymentMethod, currency: &str) -> Self {
        let mut draft = Self::create(OrderFlow::Checkout { zone }, shipping_address, payment_method, currency);
        draft.items = items;
        draft
    }

    /// Manual order entered by staff; starts empty.
    pub fn admin(shipping_address: AddressRef, payment_method: PaymentMethod, currency: &str) -> Self {
        let mut draft = Self::create(OrderFlow::Admin, shipping_address, payment_method, currency);
        draft.recalculate();
        draft
    }

    pub fn flow(&self) -> OrderFlow { self.flow }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn custom_items(&self) -> &[LineItem] { &self.custom_items }
    pub fn all_items(&self) -> impl Iterator<Item = &LineItem> { self.items.iter().chain(self.custom_items.iter()) }
    pub fn is_empty(&self) -> bool { self.items.is_empty() && self.custom_items.is_empty() }
    pub fn shipping_address(&self) -> &AddressRef { &self.shipping_address }
    pub fn billing_address(&self) -> Option<&AddressRef> { self.billing_address.as_ref() }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn contact_email(&self) -> Option<&str> { self.contact_email.as_deref() }
    pub fn discount(&self) -> Decimal { self.discount }
    pub fn create_invoice(&self) -> bool { self.create_invoice }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn idempotency_key(&self) -> Uuid { self.idempotency_key }
    /// Totals cached by the last admin-side mutation. Always `None` for checkout drafts.
    pub fn cached_totals(&self) -> Option<&OrderTotals> { self.cached_totals.as_ref() }

    /// Totals derived fresh from the current lines.
    pub fn totals(&self) -> OrderTotals { self.flow.pricing().quote(self.all_items(), self.discount) }

    pub fn with_billing_address(mut self, address: AddressRef) -> Self { self.billing_address = Some(address); self }
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self { self.notes = Some(notes.into()); self }
    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self { self.contact_email = Some(email.into()); self }

    /// Reuse a key minted earlier so a resubmitted draft is recognised as the same order.
    pub fn with_idempotency_key(mut self, key: Uuid) -> Self { self.idempotency_key = key; self }

    pub fn add_item(&mut self, item: LineItem) {
        if item.is_custom() { self.custom_items.push(item) } else { self.items.push(item) }
        self.recalculate();
    }

    pub fn add_custom_item(&mut self, name: impl Into<String>, unit_price: Decimal, quantity: Quantity) {
        self.add_item(LineItem::custom(name, unit_price, quantity));
    }

    pub fn remove_item(&mut self, index: usize) -> Option<LineItem> {
        let removed = (index < self.items.len()).then(|| self.items.remove(index));
        self.recalculate();
        removed
    }

    pub fn remove_custom_item(&mut self, index: usize) -> Option<LineItem> {
        let removed = (index < self.custom_items.len()).then(|| self.custom_items.remove(index));
        self.recalculate();
        removed
    }

    pub fn set_quantity(&mut self, index: usize, quantity: Quantity) -> Result<(), OrderError> {
        self.items.get_mut(index).ok_or(OrderError::NoSuchLine(index))?.set_quantity(quantity);
        self.recalculate();
        Ok(())
    }

    pub fn set_discount(&mut self, discount: Decimal) { self.discount = discount; self.recalculate(); }

    pub fn set_zone(&mut self, zone: ShippingZone) -> Result<(), OrderError> {
        match &mut self.flow {
            OrderFlow::Checkout { zone: current } => { *current = zone; Ok(()) }
            OrderFlow::Admin => Err(OrderError::WrongFlow),
        }
    }

    pub fn request_invoice(&mut self, create_invoice: bool) -> Result<(), OrderError> {
        if !self.flow.is_admin() { return Err(OrderError::WrongFlow); }
        self.create_invoice = create_invoice;
        Ok(())
    }

    pub(crate) fn set_shipping_address(&mut self, address: AddressRef) { self.shipping_address = address; }
    pub(crate) fn set_billing_address(&mut self, address: AddressRef) { self.billing_address = Some(address); }

    /// Admin drafts keep their totals cached on every change; checkout drafts never do.
    pub(crate) fn recalculate(&mut self) {
        if self.flow.is_admin() { self.cached_totals = Some(self.totals()); }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NoSuchLine(usize), WrongFlow }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSuchLine(i) => write!(f, "No line at position {i}"),
            Self::WrongFlow => write!(f, "Not available for this kind of order"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }

    fn address() -> InlineAddress {
        InlineAddress {
            name: "Ada".into(), phone: "0123".into(), email: None, address: "1 Loop Rd".into(),
            city: "Dhaka".into(), state: None, zip_code: None, country: "BD".into(),
        }
    }

    #[test]
    fn test_line_total_recomputed() {
        let mut line = LineItem::new(ProductRef::Catalog("P1".into()), "Widget", dec!(2.5), qty(2));
        assert_eq!(line.line_total(), dec!(5));
        line.set_quantity(qty(3));
        assert_eq!(line.line_total(), dec!(7.5));
        line.set_unit_price(dec!(1));
        assert_eq!(line.line_total(), dec!(3));
    }

    #[test]
    fn test_inline_address_validation() {
        assert!(address().invalid_fields().is_empty());
        let mut partial = address();
        partial.city = "  ".into();
        partial.phone = String::new();
        assert_eq!(partial.invalid_fields(), vec!["city", "phone"]);
        partial = address();
        partial.email = Some("not-an-email".into());
        assert_eq!(partial.invalid_fields(), vec!["email"]);
        assert!(partial.missing_fields().is_empty());
        assert_eq!(partial.malformed_fields(), vec!["email"]);
    }

    #[test]
    fn test_address_ref_wire_format() {
        let saved: AddressRef = serde_json::from_str(r#"{"kind":"saved","id":"a1"}"#).unwrap();
        assert_eq!(saved, AddressRef::saved("a1"));
        let inline: AddressRef = serde_json::from_str(r#"{"kind":"inline","name":"Ada","city":"Dhaka"}"#).unwrap();
        let AddressRef::Inline(inline) = inline else { panic!("expected inline") };
        assert_eq!(inline.invalid_fields(), vec!["address", "country", "phone"]);
    }

    #[test]
    fn test_admin_draft_caches_totals() {
        let mut draft = DraftOrder::admin(AddressRef::saved("a1"), PaymentMethod::CashOnDelivery, "USD");
        assert_eq!(draft.cached_totals(), Some(&OrderTotals::default()));
        draft.add_item(LineItem::new(ProductRef::Catalog("P1".into()), "Widget", dec!(25), qty(1)));
        draft.add_custom_item("Gift wrap", dec!(5), qty(1));
        assert_eq!(draft.cached_totals().unwrap().subtotal, dec!(30));
        draft.set_quantity(0, qty(2)).unwrap();
        assert_eq!(draft.cached_totals(), Some(&draft.totals()));
        assert_eq!(draft.cached_totals().unwrap().subtotal, dec!(55));
        assert_eq!(draft.cached_totals().unwrap().shipping, dec!(0));
        assert!(draft.remove_custom_item(0).is_some());
        assert_eq!(draft.cached_totals().unwrap().shipping, dec!(10));
    }

    #[test]
    fn test_checkout_draft_never_caches() {
        let items = vec![LineItem::new(ProductRef::Catalog("P1".into()), "Widget", dec!(10), qty(1))];
        let mut draft = DraftOrder::checkout(items, ShippingZone::InsideRegion, AddressRef::Inline(address()), PaymentMethod::Card, "USD");
        draft.set_discount(dec!(1));
        assert!(draft.cached_totals().is_none());
        assert_eq!(draft.request_invoice(true), Err(OrderError::WrongFlow));
        draft.set_zone(ShippingZone::OutsideRegion).unwrap();
        assert_eq!(draft.totals().shipping, dec!(120));
    }
}
