//! End-to-end checkout and admin order flows against the recording backend.

use ekomart_checkout::cart_source::{
    resolve_items, CartResolution, DetachedCart, KeyValueStore, LocalCartSource, MemoryStorage, SelectedCart, ServerCartSource,
    GUEST_CART_KEY,
};
use ekomart_checkout::domain::aggregates::{AddressRef, Cart, CartEntry, DraftOrder, InlineAddress, LineItem, PaymentMethod, ProductSnapshot};
use ekomart_checkout::domain::events::{DomainEvent, EventBus, LocalEventBus};
use ekomart_checkout::domain::value_objects::{ProductRef, Quantity};
use ekomart_checkout::mocks::MockStoreBackend;
use ekomart_checkout::{CartSource, CheckoutError, Identity, InvoiceOutcome, NoticeLevel, OrderSubmitter, ShippingZone};
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::sync::Arc;

fn signed_in() -> Identity {
    Identity::Authenticated { access_token: SecretString::from("customer-token".to_string()) }
}

fn product(id: &str, price: rust_decimal::Decimal) -> ProductSnapshot {
    ProductSnapshot { id: id.into(), name: "Mug".into(), price, stock: None, sku: None, image: None }
}

fn home() -> InlineAddress {
    InlineAddress {
        name: "Ada Lovelace".into(), phone: "+880 1700 000000".into(), email: Some("ada@example.com".into()),
        address: "12 Lake Rd".into(), city: "Dhaka".into(), state: None, zip_code: Some("1212".into()), country: "BD".into(),
    }
}

fn qty(n: u32) -> Quantity { Quantity::new(n).unwrap() }

#[tokio::test]
async fn test_server_and_guest_carts_resolve_identically() {
    let mut locked = CartEntry::new(product("p1", dec!(10)), None, qty(2));
    locked.price = Some(dec!(10));
    let backend = MockStoreBackend::new().with_cart(Cart { items: vec![locked] });
    let storage = MemoryStorage::with_guest_cart(&Cart { items: vec![CartEntry::new(product("p1", dec!(10)), None, qty(2))] }).unwrap();

    let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::default());
    let server = resolve_items(&SelectedCart::for_identity(&signed_in(), backend.clone(), storage.clone(), Arc::clone(&bus))).await.unwrap();
    let guest = resolve_items(&SelectedCart::for_identity(&Identity::Guest, backend, storage, bus)).await.unwrap();

    assert_eq!(server, guest);
    let CartResolution::Ready(items) = server else { panic!("expected items") };
    assert_eq!(items[0].line_total(), dec!(20));
}

#[tokio::test]
async fn test_address_save_failure_stops_before_order() {
    let backend = MockStoreBackend::new().fail_add_address("Address book is full");
    let cart = ServerCartSource::new(backend.clone());
    let items = vec![LineItem::new(ProductRef::Catalog("p1".into()), "Mug", dec!(10), qty(1))];
    let mut draft = DraftOrder::checkout(items, ShippingZone::InsideRegion, AddressRef::Inline(home()), PaymentMethod::CashOnDelivery, "USD");

    let err = OrderSubmitter::new(&backend, &cart).submit(&mut draft, &signed_in()).await.unwrap_err();

    assert!(matches!(err, CheckoutError::AddressPersist(ref m) if m == "Address book is full"));
    assert_eq!(backend.add_address_calls(), 1);
    assert_eq!(backend.create_order_calls(), 0);
    assert!(matches!(draft.shipping_address(), AddressRef::Inline(_)));
}

#[tokio::test]
async fn test_invoice_failure_keeps_order_and_clears_cart() {
    let backend = MockStoreBackend::new()
        .with_cart(Cart { items: vec![CartEntry::new(product("p1", dec!(10)), None, qty(1))] })
        .fail_create_invoice("PDF service unavailable");
    let bus = LocalEventBus::default();
    let mut events = bus.subscribe();

    let mut draft = DraftOrder::admin(AddressRef::saved("a1"), PaymentMethod::BankTransfer, "USD");
    draft.add_item(LineItem::new(ProductRef::Catalog("p1".into()), "Widget", dec!(25), qty(2)));
    draft.request_invoice(true).unwrap();

    // Admin order placed on behalf of a signed-in customer with a server cart.
    let cart = ServerCartSource::new(backend.clone());
    let confirmation = OrderSubmitter::new(&backend, &cart).with_events(&bus).submit(&mut draft, &signed_in()).await.unwrap();

    assert_eq!(confirmation.order_number, "ORD-1001");
    assert_eq!(confirmation.invoice, InvoiceOutcome::Failed { reason: "PDF service unavailable".into() });
    assert_eq!(confirmation.notices[0].level, NoticeLevel::Success);
    assert_eq!(confirmation.notices[1].level, NoticeLevel::Warning);
    assert_eq!(backend.create_invoice_calls(), 1);
    assert_eq!(backend.clear_cart_calls(), 1);
    assert!(backend.cart().is_empty());

    assert!(matches!(events.recv().await.unwrap(), DomainEvent::OrderCreated { .. }));
    assert!(matches!(events.recv().await.unwrap(), DomainEvent::InvoiceFailed { .. }));
}

#[tokio::test]
async fn test_admin_order_with_invoice() {
    let backend = MockStoreBackend::new();
    let mut draft = DraftOrder::admin(AddressRef::saved("a1"), PaymentMethod::Card, "USD");
    draft.add_item(LineItem::new(ProductRef::Catalog("p1".into()), "Widget", dec!(25), qty(2)));
    draft.request_invoice(true).unwrap();

    let confirmation = OrderSubmitter::new(&backend, &DetachedCart).submit(&mut draft, &signed_in()).await.unwrap();

    assert_eq!(confirmation.invoice, InvoiceOutcome::Created { invoice_id: "inv-order-1".into() });
    assert_eq!(backend.invoices()[0].order_id, "order-1");
}

#[tokio::test]
async fn test_admin_totals_at_threshold() {
    let backend = MockStoreBackend::new();
    let mut draft = DraftOrder::admin(AddressRef::saved("a1"), PaymentMethod::CashOnDelivery, "USD");
    draft.add_item(LineItem::new(ProductRef::Catalog("w1".into()), "Widget", dec!(25.00), qty(2)));

    let cached = *draft.cached_totals().unwrap();
    assert_eq!(cached.subtotal, dec!(50.00));
    assert_eq!(cached.tax, dec!(4.00));
    assert_eq!(cached.shipping, dec!(10));
    assert_eq!(cached.total, dec!(64.00));

    let confirmation = OrderSubmitter::new(&backend, &DetachedCart).submit(&mut draft, &signed_in()).await.unwrap();
    assert_eq!(confirmation.totals, cached);
    assert_eq!(backend.orders()[0].totals.total, dec!(64.00));
    assert_eq!(confirmation.invoice, InvoiceOutcome::NotRequested);
}

#[tokio::test]
async fn test_checkout_outside_region_flat_fee() {
    let backend = MockStoreBackend::new()
        .with_cart(Cart { items: vec![CartEntry::new(product("tv", dec!(500)), None, qty(2))] });
    let cart = ServerCartSource::new(backend.clone());
    let CartResolution::Ready(items) = resolve_items(&cart).await.unwrap() else { panic!("expected items") };
    let mut draft = DraftOrder::checkout(items, ShippingZone::OutsideRegion, AddressRef::saved("a1"), PaymentMethod::Card, "USD");

    let confirmation = OrderSubmitter::new(&backend, &cart).submit(&mut draft, &signed_in()).await.unwrap();

    assert_eq!(confirmation.totals.subtotal, dec!(1000));
    assert_eq!(confirmation.totals.tax, dec!(80));
    assert_eq!(confirmation.totals.shipping, dec!(120));
    assert_eq!(confirmation.totals.total, dec!(1200));
    assert!(draft.cached_totals().is_none());
}

#[tokio::test]
async fn test_guest_checkout_keeps_address_inline() {
    let backend = MockStoreBackend::new();
    let storage = MemoryStorage::new();
    storage.set(GUEST_CART_KEY, r#"{"items":[{"product":{"_id":"p1","name":"Mug","price":15},"quantity":3}]}"#.to_string()).unwrap();
    let bus = LocalEventBus::default();
    let mut badge = bus.subscribe();
    let cart = LocalCartSource::with_events(storage, Arc::new(bus));

    let CartResolution::Ready(items) = resolve_items(&cart).await.unwrap() else { panic!("expected items") };
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].line_total(), dec!(45));
    assert!(backend.addresses().is_empty());

    let mut draft = DraftOrder::checkout(items, ShippingZone::InsideRegion, AddressRef::Inline(home()), PaymentMethod::CashOnDelivery, "USD");
    let confirmation = OrderSubmitter::new(&backend, &cart).submit(&mut draft, &Identity::Guest).await.unwrap();

    assert_eq!(backend.add_address_calls(), 0);
    let order = &backend.orders()[0];
    assert!(order.guest_items.is_some());
    assert_eq!(order.email.as_deref(), Some("ada@example.com"));
    assert_eq!(confirmation.totals.subtotal, dec!(45));
    assert!(cart.get().await.unwrap().is_empty());
    assert_eq!(badge.recv().await.unwrap(), DomainEvent::CartUpdated { item_count: 0 });
    assert_eq!(badge.recv().await.unwrap(), DomainEvent::CartCleared);
}
