//! Mock store backend for testing.
//!
//! Records every call and can be told to fail individual endpoints.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{
    BackendError, FieldError, Invoice, InvoiceRequest, OrderCreated, OrderPayload, SavedAddress, StoreBackend,
};
use crate::domain::aggregates::{Cart, InlineAddress};

#[derive(Clone, Debug)]
struct Failure {
    status: u16,
    message: String,
    field_errors: Vec<FieldError>,
}

impl Failure {
    fn to_error(&self) -> BackendError {
        BackendError::Api { status: self.status, message: self.message.clone(), field_errors: self.field_errors.clone() }
    }
}

#[derive(Debug, Default)]
struct MockState {
    cart: Cart,
    addresses: Vec<SavedAddress>,
    orders: Vec<OrderPayload>,
    invoices: Vec<InvoiceRequest>,
    get_cart_calls: usize,
    clear_cart_calls: usize,
    add_address_calls: usize,
    fail_get_cart: Option<Failure>,
    fail_clear_cart: Option<Failure>,
    fail_add_address: Option<Failure>,
    fail_create_order: Option<Failure>,
    fail_create_invoice: Option<Failure>,
}

/// Mock store backend.
///
/// Clones share state, so a test can keep a handle while the code under test
/// owns another.
#[derive(Clone, Debug, Default)]
pub struct MockStoreBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockStoreBackend {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with_cart(self, cart: Cart) -> Self { self.state().cart = cart; self }

    #[must_use]
    pub fn with_addresses(self, addresses: Vec<SavedAddress>) -> Self { self.state().addresses = addresses; self }

    #[must_use]
    pub fn fail_get_cart(self, message: &str) -> Self { self.state().fail_get_cart = Some(failure(503, message)); self }

    #[must_use]
    pub fn fail_clear_cart(self, message: &str) -> Self { self.state().fail_clear_cart = Some(failure(503, message)); self }

    #[must_use]
    pub fn fail_add_address(self, message: &str) -> Self { self.state().fail_add_address = Some(failure(500, message)); self }

    #[must_use]
    pub fn fail_create_order(self, message: &str, field_errors: Vec<FieldError>) -> Self {
        self.state().fail_create_order = Some(Failure { status: 422, message: message.to_string(), field_errors });
        self
    }

    #[must_use]
    pub fn fail_create_invoice(self, message: &str) -> Self { self.state().fail_create_invoice = Some(failure(500, message)); self }

    /// Let order creation succeed again, e.g. before a retry.
    pub fn recover_create_order(&self) { self.state().fail_create_order = None; }

    pub fn cart(&self) -> Cart { self.state().cart.clone() }
    pub fn addresses(&self) -> Vec<SavedAddress> { self.state().addresses.clone() }
    pub fn orders(&self) -> Vec<OrderPayload> { self.state().orders.clone() }
    pub fn invoices(&self) -> Vec<InvoiceRequest> { self.state().invoices.clone() }
    pub fn get_cart_calls(&self) -> usize { self.state().get_cart_calls }
    pub fn clear_cart_calls(&self) -> usize { self.state().clear_cart_calls }
    pub fn add_address_calls(&self) -> usize { self.state().add_address_calls }
    /// Attempts, including failed ones.
    pub fn create_order_calls(&self) -> usize { self.state().orders.len() }
    pub fn create_invoice_calls(&self) -> usize { self.state().invoices.len() }

    // A panic while holding the lock only happens inside a failing test.
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn failure(status: u16, message: &str) -> Failure {
    Failure { status, message: message.to_string(), field_errors: Vec::new() }
}

impl StoreBackend for MockStoreBackend {
    async fn get_cart(&self) -> Result<Cart, BackendError> {
        let mut state = self.state();
        state.get_cart_calls += 1;
        match &state.fail_get_cart {
            Some(f) => Err(f.to_error()),
            None => Ok(state.cart.clone()),
        }
    }

    async fn put_cart(&self, cart: &Cart) -> Result<(), BackendError> {
        self.state().cart = cart.clone();
        Ok(())
    }

    async fn clear_cart(&self) -> Result<(), BackendError> {
        let mut state = self.state();
        state.clear_cart_calls += 1;
        if let Some(f) = &state.fail_clear_cart {
            return Err(f.to_error());
        }
        state.cart = Cart::new();
        Ok(())
    }

    async fn get_addresses(&self) -> Result<Vec<SavedAddress>, BackendError> {
        Ok(self.state().addresses.clone())
    }

    async fn add_address(&self, address: &InlineAddress) -> Result<SavedAddress, BackendError> {
        let mut state = self.state();
        state.add_address_calls += 1;
        if let Some(f) = &state.fail_add_address {
            return Err(f.to_error());
        }
        let saved = SavedAddress { id: format!("addr-{}", state.addresses.len() + 1), address: address.clone(), is_default: false };
        state.addresses.push(saved.clone());
        Ok(saved)
    }

    async fn create_order(&self, order: &OrderPayload) -> Result<OrderCreated, BackendError> {
        let mut state = self.state();
        state.orders.push(order.clone());
        if let Some(f) = &state.fail_create_order {
            return Err(f.to_error());
        }
        let n = state.orders.len();
        Ok(OrderCreated { order_id: format!("order-{n}"), order_number: format!("ORD-{:04}", 1000 + n) })
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, BackendError> {
        let mut state = self.state();
        state.invoices.push(request.clone());
        if let Some(f) = &state.fail_create_invoice {
            return Err(f.to_error());
        }
        Ok(Invoice { invoice_id: format!("inv-{}", request.order_id), invoice_number: None })
    }
}
