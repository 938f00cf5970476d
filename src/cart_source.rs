//! Where checkout line items come from.
//!
//! Authenticated customers have a cart on the server. Guests keep theirs as a
//! JSON blob in client storage under [`GUEST_CART_KEY`]. Both are exposed as a
//! [`CartSource`] and normalize to the same [`LineItem`]s, so pricing and
//! submission never need to know which one they got.
//!
//! The guest blob is read-modify-write with last-write-wins semantics; two
//! tabs editing the same cart can lose an update.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::backend::StoreBackend;
use crate::domain::aggregates::{Cart, CartEntry, LineItem};
use crate::domain::events::{DomainEvent, EventBus, LocalEventBus};
use crate::{CheckoutError, Identity, Result};

pub const GUEST_CART_KEY: &str = "ekomart-cart";

#[allow(async_fn_in_trait)]
pub trait CartSource {
    async fn get(&self) -> Result<Cart>;
    async fn set(&self, cart: &Cart) -> Result<()>;
    async fn clear(&self) -> Result<()>;

    /// Adds an entry, merging with a matching line.
    async fn add(&self, entry: CartEntry) -> Result<Cart> {
        let mut cart = self.get().await?;
        cart.add_item(entry)?;
        self.set(&cart).await?;
        Ok(cart)
    }
}

/// Outcome of loading the cart for checkout.
#[derive(Clone, Debug, PartialEq)]
pub enum CartResolution {
    Ready(Vec<LineItem>),
    /// Nothing to check out; callers send the shopper back to the shop.
    Empty,
}

/// Loads line items for checkout from `source`.
///
/// # Errors
///
/// Returns [`CheckoutError::CartUnavailable`] when the server cart cannot be fetched.
pub async fn resolve_items<C: CartSource>(source: &C) -> Result<CartResolution> {
    let cart = source.get().await?;
    if cart.is_empty() {
        return Ok(CartResolution::Empty);
    }
    Ok(CartResolution::Ready(cart.line_items()))
}

/// Cart persisted by the store backend for the signed-in customer.
#[derive(Clone, Debug)]
pub struct ServerCartSource<B> {
    backend: B,
}

impl<B: StoreBackend> ServerCartSource<B> {
    pub fn new(backend: B) -> Self { Self { backend } }
}

impl<B: StoreBackend> CartSource for ServerCartSource<B> {
    async fn get(&self) -> Result<Cart> {
        self.backend.get_cart().await.map_err(|e| CheckoutError::CartUnavailable(e.to_string()))
    }

    async fn set(&self, cart: &Cart) -> Result<()> {
        self.backend.put_cart(cart).await.map_err(|e| CheckoutError::CartUnavailable(e.to_string()))
    }

    async fn clear(&self) -> Result<()> {
        self.backend.clear_cart().await.map_err(|e| CheckoutError::CartUnavailable(e.to_string()))
    }
}

/// Client-side persistent key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
}

/// Process-local [`KeyValueStore`]. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    /// Storage pre-loaded with a guest cart, as sent by a browser.
    pub fn with_guest_cart(cart: &Cart) -> Result<Self> {
        let storage = Self::new();
        storage.set(GUEST_CART_KEY, encode(cart)?)?;
        Ok(storage)
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| CheckoutError::Storage("storage lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| CheckoutError::Storage("storage lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Guest cart kept in client storage.
///
/// Every write broadcasts [`DomainEvent::CartUpdated`] so cart badges refresh.
#[derive(Clone)]
pub struct LocalCartSource<S> {
    storage: S,
    events: Arc<dyn EventBus>,
}

impl<S: KeyValueStore> LocalCartSource<S> {
    /// Broadcasts on a private bus nobody listens to; use [`Self::with_events`] to be heard.
    pub fn new(storage: S) -> Self { Self::with_events(storage, Arc::new(LocalEventBus::default())) }

    pub fn with_events(storage: S, events: Arc<dyn EventBus>) -> Self { Self { storage, events } }

    pub fn storage(&self) -> &S { &self.storage }
}

impl<S: fmt::Debug> fmt::Debug for LocalCartSource<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCartSource").field("storage", &self.storage).finish_non_exhaustive()
    }
}

impl<S: KeyValueStore> CartSource for LocalCartSource<S> {
    async fn get(&self) -> Result<Cart> {
        let Some(raw) = self.storage.get(GUEST_CART_KEY)? else { return Ok(Cart::new()) };
        match serde_json::from_str(&raw) {
            Ok(cart) => Ok(cart),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable guest cart");
                Ok(Cart::new())
            }
        }
    }

    async fn set(&self, cart: &Cart) -> Result<()> {
        self.storage.set(GUEST_CART_KEY, encode(cart)?)?;
        self.events.publish(DomainEvent::CartUpdated { item_count: cart.item_count() });
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.set(&Cart::new()).await?;
        self.events.publish(DomainEvent::CartCleared);
        Ok(())
    }
}

fn encode(cart: &Cart) -> Result<String> {
    serde_json::to_string(cart).map_err(|e| CheckoutError::Storage(e.to_string()))
}

/// The cart that belongs to an identity.
#[derive(Clone, Debug)]
pub enum SelectedCart<B, S> {
    Server(ServerCartSource<B>),
    Local(LocalCartSource<S>),
}

impl<B: StoreBackend, S: KeyValueStore> SelectedCart<B, S> {
    /// Server cart for signed-in customers, client storage for guests.
    ///
    /// Guest cart writes are published on `events`.
    pub fn for_identity(identity: &Identity, backend: B, storage: S, events: Arc<dyn EventBus>) -> Self {
        match identity {
            Identity::Authenticated { .. } => Self::Server(ServerCartSource::new(backend)),
            Identity::Guest => Self::Local(LocalCartSource::with_events(storage, events)),
        }
    }
}

impl<B: StoreBackend, S: KeyValueStore> CartSource for SelectedCart<B, S> {
    async fn get(&self) -> Result<Cart> {
        match self { Self::Server(s) => s.get().await, Self::Local(l) => l.get().await }
    }

    async fn set(&self, cart: &Cart) -> Result<()> {
        match self { Self::Server(s) => s.set(cart).await, Self::Local(l) => l.set(cart).await }
    }

    async fn clear(&self) -> Result<()> {
        match self { Self::Server(s) => s.clear().await, Self::Local(l) => l.clear().await }
    }
}

/// No cart at all: staff-entered orders are not built from one.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedCart;

impl CartSource for DetachedCart {
    async fn get(&self) -> Result<Cart> { Ok(Cart::new()) }
    async fn set(&self, _cart: &Cart) -> Result<()> { Ok(()) }
    async fn clear(&self) -> Result<()> { Ok(()) }
}
