//! Store backend port.
//!
//! Everything the checkout needs from the store REST API, behind one trait so
//! the submission logic can run against HTTP, or a recording mock in tests.

mod http;

pub use http::HttpStoreBackend;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartEntry, InlineAddress, LineItem, PaymentMethod, VariantSelection};
use crate::domain::value_objects::{ProductRef, Quantity};
use crate::pricing::OrderTotals;

/// Errors returned by a [`StoreBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status or `success: false`.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String, field_errors: Vec<FieldError> },

    /// Response body did not match the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl BackendError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api { status, message: message.into(), field_errors: Vec::new() }
    }

    /// Message written by the backend itself, suitable for showing verbatim.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Api { message, .. } if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Api { field_errors, .. } => field_errors,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub field: String,
    pub message: String,
}

/// Response envelope used by every store endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<FieldError>,
}

fn default_success() -> bool { true }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAddress {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub address: InlineAddress,
    #[serde(default)]
    pub is_default: bool,
}

/// A shipping or billing address as sent in an order: a saved id or the full address.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AddressPayload {
    Reference(String),
    Inline(InlineAddress),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemPayload {
    pub product: ProductRef,
    pub name: String,
    pub price: Decimal,
    pub quantity: Quantity,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantSelection>,
}

impl From<&LineItem> for OrderItemPayload {
    fn from(item: &LineItem) -> Self {
        Self {
            product: item.product_ref().clone(),
            name: item.name().to_string(),
            price: item.unit_price(),
            quantity: item.quantity(),
            total: item.line_total(),
            variant: item.variant().cloned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub shipping_address: AddressPayload,
    pub billing_address: AddressPayload,
    pub items: Vec<OrderItemPayload>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub currency: String,
    pub idempotency_key: Uuid,
    /// Raw cart entries; only sent for guests, who have no server cart.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_items: Option<Vec<CartEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    #[serde(alias = "_id", alias = "id")]
    pub order_id: String,
    pub order_number: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRequest {
    pub order_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    #[serde(alias = "_id", alias = "id")]
    pub invoice_id: String,
    #[serde(default)]
    pub invoice_number: Option<String>,
}

/// Store REST API as seen by the checkout.
///
/// Implementations are scoped to one caller: authenticated calls act on that
/// customer's cart and address book.
#[allow(async_fn_in_trait)]
pub trait StoreBackend {
    async fn get_cart(&self) -> Result<Cart, BackendError>;

    async fn put_cart(&self, cart: &Cart) -> Result<(), BackendError>;

    async fn clear_cart(&self) -> Result<(), BackendError>;

    async fn get_addresses(&self) -> Result<Vec<SavedAddress>, BackendError>;

    /// Persists an address and returns it with its new id.
    async fn add_address(&self, address: &InlineAddress) -> Result<SavedAddress, BackendError>;

    async fn create_order(&self, order: &OrderPayload) -> Result<OrderCreated, BackendError>;

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, BackendError>;
}
