//! Ekomart checkout
//!
//! Order pricing and submission for the Ekomart storefront and its admin
//! back-office.
//!
//! ## Features
//! - Order totals for customer checkout and staff-entered orders
//! - Server carts for signed-in customers, client-stored carts for guests
//! - Order submission with saved or inline addresses
//! - Best-effort invoice creation after an order is placed
//! - Idempotency keys on order creation

pub mod backend;
pub mod cart_source;
pub mod config;
pub mod domain;
pub mod mocks;
pub mod pricing;
pub mod routes;
pub mod submission;

use secrecy::SecretString;
use serde::Serialize;
use thiserror::Error;

pub use backend::{BackendError, FieldError, HttpStoreBackend, StoreBackend};
pub use cart_source::{CartResolution, CartSource, LocalCartSource, SelectedCart, ServerCartSource};
pub use domain::aggregates::{AddressRef, Cart, DraftOrder, InlineAddress, LineItem, PaymentMethod};
pub use pricing::{compute_totals, OrderTotals, PricingPolicy, ShippingZone};
pub use submission::{InvoiceOutcome, OrderConfirmation, OrderSubmitter};

use domain::aggregates::CartError;

// =============================================================================
// Core Types
// =============================================================================

/// Who is checking out.
#[derive(Clone, Debug)]
pub enum Identity {
    /// Signed in; the token authorises calls to the store API.
    Authenticated { access_token: SecretString },
    Guest,
}

impl Identity {
    pub fn is_guest(&self) -> bool { matches!(self, Self::Guest) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A user-facing message, rendered as a toast by the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self { Self { level: NoticeLevel::Success, message: message.into() } }
    pub fn warning(message: impl Into<String>) -> Self { Self { level: NoticeLevel::Warning, message: message.into() } }
    pub fn error(message: impl Into<String>) -> Self { Self { level: NoticeLevel::Error, message: message.into() } }
}

// =============================================================================
// Error Types
// =============================================================================

pub const GENERIC_ORDER_FAILURE: &str = "Failed to place order. Please try again.";

#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Caught locally; nothing was sent.
    #[error("{0}")]
    Validation(String),

    #[error("Cart unavailable: {0}")]
    CartUnavailable(String),

    #[error("Could not save shipping address: {0}")]
    AddressPersist(String),

    #[error("{message}")]
    OrderCreate { message: String, field_errors: Vec<FieldError> },

    #[error("Invoice could not be created: {0}")]
    InvoiceCreate(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Staff-only operation attempted without a staff token.
    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Cart(#[from] CartError),
}

impl CheckoutError {
    /// Toasts for this error; field-level order errors get one each.
    pub fn notices(&self) -> Vec<Notice> {
        match self {
            Self::OrderCreate { message, field_errors } if !field_errors.is_empty() => {
                std::iter::once(Notice::error(message.clone()))
                    .chain(field_errors.iter().map(|e| Notice::error(e.message.clone())))
                    .collect()
            }
            Self::InvoiceCreate(_) => vec![Notice::warning(self.to_string())],
            _ => vec![Notice::error(self.to_string())],
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
