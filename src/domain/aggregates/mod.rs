//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{ProductSnapshot, VariantSelection};
pub use order::{AddressRef, DraftOrder, InlineAddress, LineItem, OrderError, OrderFlow, PaymentMethod};
pub use cart::{Cart, CartEntry, CartError};
