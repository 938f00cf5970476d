//! Order submission.
//!
//! [`OrderSubmitter`] turns a [`DraftOrder`] into a placed order in three
//! sequential steps: resolve addresses, create the order, then follow up
//! (clear the cart, request an invoice). Only order creation is
//! authoritative; nothing after it can undo a placed order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::backend::{AddressPayload, BackendError, InvoiceRequest, OrderItemPayload, OrderPayload, StoreBackend};
use crate::cart_source::CartSource;
use crate::domain::aggregates::{AddressRef, DraftOrder, InlineAddress};
use crate::domain::events::{DomainEvent, EventBus};
use crate::domain::value_objects::Money;
use crate::pricing::OrderTotals;
use crate::{CheckoutError, Identity, Notice, Result, GENERIC_ORDER_FAILURE};

/// What happened to the follow-up invoice request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum InvoiceOutcome {
    NotRequested,
    #[serde(rename_all = "camelCase")]
    Created { invoice_id: String },
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub order_id: String,
    pub order_number: String,
    pub totals: OrderTotals,
    pub invoice: InvoiceOutcome,
    /// Key the order was created under; resend it with a retried request.
    pub idempotency_key: Uuid,
    /// Success first, then any follow-up warnings.
    pub notices: Vec<Notice>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Clone, Copy)]
enum AddressRole {
    Shipping,
    Billing,
}

impl AddressRole {
    fn label(self) -> &'static str {
        match self { Self::Shipping => "shipping", Self::Billing => "billing" }
    }
}

/// Submits drafts against one backend and the cart the draft was built from.
///
/// The backend must already be scoped to the caller.
pub struct OrderSubmitter<'a, B, C> {
    backend: &'a B,
    cart: &'a C,
    events: Option<&'a dyn EventBus>,
}

impl<'a, B: StoreBackend, C: CartSource> OrderSubmitter<'a, B, C> {
    pub fn new(backend: &'a B, cart: &'a C) -> Self { Self { backend, cart, events: None } }

    pub fn with_events(mut self, events: &'a dyn EventBus) -> Self { self.events = Some(events); self }

    /// Places `draft` for `identity`.
    ///
    /// On error the draft is left as it was, apart from inline addresses that
    /// were already saved to the address book, which now point at the saved
    /// copy. Submitting it again reuses its idempotency key.
    ///
    /// # Errors
    ///
    /// - [`CheckoutError::Validation`] when there are no items, an inline address is incomplete,
    ///   or a guest refers to a saved address
    /// - [`CheckoutError::AddressPersist`] when an inline address cannot be saved
    /// - [`CheckoutError::OrderCreate`] when the backend rejects the order
    #[instrument(
        skip_all,
        fields(flow = ?draft.flow(), guest = identity.is_guest(), idempotency_key = %draft.idempotency_key())
    )]
    pub async fn submit(&self, draft: &mut DraftOrder, identity: &Identity) -> Result<OrderConfirmation> {
        if draft.is_empty() {
            return Err(CheckoutError::Validation("no items in cart".to_string()));
        }
        check_address(draft.shipping_address(), identity, AddressRole::Shipping)?;
        if let Some(billing) = draft.billing_address() {
            check_address(billing, identity, AddressRole::Billing)?;
        }

        let requested_shipping = draft.shipping_address().clone();
        let shipping = self.resolve_address(&requested_shipping, identity, AddressRole::Shipping).await?;
        if let AddressPayload::Reference(id) = &shipping {
            draft.set_shipping_address(AddressRef::saved(id.clone()));
        }
        let billing = match draft.billing_address().cloned() {
            Some(billing) if billing == requested_shipping => shipping.clone(),
            Some(billing) => {
                let resolved = self.resolve_address(&billing, identity, AddressRole::Billing).await?;
                if let AddressPayload::Reference(id) = &resolved {
                    draft.set_billing_address(AddressRef::saved(id.clone()));
                }
                resolved
            }
            None => shipping.clone(),
        };

        draft.recalculate();
        let totals = draft.totals();
        let payload = self.build_payload(draft, identity, shipping, billing, totals).await?;

        let created = self.backend.create_order(&payload).await.map_err(order_create_error)?;
        info!(order_id = %created.order_id, order_number = %created.order_number, total = %totals.total, "Order created");
        self.publish(DomainEvent::OrderCreated {
            order_id: created.order_id.clone(),
            order_number: created.order_number.clone(),
            total: totals.total,
            occurred_at: Utc::now(),
        });

        let placed = Money::new(totals.total, draft.currency());
        let mut notices = vec![Notice::success(format!("Order {} placed successfully ({placed})", created.order_number))];

        if let Err(e) = self.cart.clear().await {
            warn!(error = %e, order_id = %created.order_id, "Order placed but cart was not cleared");
            notices.push(Notice::warning("Your order was placed, but the cart could not be emptied."));
        }

        let invoice = if draft.flow().is_admin() && draft.create_invoice() {
            self.request_invoice(&created.order_id, &mut notices).await
        } else {
            InvoiceOutcome::NotRequested
        };

        Ok(OrderConfirmation {
            order_id: created.order_id,
            order_number: created.order_number,
            totals,
            invoice,
            idempotency_key: draft.idempotency_key(),
            notices,
            placed_at: Utc::now(),
        })
    }

    async fn resolve_address(&self, address: &AddressRef, identity: &Identity, role: AddressRole) -> Result<AddressPayload> {
        match (address, identity) {
            (AddressRef::Saved { id }, _) => Ok(AddressPayload::Reference(id.clone())),
            (AddressRef::Inline(inline), Identity::Guest) => Ok(AddressPayload::Inline(inline.clone())),
            (AddressRef::Inline(inline), Identity::Authenticated { .. }) => {
                let saved = self.backend.add_address(inline).await.map_err(|e| {
                    warn!(error = %e, role = role.label(), "Failed to save address");
                    CheckoutError::AddressPersist(e.server_message().map_or_else(|| e.to_string(), str::to_string))
                })?;
                info!(address_id = %saved.id, role = role.label(), "Saved inline address");
                Ok(AddressPayload::Reference(saved.id))
            }
        }
    }

    async fn build_payload(
        &self,
        draft: &DraftOrder,
        identity: &Identity,
        shipping_address: AddressPayload,
        billing_address: AddressPayload,
        totals: OrderTotals,
    ) -> Result<OrderPayload> {
        // Guests have no server session, so the backend needs the raw cart and a contact.
        let (guest_items, email) = if identity.is_guest() && !draft.flow().is_admin() {
            let cart = self.cart.get().await?;
            let email = draft.contact_email().map(str::to_string).or_else(|| inline_email(&shipping_address));
            (Some(cart.items), email)
        } else {
            (None, draft.contact_email().map(str::to_string))
        };

        Ok(OrderPayload {
            payment_method: draft.payment_method(),
            notes: draft.notes().map(str::to_string),
            shipping_address,
            billing_address,
            items: draft.all_items().map(OrderItemPayload::from).collect(),
            totals,
            currency: draft.currency().to_string(),
            idempotency_key: draft.idempotency_key(),
            guest_items,
            email,
        })
    }

    async fn request_invoice(&self, order_id: &str, notices: &mut Vec<Notice>) -> InvoiceOutcome {
        match self.backend.create_invoice(&InvoiceRequest { order_id: order_id.to_string() }).await {
            Ok(invoice) => {
                info!(order_id, invoice_id = %invoice.invoice_id, "Invoice created");
                notices.push(Notice::success("Invoice created"));
                self.publish(DomainEvent::InvoiceCreated { order_id: order_id.to_string(), invoice_id: invoice.invoice_id.clone() });
                InvoiceOutcome::Created { invoice_id: invoice.invoice_id }
            }
            Err(e) => {
                warn!(error = %e, order_id, "Invoice creation failed; order stands");
                let reason = e.server_message().map_or_else(|| e.to_string(), str::to_string);
                notices.extend(CheckoutError::InvoiceCreate(reason.clone()).notices());
                self.publish(DomainEvent::InvoiceFailed { order_id: order_id.to_string(), reason: reason.clone() });
                InvoiceOutcome::Failed { reason }
            }
        }
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(events) = self.events {
            events.publish(event);
        }
    }
}

/// Local checks on an address before anything is sent.
///
/// Guests have no address book, so they can only ship to inline addresses.
fn check_address(address: &AddressRef, identity: &Identity, role: AddressRole) -> Result<()> {
    let inline = match (address, identity) {
        (AddressRef::Inline(inline), _) => inline,
        (AddressRef::Saved { .. }, Identity::Guest) => {
            return Err(CheckoutError::Validation(format!("saved {} address requires sign-in", role.label())));
        }
        (AddressRef::Saved { .. }, Identity::Authenticated { .. }) => return Ok(()),
    };
    let missing = inline.missing_fields();
    if !missing.is_empty() {
        return Err(CheckoutError::Validation(format!("missing {} field: {}", role.label(), missing.join(", "))));
    }
    let malformed = inline.malformed_fields();
    if !malformed.is_empty() {
        return Err(CheckoutError::Validation(format!("invalid {} field: {}", role.label(), malformed.join(", "))));
    }
    Ok(())
}

fn inline_email(address: &AddressPayload) -> Option<String> {
    match address {
        AddressPayload::Inline(InlineAddress { email, .. }) => email.clone(),
        AddressPayload::Reference(_) => None,
    }
}

fn order_create_error(e: BackendError) -> CheckoutError {
    warn!(error = %e, "Order creation failed");
    CheckoutError::OrderCreate {
        message: e.server_message().unwrap_or(GENERIC_ORDER_FAILURE).to_string(),
        field_errors: e.field_errors().to_vec(),
    }
}
