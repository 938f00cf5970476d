//! HTTP surface: checkout and admin order endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{HttpStoreBackend, SavedAddress, StoreBackend};
use crate::cart_source::{resolve_items, CartResolution, CartSource, DetachedCart, MemoryStorage, SelectedCart};
use crate::domain::aggregates::{AddressRef, Cart, DraftOrder, LineItem, PaymentMethod, VariantSelection};
use crate::domain::events::EventBus;
use crate::domain::value_objects::{ProductRef, Quantity};
use crate::pricing::{OrderTotals, PricingPolicy, ShippingZone};
use crate::submission::{OrderConfirmation, OrderSubmitter};
use crate::{CheckoutError, Identity, Notice};

/// Where shoppers with nothing to check out are sent.
pub const SHOP_PATH: &str = "/shop";

#[derive(Clone)]
pub struct AppState {
    pub backend: HttpStoreBackend,
    pub events: Arc<dyn EventBus>,
    pub currency: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "ekomart-checkout"})) }))
        .route("/api/v1/checkout/init", post(init_checkout))
        .route("/api/v1/checkout/quote", post(quote_checkout))
        .route("/api/v1/checkout", post(submit_checkout))
        .route("/api/v1/admin/orders/quote", post(quote_admin_order))
        .route("/api/v1/admin/orders", post(submit_admin_order))
        .with_state(state)
}

/// Admin endpoints act with the caller's own token; the service token is never lent to them.
fn require_staff(identity: &Identity) -> crate::Result<()> {
    if identity.is_guest() {
        return Err(CheckoutError::Unauthorized("Staff sign-in required".to_string()));
    }
    Ok(())
}

/// Bearer token present means a signed-in caller; anything else is a guest.
pub fn identity_from(headers: &HeaderMap) -> Identity {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map_or(Identity::Guest, |t| Identity::Authenticated { access_token: SecretString::from(t.to_string()) })
}

// =============================================================================
// Request / response types
// =============================================================================

/// A line as typed into the admin form or echoed back by the checkout page.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    /// Catalog id, or absent / `"custom"` for an ad-hoc line.
    #[serde(default)]
    pub product: Option<ProductRef>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Quantity,
    #[serde(default)]
    pub variant: Option<VariantSelection>,
}

impl TryFrom<ItemInput> for LineItem {
    type Error = CheckoutError;

    fn try_from(input: ItemInput) -> Result<Self, Self::Error> {
        if input.unit_price.is_sign_negative() {
            return Err(CheckoutError::Validation(format!("price of {} must not be negative", input.name)));
        }
        let product = input.product.unwrap_or(ProductRef::Custom);
        Ok(LineItem::new(product, input.name, input.unit_price, input.quantity).with_variant(input.variant))
    }
}

fn line_items(inputs: Vec<ItemInput>) -> crate::Result<Vec<LineItem>> {
    inputs.into_iter().map(LineItem::try_from).collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    /// The guest cart blob from client storage; ignored for signed-in callers.
    #[serde(default)]
    pub guest_cart: Option<Cart>,
    #[serde(default)]
    pub zone: ShippingZone,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum InitResponse {
    #[serde(rename_all = "camelCase")]
    Ready {
        items: Vec<LineItem>,
        addresses: Vec<SavedAddress>,
        default_address_id: Option<String>,
        totals: OrderTotals,
    },
    #[serde(rename_all = "camelCase")]
    Redirect { redirect_to: &'static str, notice: Notice },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutQuoteRequest {
    pub items: Vec<ItemInput>,
    #[serde(default)]
    pub zone: ShippingZone,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub zone: ShippingZone,
    pub shipping_address: AddressRef,
    #[serde(default)]
    pub billing_address: Option<AddressRef>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Sent back on retry so the store can recognise a duplicate submission.
    #[serde(default)]
    pub idempotency_key: Option<Uuid>,
    #[serde(default)]
    pub guest_cart: Option<Cart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    #[serde(flatten)]
    pub confirmation: OrderConfirmation,
    /// Cleared guest cart for the client to write back to storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_cart: Option<Cart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuoteRequest {
    pub items: Vec<ItemInput>,
    #[serde(default)]
    pub discount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderRequest {
    pub items: Vec<ItemInput>,
    pub shipping_address: AddressRef,
    #[serde(default)]
    pub billing_address: Option<AddressRef>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub create_invoice: bool,
    #[serde(default)]
    pub idempotency_key: Option<Uuid>,
}

// =============================================================================
// Handlers
// =============================================================================

async fn init_checkout(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<InitRequest>,
) -> Result<Json<InitResponse>, ApiError> {
    let identity = identity_from(&headers);
    let backend = s.backend.scoped(&identity);
    let storage = MemoryStorage::with_guest_cart(&r.guest_cart.unwrap_or_default())?;
    let cart = SelectedCart::for_identity(&identity, backend.clone(), storage, Arc::clone(&s.events));

    let items = match resolve_items(&cart).await {
        Ok(CartResolution::Ready(items)) => items,
        Ok(CartResolution::Empty) => {
            return Ok(Json(InitResponse::Redirect { redirect_to: SHOP_PATH, notice: Notice::warning("Your cart is empty") }));
        }
        Err(e @ CheckoutError::CartUnavailable(_)) => {
            tracing::warn!(error = %e, "Server cart unavailable; sending shopper back to the shop");
            return Ok(Json(InitResponse::Redirect { redirect_to: SHOP_PATH, notice: Notice::error("Failed to load cart") }));
        }
        Err(e) => return Err(e.into()),
    };

    let addresses = if identity.is_guest() {
        Vec::new()
    } else {
        backend.get_addresses().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Could not load saved addresses");
            Vec::new()
        })
    };
    let default_address_id = addresses.iter().find(|a| a.is_default).or(addresses.first()).map(|a| a.id.clone());
    let totals = PricingPolicy::checkout(r.zone).quote(&items, Decimal::ZERO);

    Ok(Json(InitResponse::Ready { items, addresses, default_address_id, totals }))
}

async fn quote_checkout(Json(r): Json<CheckoutQuoteRequest>) -> Result<Json<OrderTotals>, ApiError> {
    let items = line_items(r.items)?;
    Ok(Json(PricingPolicy::checkout(r.zone).quote(&items, Decimal::ZERO)))
}

async fn submit_checkout(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let identity = identity_from(&headers);
    let backend = s.backend.scoped(&identity);
    let storage = MemoryStorage::with_guest_cart(&r.guest_cart.unwrap_or_default())?;
    let cart = SelectedCart::for_identity(&identity, backend.clone(), storage, Arc::clone(&s.events));

    // Items always come from the cart, never from the request body.
    let CartResolution::Ready(items) = resolve_items(&cart).await? else {
        return Err(CheckoutError::Validation("no items in cart".to_string()).into());
    };

    let mut draft = DraftOrder::checkout(items, r.zone, r.shipping_address, r.payment_method, &s.currency);
    if let Some(billing) = r.billing_address { draft = draft.with_billing_address(billing); }
    if let Some(notes) = r.notes { draft = draft.with_notes(notes); }
    if let Some(email) = r.email { draft = draft.with_contact_email(email); }
    if let Some(key) = r.idempotency_key { draft = draft.with_idempotency_key(key); }
    let key = draft.idempotency_key();

    // Discounts are staff-only; the storefront never prices one in.
    let confirmation = OrderSubmitter::new(&backend, &cart)
        .with_events(s.events.as_ref())
        .submit(&mut draft, &identity)
        .await
        .map_err(|e| ApiError::from(e).with_idempotency_key(key))?;
    let guest_cart = match &cart {
        SelectedCart::Local(local) => Some(local.get().await?),
        SelectedCart::Server(_) => None,
    };
    Ok(Json(CheckoutResponse { confirmation, guest_cart }))
}

async fn quote_admin_order(headers: HeaderMap, Json(r): Json<AdminQuoteRequest>) -> Result<Json<OrderTotals>, ApiError> {
    require_staff(&identity_from(&headers))?;
    let items = line_items(r.items)?;
    Ok(Json(PricingPolicy::admin().quote(&items, r.discount)))
}

async fn submit_admin_order(
    State(s): State<AppState>,
    headers: HeaderMap,
    Json(r): Json<AdminOrderRequest>,
) -> Result<(StatusCode, Json<OrderConfirmation>), ApiError> {
    let identity = identity_from(&headers);
    require_staff(&identity)?;
    let backend = s.backend.scoped(&identity);

    let mut draft = DraftOrder::admin(r.shipping_address, r.payment_method, &s.currency);
    for item in line_items(r.items)? { draft.add_item(item); }
    if let Some(billing) = r.billing_address { draft = draft.with_billing_address(billing); }
    if let Some(notes) = r.notes { draft = draft.with_notes(notes); }
    if let Some(key) = r.idempotency_key { draft = draft.with_idempotency_key(key); }
    draft.set_discount(r.discount);
    draft.request_invoice(r.create_invoice).map_err(|e| CheckoutError::Validation(e.to_string()))?;
    let key = draft.idempotency_key();

    let confirmation = OrderSubmitter::new(&backend, &DetachedCart)
        .with_events(s.events.as_ref())
        .submit(&mut draft, &identity)
        .await
        .map_err(|e| ApiError::from(e).with_idempotency_key(key))?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub error: CheckoutError,
    /// Set once a draft exists, so the client can retry under the same key.
    pub idempotency_key: Option<Uuid>,
}

impl ApiError {
    pub fn with_idempotency_key(mut self, key: Uuid) -> Self {
        self.idempotency_key = Some(key);
        self
    }
}

impl From<CheckoutError> for ApiError {
    fn from(error: CheckoutError) -> Self { Self { error, idempotency_key: None } }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    message: String,
    notices: Vec<Notice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    idempotency_key: Option<Uuid>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.error {
            CheckoutError::Validation(_) | CheckoutError::OrderCreate { .. } | CheckoutError::Cart(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CheckoutError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CheckoutError::CartUnavailable(_) | CheckoutError::AddressPersist(_) | CheckoutError::InvoiceCreate(_) => StatusCode::BAD_GATEWAY,
            CheckoutError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.error, "Checkout request failed");
        }
        let body = ErrorBody { message: self.error.to_string(), notices: self.error.notices(), idempotency_key: self.idempotency_key };
        (status, Json(body)).into_response()
    }
}
