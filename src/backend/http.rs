//! HTTP implementation of [`StoreBackend`] over the store REST API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    ApiEnvelope, BackendError, Invoice, InvoiceRequest, OrderCreated, OrderPayload, SavedAddress, StoreBackend,
};
use crate::config::BackendConfig;
use crate::domain::aggregates::{Cart, InlineAddress};
use crate::Identity;

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Store API client.
///
/// Cheap to clone. [`HttpStoreBackend::scoped`] returns a copy that
/// authenticates as a given caller.
#[derive(Clone)]
pub struct HttpStoreBackend {
    inner: Arc<HttpStoreBackendInner>,
    token: Option<SecretString>,
}

struct HttpStoreBackendInner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStoreBackend {
    /// Create a new store API client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpStoreBackendInner {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
            }),
            token: config.service_token.clone(),
        })
    }

    /// A client acting on behalf of `identity`. Guests keep the service token, if any.
    #[must_use]
    pub fn scoped(&self, identity: &Identity) -> Self {
        match identity {
            Identity::Authenticated { access_token } => Self { inner: Arc::clone(&self.inner), token: Some(access_token.clone()) },
            Identity::Guest => self.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.inner.base_url);
        let builder = self.inner.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, BackendError> {
        let response = builder.send().await?;
        let envelope: ApiEnvelope<T> = Self::read_envelope(response).await?;
        envelope.data.ok_or_else(|| BackendError::Parse("response has no data".to_string()))
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), BackendError> {
        let response = builder.send().await?;
        if response.status().as_u16() == 204 {
            return Ok(());
        }
        Self::read_envelope::<serde_json::Value>(response).await.map(|_| ())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<T, BackendError> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<ApiEnvelope<T>, BackendError> {
        let status = response.status();
        let body = response.text().await?;

        let envelope = serde_json::from_str::<ApiEnvelope<T>>(&body);
        match envelope {
            Ok(envelope) if status.is_success() && envelope.success => Ok(envelope),
            Ok(envelope) => Err(BackendError::Api {
                status: status.as_u16(),
                message: envelope.message.unwrap_or_default(),
                field_errors: envelope.errors,
            }),
            Err(e) if status.is_success() => Err(BackendError::Parse(format!("Failed to parse response: {e}"))),
            // Non-JSON error pages carry no message worth showing.
            Err(_) => Err(BackendError::api(status.as_u16(), String::new())),
        }
    }
}

impl StoreBackend for HttpStoreBackend {
    async fn get_cart(&self) -> Result<Cart, BackendError> {
        self.get("/cart").await
    }

    async fn put_cart(&self, cart: &Cart) -> Result<(), BackendError> {
        self.send_empty(self.request(Method::PUT, "/cart").json(cart)).await
    }

    async fn clear_cart(&self) -> Result<(), BackendError> {
        self.send_empty(self.request(Method::DELETE, "/cart")).await
    }

    async fn get_addresses(&self) -> Result<Vec<SavedAddress>, BackendError> {
        self.get("/addresses").await
    }

    async fn add_address(&self, address: &InlineAddress) -> Result<SavedAddress, BackendError> {
        self.post("/addresses", address).await
    }

    async fn create_order(&self, order: &OrderPayload) -> Result<OrderCreated, BackendError> {
        let builder = self
            .request(Method::POST, "/orders")
            .header(IDEMPOTENCY_HEADER, order.idempotency_key.to_string())
            .json(order);
        self.send(builder).await
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, BackendError> {
        self.post("/invoices", request).await
    }
}

impl std::fmt::Debug for HttpStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStoreBackend")
            .field("base_url", &self.inner.base_url)
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}
