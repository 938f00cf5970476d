//! Ekomart checkout service

use std::sync::Arc;

use anyhow::Result;
use ekomart_checkout::config::CheckoutConfig;
use ekomart_checkout::domain::events::{EventBus, LocalEventBus, NatsEventBus};
use ekomart_checkout::routes::{router, AppState};
use ekomart_checkout::HttpStoreBackend;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_SUBJECT_PREFIX: &str = "ekomart";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CheckoutConfig::from_env()?;
    let backend = HttpStoreBackend::new(&config.backend)?;
    let events = event_bus(config.nats_url.as_deref()).await;
    let state = AppState { backend, events, currency: config.currency.clone() };

    let app = router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    let addr = config.socket_addr();
    tracing::info!(%addr, store_api = %config.backend.base_url, "Ekomart checkout listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

/// NATS when configured and reachable, otherwise in-process only.
async fn event_bus(nats_url: Option<&str>) -> Arc<dyn EventBus> {
    if let Some(url) = nats_url {
        match async_nats::connect(url).await {
            Ok(client) => return Arc::new(NatsEventBus::new(client, EVENT_SUBJECT_PREFIX)),
            Err(e) => tracing::warn!(error = %e, "NATS unavailable; publishing events in-process"),
        }
    }
    Arc::new(LocalEventBus::default())
}
