//! Domain events
//!
//! Published best-effort: a failed publish is logged and never fails the
//! operation that raised the event.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainEvent {
    #[serde(rename_all = "camelCase")]
    CartUpdated { item_count: u32 },
    CartCleared,
    #[serde(rename_all = "camelCase")]
    OrderCreated { order_id: String, order_number: String, total: Decimal, occurred_at: DateTime<Utc> },
    #[serde(rename_all = "camelCase")]
    InvoiceCreated { order_id: String, invoice_id: String },
    #[serde(rename_all = "camelCase")]
    InvoiceFailed { order_id: String, reason: String },
}

impl DomainEvent {
    /// Dotted name used as the NATS subject suffix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CartUpdated { .. } => "cart.updated",
            Self::CartCleared => "cart.cleared",
            Self::OrderCreated { .. } => "order.created",
            Self::InvoiceCreated { .. } => "invoice.created",
            Self::InvoiceFailed { .. } => "invoice.failed",
        }
    }
}

pub trait EventBus: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// In-process fan-out, e.g. for cart badge listeners.
#[derive(Clone, Debug)]
pub struct LocalEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl LocalEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> { self.sender.subscribe() }
}

impl Default for LocalEventBus {
    fn default() -> Self { Self::new(64) }
}

impl EventBus for LocalEventBus {
    fn publish(&self, event: DomainEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }
}

/// Publishes JSON events to NATS under `<prefix>.<event name>`.
#[derive(Clone, Debug)]
pub struct NatsEventBus {
    client: async_nats::Client,
    prefix: String,
}

impl NatsEventBus {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self { client, prefix: prefix.into() }
    }

    pub fn subject_for(&self, event: &DomainEvent) -> String { format!("{}.{}", self.prefix, event.name()) }
}

impl EventBus for NatsEventBus {
    fn publish(&self, event: DomainEvent) {
        let subject = self.subject_for(&event);
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => { tracing::warn!(error = %e, subject = %subject, "Failed to encode event"); return; }
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(error = %e, subject = %subject, "Failed to publish event");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_bus_delivers_to_subscribers() {
        let bus = LocalEventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(DomainEvent::CartUpdated { item_count: 3 });
        assert_eq!(rx.recv().await.unwrap(), DomainEvent::CartUpdated { item_count: 3 });
    }

    #[test]
    fn test_publish_without_subscribers_is_fine() {
        LocalEventBus::new(4).publish(DomainEvent::CartCleared);
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(DomainEvent::CartUpdated { item_count: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "cartUpdated", "itemCount": 2 }));
        assert_eq!(DomainEvent::CartCleared.name(), "cart.cleared");
    }
}
