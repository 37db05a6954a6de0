//! Notifications about mock mutations and captured traffic.
//!
//! Delivery is best-effort: a sink that cannot keep up (or has no listener)
//! drops events, and nothing in the pipeline waits on a subscriber.

use crate::exchange::InterceptedExchange;
use crate::mock::Mock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of a [`BroadcastSink`] channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Event emitted by the registry and the capture pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProxyEvent {
    #[serde(rename_all = "camelCase")]
    MockAdded { endpoint: u16, mock: Mock },
    #[serde(rename_all = "camelCase")]
    MockAutoCreated { endpoint: u16, mock: Mock },
    #[serde(rename_all = "camelCase")]
    MockUpdated { endpoint: u16, mock: Mock },
    #[serde(rename_all = "camelCase")]
    MockRemoved { endpoint: u16, mock_id: String },
    #[serde(rename_all = "camelCase")]
    MockToggled {
        endpoint: u16,
        mock_id: String,
        enabled: bool,
    },
    #[serde(rename_all = "camelCase")]
    ProxyError {
        endpoint: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        exchange_id: Option<String>,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    RequestCaptured {
        endpoint: u16,
        exchange: InterceptedExchange,
    },
    #[serde(rename_all = "camelCase")]
    RequestCompleted {
        endpoint: u16,
        exchange: InterceptedExchange,
    },
}

impl ProxyEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ProxyEvent::MockAdded { .. } => "mockAdded",
            ProxyEvent::MockAutoCreated { .. } => "mockAutoCreated",
            ProxyEvent::MockUpdated { .. } => "mockUpdated",
            ProxyEvent::MockRemoved { .. } => "mockRemoved",
            ProxyEvent::MockToggled { .. } => "mockToggled",
            ProxyEvent::ProxyError { .. } => "proxyError",
            ProxyEvent::RequestCaptured { .. } => "requestCaptured",
            ProxyEvent::RequestCompleted { .. } => "requestCompleted",
        }
    }

    pub fn endpoint(&self) -> u16 {
        match self {
            ProxyEvent::MockAdded { endpoint, .. }
            | ProxyEvent::MockAutoCreated { endpoint, .. }
            | ProxyEvent::MockUpdated { endpoint, .. }
            | ProxyEvent::MockRemoved { endpoint, .. }
            | ProxyEvent::MockToggled { endpoint, .. }
            | ProxyEvent::ProxyError { endpoint, .. }
            | ProxyEvent::RequestCaptured { endpoint, .. }
            | ProxyEvent::RequestCompleted { endpoint, .. } => *endpoint,
        }
    }
}

/// Receiver of [`ProxyEvent`]s. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProxyEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: ProxyEvent) {}
}

/// Fans events out to any number of subscribers over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ProxyEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: ProxyEvent) {
        let name = event.name();
        // No receivers is not an error
        if self.tx.send(event).is_err() {
            trace!(event = name, "Event dropped, no subscribers");
        }
    }
}
