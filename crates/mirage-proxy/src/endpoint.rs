//! Runtime state of one proxy endpoint.

use crate::config::{Protocol, ProxyEndpoint};
use crate::exchange::{ExchangeStatus, InterceptedExchange};
use crate::history::History;
use crate::metrics;
use crate::mock::MockStore;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Traffic counters of an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub mocked: u64,
    pub active_connections: u64,
}

/// Counters and history, always updated together
#[derive(Debug, Default)]
struct Ledger {
    stats: EndpointStats,
    history: History,
}

/// Runtime state of an endpoint: its description, mocks, counters and history.
#[derive(Debug)]
pub struct EndpointState {
    config: RwLock<ProxyEndpoint>,
    mocks: MockStore,
    ledger: Mutex<Ledger>,
    next_connection_id: AtomicU64,
}

impl EndpointState {
    pub fn new(config: ProxyEndpoint, mocks: MockStore) -> Self {
        Self {
            config: RwLock::new(config),
            mocks,
            ledger: Mutex::new(Ledger::default()),
            next_connection_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> ProxyEndpoint {
        self.config.read().clone()
    }

    pub fn port(&self) -> u16 {
        self.config.read().port
    }

    pub fn protocol(&self) -> Protocol {
        self.config.read().protocol
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.config.write().running = running;
    }

    pub fn mocks(&self) -> &MockStore {
        &self.mocks
    }

    /// Register a client connection. Dropping the guard unregisters it.
    pub fn open_connection(self: &Arc<Self>) -> ConnectionGuard {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        self.ledger.lock().stats.active_connections += 1;
        metrics::connection_opened(self.port());
        ConnectionGuard {
            endpoint: Arc::clone(self),
            id,
        }
    }

    /// Append a completed exchange to history and count it.
    /// Returns the number of history entries evicted.
    pub fn record(&self, exchange: InterceptedExchange, history_limit: usize) -> usize {
        let mut ledger = self.ledger.lock();
        ledger.stats.total += 1;
        match exchange.status {
            ExchangeStatus::Success => ledger.stats.success += 1,
            ExchangeStatus::Failed => ledger.stats.failed += 1,
            ExchangeStatus::Mocked => ledger.stats.mocked += 1,
            ExchangeStatus::Pending => {}
        }
        ledger.history.push(exchange, history_limit)
    }

    pub fn stats(&self) -> EndpointStats {
        self.ledger.lock().stats
    }

    /// History in insertion order
    pub fn history(&self) -> Vec<InterceptedExchange> {
        self.ledger.lock().history.entries()
    }

    pub fn history_recent_first(&self) -> Vec<InterceptedExchange> {
        self.ledger.lock().history.recent_first()
    }

    pub fn exchange(&self, id: &str) -> Option<InterceptedExchange> {
        self.ledger.lock().history.get(id).cloned()
    }

    pub fn clear_history(&self) {
        self.ledger.lock().history.clear();
    }
}

/// Live client connection. Tracks the active-connection counter.
pub struct ConnectionGuard {
    endpoint: Arc<EndpointState>,
    id: u64,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn endpoint(&self) -> &Arc<EndpointState> {
        &self.endpoint
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        {
            let mut ledger = self.endpoint.ledger.lock();
            ledger.stats.active_connections = ledger.stats.active_connections.saturating_sub(1);
        }
        metrics::connection_closed(self.endpoint.port());
    }
}
