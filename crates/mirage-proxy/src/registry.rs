//! Registry - owner of all endpoint state, settings, events and persistence.
//!
//! Every programmatic operation goes through a [`Registry`]. It is cheap to
//! clone; clones share the same state.
//!
//! Durable mutations (endpoints and mocks) are serialized by one lock and
//! follow persist-then-publish ordering: the new collection is written to the
//! store first, and readers only see it once the write succeeded.

use crate::config::{ProxyEndpoint, Settings, SettingsHandle, SettingsPatch, UpdateError};
use crate::diff::{detect_drift, DriftReport};
use crate::endpoint::{EndpointState, EndpointStats};
use crate::error::{MockConfigError, RegistryError};
use crate::events::{EventSink, NoopSink, ProxyEvent};
use crate::exchange::{CapturedRequest, DbQuery, HttpRequest, InterceptedExchange, ResponseDescriptor};
use crate::forward::{HttpUpstream, Upstream};
use crate::metrics;
use crate::mock::{
    analyze_mocks, draft_from_exchange, response_from_descriptor, MatcherKind, Mock,
    MockAnalysisResult, MockDraft, MockPatch, MockStore, StoredMock,
};
use crate::pipeline::CapturePipeline;
use crate::persistence::Persistence;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

struct RegistryInner {
    endpoints: RwLock<HashMap<u16, Arc<EndpointState>>>,
    settings: SettingsHandle,
    events: Arc<dyn EventSink>,
    persistence: Option<Arc<dyn Persistence>>,
    /// Serializes durable mutations across endpoints
    mutation_lock: Mutex<()>,
}

/// Shared handle to all proxy state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

/// Outcome of replaying one mock against its upstream
#[derive(Debug, Clone)]
pub struct DriftCheck {
    /// Set when the upstream no longer agrees with the mock
    pub report: Option<DriftReport>,
    /// The upstream answer the mock was compared against
    pub response: ResponseDescriptor,
}

impl DriftCheck {
    pub fn drifted(&self) -> bool {
        self.report.is_some()
    }
}

/// Builder for [`Registry`]
pub struct RegistryBuilder {
    settings: Settings,
    events: Arc<dyn EventSink>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            events: Arc::new(NoopSink),
            persistence: None,
        }
    }
}

impl RegistryBuilder {
    /// Initial settings. Settings found in the persistence store win.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Build an empty registry without reading the store
    pub fn build(self) -> Registry {
        Registry {
            inner: Arc::new(RegistryInner {
                endpoints: RwLock::new(HashMap::new()),
                settings: SettingsHandle::new(self.settings),
                events: self.events,
                persistence: self.persistence,
                mutation_lock: Mutex::new(()),
            }),
        }
    }

    /// Build a registry and load settings, endpoints and mocks from the store.
    ///
    /// Stored mocks that no longer validate, or whose endpoint is gone, are
    /// skipped with a warning.
    pub fn open(self) -> Result<Registry, RegistryError> {
        let Some(store) = self.persistence.clone() else {
            return Ok(self.build());
        };

        let mut settings = self.settings.clone();
        if let Some(saved) = store.load_settings()? {
            saved.validate()?;
            settings = saved;
        }

        let endpoints = store.load_endpoints()?;
        let mut by_port: HashMap<u16, Vec<Arc<StoredMock>>> =
            endpoints.iter().map(|e| (e.port, Vec::new())).collect();

        for mock in store.load_mocks()? {
            let Some(list) = by_port.get_mut(&mock.endpoint) else {
                warn!(
                    "Skipping mock {} for unknown endpoint {}",
                    mock.id, mock.endpoint
                );
                continue;
            };
            let id = mock.id.clone();
            match StoredMock::compile(mock) {
                Ok(stored) => list.push(Arc::new(stored)),
                Err(e) => warn!("Skipping invalid stored mock {}: {}", id, e),
            }
        }

        let registry = self.settings(settings).build();
        {
            let mut map = registry.inner.endpoints.write();
            for endpoint in endpoints {
                let mocks = by_port.remove(&endpoint.port).unwrap_or_default();
                let port = endpoint.port;
                map.insert(
                    port,
                    Arc::new(EndpointState::new(endpoint, MockStore::from_entries(mocks))),
                );
            }
            info!("Registry opened with {} endpoints", map.len());
        }
        Ok(registry)
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// In-memory registry with the given settings, no events, no persistence
    pub fn new(settings: Settings) -> Self {
        Self::builder().settings(settings).build()
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Current settings snapshot
    pub fn settings(&self) -> Arc<Settings> {
        self.inner.settings.snapshot()
    }

    pub fn settings_handle(&self) -> &SettingsHandle {
        &self.inner.settings
    }

    /// Apply a partial settings update, persisting it before it takes effect.
    pub fn update_settings(&self, patch: &SettingsPatch) -> Result<Arc<Settings>, RegistryError> {
        self.inner
            .settings
            .update_with(patch, |next| match &self.inner.persistence {
                Some(store) => store.save_settings(next),
                None => Ok(()),
            })
            .map_err(|e| match e {
                UpdateError::Invalid(e) => RegistryError::Settings(e),
                UpdateError::Commit(e) => {
                    error!("Failed to persist settings: {}", e);
                    RegistryError::Persistence(e)
                }
            })
    }

    pub(crate) fn emit(&self, event: ProxyEvent) {
        self.inner.events.emit(event);
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    pub fn endpoint(&self, port: u16) -> Result<Arc<EndpointState>, RegistryError> {
        self.inner
            .endpoints
            .read()
            .get(&port)
            .cloned()
            .ok_or(RegistryError::EndpointNotFound(port))
    }

    /// All endpoints, ordered by port
    pub fn endpoints(&self) -> Vec<ProxyEndpoint> {
        let mut endpoints: Vec<ProxyEndpoint> = self
            .inner
            .endpoints
            .read()
            .values()
            .map(|e| e.config())
            .collect();
        endpoints.sort_by_key(|e| e.port);
        endpoints
    }

    pub fn add_endpoint(&self, endpoint: ProxyEndpoint) -> Result<Arc<EndpointState>, RegistryError> {
        let _guard = self.inner.mutation_lock.lock();
        let port = endpoint.port;
        endpoint
            .validate()
            .map_err(|reason| RegistryError::InvalidEndpoint { port, reason })?;
        if self.inner.endpoints.read().contains_key(&port) {
            return Err(RegistryError::EndpointExists(port));
        }

        let mut next = self.endpoints();
        next.push(endpoint.clone());
        next.sort_by_key(|e| e.port);
        self.persist_endpoints(&next)?;

        info!(
            "Added {} endpoint {} -> {}",
            endpoint.protocol,
            endpoint.label(),
            endpoint.upstream
        );
        let state = Arc::new(EndpointState::new(endpoint, MockStore::new()));
        self.inner.endpoints.write().insert(port, Arc::clone(&state));
        Ok(state)
    }

    /// Remove an endpoint together with its mocks
    pub fn remove_endpoint(&self, port: u16) -> Result<ProxyEndpoint, RegistryError> {
        let _guard = self.inner.mutation_lock.lock();
        let state = self.endpoint(port)?;

        let remaining: Vec<ProxyEndpoint> = self
            .endpoints()
            .into_iter()
            .filter(|e| e.port != port)
            .collect();
        let remaining_mocks: Vec<Mock> = self
            .all_mock_snapshots()
            .into_iter()
            .filter(|m| m.endpoint != port)
            .collect();
        if let Some(store) = &self.inner.persistence {
            store.save_mocks(&remaining_mocks).map_err(|e| {
                error!("Failed to persist mocks: {}", e);
                e
            })?;
        }
        self.persist_endpoints(&remaining)?;

        self.inner.endpoints.write().remove(&port);
        let removed = state.mocks().clear();
        for mock in &removed {
            self.emit(ProxyEvent::MockRemoved {
                endpoint: port,
                mock_id: mock.id().to_string(),
            });
        }
        info!(
            "Removed endpoint {} and {} mocks",
            state.config().label(),
            removed.len()
        );
        Ok(state.config())
    }

    /// Record whether the endpoint's listener is accepting traffic
    pub fn set_running(&self, port: u16, running: bool) -> Result<(), RegistryError> {
        let state = self.endpoint(port)?;
        state.set_running(running);
        info!(
            "Endpoint {} {}",
            state.config().label(),
            if running { "started" } else { "stopped" }
        );
        Ok(())
    }

    pub fn stats(&self, port: u16) -> Result<EndpointStats, RegistryError> {
        Ok(self.endpoint(port)?.stats())
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Completed exchanges, oldest first
    pub fn history(&self, port: u16) -> Result<Vec<InterceptedExchange>, RegistryError> {
        Ok(self.endpoint(port)?.history())
    }

    pub fn clear_history(&self, port: u16) -> Result<(), RegistryError> {
        self.endpoint(port)?.clear_history();
        Ok(())
    }

    // ========================================================================
    // Mocks
    // ========================================================================

    pub fn list_mocks(&self, port: u16) -> Result<Vec<Mock>, RegistryError> {
        Ok(self
            .endpoint(port)?
            .mocks()
            .snapshot()
            .iter()
            .map(|m| m.snapshot())
            .collect())
    }

    pub fn get_mock(&self, port: u16, id: &str) -> Result<Mock, RegistryError> {
        self.endpoint(port)?
            .mocks()
            .get(id)
            .map(|m| m.snapshot())
            .ok_or_else(|| RegistryError::MockNotFound(id.to_string()))
    }

    /// Validate and store a new mock
    pub fn create_mock(&self, port: u16, draft: MockDraft) -> Result<Mock, RegistryError> {
        let mock = self.insert_mock(port, draft)?;
        metrics::record_mock_mutation(port, "add");
        info!("Added mock {} ({}) on port {}", mock.id, mock.name, port);
        self.emit(ProxyEvent::MockAdded {
            endpoint: port,
            mock: mock.clone(),
        });
        Ok(mock)
    }

    /// Store an exact mock built from a forwarded exchange
    pub fn auto_create_mock(
        &self,
        port: u16,
        request: &CapturedRequest,
        response: &ResponseDescriptor,
    ) -> Result<Mock, RegistryError> {
        let limit = self.settings().max_captured_body_bytes;
        let draft = draft_from_exchange(request, response, limit)?;
        let mock = self.insert_mock(port, draft)?;
        metrics::record_mock_mutation(port, "auto_create");
        info!("Auto-created mock {} ({}) on port {}", mock.id, mock.name, port);
        self.emit(ProxyEvent::MockAutoCreated {
            endpoint: port,
            mock: mock.clone(),
        });
        Ok(mock)
    }

    fn insert_mock(&self, port: u16, draft: MockDraft) -> Result<Mock, RegistryError> {
        let state = self.endpoint(port)?;
        let mock = Mock::from_draft(port, state.protocol(), draft);
        let stored = Arc::new(StoredMock::compile(mock.clone())?);

        let _guard = self.inner.mutation_lock.lock();
        state.mocks().edit(
            |list| {
                list.push(stored);
                Ok::<(), RegistryError>(())
            },
            |next| self.persist_mocks(port, next),
        )?;
        Ok(mock)
    }

    /// Edit a mock. Its compiled matcher is rebuilt; usage is kept.
    pub fn update_mock(&self, port: u16, id: &str, patch: MockPatch) -> Result<Mock, RegistryError> {
        let mock = self.edit_mock(port, id, |current| Ok(current.apply(patch)))?;
        metrics::record_mock_mutation(port, "update");
        info!("Updated mock {} on port {}", id, port);
        self.emit(ProxyEvent::MockUpdated {
            endpoint: port,
            mock: mock.clone(),
        });
        Ok(mock)
    }

    /// Flip a mock's enabled flag
    pub fn toggle_mock(&self, port: u16, id: &str) -> Result<Mock, RegistryError> {
        let mock = self.edit_mock(port, id, |current| {
            Ok(current.apply(MockPatch {
                enabled: Some(!current.enabled),
                ..Default::default()
            }))
        })?;
        metrics::record_mock_mutation(port, "toggle");
        info!(
            "Mock {} on port {} {}",
            id,
            port,
            if mock.enabled { "enabled" } else { "disabled" }
        );
        self.emit(ProxyEvent::MockToggled {
            endpoint: port,
            mock_id: id.to_string(),
            enabled: mock.enabled,
        });
        Ok(mock)
    }

    /// Overwrite a mock's response with a real one. Matcher, name and
    /// enabled flag are untouched.
    pub fn replace_mock_response(
        &self,
        port: u16,
        id: &str,
        response: &ResponseDescriptor,
    ) -> Result<Mock, RegistryError> {
        let limit = self.settings().max_captured_body_bytes;
        let replacement = response_from_descriptor(response, limit)?;
        let mock = self.edit_mock(port, id, |current| {
            Ok(current.apply(MockPatch {
                response: Some(replacement),
                ..Default::default()
            }))
        })?;
        metrics::record_mock_mutation(port, "replace");
        info!("Replaced response of mock {} on port {}", id, port);
        self.emit(ProxyEvent::MockUpdated {
            endpoint: port,
            mock: mock.clone(),
        });
        Ok(mock)
    }

    fn edit_mock(
        &self,
        port: u16,
        id: &str,
        change: impl FnOnce(&Mock) -> Result<Mock, MockConfigError>,
    ) -> Result<Mock, RegistryError> {
        let state = self.endpoint(port)?;
        let _guard = self.inner.mutation_lock.lock();
        state.mocks().edit(
            |list| -> Result<Mock, RegistryError> {
                let index = list
                    .iter()
                    .position(|m| m.id() == id)
                    .ok_or_else(|| RegistryError::MockNotFound(id.to_string()))?;
                let next = change(list[index].mock())?;
                let edited = list[index].edited(next)?;
                let snapshot = edited.snapshot();
                list[index] = Arc::new(edited);
                Ok(snapshot)
            },
            |next| self.persist_mocks(port, next),
        )
    }

    pub fn delete_mock(&self, port: u16, id: &str) -> Result<Mock, RegistryError> {
        let state = self.endpoint(port)?;
        let removed = {
            let _guard = self.inner.mutation_lock.lock();
            state.mocks().edit(
                |list| -> Result<Mock, RegistryError> {
                    let index = list
                        .iter()
                        .position(|m| m.id() == id)
                        .ok_or_else(|| RegistryError::MockNotFound(id.to_string()))?;
                    Ok(list.remove(index).snapshot())
                },
                |next| self.persist_mocks(port, next),
            )?
        };
        metrics::record_mock_mutation(port, "remove");
        info!("Removed mock {} from port {}", id, port);
        self.emit(ProxyEvent::MockRemoved {
            endpoint: port,
            mock_id: id.to_string(),
        });
        Ok(removed)
    }

    /// Lint the mocks of an endpoint
    pub fn analyze(&self, port: u16) -> Result<MockAnalysisResult, RegistryError> {
        Ok(analyze_mocks(&self.list_mocks(port)?))
    }

    // ========================================================================
    // Drift
    // ========================================================================

    /// Replay an exact mock's request against `upstream` and compare the
    /// answer with the stored response. The answer is returned with the
    /// report so a drifted mock can be replaced from exactly what was compared.
    pub async fn check_drift(
        &self,
        port: u16,
        id: &str,
        upstream: &dyn Upstream,
    ) -> Result<DriftCheck, RegistryError> {
        let mock = self.get_mock(port, id)?;
        if mock.matcher.kind != MatcherKind::Exact {
            return Err(RegistryError::NotReplayable(id.to_string()));
        }

        let request = if mock.protocol.is_database() {
            CapturedRequest::Query(DbQuery::new(mock.matcher.pattern.clone()))
        } else {
            let method = mock.matcher.method.clone().unwrap_or_else(|| "GET".to_string());
            CapturedRequest::Http(HttpRequest::new(method, mock.matcher.pattern.clone()))
        };

        let response = upstream.forward(&request).await?;
        let report = detect_drift(&mock, &response);
        if let Some(report) = &report {
            metrics::record_drift(port, false);
            warn!("Mock {} drifted from {}: {}", id, upstream.target(), report.summary);
        }
        Ok(DriftCheck { report, response })
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    /// Capture pipeline for an endpoint, forwarding to `upstream`
    pub fn pipeline(
        &self,
        port: u16,
        upstream: Arc<dyn Upstream>,
    ) -> Result<CapturePipeline, RegistryError> {
        let endpoint = self.endpoint(port)?;
        Ok(CapturePipeline::new(self.clone(), endpoint, upstream))
    }

    /// Capture pipeline for an HTTP endpoint, forwarding to its configured upstream
    pub fn http_pipeline(&self, port: u16) -> Result<CapturePipeline, RegistryError> {
        let endpoint = self.endpoint(port)?;
        let upstream = HttpUpstream::new(endpoint.config().upstream_base_url())?;
        Ok(CapturePipeline::new(self.clone(), endpoint, Arc::new(upstream)))
    }

    // ========================================================================
    // Persistence helpers
    // ========================================================================

    fn all_mock_snapshots(&self) -> Vec<Mock> {
        let endpoints = self.inner.endpoints.read();
        let mut ports: Vec<u16> = endpoints.keys().copied().collect();
        ports.sort_unstable();
        ports
            .iter()
            .filter_map(|port| endpoints.get(port))
            .flat_map(|state| {
                state
                    .mocks()
                    .snapshot()
                    .iter()
                    .map(|m| m.snapshot())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Persist every mock, with `next` standing in for the mocks of `port`.
    /// Caller holds the mutation lock.
    fn persist_mocks(&self, port: u16, next: &[Arc<StoredMock>]) -> Result<(), RegistryError> {
        let Some(store) = &self.inner.persistence else {
            return Ok(());
        };

        let endpoints = self.inner.endpoints.read();
        let mut ports: Vec<u16> = endpoints.keys().copied().collect();
        ports.sort_unstable();

        let mut all = Vec::new();
        for p in ports {
            if p == port {
                all.extend(next.iter().map(|m| m.snapshot()));
            } else if let Some(state) = endpoints.get(&p) {
                all.extend(state.mocks().snapshot().iter().map(|m| m.snapshot()));
            }
        }
        drop(endpoints);

        store.save_mocks(&all).map_err(|e| {
            error!("Failed to persist mocks: {}", e);
            RegistryError::Persistence(e)
        })
    }

    fn persist_endpoints(&self, endpoints: &[ProxyEndpoint]) -> Result<(), RegistryError> {
        let Some(store) = &self.inner.persistence else {
            return Ok(());
        };
        store.save_endpoints(endpoints).map_err(|e| {
            error!("Failed to persist endpoints: {}", e);
            RegistryError::Persistence(e)
        })
    }
}
