//! Capture pipeline: the per-exchange decision path of an endpoint.
//!
//! filter -> requestCaptured -> match -> (synthesize | forward) -> history -> requestCompleted
//!
//! Each exchange reads one settings snapshot. No lock is held across the
//! upstream await, so a slow forward never blocks another connection.

use crate::adapter::ProtocolAdapter;
use crate::config::Settings;
use crate::diff::{detect_drift, DriftReport};
use crate::endpoint::{ConnectionGuard, EndpointState};
use crate::error::DecodeError;
use crate::events::ProxyEvent;
use crate::exchange::{
    summarize_body, CapturedRequest, CapturedResponse, ClientInfo, DbQuery, InterceptedExchange,
    ResponseDescriptor,
};
use crate::filter::should_filter;
use crate::forward::Upstream;
use crate::metrics;
use crate::mock::{is_auto_savable, MatchCandidate, MatchOptions, StoredMock};
use crate::registry::Registry;
use crate::synthesizer;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Result of one captured exchange
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// Completed record, as appended to history
    pub exchange: InterceptedExchange,
    /// What the client receives
    pub response: ResponseDescriptor,
    /// Set when a forwarded response disagreed with an enabled mock
    pub drift: Option<DriftReport>,
}

/// Capture pipeline bound to one endpoint and its upstream.
#[derive(Clone)]
pub struct CapturePipeline {
    registry: Registry,
    endpoint: Arc<EndpointState>,
    upstream: Arc<dyn Upstream>,
}

fn candidate(request: &CapturedRequest) -> MatchCandidate<'_> {
    match request {
        CapturedRequest::Http(req) => MatchCandidate::Http {
            method: &req.method,
            url: &req.url,
        },
        CapturedRequest::Query(query) => MatchCandidate::Query(&query.text),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

impl CapturePipeline {
    pub fn new(registry: Registry, endpoint: Arc<EndpointState>, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            registry,
            endpoint,
            upstream,
        }
    }

    pub fn endpoint(&self) -> &Arc<EndpointState> {
        &self.endpoint
    }

    /// Register a client connection on this pipeline's endpoint
    pub fn open_connection(&self) -> ConnectionGuard {
        self.endpoint.open_connection()
    }

    /// Run one decoded request through the pipeline.
    ///
    /// Returns `None` when the request is a health-check probe that was
    /// dropped; the caller then answers it by forwarding outside of capture.
    pub async fn capture(
        &self,
        connection: &ConnectionGuard,
        request: CapturedRequest,
        client: ClientInfo,
    ) -> Option<CaptureOutcome> {
        let settings = self.registry.settings();
        let port = self.endpoint.port();
        let protocol = self.endpoint.protocol();

        if let CapturedRequest::Query(query) = &request {
            if should_filter(&query.text, settings.filter_health_checks) {
                debug!(port, query = %query.text, "Dropped health-check probe");
                metrics::record_filtered_probe(port);
                return None;
            }
        }

        let started = Instant::now();
        let pending = InterceptedExchange::pending(
            port,
            protocol,
            connection.id(),
            &request,
            client.clone(),
            settings.max_captured_body_bytes,
        );
        self.registry.emit(ProxyEvent::RequestCaptured {
            endpoint: port,
            exchange: pending.clone(),
        });

        let options = MatchOptions {
            match_query_string: settings.match_query_string,
        };
        let matched = if settings.pattern_matching_enabled {
            self.endpoint.mocks().find_match(&candidate(&request), &options)
        } else {
            None
        };

        let (exchange, response, drift) = match matched {
            Some(stored) => {
                let response =
                    synthesizer::serve(&stored, &pending.request, &client, elapsed_ms(started));
                debug!(port, mock_id = stored.id(), request = %pending.request, "Served from mock");
                let captured =
                    CapturedResponse::from_descriptor(&response, settings.max_captured_body_bytes);
                let exchange = pending.into_mocked(stored.id(), captured, elapsed_ms(started));
                (exchange, response, None)
            }
            None => {
                self.forward(pending, &request, &settings, &options, started)
                    .await
            }
        };

        self.endpoint.record(exchange.clone(), settings.max_request_history);
        metrics::record_exchange(port, protocol.as_str(), exchange.status.as_str());
        self.registry.emit(ProxyEvent::RequestCompleted {
            endpoint: port,
            exchange: exchange.clone(),
        });

        Some(CaptureOutcome {
            exchange,
            response,
            drift,
        })
    }

    async fn forward(
        &self,
        pending: InterceptedExchange,
        request: &CapturedRequest,
        settings: &Settings,
        options: &MatchOptions,
        started: Instant,
    ) -> (InterceptedExchange, ResponseDescriptor, Option<DriftReport>) {
        let port = self.endpoint.port();
        debug!(port, request = %pending.request, target = self.upstream.target(), "Forwarding");

        match self.upstream.forward(request).await {
            Ok(response) => {
                let duration = elapsed_ms(started);
                metrics::record_upstream(port, duration, true);
                let captured =
                    CapturedResponse::from_descriptor(&response, settings.max_captured_body_bytes);
                let exchange = pending.into_success(captured, duration);

                // With matching enabled the lookup already came back empty
                let existing = if settings.pattern_matching_enabled {
                    None
                } else {
                    self.endpoint.mocks().find_match(&candidate(request), options)
                };

                let drift = match existing {
                    Some(stored) => self.check_drift(&stored, &response, settings),
                    None => {
                        if settings.auto_save_requests_as_mocks && is_auto_savable(&response) {
                            if let Err(e) = self.registry.auto_create_mock(port, request, &response) {
                                debug!(port, "Exchange not auto-saved: {}", e);
                            }
                        }
                        None
                    }
                };
                (exchange, response, drift)
            }
            Err(e) => {
                let duration = elapsed_ms(started);
                metrics::record_upstream(port, duration, false);
                warn!(
                    "Upstream {} failed for {}: {}",
                    self.upstream.target(),
                    pending.request,
                    e
                );
                let exchange = pending.into_failed(e.to_string(), duration);
                self.registry.emit(ProxyEvent::ProxyError {
                    endpoint: port,
                    exchange_id: Some(exchange.id.clone()),
                    message: e.to_string(),
                });
                let response = ResponseDescriptor::upstream_failure(self.endpoint.protocol(), &e);
                (exchange, response, None)
            }
        }
    }

    fn check_drift(
        &self,
        stored: &StoredMock,
        response: &ResponseDescriptor,
        settings: &Settings,
    ) -> Option<DriftReport> {
        let report = detect_drift(stored.mock(), response)?;
        let port = self.endpoint.port();
        warn!(
            "Mock {} ({}) drifted on port {}: {}",
            stored.id(),
            stored.mock().name,
            port,
            report.summary
        );

        let mut replaced = false;
        if settings.auto_replace_mocks_on_difference {
            match self.registry.replace_mock_response(port, stored.id(), response) {
                Ok(_) => replaced = true,
                Err(e) => warn!("Could not replace mock {}: {}", stored.id(), e),
            }
        }
        metrics::record_drift(port, replaced);
        Some(report)
    }

    /// Record a unit the adapter could not decode as a failed exchange
    pub fn record_decode_failure(
        &self,
        connection: &ConnectionGuard,
        raw: &[u8],
        error: &DecodeError,
        client: ClientInfo,
    ) -> InterceptedExchange {
        let settings = self.registry.settings();
        let port = self.endpoint.port();
        let protocol = self.endpoint.protocol();

        let text = summarize_body(raw, None, settings.max_captured_body_bytes);
        let exchange = InterceptedExchange::pending(
            port,
            protocol,
            connection.id(),
            &CapturedRequest::Query(DbQuery::new(text)),
            client,
            settings.max_captured_body_bytes,
        )
        .into_failed(error.to_string(), 0);

        warn!("Undecodable {} traffic on port {}: {}", protocol, port, error);
        self.endpoint.record(exchange.clone(), settings.max_request_history);
        metrics::record_exchange(port, protocol.as_str(), exchange.status.as_str());
        self.registry.emit(ProxyEvent::ProxyError {
            endpoint: port,
            exchange_id: Some(exchange.id.clone()),
            message: error.to_string(),
        });
        self.registry.emit(ProxyEvent::RequestCompleted {
            endpoint: port,
            exchange: exchange.clone(),
        });
        exchange
    }

    /// Decode `raw` with `adapter`, capture it, and encode the reply.
    ///
    /// `Ok(None)` means the unit was a dropped health-check probe. A decode
    /// failure is recorded and returned; the caller usually closes the
    /// connection.
    pub async fn handle_bytes(
        &self,
        adapter: &dyn ProtocolAdapter,
        connection: &ConnectionGuard,
        raw: &[u8],
        client: ClientInfo,
    ) -> Result<Option<Bytes>, DecodeError> {
        let request = match adapter.decode(raw) {
            Ok(request) => request,
            Err(e) => {
                self.record_decode_failure(connection, raw, &e, client);
                return Err(e);
            }
        };
        Ok(self
            .capture(connection, request, client)
            .await
            .map(|outcome| adapter.encode(&outcome.response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Protocol, ProxyEndpoint};
    use crate::error::UpstreamError;
    use crate::exchange::HttpRequest;
    use async_trait::async_trait;
    use tracing_test::traced_test;

    struct Refusing;

    #[async_trait]
    impl Upstream for Refusing {
        async fn forward(&self, _request: &CapturedRequest) -> Result<ResponseDescriptor, UpstreamError> {
            Err(UpstreamError::ConnectionRefused("localhost:1".to_string()))
        }

        fn target(&self) -> &str {
            "localhost:1"
        }
    }

    fn pipeline() -> CapturePipeline {
        let registry = Registry::new(Settings::default());
        registry
            .add_endpoint(ProxyEndpoint::new(9000, Protocol::Http, "localhost:1"))
            .unwrap();
        registry.pipeline(9000, Arc::new(Refusing)).unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn test_upstream_failure_is_logged() {
        let pipeline = pipeline();
        let conn = pipeline.open_connection();
        let outcome = pipeline
            .capture(
                &conn,
                CapturedRequest::Http(HttpRequest::new("GET", "/api/users")),
                ClientInfo::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.exchange.connection_id, conn.id());
        assert!(logs_contain("Upstream localhost:1 failed for GET /api/users"));
    }

    #[tokio::test]
    async fn test_http_traffic_is_never_health_filtered() {
        let pipeline = pipeline();
        let conn = pipeline.open_connection();
        // Looks like a probe but arrives as an HTTP request
        let outcome = pipeline
            .capture(
                &conn,
                CapturedRequest::Http(HttpRequest::new("GET", "/ping")),
                ClientInfo::default(),
            )
            .await;
        assert!(outcome.is_some());
    }

    #[test]
    fn test_candidate_borrows_request() {
        let request = CapturedRequest::Http(HttpRequest::new("POST", "/x?y=1"));
        assert_eq!(
            candidate(&request),
            MatchCandidate::Http {
                method: "POST",
                url: "/x?y=1"
            }
        );
        let query = CapturedRequest::Query(DbQuery::new("SELECT 2"));
        assert_eq!(candidate(&query), MatchCandidate::Query("SELECT 2"));
    }
}
