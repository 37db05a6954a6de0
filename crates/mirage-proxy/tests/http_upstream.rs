//! End-to-end tests against a real local HTTP upstream
//!
//! A small hyper server plays the upstream API. A second hyper server plays
//! the proxy endpoint, wiring the HTTP adapter into the capture pipeline.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use mirage_proxy::adapter::{request_from_hyper, response_to_hyper};
use mirage_proxy::exchange::{
    CapturedRequest, ClientInfo, ExchangeStatus, HttpRequest, ResponseDescriptor,
};
use mirage_proxy::forward::{HttpUpstream, Upstream};
use mirage_proxy::{CapturePipeline, Protocol, ProxyEndpoint, Registry, RegistryError, SettingsPatch, UpstreamError};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// Upstream API whose `/api/version` answer changes with `version`
#[derive(Default)]
struct FakeApi {
    version: AtomicUsize,
    hits: AtomicUsize,
}

async fn handle_api(
    req: Request<Incoming>,
    api: Arc<FakeApi>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    api.hits.fetch_add(1, Ordering::SeqCst);
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    let response = match path.as_str() {
        "/api/users" => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/json")
            .header("x-request-id", format!("req-{}", api.hits.load(Ordering::SeqCst)))
            .header("set-cookie", "session=abc")
            .header("set-cookie", "theme=dark")
            .body(Full::new(Bytes::from(
                json!({"users": [{"id": 1, "name": "ada"}], "query": query}).to_string(),
            ))),
        "/api/version" => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(
                json!({"version": api.version.load(Ordering::SeqCst)}).to_string(),
            ))),
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Response::builder().status(StatusCode::OK).body(Full::new(Bytes::new()))
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"not found"))),
    };
    Ok(response.unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))))
}

async fn start_api() -> (SocketAddr, Arc<FakeApi>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let api = Arc::new(FakeApi::default());
    let shared = Arc::clone(&api);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let api = Arc::clone(&shared);
            tokio::spawn(async move {
                let service = service_fn(move |req| handle_api(req, Arc::clone(&api)));
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    (addr, api)
}

/// Proxy endpoint: one pipeline per listener, one connection guard per TCP connection
async fn start_proxy(pipeline: CapturePipeline) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, peer)) = listener.accept().await else {
                break;
            };
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                let conn = Arc::new(pipeline.open_connection());
                let service = service_fn(move |req: Request<Incoming>| {
                    let pipeline = pipeline.clone();
                    let conn = Arc::clone(&conn);
                    async move {
                        let response = match request_from_hyper(req).await {
                            Ok(request) => pipeline
                                .capture(&conn, request, ClientInfo::from_address(peer.to_string()))
                                .await
                                .map(|outcome| outcome.response),
                            Err(_) => None,
                        };
                        let response = response.unwrap_or_else(|| {
                            ResponseDescriptor::upstream_failure(
                                Protocol::Http,
                                &UpstreamError::Protocol("unreadable request".into()),
                            )
                        });
                        Ok::<_, Infallible>(response_to_hyper(&response))
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    addr
}

fn registry_for(api: SocketAddr, port: u16) -> Registry {
    let registry = Registry::new(Default::default());
    registry
        .add_endpoint(ProxyEndpoint::new(port, Protocol::Http, api.to_string()))
        .unwrap();
    registry
}

#[tokio::test]
async fn test_http_upstream_forwards_path_and_query() {
    let (addr, _api) = start_api().await;
    let upstream = HttpUpstream::new(format!("http://{addr}/")).unwrap();
    assert_eq!(upstream.target(), format!("http://{addr}"));

    let request = CapturedRequest::Http(
        HttpRequest::new("GET", "/api/users?page=2").with_header("accept", "application/json"),
    );
    let ResponseDescriptor::Http(response) = upstream.forward(&request).await.unwrap() else {
        panic!("expected http response");
    };
    assert_eq!(response.status, 200);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["query"], "page=2");
    assert_eq!(response.header("set-cookie"), Some("session=abc, theme=dark"));

    let missing = upstream
        .forward(&CapturedRequest::Http(HttpRequest::new("GET", "/nope")))
        .await
        .unwrap();
    assert!(missing.is_error());
}

#[tokio::test]
async fn test_http_upstream_timeout() {
    let (addr, _api) = start_api().await;
    let upstream =
        HttpUpstream::with_timeout(format!("http://{addr}"), Duration::from_millis(200)).unwrap();

    let err = upstream
        .forward(&CapturedRequest::Http(HttpRequest::new("GET", "/slow")))
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Timeout { .. }));
}

#[tokio::test]
async fn test_proxy_records_then_replays_from_auto_saved_mock() {
    let (api_addr, api) = start_api().await;
    let registry = registry_for(api_addr, 19100);
    registry
        .update_settings(&SettingsPatch {
            auto_save_requests_as_mocks: Some(true),
            ..Default::default()
        })
        .unwrap();
    let proxy = start_proxy(registry.http_pipeline(19100).unwrap()).await;
    let client = reqwest::Client::new();

    let first = client
        .get(format!("http://{proxy}/api/users?b=2&a=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);
    assert!(first.headers().get("x-mirage-mock").is_none());
    let first_body: serde_json::Value = first.json().await.unwrap();

    let mocks = registry.list_mocks(19100).unwrap();
    assert_eq!(mocks.len(), 1);
    assert_eq!(mocks[0].matcher.pattern, "/api/users?a=1&b=2");
    assert_eq!(mocks[0].matcher.method.as_deref(), Some("GET"));

    // Same request, parameters in another order: served without the upstream
    let second = client
        .get(format!("http://{proxy}/api/users?a=1&b=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
    assert_eq!(
        second.headers().get("x-mirage-mock").unwrap().to_str().unwrap(),
        mocks[0].id
    );
    let second_body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(second_body, first_body);
    assert_eq!(api.hits.load(Ordering::SeqCst), 1);

    let history = registry.history(19100).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, ExchangeStatus::Success);
    assert_eq!(history[1].status, ExchangeStatus::Mocked);
    assert_eq!(history[0].client.address, history[1].client.address);
}

#[tokio::test]
async fn test_unreachable_upstream_returns_bad_gateway() {
    // Bind and drop to get a port with nothing listening
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let registry = registry_for(addr, 19101);
    let proxy = start_proxy(registry.http_pipeline(19101).unwrap()).await;

    let response = reqwest::get(format!("http://{proxy}/api/users")).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Bad Gateway");

    let history = registry.history(19101).unwrap();
    assert_eq!(history[0].status, ExchangeStatus::Failed);
    assert_eq!(registry.stats(19101).unwrap().failed, 1);
}

#[tokio::test]
async fn test_check_drift_replays_exact_mock() {
    let (api_addr, api) = start_api().await;
    let registry = registry_for(api_addr, 19102);
    registry
        .update_settings(&SettingsPatch {
            auto_save_requests_as_mocks: Some(true),
            ..Default::default()
        })
        .unwrap();

    let pipeline = registry.http_pipeline(19102).unwrap();
    let conn = pipeline.open_connection();
    pipeline
        .capture(
            &conn,
            CapturedRequest::Http(HttpRequest::new("GET", "/api/version")),
            ClientInfo::default(),
        )
        .await
        .unwrap();
    let mock = registry.list_mocks(19102).unwrap().remove(0);

    let upstream = HttpUpstream::new(format!("http://{api_addr}")).unwrap();
    let agreed = registry.check_drift(19102, &mock.id, &upstream).await.unwrap();
    assert!(!agreed.drifted());

    api.version.store(2, Ordering::SeqCst);
    let hits_before = api.hits.load(Ordering::SeqCst);
    let check = registry.check_drift(19102, &mock.id, &upstream).await.unwrap();
    let report = check.report.clone().expect("drift expected");
    assert_eq!(report.mock_id, mock.id);
    assert_eq!(report.diff.differences[0].path, "version");
    assert_eq!(report.summary, "Differences found in: body");
    assert_eq!(api.hits.load(Ordering::SeqCst), hits_before + 1);

    // Replace from the answer that was compared, without asking again
    let ResponseDescriptor::Http(compared) = &check.response else {
        panic!("expected http response");
    };
    let compared_body: serde_json::Value = serde_json::from_slice(&compared.body).unwrap();
    assert_eq!(compared_body, json!({"version": 2}));
    registry
        .replace_mock_response(19102, &mock.id, &check.response)
        .unwrap();
    assert_eq!(api.hits.load(Ordering::SeqCst), hits_before + 1);
    assert!(!registry
        .check_drift(19102, &mock.id, &upstream)
        .await
        .unwrap()
        .drifted());

    let contains = registry
        .create_mock(
            19102,
            mirage_proxy::mock::MockDraft::new(
                mirage_proxy::mock::MockMatcher::contains("/api"),
                mirage_proxy::mock::MockResponse::http(200, "{}"),
            ),
        )
        .unwrap();
    assert!(matches!(
        registry.check_drift(19102, &contains.id, &upstream).await,
        Err(RegistryError::NotReplayable(_))
    ));
}
