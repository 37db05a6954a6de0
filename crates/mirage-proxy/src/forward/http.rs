//! HTTP upstream backed by `reqwest`.

use super::Upstream;
use crate::error::UpstreamError;
use crate::exchange::{CapturedRequest, HttpRequest, HttpResponse, ResponseDescriptor};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Request headers not copied to the upstream request
const SKIPPED_REQUEST_HEADERS: &[&str] = &["host", "content-length", "connection", "transfer-encoding"];

/// Forwards HTTP requests to a base URL, keeping path and query.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        Self::with_timeout(base_url, DEFAULT_UPSTREAM_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| UpstreamError::Other(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    /// Full upstream URL for a request target. Absolute targets keep only
    /// their path and query.
    fn target_url(&self, url: &str) -> String {
        let path_and_query = match url.parse::<hyper::Uri>() {
            Ok(uri) if uri.scheme().is_some() => uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string()),
            _ if url.starts_with('/') => url.to_string(),
            _ => format!("/{url}"),
        };
        format!("{}{}", self.base_url, path_and_query)
    }

    fn map_error(&self, error: reqwest::Error) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout {
                target: self.base_url.clone(),
                after: self.timeout,
            }
        } else if error.is_connect() {
            UpstreamError::ConnectionRefused(self.base_url.clone())
        } else if error.is_body() || error.is_decode() {
            UpstreamError::ConnectionReset(self.base_url.clone())
        } else {
            UpstreamError::Other(error.to_string())
        }
    }

    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, UpstreamError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| UpstreamError::Protocol(format!("Invalid HTTP method '{}'", request.method)))?;
        let url = self.target_url(&request.url);
        debug!("Forwarding {} to: {}", request.method, url);

        let mut builder = self.client.request(method, &url);
        for (key, value) in &request.headers {
            if !SKIPPED_REQUEST_HEADERS
                .iter()
                .any(|skip| key.eq_ignore_ascii_case(skip))
            {
                builder = builder.header(key, value);
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Flatten upstream response headers. Repeated headers (`set-cookie`) are
/// joined with `, `; values that are not visible ASCII are decoded lossily.
fn collect_headers(map: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes());
        headers
            .entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    headers
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn forward(&self, request: &CapturedRequest) -> Result<ResponseDescriptor, UpstreamError> {
        let CapturedRequest::Http(http) = request else {
            return Err(UpstreamError::Protocol(
                "HTTP upstream cannot forward a database query".to_string(),
            ));
        };

        let start = Instant::now();
        match self.send(http).await {
            Ok(response) => {
                debug!(
                    status = response.status,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Upstream responded"
                );
                Ok(ResponseDescriptor::Http(response))
            }
            Err(e) => {
                warn!("Failed to forward request to upstream {}: {}", self.base_url, e);
                Err(e)
            }
        }
    }

    fn target(&self) -> &str {
        &self.base_url
    }
}
