//! HTTP/1.1 adapter over hyper types.

use super::ProtocolAdapter;
use crate::config::Protocol;
use crate::error::DecodeError;
use crate::exchange::{CapturedRequest, DbResult, HttpRequest, HttpResponse, ResponseDescriptor};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode, Uri};
use std::collections::HashMap;
use std::fmt::Display;
use tracing::warn;

const PROTOCOL: &str = "http";

/// Hop-by-hop headers recomputed on encode
const HOP_BY_HOP: &[&str] = &["content-length", "transfer-encoding", "connection"];

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed {
        protocol: PROTOCOL,
        reason: reason.into(),
    }
}

/// Collect a hyper request into a [`CapturedRequest`]
pub async fn request_from_hyper<B>(req: Request<B>) -> Result<CapturedRequest, DecodeError>
where
    B: Body,
    B::Error: Display,
{
    let (parts, body) = req.into_parts();
    let headers: HashMap<String, String> = parts
        .headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
    let body = body
        .collect()
        .await
        .map_err(|e| malformed(format!("failed to read body: {e}")))?
        .to_bytes();

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    Ok(CapturedRequest::Http(HttpRequest {
        method: parts.method.as_str().to_string(),
        url,
        headers,
        body,
    }))
}

/// Build a hyper response from a descriptor.
///
/// Database results reaching an HTTP client are rendered as JSON, with status
/// 502 for an error result.
pub fn response_to_hyper(response: &ResponseDescriptor) -> Response<Full<Bytes>> {
    let http = as_http(response);
    let status = StatusCode::from_u16(http.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = Response::builder().status(status);
    for (name, value) in &http.headers {
        if HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => builder = builder.header(name, value),
            _ => warn!("Dropping invalid response header {:?}", name),
        }
    }

    builder.body(Full::new(http.body.clone())).unwrap_or_else(|_| {
        let mut fallback = Response::new(Full::new(Bytes::from_static(b"Response build error")));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

fn as_http(response: &ResponseDescriptor) -> HttpResponse {
    match response {
        ResponseDescriptor::Http(resp) => resp.clone(),
        ResponseDescriptor::Database(result) => {
            let status = if matches!(result, DbResult::Error { .. }) { 502 } else { 200 };
            HttpResponse::new(status)
                .with_header("content-type", "application/json")
                .with_body(result.to_json().to_string())
        }
    }
}

/// Decodes raw HTTP/1.x request bytes; encodes responses as HTTP/1.1.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAdapter;

impl HttpAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ProtocolAdapter for HttpAdapter {
    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    fn decode(&self, bytes: &[u8]) -> Result<CapturedRequest, DecodeError> {
        let head_end = find_head_end(bytes).ok_or_else(|| malformed("incomplete request head"))?;
        let head = std::str::from_utf8(&bytes[..head_end])
            .map_err(|_| malformed("request head is not valid UTF-8"))?;
        let mut lines = head.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ');
        let (Some(method), Some(target), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed(format!("bad request line {request_line:?}")));
        };
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| malformed(format!("bad method {method:?}")))?;
        target
            .parse::<Uri>()
            .map_err(|e| malformed(format!("bad request target {target:?}: {e}")))?;
        if !version.starts_with("HTTP/1.") {
            return Err(malformed(format!("unsupported version {version:?}")));
        }

        let mut headers = HashMap::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| malformed(format!("bad header line {line:?}")))?;
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|_| malformed(format!("bad header name {name:?}")))?;
            headers.insert(name.as_str().to_string(), value.trim().to_string());
        }

        let body = &bytes[head_end + 4..];
        let request = HttpRequest {
            method: method.as_str().to_string(),
            url: target.to_string(),
            headers,
            body: Bytes::new(),
        };
        let body = match request.header("content-length") {
            Some(raw) => {
                let expected: usize = raw
                    .parse()
                    .map_err(|_| malformed(format!("bad content-length {raw:?}")))?;
                if body.len() < expected {
                    return Err(DecodeError::Truncated {
                        protocol: PROTOCOL,
                        expected,
                        actual: body.len(),
                    });
                }
                Bytes::copy_from_slice(&body[..expected])
            }
            None => Bytes::copy_from_slice(body),
        };

        Ok(CapturedRequest::Http(HttpRequest { body, ..request }))
    }

    fn encode(&self, response: &ResponseDescriptor) -> Bytes {
        let http = as_http(response);
        let reason = StatusCode::from_u16(http.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");

        let mut names: Vec<&String> = http
            .headers
            .keys()
            .filter(|name| !HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name)))
            .collect();
        names.sort();

        let mut out = format!("HTTP/1.1 {} {}\r\n", http.status, reason);
        for name in names {
            out.push_str(&format!("{}: {}\r\n", name, http.headers[name]));
        }
        out.push_str(&format!("content-length: {}\r\n\r\n", http.body.len()));

        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&http.body);
        Bytes::from(bytes)
    }
}

fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;

    #[test]
    fn test_decode_request_with_body() {
        let raw = b"POST /api/users?b=2 HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"name\":\"x\"}\n";
        let CapturedRequest::Http(req) = HttpAdapter.decode(raw).unwrap() else {
            panic!("expected http request");
        };
        assert_eq!(req.method, "POST");
        assert_eq!(req.url, "/api/users?b=2");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.body.as_ref(), b"{\"name\":\"x\"}\n");
    }

    #[test]
    fn test_decode_truncated_body() {
        let raw = b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc";
        assert_eq!(
            HttpAdapter.decode(raw).unwrap_err(),
            DecodeError::Truncated {
                protocol: "http",
                expected: 10,
                actual: 3
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            HttpAdapter.decode(b"\x16\x03\x01\x02\x00"),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            HttpAdapter.decode(b"GET\r\n\r\n"),
            Err(DecodeError::Malformed { .. })
        ));
        assert!(matches!(
            HttpAdapter.decode(b"GET / SPDY/3\r\n\r\n"),
            Err(DecodeError::Malformed { .. })
        ));
    }

    #[test]
    fn test_encode_recomputes_content_length() {
        let response = ResponseDescriptor::Http(
            HttpResponse::new(404)
                .with_header("Content-Length", "999")
                .with_header("x-b", "2")
                .with_body("nope"),
        );
        let encoded = HttpAdapter.encode(&response);
        assert_eq!(
            std::str::from_utf8(&encoded).unwrap(),
            "HTTP/1.1 404 Not Found\r\nx-b: 2\r\ncontent-length: 4\r\n\r\nnope"
        );
    }

    #[test]
    fn test_upstream_failure_becomes_502() {
        let failure = ResponseDescriptor::upstream_failure(
            Protocol::Http,
            &UpstreamError::ConnectionRefused("localhost:1".into()),
        );
        let response = response_to_hyper(&failure);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_database_result_rendered_as_json() {
        let response = response_to_hyper(&ResponseDescriptor::Database(DbResult::Empty {
            affected_rows: 3,
        }));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_request_from_hyper_collects_body() {
        let req = Request::builder()
            .method("PUT")
            .uri("http://example.com/api/items/1?x=1")
            .header("X-Trace", "abc")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();

        let CapturedRequest::Http(captured) = request_from_hyper(req).await.unwrap() else {
            panic!("expected http request");
        };
        assert_eq!(captured.method, "PUT");
        assert_eq!(captured.url, "/api/items/1?x=1");
        assert_eq!(captured.header("x-trace"), Some("abc"));
        assert_eq!(captured.body.as_ref(), b"payload");
    }
}
