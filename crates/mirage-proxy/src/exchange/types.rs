//! Request and response descriptors exchanged with protocol adapters.

use crate::classifier::Command;
use crate::config::Protocol;
use crate::error::UpstreamError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoded HTTP request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    /// Origin-form target (`/path?query`) or an absolute URL
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Header lookup by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }
}

/// Decoded database query
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbQuery {
    pub text: String,
    /// Adapter-specific structured fields (database name, bind parameters, ...)
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl DbQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fields: serde_json::Map::new(),
        }
    }
}

/// One decoded unit of traffic, as handed to the capture pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CapturedRequest {
    Http(HttpRequest),
    Query(DbQuery),
}

impl CapturedRequest {
    /// Raw text recorded on the exchange: `METHOD url` for HTTP, the query otherwise
    pub fn text(&self) -> String {
        match self {
            CapturedRequest::Http(req) => format!("{} {}", req.method, req.url),
            CapturedRequest::Query(query) => query.text.clone(),
        }
    }

    /// Semantic verb. HTTP requests are classified by their method.
    pub fn command(&self) -> Command {
        match self {
            CapturedRequest::Http(req) => Command::classify(&req.method),
            CapturedRequest::Query(query) => Command::classify(&query.text),
        }
    }

    /// Display verb: the HTTP method as sent, or the classified command
    pub fn verb(&self) -> String {
        match self {
            CapturedRequest::Http(req) => req.method.to_uppercase(),
            CapturedRequest::Query(query) => Command::classify(&query.text).to_string(),
        }
    }
}

/// Real or synthesized HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_lookup(&self.headers, name)
    }
}

/// Database result, one of four shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DbResult {
    /// Document-style result (MongoDB, JSON columns)
    Json { data: serde_json::Value },
    /// Tabular result set
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<serde_json::Value>>,
    },
    /// Server-side error
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Command completed without a result set
    Empty {
        #[serde(default, rename = "affectedRows")]
        affected_rows: u64,
    },
}

impl DbResult {
    pub fn kind(&self) -> &'static str {
        match self {
            DbResult::Json { .. } => "json",
            DbResult::Rows { .. } => "rows",
            DbResult::Error { .. } => "error",
            DbResult::Empty { .. } => "empty",
        }
    }

    /// JSON rendering used for capture summaries and diffing
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DbResult::Json { data } => data.clone(),
            DbResult::Rows { columns, rows } => serde_json::Value::Array(
                rows.iter()
                    .map(|row| {
                        let obj: serde_json::Map<String, serde_json::Value> = columns
                            .iter()
                            .cloned()
                            .zip(row.iter().cloned())
                            .collect();
                        serde_json::Value::Object(obj)
                    })
                    .collect(),
            ),
            DbResult::Error { message, code } => serde_json::json!({
                "error": message,
                "code": code,
            }),
            DbResult::Empty { affected_rows } => serde_json::json!({
                "affectedRows": affected_rows,
            }),
        }
    }
}

/// Protocol-neutral response description, encoded to bytes by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseDescriptor {
    Http(HttpResponse),
    Database(DbResult),
}

impl ResponseDescriptor {
    /// Response handed back to the client when the upstream could not be reached
    pub fn upstream_failure(protocol: Protocol, error: &UpstreamError) -> Self {
        match protocol {
            Protocol::Http => {
                let body = serde_json::json!({ "error": "Bad Gateway", "detail": error.to_string() });
                ResponseDescriptor::Http(
                    HttpResponse::new(502)
                        .with_header("content-type", "application/json")
                        .with_body(body.to_string()),
                )
            }
            _ => ResponseDescriptor::Database(DbResult::Error {
                message: error.to_string(),
                code: Some("MIRAGE_UPSTREAM".to_string()),
            }),
        }
    }

    /// True for HTTP 4xx/5xx and database error results
    pub fn is_error(&self) -> bool {
        match self {
            ResponseDescriptor::Http(resp) => resp.status >= 400,
            ResponseDescriptor::Database(result) => matches!(result, DbResult::Error { .. }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResponseDescriptor::Http(_) => "http",
            ResponseDescriptor::Database(result) => result.kind(),
        }
    }
}

pub(crate) fn header_lookup<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
