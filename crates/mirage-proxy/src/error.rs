//! Error types for the mirage core.
//!
//! Each failure family gets its own enum so callers can tell a rejected mock
//! apart from an upstream outage. The hot path (classification, filtering,
//! diffing) has no error type at all: it degrades instead of failing.

use std::time::Duration;

/// Malformed wire bytes surfaced by a protocol adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed {protocol} payload: {reason}")]
    Malformed {
        protocol: &'static str,
        reason: String,
    },
    #[error("Truncated {protocol} payload: expected {expected} bytes, got {actual}")]
    Truncated {
        protocol: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Forwarding to the real upstream failed. Recorded on the exchange, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("Connection refused by upstream {0}")]
    ConnectionRefused(String),
    #[error("Connection to upstream {0} was reset")]
    ConnectionReset(String),
    #[error("Upstream {target} timed out after {millis}ms", millis = .after.as_millis())]
    Timeout { target: String, after: Duration },
    #[error("Upstream protocol error: {0}")]
    Protocol(String),
    #[error("Upstream error: {0}")]
    Other(String),
}

/// A mock was rejected at save time. Invalid mocks are never stored.
#[derive(Debug, thiserror::Error)]
pub enum MockConfigError {
    #[error("Invalid regex pattern '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Mock pattern must not be empty")]
    EmptyPattern,
    #[error("Invalid status code {0}")]
    InvalidStatusCode(u16),
    #[error("Malformed response body: {0}")]
    MalformedBody(String),
    #[error("Row {row} has {actual} values but {expected} columns are declared")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("A {response} response cannot be served by a {protocol} endpoint")]
    ProtocolMismatch {
        protocol: &'static str,
        response: &'static str,
    },
    #[error("Response cannot be stored as a mock: {0}")]
    UnstorableBody(String),
}

/// A settings update was rejected; the previous settings stay in effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSettingsError {
    #[error("maxRequestHistory must be between 1 and {max}, got {value}")]
    HistoryLimit { value: i64, max: i64 },
    #[error("maxCapturedBodyBytes must be at least 1, got {0}")]
    CapturedBodyLimit(i64),
}

/// Failure reading or writing the persistence store.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors returned by the registry's programmatic API.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Endpoint not found on port {0}")]
    EndpointNotFound(u16),
    #[error("Endpoint already registered on port {0}")]
    EndpointExists(u16),
    #[error("Invalid endpoint on port {port}: {reason}")]
    InvalidEndpoint { port: u16, reason: String },
    #[error("Mock {0} not found")]
    MockNotFound(String),
    #[error("Mock {0} cannot be replayed: only exact matchers describe a concrete request")]
    NotReplayable(String),
    #[error(transparent)]
    MockConfig(#[from] MockConfigError),
    #[error(transparent)]
    Settings(#[from] InvalidSettingsError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
