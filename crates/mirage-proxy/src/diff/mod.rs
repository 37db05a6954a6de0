//! Structural comparison of a real response against a mock's stored response.
//!
//! # Module Structure
//!
//! - `engine` - [`compare`] over a protocol-neutral [`ComparableResponse`]
//! - `json` - typed recursive diff of JSON bodies
//! - `drift` - [`DriftReport`] construction and unified body diffs

mod drift;
mod engine;
mod json;

use crate::exchange::ResponseDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use drift::{detect_drift, unified_body_diff, DriftReport};
pub use engine::{compare, is_ignored_header, IGNORED_HEADERS, IGNORED_HEADER_PREFIXES};

/// Part of the response a difference was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffCategory {
    StatusCode,
    Headers,
    Body,
}

impl DiffCategory {
    /// Label used in summaries
    pub fn label(&self) -> &'static str {
        match self {
            DiffCategory::StatusCode => "status code",
            DiffCategory::Headers => "headers",
            DiffCategory::Body => "body",
        }
    }
}

/// What kind of difference was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiffKind {
    /// Present on both sides with different values
    Changed,
    /// Present in the mock, absent from the real response
    Missing,
    /// Present in the real response, absent from the mock
    Extra,
    /// JSON values of different types; the subtree is not descended
    TypeMismatch,
}

/// A single difference. `expected` is the mock's side, `actual` the upstream's.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Difference {
    pub category: DiffCategory,
    /// `statusCode`, `headers.<name>`, or a body path such as `user.name`,
    /// `items[0].id`, `[length]` (empty for the body root)
    pub path: String,
    pub kind: DiffKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<serde_json::Value>,
}

/// Outcome of [`compare`]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub status_code_matches: bool,
    pub headers_match: bool,
    pub body_matches: bool,
    pub differences: Vec<Difference>,
    pub summary: String,
}

impl DiffResult {
    pub fn has_differences(&self) -> bool {
        !self.differences.is_empty()
    }

    pub fn is_match(&self) -> bool {
        self.differences.is_empty()
    }
}

/// Protocol-neutral view of a response for comparison.
///
/// Database results have no status or headers; their body is the JSON
/// rendering of the result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComparableResponse {
    pub status: Option<u16>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ComparableResponse {
    pub fn http(status: u16, headers: HashMap<String, String>, body: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            headers,
            body: body.into(),
        }
    }
}

impl From<&ResponseDescriptor> for ComparableResponse {
    fn from(response: &ResponseDescriptor) -> Self {
        match response {
            ResponseDescriptor::Http(resp) => Self {
                status: Some(resp.status),
                headers: resp.headers.clone(),
                body: String::from_utf8_lossy(&resp.body).into_owned(),
            },
            ResponseDescriptor::Database(result) => Self {
                status: None,
                headers: HashMap::new(),
                body: result.to_json().to_string(),
            },
        }
    }
}
