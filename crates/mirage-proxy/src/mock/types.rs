//! Type definitions for stored mocks.

use crate::config::Protocol;
use crate::error::MockConfigError;
use crate::exchange::{ClientInfo, DbResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Number of usage entries kept per mock
pub const RECENT_USAGE_LIMIT: usize = 10;

// ============================================================================
// Matcher Types
// ============================================================================

/// How a mock's pattern is compared against traffic.
///
/// When several enabled mocks match, the kind decides which one wins:
/// exact beats contains beats regex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    Exact,
    Contains,
    Regex,
}

impl MatcherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatcherKind::Exact => "exact",
            MatcherKind::Contains => "contains",
            MatcherKind::Regex => "regex",
        }
    }
}

/// Matcher definition as stored and persisted
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockMatcher {
    #[serde(rename = "type")]
    pub kind: MatcherKind,
    pub pattern: String,
    /// HTTP method restriction; none matches any method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl MockMatcher {
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            kind: MatcherKind::Exact,
            pattern: pattern.into(),
            method: None,
        }
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            kind: MatcherKind::Contains,
            pattern: pattern.into(),
            method: None,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            kind: MatcherKind::Regex,
            pattern: pattern.into(),
            method: None,
        }
    }

    /// Restrict to one HTTP method. Methods are stored upper-case.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into().to_uppercase());
        self
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Response a mock serves
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MockResponse {
    Http {
        #[serde(rename = "statusCode")]
        status_code: u16,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: String,
    },
    Json {
        data: serde_json::Value,
    },
    Rows {
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<serde_json::Value>>,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    Empty {
        #[serde(default, rename = "affectedRows")]
        affected_rows: u64,
    },
}

impl MockResponse {
    /// Plain-text HTTP response
    pub fn http(status_code: u16, body: impl Into<String>) -> Self {
        MockResponse::Http {
            status_code,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// HTTP response with a JSON body and matching content type
    pub fn http_json(status_code: u16, body: &serde_json::Value) -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        MockResponse::Http {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MockResponse::Http { .. } => "http",
            MockResponse::Json { .. } => "json",
            MockResponse::Rows { .. } => "rows",
            MockResponse::Error { .. } => "error",
            MockResponse::Empty { .. } => "empty",
        }
    }

    /// Database result for the non-HTTP variants
    pub fn to_db_result(&self) -> Option<DbResult> {
        match self {
            MockResponse::Http { .. } => None,
            MockResponse::Json { data } => Some(DbResult::Json { data: data.clone() }),
            MockResponse::Rows { columns, rows } => Some(DbResult::Rows {
                columns: columns.clone(),
                rows: rows.clone(),
            }),
            MockResponse::Error { message, code } => Some(DbResult::Error {
                message: message.clone(),
                code: code.clone(),
            }),
            MockResponse::Empty { affected_rows } => Some(DbResult::Empty {
                affected_rows: *affected_rows,
            }),
        }
    }

    pub fn from_db_result(result: &DbResult) -> Self {
        match result {
            DbResult::Json { data } => MockResponse::Json { data: data.clone() },
            DbResult::Rows { columns, rows } => MockResponse::Rows {
                columns: columns.clone(),
                rows: rows.clone(),
            },
            DbResult::Error { message, code } => MockResponse::Error {
                message: message.clone(),
                code: code.clone(),
            },
            DbResult::Empty { affected_rows } => MockResponse::Empty {
                affected_rows: *affected_rows,
            },
        }
    }

    /// Check the response is well-formed and servable by a `protocol` endpoint
    pub fn validate(&self, protocol: Protocol) -> Result<(), MockConfigError> {
        let is_http = matches!(self, MockResponse::Http { .. });
        if is_http != (protocol == Protocol::Http) {
            return Err(MockConfigError::ProtocolMismatch {
                protocol: protocol.as_str(),
                response: self.kind(),
            });
        }

        match self {
            MockResponse::Http {
                status_code,
                headers,
                body,
            } => {
                if !(100..=599).contains(status_code) {
                    return Err(MockConfigError::InvalidStatusCode(*status_code));
                }
                let declares_json = headers.iter().any(|(k, v)| {
                    k.eq_ignore_ascii_case("content-type") && v.to_ascii_lowercase().contains("json")
                });
                if declares_json && !body.trim().is_empty() {
                    serde_json::from_str::<serde_json::Value>(body)
                        .map_err(|e| MockConfigError::MalformedBody(e.to_string()))?;
                }
            }
            MockResponse::Rows { columns, rows } => {
                for (index, row) in rows.iter().enumerate() {
                    if row.len() != columns.len() {
                        return Err(MockConfigError::RowWidth {
                            row: index,
                            expected: columns.len(),
                            actual: row.len(),
                        });
                    }
                }
            }
            MockResponse::Json { .. } | MockResponse::Error { .. } | MockResponse::Empty { .. } => {}
        }
        Ok(())
    }
}

// ============================================================================
// Usage Types
// ============================================================================

/// One entry of a mock's recent-usage log
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    /// Request text that was served
    pub query: String,
    #[serde(default)]
    pub client: ClientInfo,
}

/// Usage statistics, advanced only when a mock actually serves traffic
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockUsage {
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recent_usage: VecDeque<UsageEntry>,
}

impl MockUsage {
    pub fn record(&mut self, entry: UsageEntry) {
        self.usage_count += 1;
        self.last_used_at = Some(entry.timestamp);
        self.recent_usage.push_back(entry);
        while self.recent_usage.len() > RECENT_USAGE_LIMIT {
            self.recent_usage.pop_front();
        }
    }
}

// ============================================================================
// Mock Types
// ============================================================================

/// A stored mock.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mock {
    pub id: String,
    /// Port of the owning endpoint
    pub endpoint: u16,
    pub protocol: Protocol,
    pub name: String,
    pub matcher: MockMatcher,
    pub response: MockResponse,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub usage: MockUsage,
}

impl Mock {
    /// Build a new mock from a draft, assigning id and timestamps
    pub fn from_draft(endpoint: u16, protocol: Protocol, draft: MockDraft) -> Self {
        let now = Utc::now();
        let name = draft
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_name(&draft.matcher));
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint,
            protocol,
            name,
            matcher: normalize_matcher(draft.matcher),
            response: draft.response,
            enabled: draft.enabled,
            created_at: now,
            updated_at: now,
            usage: MockUsage::default(),
        }
    }

    /// Apply an edit. `updated_at` is bumped, usage is left alone.
    pub fn apply(&self, patch: MockPatch) -> Mock {
        let mut next = self.clone();
        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(matcher) = patch.matcher {
            next.matcher = normalize_matcher(matcher);
        }
        if let Some(response) = patch.response {
            next.response = response;
        }
        if let Some(enabled) = patch.enabled {
            next.enabled = enabled;
        }
        next.updated_at = Utc::now();
        next
    }
}

fn normalize_matcher(mut matcher: MockMatcher) -> MockMatcher {
    matcher.method = matcher
        .method
        .map(|m| m.trim().to_uppercase())
        .filter(|m| !m.is_empty());
    matcher
}

fn default_name(matcher: &MockMatcher) -> String {
    const MAX_NAME_CHARS: usize = 60;
    let pattern: String = matcher.pattern.split_whitespace().collect::<Vec<_>>().join(" ");
    let pattern = if pattern.chars().count() > MAX_NAME_CHARS {
        let cut: String = pattern.chars().take(MAX_NAME_CHARS).collect();
        format!("{cut}...")
    } else {
        pattern
    };
    match &matcher.method {
        Some(method) => format!("{} {}", method.to_uppercase(), pattern),
        None => pattern,
    }
}

/// Input for creating a mock
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub matcher: MockMatcher,
    pub response: MockResponse,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl MockDraft {
    pub fn new(matcher: MockMatcher, response: MockResponse) -> Self {
        Self {
            name: None,
            matcher,
            response,
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Partial edit of a mock. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<MockMatcher>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<MockResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}
