//! Pattern matching of traffic against stored mocks.
//!
//! This module provides:
//! - `CachedValue` - a pattern with its pre-computed lower-case form
//! - `CompiledMatcher` - a mock matcher compiled once at save time
//! - URL and query normalization shared by matching and mock generation
//! - `select` - precedence-aware selection among candidate mocks

use super::store::StoredMock;
use super::types::{MatcherKind, MockMatcher};
use crate::config::Protocol;
use crate::error::MockConfigError;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

/// A unit of traffic to look up, borrowed from the decoded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchCandidate<'a> {
    Http { method: &'a str, url: &'a str },
    Query(&'a str),
}

/// Per-lookup switches taken from the settings snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchOptions {
    pub match_query_string: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            match_query_string: true,
        }
    }
}

/// A pattern with pre-computed ASCII lower-case for case-insensitive matching.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: String,
    pub lower: String,
}

impl CachedValue {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let lower = value.to_ascii_lowercase();
        Self { value, lower }
    }

    #[inline]
    pub fn equals(&self, value: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            value == self.value
        } else {
            value.eq_ignore_ascii_case(&self.value)
        }
    }

    #[inline]
    pub fn contained_in(&self, value: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            value.contains(&self.value)
        } else {
            value.to_ascii_lowercase().contains(&self.lower)
        }
    }
}

/// Compiled form of the pattern itself
#[derive(Debug, Clone)]
enum CompiledPattern {
    /// Normalized query text
    Query(CachedValue),
    /// Normalized URL with and without its query string
    Url { full: String, path_only: String },
    Regex(Arc<Regex>),
}

/// Matcher compiled at save time. Editing a mock recompiles it.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    kind: MatcherKind,
    method: Option<String>,
    pattern: CompiledPattern,
}

impl CompiledMatcher {
    /// Validate and compile `matcher` for an endpoint speaking `protocol`.
    pub fn compile(matcher: &MockMatcher, protocol: Protocol) -> Result<Self, MockConfigError> {
        if matcher.pattern.trim().is_empty() {
            return Err(MockConfigError::EmptyPattern);
        }

        let pattern = match (matcher.kind, protocol) {
            (MatcherKind::Regex, _) => {
                let regex = RegexBuilder::new(&matcher.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| MockConfigError::InvalidRegex {
                        pattern: matcher.pattern.clone(),
                        source,
                    })?;
                CompiledPattern::Regex(Arc::new(regex))
            }
            (MatcherKind::Exact, Protocol::Http) => CompiledPattern::Url {
                full: normalize_url(&matcher.pattern, true),
                path_only: normalize_url(&matcher.pattern, false),
            },
            (MatcherKind::Contains, Protocol::Http) => {
                CompiledPattern::Query(CachedValue::new(matcher.pattern.trim()))
            }
            (_, _) => CompiledPattern::Query(CachedValue::new(normalize_query(&matcher.pattern))),
        };

        let method = match protocol {
            Protocol::Http => matcher.method.as_ref().map(|m| m.trim().to_uppercase()),
            _ => None,
        };

        Ok(Self {
            kind: matcher.kind,
            method,
            pattern,
        })
    }

    pub fn kind(&self) -> MatcherKind {
        self.kind
    }

    /// Whether the candidate satisfies this matcher. No side effects.
    pub fn matches(&self, candidate: &MatchCandidate<'_>, options: &MatchOptions) -> bool {
        match candidate {
            MatchCandidate::Http { method, url } => {
                if let Some(expected) = &self.method {
                    // Methods are case-sensitive on the wire
                    if expected != method {
                        return false;
                    }
                }
                let normalized = normalize_url(url, options.match_query_string);
                match &self.pattern {
                    CompiledPattern::Url { full, path_only } => {
                        let pattern = if options.match_query_string {
                            full
                        } else {
                            path_only
                        };
                        *pattern == normalized
                    }
                    CompiledPattern::Query(value) => value.contained_in(&normalized, true),
                    CompiledPattern::Regex(regex) => regex.is_match(&normalized),
                }
            }
            MatchCandidate::Query(text) => match &self.pattern {
                CompiledPattern::Query(value) => {
                    let normalized = normalize_query(text);
                    match self.kind {
                        MatcherKind::Exact => value.equals(&normalized, false),
                        _ => value.contained_in(&normalized, false),
                    }
                }
                CompiledPattern::Regex(regex) => regex.is_match(text),
                // URL patterns only exist on HTTP endpoints
                CompiledPattern::Url { .. } => false,
            },
        }
    }
}

/// Select the mock that serves `candidate`: among enabled mocks, exact beats
/// contains beats regex, and ties go to the earliest inserted.
pub fn select(
    mocks: &[Arc<StoredMock>],
    candidate: &MatchCandidate<'_>,
    options: &MatchOptions,
) -> Option<Arc<StoredMock>> {
    let mut best: Option<&Arc<StoredMock>> = None;
    for stored in mocks.iter().filter(|m| m.is_enabled()) {
        let kind = stored.matcher().kind();
        if best.is_some_and(|b| b.matcher().kind() <= kind) {
            continue;
        }
        if stored.matcher().matches(candidate, options) {
            best = Some(stored);
            if kind == MatcherKind::Exact {
                break;
            }
        }
    }
    best.cloned()
}

/// Normalize database query text: trim, collapse whitespace runs, drop one
/// trailing `;`.
pub fn normalize_query(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.strip_suffix(';') {
        Some(stripped) => stripped.trim_end().to_string(),
        None => collapsed,
    }
}

/// Normalize a request URL for comparison.
///
/// Scheme and authority are dropped, a trailing slash is removed (the root
/// stays `/`), and query parameters are decoded, sorted and re-encoded.
/// With `include_query == false` only the path is returned.
pub fn normalize_url(raw: &str, include_query: bool) -> String {
    let trimmed = raw.trim();
    let (path, query) = match trimmed.parse::<hyper::Uri>() {
        Ok(uri) => (uri.path().to_string(), uri.query().map(str::to_string)),
        Err(_) => {
            let without_fragment = trimmed.split('#').next().unwrap_or_default();
            match without_fragment.split_once('?') {
                Some((path, query)) => (path.to_string(), Some(query.to_string())),
                None => (without_fragment.to_string(), None),
            }
        }
    };

    let mut path = path.trim_end_matches('/').to_string();
    if path.is_empty() {
        path.push('/');
    } else if !path.starts_with('/') {
        path.insert(0, '/');
    }

    if !include_query {
        return path;
    }

    match query.map(|q| canonical_query(&q)).filter(|q| !q.is_empty()) {
        Some(query) => format!("{path}?{query}"),
        None => path,
    }
}

fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, Option<String>)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_component(key), Some(decode_component(value))),
            None => (decode_component(pair), None),
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)),
            None => urlencoding::encode(key).into_owned(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(method: &'static str, url: &'static str) -> MatchCandidate<'static> {
        MatchCandidate::Http { method, url }
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("/api/users/", true), "/api/users");
        assert_eq!(normalize_url("/", true), "/");
        assert_eq!(normalize_url("", true), "/");
        assert_eq!(normalize_url("/a?b=2&a=1", true), "/a?a=1&b=2");
        assert_eq!(normalize_url("/a?b=2&a=1", false), "/a");
        assert_eq!(normalize_url("/a?name=John%20Doe", true), "/a?name=John%20Doe");
        assert_eq!(normalize_url("/a?name=John+Doe", true), "/a?name=John%20Doe");
        assert_eq!(
            normalize_url("http://localhost:8080/api/users/?x=1", true),
            "/api/users?x=1"
        );
        assert_eq!(normalize_url("/a?", true), "/a");
        assert_eq!(normalize_url("/a?flag&b=1", true), "/a?b=1&flag");
    }

    #[test]
    fn test_normalize_url_falls_back_on_unparseable_input() {
        assert_eq!(normalize_url("/path with space/?b=1&a=2", true), "/path with space?a=2&b=1");
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  SELECT  *\n FROM t ; "), "SELECT * FROM t");
        assert_eq!(normalize_query("SELECT 1;;"), "SELECT 1;");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_http_exact_ignores_trailing_slash_and_query_order() {
        let matcher =
            CompiledMatcher::compile(&MockMatcher::exact("/api/users?b=2&a=1"), Protocol::Http).unwrap();
        let opts = MatchOptions::default();
        assert!(matcher.matches(&http("GET", "/api/users/?a=1&b=2"), &opts));
        assert!(!matcher.matches(&http("GET", "/api/users"), &opts));
        assert!(!matcher.matches(&http("GET", "/api/users?a=1&b=3"), &opts));
    }

    #[test]
    fn test_http_exact_without_query_string_matching() {
        let matcher = CompiledMatcher::compile(&MockMatcher::exact("/api/users"), Protocol::Http).unwrap();
        let opts = MatchOptions {
            match_query_string: false,
        };
        assert!(matcher.matches(&http("GET", "/api/users?page=2"), &opts));
        assert!(!matcher.matches(&http("GET", "/api/users?page=2"), &MatchOptions::default()));
    }

    #[test]
    fn test_http_method_is_case_sensitive() {
        let matcher = CompiledMatcher::compile(
            &MockMatcher::exact("/api/users").with_method("get"),
            Protocol::Http,
        )
        .unwrap();
        let opts = MatchOptions::default();
        assert!(matcher.matches(&http("GET", "/api/users"), &opts));
        assert!(!matcher.matches(&http("get", "/api/users"), &opts));
        assert!(!matcher.matches(&http("POST", "/api/users"), &opts));

        let any = CompiledMatcher::compile(&MockMatcher::exact("/api/users"), Protocol::Http).unwrap();
        assert!(any.matches(&http("DELETE", "/api/users"), &opts));
    }

    #[test]
    fn test_http_contains_and_regex() {
        let opts = MatchOptions::default();
        let contains = CompiledMatcher::compile(&MockMatcher::contains("/users"), Protocol::Http).unwrap();
        assert!(contains.matches(&http("GET", "/api/users/42"), &opts));
        assert!(!contains.matches(&http("GET", "/api/orders"), &opts));

        let regex =
            CompiledMatcher::compile(&MockMatcher::regex(r"^/api/users/\d+$"), Protocol::Http).unwrap();
        assert!(regex.matches(&http("GET", "/API/USERS/42/"), &opts));
        assert!(!regex.matches(&http("GET", "/api/users/abc"), &opts));
    }

    #[test]
    fn test_query_exact_is_case_and_whitespace_insensitive() {
        let matcher =
            CompiledMatcher::compile(&MockMatcher::exact("SELECT * FROM users;"), Protocol::Postgres)
                .unwrap();
        let opts = MatchOptions::default();
        assert!(matcher.matches(&MatchCandidate::Query("select *   from users"), &opts));
        assert!(!matcher.matches(&MatchCandidate::Query("SELECT * FROM users WHERE id = 1"), &opts));
    }

    #[test]
    fn test_query_contains_and_regex() {
        let opts = MatchOptions::default();
        let contains =
            CompiledMatcher::compile(&MockMatcher::contains("from   USERS"), Protocol::Mysql).unwrap();
        assert!(contains.matches(&MatchCandidate::Query("SELECT id FROM users WHERE x"), &opts));

        let regex =
            CompiledMatcher::compile(&MockMatcher::regex(r"^select .* from orders"), Protocol::Mysql)
                .unwrap();
        assert!(regex.matches(&MatchCandidate::Query("SELECT id FROM orders"), &opts));
        assert!(!regex.matches(&MatchCandidate::Query("DELETE FROM orders"), &opts));
    }

    #[test]
    fn test_compile_rejects_invalid_regex_and_empty_pattern() {
        assert!(matches!(
            CompiledMatcher::compile(&MockMatcher::regex("(unclosed"), Protocol::Postgres),
            Err(MockConfigError::InvalidRegex { .. })
        ));
        assert!(matches!(
            CompiledMatcher::compile(&MockMatcher::exact("   "), Protocol::Http),
            Err(MockConfigError::EmptyPattern)
        ));
    }

    #[test]
    fn test_method_is_ignored_for_database_endpoints() {
        let matcher = CompiledMatcher::compile(
            &MockMatcher::exact("SELECT 2").with_method("GET"),
            Protocol::Postgres,
        )
        .unwrap();
        assert!(matcher.matches(&MatchCandidate::Query("SELECT 2"), &MatchOptions::default()));
    }
}
