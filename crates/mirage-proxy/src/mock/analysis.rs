//! Mock analysis for detecting duplicates, shadowing and catch-all patterns.
//!
//! Matching silently picks one mock by precedence, so a mock that can never
//! win is easy to miss. This analysis reports those cases; it never changes
//! what is stored.

use super::matcher::{normalize_query, normalize_url};
use super::types::{MatcherKind, Mock};
use crate::config::Protocol;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Warning produced by [`analyze_mocks`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MockWarning {
    pub warning_type: WarningType,
    pub message: String,
    pub mock_id: String,
    /// Mock that wins instead (for duplicate and shadow warnings)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadowed_by: Option<String>,
}

/// Types of warnings that can be generated
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    /// Same kind, pattern and method as an earlier mock
    ExactDuplicate,
    /// An earlier contains mock matches everything this one does
    Shadowed,
    /// Regex that matches any input
    CatchAll,
}

impl WarningType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningType::ExactDuplicate => "exact_duplicate",
            WarningType::Shadowed => "shadowed",
            WarningType::CatchAll => "catch_all",
        }
    }
}

/// Result of mock analysis
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MockAnalysisResult {
    pub warnings: Vec<MockWarning>,
}

impl MockAnalysisResult {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    fn add(&mut self, warning: MockWarning) {
        self.warnings.push(warning);
    }
}

/// Comparable form of a matcher, following the matching rules of its protocol
fn match_key(mock: &Mock) -> String {
    let pattern = &mock.matcher.pattern;
    match (mock.protocol, mock.matcher.kind) {
        (Protocol::Http, MatcherKind::Exact) => normalize_url(pattern, true),
        (Protocol::Http, _) => pattern.trim().to_string(),
        (_, MatcherKind::Regex) => pattern.clone(),
        (_, _) => normalize_query(pattern).to_ascii_lowercase(),
    }
}

/// `earlier` restricts to a method `later` also requires, or to none at all
fn method_covers(earlier: &Option<String>, later: &Option<String>) -> bool {
    match (earlier, later) {
        (None, _) => true,
        (Some(a), Some(b)) => a == b,
        (Some(_), None) => false,
    }
}

/// Analyze the enabled mocks of one endpoint, in insertion order.
pub fn analyze_mocks(mocks: &[Mock]) -> MockAnalysisResult {
    let mut result = MockAnalysisResult::default();
    let enabled: Vec<&Mock> = mocks.iter().filter(|m| m.enabled).collect();
    let mut seen: HashMap<(MatcherKind, Option<String>, String), &Mock> = HashMap::new();

    for (index, mock) in enabled.iter().enumerate() {
        let key = match_key(mock);

        let identity = (mock.matcher.kind, mock.matcher.method.clone(), key.clone());
        if let Some(first) = seen.get(&identity) {
            result.add(MockWarning {
                warning_type: WarningType::ExactDuplicate,
                message: format!(
                    "Mock '{}' has the same {} pattern as '{}' and will never be served",
                    mock.name,
                    mock.matcher.kind.as_str(),
                    first.name
                ),
                mock_id: mock.id.clone(),
                shadowed_by: Some(first.id.clone()),
            });
            continue;
        }
        seen.insert(identity, *mock);

        if mock.matcher.kind == MatcherKind::Regex {
            let catch_all = RegexBuilder::new(&mock.matcher.pattern)
                .case_insensitive(true)
                .build()
                .map(|re| re.is_match(""))
                .unwrap_or(false);
            if catch_all {
                result.add(MockWarning {
                    warning_type: WarningType::CatchAll,
                    message: format!(
                        "Mock '{}' uses a regex that matches every request not served by an exact or contains mock",
                        mock.name
                    ),
                    mock_id: mock.id.clone(),
                    shadowed_by: None,
                });
            }
        }

        if mock.matcher.kind == MatcherKind::Contains {
            let shadow = enabled[..index].iter().find(|earlier| {
                earlier.matcher.kind == MatcherKind::Contains
                    && method_covers(&earlier.matcher.method, &mock.matcher.method)
                    && key.contains(&match_key(earlier))
            });
            if let Some(earlier) = shadow {
                result.add(MockWarning {
                    warning_type: WarningType::Shadowed,
                    message: format!(
                        "Mock '{}' is shadowed by earlier contains mock '{}'",
                        mock.name, earlier.name
                    ),
                    mock_id: mock.id.clone(),
                    shadowed_by: Some(earlier.id.clone()),
                });
            }
        }
    }

    result
}
