//! Drift reports: a mock that no longer agrees with its upstream.

use super::engine::compare;
use super::{ComparableResponse, DiffResult};
use crate::exchange::ResponseDescriptor;
use crate::mock::Mock;
use crate::synthesizer::build_response;
use serde::{Deserialize, Serialize};
use similar::TextDiff;

/// Differences between a mock and the real upstream for the same request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftReport {
    pub endpoint: u16,
    pub mock_id: String,
    pub mock_name: String,
    pub diff: DiffResult,
    pub summary: String,
    /// Unified diff of the bodies, mock first; absent when the bodies agree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_diff: Option<String>,
}

/// Compare `actual` against what `mock` would serve. `None` when they agree.
pub fn detect_drift(mock: &Mock, actual: &ResponseDescriptor) -> Option<DriftReport> {
    let expected = ComparableResponse::from(&build_response(mock));
    let actual = ComparableResponse::from(actual);
    let diff = compare(&actual, &expected);
    if diff.is_match() {
        return None;
    }

    let body_diff = if diff.body_matches {
        None
    } else {
        Some(unified_body_diff(&expected.body, &actual.body))
    };

    Some(DriftReport {
        endpoint: mock.endpoint,
        mock_id: mock.id.clone(),
        mock_name: mock.name.clone(),
        summary: diff.summary.clone(),
        diff,
        body_diff,
    })
}

/// JSON bodies are pretty-printed first so the diff is line oriented.
fn pretty(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}

/// Unified text diff from the mock body to the upstream body
pub fn unified_body_diff(expected: &str, actual: &str) -> String {
    let expected = pretty(expected);
    let actual = pretty(actual);
    TextDiff::from_lines(&expected, &actual)
        .unified_diff()
        .context_radius(3)
        .header("mock", "upstream")
        .to_string()
}
