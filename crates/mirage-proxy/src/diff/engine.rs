//! Response comparison.

use super::json::diff_values;
use super::{ComparableResponse, DiffCategory, DiffKind, DiffResult, Difference};
use crate::synthesizer::MOCK_HEADER;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Headers that vary per response and are never compared
pub const IGNORED_HEADERS: &[&str] = &[
    "date",
    "x-request-id",
    "x-correlation-id",
    "x-trace-id",
    "server",
    "x-powered-by",
    "connection",
    "transfer-encoding",
    "content-length",
    MOCK_HEADER,
];

/// Header name prefixes that are never compared
pub const IGNORED_HEADER_PREFIXES: &[&str] = &["x-runtime", "x-request-start"];

pub fn is_ignored_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    IGNORED_HEADERS.contains(&lower.as_str())
        || IGNORED_HEADER_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Compare a real response (`actual`) against a mock's stored one
/// (`expected`). Pure; never fails.
pub fn compare(actual: &ComparableResponse, expected: &ComparableResponse) -> DiffResult {
    let mut differences = Vec::new();

    let status_code_matches = actual.status == expected.status;
    if !status_code_matches {
        differences.push(Difference {
            category: DiffCategory::StatusCode,
            path: "statusCode".to_string(),
            kind: DiffKind::Changed,
            expected: expected.status.map(Value::from),
            actual: actual.status.map(Value::from),
        });
    }

    let before = differences.len();
    diff_headers(&actual.headers, &expected.headers, &mut differences);
    let headers_match = differences.len() == before;

    let before = differences.len();
    diff_body(&actual.body, &expected.body, &mut differences);
    let body_matches = differences.len() == before;

    let summary = summarize(status_code_matches, headers_match, body_matches);
    DiffResult {
        status_code_matches,
        headers_match,
        body_matches,
        differences,
        summary,
    }
}

fn comparable_headers(headers: &HashMap<String, String>) -> BTreeMap<String, &str> {
    headers
        .iter()
        .filter(|(name, _)| !is_ignored_header(name))
        .map(|(name, value)| (name.to_ascii_lowercase(), value.as_str()))
        .collect()
}

fn diff_headers(
    actual: &HashMap<String, String>,
    expected: &HashMap<String, String>,
    out: &mut Vec<Difference>,
) {
    let actual = comparable_headers(actual);
    let expected = comparable_headers(expected);
    let names: BTreeSet<&String> = actual.keys().chain(expected.keys()).collect();

    for name in names {
        let (kind, exp, act) = match (expected.get(name), actual.get(name)) {
            (Some(e), Some(a)) if e == a => continue,
            (Some(e), Some(a)) => (DiffKind::Changed, Some(*e), Some(*a)),
            (Some(e), None) => (DiffKind::Missing, Some(*e), None),
            (None, Some(a)) => (DiffKind::Extra, None, Some(*a)),
            (None, None) => continue,
        };
        out.push(Difference {
            category: DiffCategory::Headers,
            path: format!("headers.{name}"),
            kind,
            expected: exp.map(Value::from),
            actual: act.map(Value::from),
        });
    }
}

/// Empty and `null` bodies compare as the empty string
fn normalize_body(body: &str) -> &str {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        ""
    } else {
        body
    }
}

fn diff_body(actual: &str, expected: &str, out: &mut Vec<Difference>) {
    let actual = normalize_body(actual);
    let expected = normalize_body(expected);

    if !actual.is_empty() && !expected.is_empty() {
        if let (Ok(a), Ok(e)) = (
            serde_json::from_str::<Value>(actual),
            serde_json::from_str::<Value>(expected),
        ) {
            diff_values("", &e, &a, out);
            return;
        }
    }

    if actual != expected {
        out.push(Difference {
            category: DiffCategory::Body,
            path: String::new(),
            kind: DiffKind::Changed,
            expected: Some(Value::from(expected)),
            actual: Some(Value::from(actual)),
        });
    }
}

fn summarize(status_code_matches: bool, headers_match: bool, body_matches: bool) -> String {
    let differing: Vec<&str> = [
        (status_code_matches, DiffCategory::StatusCode),
        (headers_match, DiffCategory::Headers),
        (body_matches, DiffCategory::Body),
    ]
    .iter()
    .filter(|(matches, _)| !matches)
    .map(|(_, category)| category.label())
    .collect();

    if differing.is_empty() {
        "No differences".to_string()
    } else {
        format!("Differences found in: {}", differing.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn json_response(status: u16, body: &str) -> ComparableResponse {
        ComparableResponse::http(status, headers(&[("content-type", "application/json")]), body)
    }

    #[test]
    fn test_identical_responses() {
        let a = json_response(200, r#"{"a": 1}"#);
        let result = compare(&a, &a.clone());
        assert!(result.status_code_matches && result.headers_match && result.body_matches);
        assert!(result.differences.is_empty());
        assert_eq!(result.summary, "No differences");
    }

    #[test]
    fn test_status_and_nested_body_difference() {
        let actual = json_response(404, r#"{"user": {"name": "Bob"}}"#);
        let expected = json_response(200, r#"{"user": {"name": "Alice"}}"#);
        let result = compare(&actual, &expected);

        assert!(!result.status_code_matches);
        assert!(result.headers_match);
        assert!(!result.body_matches);
        assert_eq!(result.differences.len(), 2);
        assert_eq!(result.differences[0].path, "statusCode");
        assert_eq!(result.differences[0].expected, Some(Value::from(200)));
        assert_eq!(result.differences[0].actual, Some(Value::from(404)));
        assert_eq!(result.differences[1].path, "user.name");
        assert_eq!(result.differences[1].kind, DiffKind::Changed);
        assert_eq!(result.summary, "Differences found in: status code, body");
    }

    #[test]
    fn test_ignored_headers_do_not_count() {
        let actual = ComparableResponse::http(
            200,
            headers(&[
                ("Date", "Mon, 01 Jan 2024 00:00:00 GMT"),
                ("X-Request-Id", "abc"),
                ("X-Runtime-Ms", "12"),
                ("Server", "nginx"),
                ("Content-Length", "10"),
            ]),
            "ok",
        );
        let expected = ComparableResponse::http(
            200,
            headers(&[("date", "Tue, 02 Jan 2024 00:00:00 GMT"), ("x-mirage-mock", "m-1")]),
            "ok",
        );
        let result = compare(&actual, &expected);
        assert!(result.is_match(), "{:?}", result.differences);
    }

    #[test]
    fn test_header_differences_sorted_by_name() {
        let actual = ComparableResponse::http(
            200,
            headers(&[("X-B", "2"), ("Content-Type", "text/plain"), ("x-new", "1")]),
            "",
        );
        let expected = ComparableResponse::http(
            200,
            headers(&[("x-b", "3"), ("content-type", "text/plain"), ("x-a", "1")]),
            "",
        );
        let result = compare(&actual, &expected);

        let paths: Vec<_> = result.differences.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["headers.x-a", "headers.x-b", "headers.x-new"]);
        let kinds: Vec<_> = result.differences.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiffKind::Missing, DiffKind::Changed, DiffKind::Extra]);
        assert_eq!(result.summary, "Differences found in: headers");
    }

    #[test]
    fn test_empty_and_null_bodies_are_equal() {
        let a = ComparableResponse::http(204, HashMap::new(), "");
        let b = ComparableResponse::http(204, HashMap::new(), "null");
        assert!(compare(&a, &b).is_match());
    }

    #[test]
    fn test_non_json_bodies_compare_as_text() {
        let actual = ComparableResponse::http(200, HashMap::new(), "hello world");
        let expected = ComparableResponse::http(200, HashMap::new(), "hello");
        let result = compare(&actual, &expected);
        assert_eq!(result.differences.len(), 1);
        assert_eq!(result.differences[0].category, DiffCategory::Body);
        assert_eq!(result.differences[0].path, "");
        assert_eq!(result.differences[0].actual, Some(Value::from("hello world")));
    }

    #[test]
    fn test_json_against_text_body() {
        let actual = ComparableResponse::http(200, HashMap::new(), r#"{"a": 1}"#);
        let expected = ComparableResponse::http(200, HashMap::new(), "plain");
        let result = compare(&actual, &expected);
        assert_eq!(result.differences.len(), 1);
        assert_eq!(result.differences[0].kind, DiffKind::Changed);
    }

    #[test]
    fn test_database_results_have_no_status() {
        let actual = ComparableResponse {
            body: r#"[{"id": 1}]"#.to_string(),
            ..Default::default()
        };
        let expected = ComparableResponse {
            body: r#"[{"id": 1}, {"id": 2}]"#.to_string(),
            ..Default::default()
        };
        let result = compare(&actual, &expected);
        assert!(result.status_code_matches);
        assert!(result.headers_match);
        assert!(!result.body_matches);
    }

    #[test]
    fn test_compare_is_deterministic() {
        let actual = json_response(200, r#"{"z": 1, "a": [1, 2, 3], "m": {"y": 1, "b": 2}}"#);
        let expected = json_response(201, r#"{"z": 2, "a": [1], "m": {"b": 3, "q": 0}}"#);
        let first = compare(&actual, &expected);
        for _ in 0..10 {
            assert_eq!(compare(&actual, &expected), first);
        }
    }
}
