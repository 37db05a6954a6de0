//! Health-check / noise filter.
//!
//! Connection pools and ORMs send trivial liveness probes constantly. They
//! would drown real traffic in the history, so they are dropped before the
//! pipeline does anything else.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Normalized liveness probes, per protocol family.
const HEALTH_CHECK_QUERIES: &[&str] = &[
    // SQL
    "select 1",
    "select now()",
    "select current_timestamp",
    "select current_timestamp()",
    "select version()",
    "select 1 from dual",
    "select 1 as ping",
    "/* ping */ select 1",
    "do 1",
    // MongoDB
    "ping",
    "{ping: 1}",
    "{\"ping\": 1}",
    "{\"ping\":1}",
    "db.runcommand({ping: 1})",
    "db.runcommand({ ping: 1 })",
    "db.adminCommand({ping: 1})",
    "ismaster",
    "hello",
    // Redis
    "ping\r\n",
];

static HEALTH_CHECKS: Lazy<HashSet<String>> = Lazy::new(|| {
    HEALTH_CHECK_QUERIES
        .iter()
        .map(|q| normalize_probe(q))
        .collect()
});

/// Normalize query text for probe comparison: trim, lower-case, collapse
/// whitespace runs, drop a single trailing `;`.
pub fn normalize_probe(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .strip_suffix(';')
        .map(|s| s.trim_end().to_string())
        .unwrap_or(collapsed)
}

/// True when `text` is a known liveness probe.
pub fn is_health_check(text: &str) -> bool {
    HEALTH_CHECKS.contains(&normalize_probe(text))
}

/// Decide whether a query should be dropped. Unrecognised input is never
/// filtered.
pub fn should_filter(text: &str, filter_enabled: bool) -> bool {
    filter_enabled && is_health_check(text)
}
