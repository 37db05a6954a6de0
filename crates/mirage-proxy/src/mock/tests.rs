use super::*;
use crate::config::Protocol;
use crate::error::MockConfigError;
use crate::exchange::ClientInfo;
use chrono::Utc;
use std::sync::Arc;

fn stored(protocol: Protocol, matcher: MockMatcher) -> Arc<StoredMock> {
    let response = match protocol {
        Protocol::Http => MockResponse::http(200, "ok"),
        _ => MockResponse::Empty { affected_rows: 0 },
    };
    let mock = Mock::from_draft(9000, protocol, MockDraft::new(matcher, response));
    Arc::new(StoredMock::compile(mock).unwrap())
}

fn insert(store: &MockStore, entry: Arc<StoredMock>) {
    store
        .edit(
            |list| {
                list.push(entry);
                Ok::<(), MockConfigError>(())
            },
            |_| Ok(()),
        )
        .unwrap();
}

fn query(text: &str) -> MatchCandidate<'_> {
    MatchCandidate::Query(text)
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
fn test_exact_beats_contains_beats_regex() {
    let store = MockStore::new();
    let regex = stored(Protocol::Postgres, MockMatcher::regex("users"));
    let contains = stored(Protocol::Postgres, MockMatcher::contains("FROM users"));
    let exact = stored(Protocol::Postgres, MockMatcher::exact("SELECT * FROM users"));
    insert(&store, Arc::clone(&regex));
    insert(&store, Arc::clone(&contains));
    insert(&store, Arc::clone(&exact));

    let opts = MatchOptions::default();
    let hit = store.find_match(&query("SELECT * FROM users"), &opts).unwrap();
    assert_eq!(hit.id(), exact.id());

    let hit = store.find_match(&query("SELECT id FROM users"), &opts).unwrap();
    assert_eq!(hit.id(), contains.id());

    let hit = store.find_match(&query("DELETE users"), &opts).unwrap();
    assert_eq!(hit.id(), regex.id());

    assert!(store.find_match(&query("SELECT 2"), &opts).is_none());
}

#[test]
fn test_ties_go_to_earliest_inserted() {
    let store = MockStore::new();
    let first = stored(Protocol::Mysql, MockMatcher::contains("orders"));
    let second = stored(Protocol::Mysql, MockMatcher::contains("from orders"));
    insert(&store, Arc::clone(&first));
    insert(&store, Arc::clone(&second));

    let hit = store
        .find_match(&query("select * from orders"), &MatchOptions::default())
        .unwrap();
    assert_eq!(hit.id(), first.id());
}

#[test]
fn test_disabled_mocks_never_match() {
    let store = MockStore::new();
    let mock = Mock::from_draft(
        5433,
        Protocol::Postgres,
        MockDraft::new(MockMatcher::exact("SELECT 2"), MockResponse::Empty { affected_rows: 0 })
            .disabled(),
    );
    insert(&store, Arc::new(StoredMock::compile(mock).unwrap()));

    assert!(store
        .find_match(&query("SELECT 2"), &MatchOptions::default())
        .is_none());
}

#[test]
fn test_lookup_has_no_side_effects() {
    let store = MockStore::new();
    let exact = stored(Protocol::Postgres, MockMatcher::exact("SELECT 2"));
    insert(&store, Arc::clone(&exact));

    for _ in 0..5 {
        store.find_match(&query("SELECT 2"), &MatchOptions::default());
    }
    assert_eq!(exact.usage().usage_count, 0);
}

// ============================================================================
// Copy-on-write edits
// ============================================================================

#[test]
fn test_snapshot_is_unaffected_by_later_edits() {
    let store = MockStore::new();
    insert(&store, stored(Protocol::Postgres, MockMatcher::exact("SELECT 2")));
    let before = store.snapshot();

    insert(&store, stored(Protocol::Postgres, MockMatcher::exact("SELECT 3")));
    assert_eq!(before.len(), 1);
    assert_eq!(store.len(), 2);
}

#[test]
fn test_failed_commit_leaves_list_unchanged() {
    let store = MockStore::new();
    let result: Result<(), &str> = store.edit(
        |list| {
            list.push(stored(Protocol::Postgres, MockMatcher::exact("SELECT 2")));
            Ok(())
        },
        |_| Err("disk full"),
    );

    assert_eq!(result, Err("disk full"));
    assert!(store.is_empty());
}

#[test]
fn test_edit_recompiles_matcher_and_keeps_usage() {
    let original = stored(Protocol::Postgres, MockMatcher::exact("SELECT 2"));
    original.record_usage(UsageEntry {
        timestamp: Utc::now(),
        duration_ms: 1,
        query: "SELECT 2".into(),
        client: ClientInfo::default(),
    });

    let edited_mock = original.mock().apply(MockPatch {
        matcher: Some(MockMatcher::regex("^select [0-9]+$")),
        ..Default::default()
    });
    let edited = original.edited(edited_mock).unwrap();

    let opts = MatchOptions::default();
    assert_eq!(edited.matcher().kind(), MatcherKind::Regex);
    assert!(edited.matcher().matches(&query("select 42"), &opts));
    assert!(!original.matcher().matches(&query("select 42"), &opts));
    assert_eq!(edited.usage().usage_count, 1);
    assert_eq!(edited.snapshot().usage.usage_count, 1);
}

#[test]
fn test_compile_rejects_invalid_mock() {
    let mock = Mock::from_draft(
        5433,
        Protocol::Postgres,
        MockDraft::new(MockMatcher::regex("[a-"), MockResponse::Empty { affected_rows: 0 }),
    );
    assert!(matches!(
        StoredMock::compile(mock),
        Err(MockConfigError::InvalidRegex { .. })
    ));

    let mock = Mock::from_draft(
        5433,
        Protocol::Postgres,
        MockDraft::new(MockMatcher::exact("SELECT 1"), MockResponse::http(200, "")),
    );
    assert!(matches!(
        StoredMock::compile(mock),
        Err(MockConfigError::ProtocolMismatch { .. })
    ));
}

#[test]
fn test_concurrent_usage_is_not_lost() {
    let entry = stored(Protocol::Postgres, MockMatcher::exact("SELECT 2"));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let entry = Arc::clone(&entry);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    entry.record_usage(UsageEntry {
                        timestamp: Utc::now(),
                        duration_ms: 0,
                        query: "SELECT 2".into(),
                        client: ClientInfo::default(),
                    });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let usage = entry.usage();
    assert_eq!(usage.usage_count, 400);
    assert_eq!(usage.recent_usage.len(), RECENT_USAGE_LIMIT);
}

#[test]
fn test_http_lookup_through_store() {
    let store = MockStore::new();
    let get = stored(Protocol::Http, MockMatcher::exact("/api/users").with_method("GET"));
    let any = stored(Protocol::Http, MockMatcher::contains("/api/"));
    insert(&store, Arc::clone(&get));
    insert(&store, Arc::clone(&any));

    let opts = MatchOptions::default();
    let hit = store
        .find_match(&MatchCandidate::Http { method: "GET", url: "/api/users/" }, &opts)
        .unwrap();
    assert_eq!(hit.id(), get.id());

    let hit = store
        .find_match(&MatchCandidate::Http { method: "POST", url: "/api/users" }, &opts)
        .unwrap();
    assert_eq!(hit.id(), any.id());
}
