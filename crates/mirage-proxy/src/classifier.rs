//! Command classification for captured queries.
//!
//! Maps raw query text to a semantic verb. SQL statements are recognised by
//! their leading keyword; MongoDB shell calls (`db.<collection>.<op>(...)`)
//! by the first operation token found after `db.`. Classification is total: anything unrecognised is
//! [`Command::Unknown`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Semantic verb of a captured query or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    Alter,
    Truncate,
    Grant,
    Revoke,
    Begin,
    Commit,
    Rollback,
    Explain,
    Describe,
    Show,
    Use,
    Set,
    Call,
    Execute,
    Prepare,
    Find,
    Aggregate,
    Count,
    Distinct,
    Unknown,
}

/// SQL verbs accepted as a statement's leading keyword.
const SQL_VERBS: [Command; 21] = [
    Command::Select,
    Command::Insert,
    Command::Update,
    Command::Delete,
    Command::Create,
    Command::Drop,
    Command::Alter,
    Command::Truncate,
    Command::Grant,
    Command::Revoke,
    Command::Begin,
    Command::Commit,
    Command::Rollback,
    Command::Explain,
    Command::Describe,
    Command::Show,
    Command::Use,
    Command::Set,
    Command::Call,
    Command::Execute,
    Command::Prepare,
];

/// Shell operations, in tie-break order. Text after `db.` containing more
/// than one token (`findOneAndUpdate`, `counters.drop`) resolves to the first
/// one listed here. This ordering is a heuristic kept for compatibility, not a
/// guarantee.
const SHELL_OPERATIONS: [Command; 9] = [
    Command::Find,
    Command::Insert,
    Command::Update,
    Command::Delete,
    Command::Aggregate,
    Command::Count,
    Command::Distinct,
    Command::Drop,
    Command::Create,
];

static SQL_VERB_RE: Lazy<Regex> = Lazy::new(|| {
    let verbs: Vec<&str> = SQL_VERBS.iter().map(|c| c.as_str()).collect();
    Regex::new(&format!(r"(?i)^\s*({})\b", verbs.join("|"))).expect("static SQL verb regex")
});

static SHELL_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bdb\.([^.\s()]+)\.([a-z_$][\w$]*)\s*\(").expect("static shell regex")
});

impl Command {
    /// Classify raw query text. Never fails.
    pub fn classify(text: &str) -> Command {
        if text.trim().is_empty() {
            return Command::Unknown;
        }

        if let Some(caps) = SQL_VERB_RE.captures(text) {
            return Command::from_sql_verb(&caps[1]).unwrap_or(Command::Unknown);
        }

        if let Some(call) = SHELL_CALL_RE.find(text) {
            // Collection, operation and arguments all take part
            let tail = text[call.start() + "db.".len()..].to_ascii_lowercase();
            return SHELL_OPERATIONS
                .iter()
                .copied()
                .find(|op| tail.contains(&op.as_str().to_ascii_lowercase()))
                .unwrap_or(Command::Unknown);
        }

        Command::Unknown
    }

    /// Classify a payload that may not be text at all.
    pub fn classify_bytes(bytes: &[u8]) -> Command {
        match std::str::from_utf8(bytes) {
            Ok(text) => Command::classify(text),
            Err(_) => Command::Unknown,
        }
    }

    fn from_sql_verb(verb: &str) -> Option<Command> {
        SQL_VERBS
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(verb))
    }

    /// Upper-case name of the verb
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Select => "SELECT",
            Command::Insert => "INSERT",
            Command::Update => "UPDATE",
            Command::Delete => "DELETE",
            Command::Create => "CREATE",
            Command::Drop => "DROP",
            Command::Alter => "ALTER",
            Command::Truncate => "TRUNCATE",
            Command::Grant => "GRANT",
            Command::Revoke => "REVOKE",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Rollback => "ROLLBACK",
            Command::Explain => "EXPLAIN",
            Command::Describe => "DESCRIBE",
            Command::Show => "SHOW",
            Command::Use => "USE",
            Command::Set => "SET",
            Command::Call => "CALL",
            Command::Execute => "EXECUTE",
            Command::Prepare => "PREPARE",
            Command::Find => "FIND",
            Command::Aggregate => "AGGREGATE",
            Command::Count => "COUNT",
            Command::Distinct => "DISTINCT",
            Command::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_verbs() {
        assert_eq!(Command::classify("SELECT * FROM t"), Command::Select);
        assert_eq!(Command::classify("  select id from users"), Command::Select);
        assert_eq!(
            Command::classify("insert into t values (1)"),
            Command::Insert
        );
        assert_eq!(Command::classify("Update t set a = 1"), Command::Update);
        assert_eq!(Command::classify("BEGIN"), Command::Begin);
        assert_eq!(Command::classify("rollback;"), Command::Rollback);
        assert_eq!(Command::classify("EXPLAIN SELECT 1"), Command::Explain);
        assert_eq!(Command::classify("SET search_path TO app"), Command::Set);
    }

    #[test]
    fn test_sql_verb_must_be_whole_word() {
        assert_eq!(Command::classify("SELECTED things"), Command::Unknown);
        assert_eq!(Command::classify("settings"), Command::Unknown);
    }

    #[test]
    fn test_sql_verb_must_lead() {
        assert_eq!(Command::classify("WITH x AS (SELECT 1) SELECT * FROM x"), Command::Unknown);
    }

    #[test]
    fn test_shell_operations() {
        assert_eq!(Command::classify("db.users.find()"), Command::Find);
        assert_eq!(Command::classify("DB.USERS.FIND()"), Command::Find);
        assert_eq!(
            Command::classify("db.orders.insertOne({\"a\": 1})"),
            Command::Insert
        );
        assert_eq!(
            Command::classify("db.orders.aggregate([{\"$match\": {}}])"),
            Command::Aggregate
        );
        assert_eq!(
            Command::classify("db.orders.countDocuments({})"),
            Command::Count
        );
        assert_eq!(Command::classify("db.orders.distinct('x')"), Command::Distinct);
        assert_eq!(Command::classify("db.orders.createIndex({a: 1})"), Command::Create);
    }

    #[test]
    fn test_shell_tie_break_order() {
        // "find" precedes "update" in the enumeration
        assert_eq!(
            Command::classify("db.users.findOneAndUpdate({}, {})"),
            Command::Find
        );
        // The collection name takes part in the lookup too
        assert_eq!(Command::classify("db.accounts.find()"), Command::Find);
        assert_eq!(Command::classify("db.counters.drop()"), Command::Count);
        assert_eq!(Command::classify("db.finders.insertOne({})"), Command::Find);
        assert_eq!(Command::classify("db.logs.drop()"), Command::Drop);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(Command::classify(""), Command::Unknown);
        assert_eq!(Command::classify("   \n\t"), Command::Unknown);
        assert_eq!(
            Command::classify("db.collection.unknownOperation()"),
            Command::Unknown
        );
        assert_eq!(Command::classify("PING"), Command::Unknown);
        assert_eq!(Command::classify("db.users"), Command::Unknown);
    }

    #[test]
    fn test_classify_bytes() {
        assert_eq!(Command::classify_bytes(b"SELECT 1"), Command::Select);
        assert_eq!(Command::classify_bytes(&[0xff, 0xfe, 0x00]), Command::Unknown);
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(Command::Aggregate.to_string(), "AGGREGATE");
        assert_eq!(serde_json::to_string(&Command::Select).unwrap(), r#""SELECT""#);
    }
}
