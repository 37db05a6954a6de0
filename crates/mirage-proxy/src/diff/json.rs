//! Typed recursive diff of JSON values.

use super::{DiffCategory, DiffKind, Difference};
use serde_json::{Number, Value};
use std::collections::BTreeSet;

fn child_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn child_index(path: &str, index: &str) -> String {
    format!("{path}[{index}]")
}

fn push(out: &mut Vec<Difference>, path: String, kind: DiffKind, expected: Option<&Value>, actual: Option<&Value>) {
    out.push(Difference {
        category: DiffCategory::Body,
        path,
        kind,
        expected: expected.cloned(),
        actual: actual.cloned(),
    });
}

fn same_type(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// `10` and `10.0` are the same JSON number
fn same_number(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Walk `expected` (mock) and `actual` (upstream) together, appending body
/// differences in walk order. Object keys are visited sorted.
pub(super) fn diff_values(path: &str, expected: &Value, actual: &Value, out: &mut Vec<Difference>) {
    match (expected, actual) {
        (Value::Null, Value::Null) => {}
        (Value::Null, _) | (_, Value::Null) => {
            push(out, path.to_string(), DiffKind::Changed, Some(expected), Some(actual));
        }
        (Value::Object(exp), Value::Object(act)) => {
            let keys: BTreeSet<&String> = exp.keys().chain(act.keys()).collect();
            for key in keys {
                let child = child_key(path, key);
                match (exp.get(key), act.get(key)) {
                    (Some(e), Some(a)) => diff_values(&child, e, a, out),
                    (Some(e), None) => push(out, child, DiffKind::Missing, Some(e), None),
                    (None, Some(a)) => push(out, child, DiffKind::Extra, None, Some(a)),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(exp), Value::Array(act)) => {
            for index in 0..exp.len().max(act.len()) {
                let child = child_index(path, &index.to_string());
                match (exp.get(index), act.get(index)) {
                    (Some(e), Some(a)) => diff_values(&child, e, a, out),
                    (Some(e), None) => push(out, child, DiffKind::Missing, Some(e), None),
                    (None, Some(a)) => push(out, child, DiffKind::Extra, None, Some(a)),
                    (None, None) => {}
                }
            }
            if exp.len() != act.len() {
                push(
                    out,
                    child_index(path, "length"),
                    DiffKind::Changed,
                    Some(&Value::from(exp.len())),
                    Some(&Value::from(act.len())),
                );
            }
        }
        (Value::Number(e), Value::Number(a)) => {
            if !same_number(e, a) {
                push(out, path.to_string(), DiffKind::Changed, Some(expected), Some(actual));
            }
        }
        (e, a) if !same_type(e, a) => {
            push(out, path.to_string(), DiffKind::TypeMismatch, Some(e), Some(a));
        }
        (e, a) => {
            if e != a {
                push(out, path.to_string(), DiffKind::Changed, Some(e), Some(a));
            }
        }
    }
}
