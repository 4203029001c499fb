//! Reference resolution
//!
//! Documents may embed live pointers to other documents: any string
//! containing the marker `REF::` names another key, and resolution
//! replaces it with that document's (recursively resolved) JSON tree.
//!
//! Resolution is a pure transformation over a decoded value — it never
//! mutates the store. Errors are data, not exceptions: a missing key or
//! unparseable target becomes an inline `REF::ERR ...` string in place
//! of the reference, because the resolver has no channel back to a
//! caller mid-traversal.
//!
//! The `depth` budget strictly decreases per hop, which is the only
//! thing bounding a reference cycle. A depth of 0 is an explicit
//! opt-out: the value comes back untouched.

use serde_json::Value;

use crate::index::Index;

/// Marker prefix identifying a reference string.
pub const REF_MARKER: &str = "REF::";

/// Expands every reference in `value`, following at most `depth` hops.
///
/// Arrays resolve element-wise and objects value-wise at the same
/// depth, preserving order, length and keys; only crossing into a
/// referenced document consumes a hop. Non-string scalars pass through
/// unchanged.
pub fn resolve_references(index: &Index, value: &Value, depth: usize) -> Value {
    if depth < 1 {
        return value.clone();
    }

    match value {
        Value::String(s) if s.contains(REF_MARKER) => resolve_marker(index, s, depth),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_references(index, item, depth))
                .collect(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .map(|(key, nested)| (key.clone(), resolve_references(index, nested, depth)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolves a single marker string by key lookup.
fn resolve_marker(index: &Index, raw: &str, depth: usize) -> Value {
    let key = raw.replacen(REF_MARKER, "", 1);

    match index.lookup(&key) {
        Some(doc) => match doc.read_value(index.dir()) {
            Ok(parsed) => resolve_references(index, &parsed, depth - 1),
            Err(e) => Value::String(format!(
                "REF::ERR key '{}' cannot be parsed into json: {}",
                key, e
            )),
        },
        None => Value::String(format!("REF::ERR key '{}' not found", key)),
    }
}
