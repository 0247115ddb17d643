//! Recursive immutability for state values.

use crate::Value;
use std::collections::HashSet;

/// Recursively freeze a value in place and return it.
///
/// Primitives and already-frozen containers are returned untouched; the walk
/// never descends below a frozen node, so freezing a new snapshot that shares
/// most of its structure with the previous one only visits the new nodes.
/// Binary buffers are skipped and stay writable.
///
/// The container is marked before its children are visited, which also makes
/// the walk terminate on cyclic graphs.
///
/// # Examples
///
/// ```
/// use tirea_store::{deep_freeze, Value};
/// use serde_json::json;
///
/// let v = deep_freeze(Value::from(json!({"a": {"b": 1}})));
/// assert!(v.get("a").unwrap().is_frozen());
/// assert!(v.insert("c", 2).is_err());
/// ```
pub fn deep_freeze(value: Value) -> Value {
    freeze_node(&value);
    value
}

fn freeze_node(value: &Value) {
    if !value.freeze_shallow() {
        return;
    }
    for child in value.children() {
        if child.is_container() && !child.is_frozen() {
            freeze_node(&child);
        }
    }
}

/// Whether every container reachable from `value` is frozen.
///
/// Buffers are ignored since they can never be frozen. Each container is
/// checked once, so shared and cyclic graphs are fine.
pub fn is_deep_frozen(value: &Value) -> bool {
    check_frozen(value, &mut HashSet::new())
}

fn check_frozen(value: &Value, seen: &mut HashSet<*const ()>) -> bool {
    let Some(addr) = value.node_addr() else {
        return true;
    };
    if !seen.insert(addr) {
        return true;
    }
    value.is_frozen() && value.children().iter().all(|child| check_frozen(child, seen))
}
