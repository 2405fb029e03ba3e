//! State tree representation and shape handling.
//!
//! A state tree is plain, JSON-serializable nested data: maps of string keys
//! to primitives, nested trees, or ordered sequences. No cycles, no embedded
//! behavior. `serde_json::Value` is exactly that tagged-variant shape, so it
//! is used directly rather than wrapped.

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A plain, JSON-shaped state tree.
///
/// Maps and sequences are distinguished by variant tag, not duck-typed.
pub type StateTree = Value;

/// Classification of a state tree value's top-level shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateShape {
    /// A string-keyed map (the only shape a store root may have).
    Object,
    /// An ordered sequence.
    Array,
    /// A primitive (string, number, or boolean).
    Scalar,
    /// Explicit null.
    Null,
}

/// Classify the top-level shape of a value.
pub fn shape_of(value: &StateTree) -> StateShape {
    match value {
        Value::Object(_) => StateShape::Object,
        Value::Array(_) => StateShape::Array,
        Value::Null => StateShape::Null,
        _ => StateShape::Scalar,
    }
}

/// Coerce an arbitrary value into an object-shaped state tree.
///
/// Rules (explicit so they can be tested in isolation):
/// - an object passes through unchanged;
/// - `None` or `null` becomes an empty object (logged at debug level);
/// - an array or scalar is dropped in favor of an empty object, with a
///   warning: store roots and module states are maps, and silently
///   spreading a sequence into one loses data.
pub fn coerce_object(value: Option<StateTree>, context: &str) -> StateTree {
    match value {
        Some(v @ Value::Object(_)) => v,
        Some(Value::Null) | None => {
            debug!(context, "no state provided, starting from an empty object");
            Value::Object(Map::new())
        }
        Some(other) => {
            warn!(
                context,
                shape = ?shape_of(&other),
                "non-object state dropped, starting from an empty object"
            );
            Value::Object(Map::new())
        }
    }
}

/// Deeply merge `partial` into `target`.
///
/// - plain objects are merged recursively;
/// - arrays are replaced as a whole;
/// - primitives and nulls are assigned directly.
///
/// A non-object `partial` is a no-op: a merge payload must be a map to have
/// semantic content. A non-object `target` is first replaced with an empty
/// object so there is something to merge into.
pub fn merge_into(target: &mut StateTree, partial: &StateTree) {
    let Value::Object(entries) = partial else {
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Some(map) = target.as_object_mut() else {
        return;
    };

    for (key, next) in entries {
        match next {
            Value::Object(_) => {
                let slot = map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                merge_into(slot, next);
            }
            _ => {
                map.insert(key.clone(), next.clone());
            }
        }
    }
}
