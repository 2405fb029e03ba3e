//! Structural diff between two state trees and in-place patch application.
//!
//! [`diff`] computes a minimal transformation from tree `a` to tree `b`;
//! [`apply`] replays that transformation onto a tree in place. The invariant
//! tying them together: for any acyclic trees `a` and `b`,
//! `apply(&mut a.clone(), &diff(&a, &b))` leaves a tree deeply equal to `b`.
//!
//! # Array policy
//!
//! Arrays of equal length are diffed and patched index-wise; arrays whose
//! lengths differ are replaced wholesale at the enclosing key. Index-wise
//! diffing cannot express insertion or removal without an LCS pass, and a
//! sparse index diff applied wholesale would lose the untouched elements, so
//! length changes always fall back to replacement.
//!
//! Deletions are expressed as the explicit [`Diff::Remove`] variant rather
//! than an out-of-band sentinel, since JSON has no `undefined` distinct from
//! `null`.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::tree::StateTree;

/// A typed description of the changed parts of a transformation from one
/// state tree to another.
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// The trees are deeply equal; applying this is a no-op.
    Unchanged,
    /// Replace the target wholesale with the carried value.
    Replace(StateTree),
    /// The key exists only on the old side; remove it from the target map.
    Remove,
    /// Per-key changes to a map; keys absent here are untouched.
    Object(BTreeMap<String, Diff>),
    /// Sparse index-wise changes to a sequence of unchanged length.
    Array(Vec<(usize, Diff)>),
}

impl Diff {
    /// `true` when applying this diff would change nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Diff::Unchanged)
    }
}

/// Compute the transformation needed to turn `a` into `b`.
pub fn diff(a: &StateTree, b: &StateTree) -> Diff {
    if a == b {
        return Diff::Unchanged;
    }

    match (a, b) {
        (Value::Array(xs), Value::Array(ys)) if xs.len() == ys.len() => {
            let entries: Vec<(usize, Diff)> = xs
                .iter()
                .zip(ys.iter())
                .enumerate()
                .filter_map(|(i, (x, y))| {
                    let d = diff(x, y);
                    (!d.is_empty()).then_some((i, d))
                })
                .collect();
            if entries.is_empty() {
                Diff::Unchanged
            } else {
                Diff::Array(entries)
            }
        }
        (Value::Object(ma), Value::Object(mb)) => {
            let keys: BTreeSet<&String> = ma.keys().chain(mb.keys()).collect();
            let mut entries = BTreeMap::new();
            for key in keys {
                match (ma.get(key), mb.get(key)) {
                    (Some(x), Some(y)) => {
                        let d = diff(x, y);
                        if !d.is_empty() {
                            entries.insert(key.clone(), d);
                        }
                    }
                    (Some(_), None) => {
                        entries.insert(key.clone(), Diff::Remove);
                    }
                    (None, Some(y)) => {
                        entries.insert(key.clone(), Diff::Replace(y.clone()));
                    }
                    (None, None) => {}
                }
            }
            if entries.is_empty() {
                Diff::Unchanged
            } else {
                Diff::Object(entries)
            }
        }
        // Mismatched shapes, primitives, or arrays of different length: the
        // diff is the new value wholesale.
        _ => Diff::Replace(b.clone()),
    }
}

/// Apply a diff to `target` in place.
///
/// Application never panics on shape mismatches: an `Object` entry whose
/// target slot is not a map gets an empty map to merge into, and an `Array`
/// entry whose target slot is not a sequence is skipped with a debug log.
pub fn apply(target: &mut StateTree, diff: &Diff) {
    match diff {
        Diff::Unchanged => {}
        Diff::Replace(value) => *target = value.clone(),
        Diff::Remove => {
            // Removal is only meaningful under an enclosing map; at the top
            // level the closest equivalent is clearing the value.
            *target = Value::Null;
        }
        Diff::Object(entries) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let Some(map) = target.as_object_mut() else {
                return;
            };
            for (key, entry) in entries {
                match entry {
                    Diff::Unchanged => {}
                    Diff::Remove => {
                        map.remove(key);
                    }
                    Diff::Replace(value) => {
                        map.insert(key.clone(), value.clone());
                    }
                    Diff::Object(_) => {
                        let slot = map
                            .entry(key.clone())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if !slot.is_object() {
                            *slot = Value::Object(Map::new());
                        }
                        apply(slot, entry);
                    }
                    Diff::Array(_) => match map.get_mut(key) {
                        Some(slot) if slot.is_array() => apply(slot, entry),
                        _ => debug!(key, "array diff targets a non-array slot, skipping"),
                    },
                }
            }
        }
        Diff::Array(entries) => {
            let Some(items) = target.as_array_mut() else {
                debug!("array diff applied to a non-array target, skipping");
                return;
            };
            for (index, entry) in entries {
                match items.get_mut(*index) {
                    Some(slot) => apply(slot, entry),
                    None => debug!(index, "array diff index out of bounds, skipping"),
                }
            }
        }
    }
}
