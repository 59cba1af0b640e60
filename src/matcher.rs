//! Deciding whether a published delta affects a dependency.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::delta::{ArrayKey, Delta};
use crate::path::{Path, Seg};

/// Returns true if `delta` touches `path`.
///
/// An empty path is always touched. Descending through an array delta at
/// index `i`, the removal key `"_i"` is consulted before the positional key
/// `"i"`: a removal at `i` reaches readers of the removed element, and unless
/// an insertion at `i` replaces it, readers of whatever moved into the slot.
/// A removal or insertion before `i` shifts a different element into it,
/// which also counts. Once the descent reaches a leaf (an added, replaced or
/// deleted value), the rest of the path is looked up inside that value; for a
/// replacement, both the old and the new value are consulted.
///
/// Consulting the new value of a replacement, and counting shifted array
/// positions, makes this a superset of a match against the leading value
/// alone: `{"b": [1, {"c": 2}]}` touches `b.c`. It may report a path as
/// touched when its value is unchanged, never the other way round.
///
/// Never fails: any structural mismatch is simply `false`.
pub fn patch_has(delta: &Delta, path: &Path) -> bool {
    delta_has(delta, path.segments())
}

/// [`patch_has`] with a dotted path such as `"value.b.c"`.
///
/// Keys containing `.` cannot be addressed this way; see
/// [`Path::parse_dotted`].
pub fn patch_has_dotted(delta: &Delta, dotted: &str) -> bool {
    patch_has(delta, &Path::parse_dotted(dotted))
}

fn delta_has(delta: &Delta, path: &[Seg]) -> bool {
    let Some((first, rest)) = path.split_first() else {
        return true;
    };
    match delta {
        Delta::Added(value) | Delta::Deleted(value) => value_has(value, path),
        Delta::Modified { old, new } => value_has(old, path) || value_has(new, path),
        Delta::Object(entries) => match entries.get(first.as_key().as_ref()) {
            Some(child) => delta_has(child, rest),
            None => false,
        },
        Delta::Array(entries) => {
            let Some(index) = first.as_index() else {
                return false;
            };
            if shifts(entries, index) {
                return true;
            }
            match (
                entries.get(&ArrayKey::Removed(index)),
                entries.get(&ArrayKey::At(index)),
            ) {
                // Replaced in place: the old and the new element.
                (Some(removed), Some(Delta::Added(new))) => {
                    delta_has(removed, rest) || value_has(new, rest)
                }
                // A later element moved into the position.
                (Some(_), _) => true,
                // The previous occupant moved back.
                (None, Some(Delta::Added(_))) => true,
                (None, Some(child)) => delta_has(child, rest),
                (None, None) => false,
            }
        }
    }
}

/// Returns true if a removal or insertion before `index` moves another
/// element into that position.
fn shifts(entries: &BTreeMap<ArrayKey, Delta>, index: usize) -> bool {
    entries.iter().any(|(key, d)| match *key {
        ArrayKey::Removed(j) => j < index,
        ArrayKey::At(j) => j < index && matches!(d, Delta::Added(_)),
    })
}

fn value_has(value: &Value, path: &[Seg]) -> bool {
    let Some((first, rest)) = path.split_first() else {
        return true;
    };
    match first.lookup(value) {
        Some(child) => value_has(child, rest),
        None => false,
    }
}

/// The sub-delta found by following `path` through `delta`.
///
/// Object deltas are followed by key and array deltas by new position; a leaf
/// ends the walk (`None` if path remains).
pub fn delta_at<'d>(delta: &'d Delta, path: &Path) -> Option<&'d Delta> {
    path.iter().try_fold(delta, |d, seg| d.child(seg))
}

/// Re-base a delta computed at `base` so it is expressed relative to the root.
///
/// Index segments become positional array entries, key segments object
/// entries.
pub fn prefix(base: &Path, delta: Delta) -> Delta {
    base.iter().rev().fold(delta, |inner, seg| match seg {
        Seg::Index(i) => Delta::array_entry(ArrayKey::At(*i), inner),
        Seg::Key(k) => Delta::object_entry(k.clone(), inner),
    })
}

/// Returns true if `delta`, seen from the container it applies to, changes
/// which keys or elements that container has.
///
/// Same-position modifications do not count; insertions, removals and a
/// replacement whose key set differs do.
pub fn changes_keys(delta: &Delta) -> bool {
    match delta {
        Delta::Added(_) | Delta::Deleted(_) => true,
        Delta::Modified { old, new } => key_set(Some(old)) != key_set(Some(new)),
        Delta::Object(entries) => entries
            .values()
            .any(|d| matches!(d, Delta::Added(_) | Delta::Deleted(_))),
        Delta::Array(entries) => entries.iter().any(|(key, d)| {
            matches!(key, ArrayKey::Removed(_)) || matches!(d, Delta::Added(_))
        }),
    }
}

/// Returns true if `delta` changes which keys the container at `path` has.
///
/// Walks down to `path` and applies [`changes_keys`] there. If a leaf is met
/// on the way, the container was replaced, added or removed wholesale; the key
/// sets found under the rest of the path in the old and new values decide.
/// Removal of an array element on the way counts as a change.
pub fn keys_changed_at(delta: &Delta, path: &Path) -> bool {
    let segs = path.segments();
    let mut current = delta;
    for (depth, seg) in segs.iter().enumerate() {
        let rest = &segs[depth..];
        current = match current {
            Delta::Added(new) => return key_set(lookup(new, rest)).is_some(),
            Delta::Deleted(old) => return key_set(lookup(old, rest)).is_some(),
            Delta::Modified { old, new } => {
                return key_set(lookup(old, rest)) != key_set(lookup(new, rest))
            }
            Delta::Object(entries) => match entries.get(seg.as_key().as_ref()) {
                Some(child) => child,
                None => return false,
            },
            Delta::Array(entries) => {
                let Some(index) = seg.as_index() else {
                    return false;
                };
                if entries.contains_key(&ArrayKey::Removed(index)) || shifts(entries, index) {
                    return true;
                }
                match entries.get(&ArrayKey::At(index)) {
                    Some(Delta::Added(_)) => return true,
                    Some(child) => child,
                    None => return false,
                }
            }
        };
    }
    changes_keys(current)
}

fn lookup<'v>(value: &'v Value, path: &[Seg]) -> Option<&'v Value> {
    path.iter().try_fold(value, |v, seg| seg.lookup(v))
}

fn key_set(value: Option<&Value>) -> Option<Vec<Seg>> {
    let value = value?;
    match value {
        Value::Object(map) => Some(map.keys().map(Seg::key).collect()),
        Value::Array(items) => Some((0..items.len()).map(Seg::Index).collect()),
        _ => None,
    }
}
