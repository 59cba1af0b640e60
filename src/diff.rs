//! Computing and applying [`Delta`]s.
//!
//! Arrays are diffed positionally: the unchanged head and tail are trimmed and
//! the middle is matched by longest common subsequence on structural equality.
//! Unmatched items between two matches are paired in order and changed in
//! place; whatever is left over is removed or inserted. Moves are never
//! produced.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::delta::{ArrayKey, Delta};
use crate::error::{DocError, DocResult};
use crate::path::Path;

/// Compute the delta that turns `old` into `new`.
///
/// Returns `None` when the values are structurally equal.
pub fn diff(old: &Value, new: &Value) -> Option<Delta> {
    if old == new {
        return None;
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_objects(a, b),
        (Value::Array(a), Value::Array(b)) => diff_arrays(a, b),
        _ => Some(Delta::modified(old.clone(), new.clone())),
    }
}

/// Compute the delta for one property slot, where `None` means absent.
pub fn diff_entry(old: Option<&Value>, new: Option<&Value>) -> Option<Delta> {
    match (old, new) {
        (None, None) => None,
        (None, Some(new)) => Some(Delta::Added(new.clone())),
        (Some(old), None) => Some(Delta::Deleted(old.clone())),
        (Some(old), Some(new)) => diff(old, new),
    }
}

fn diff_objects(a: &Map<String, Value>, b: &Map<String, Value>) -> Option<Delta> {
    let mut out = BTreeMap::new();
    for (key, old) in a {
        if let Some(d) = diff_entry(Some(old), b.get(key)) {
            out.insert(key.clone(), d);
        }
    }
    for (key, new) in b.iter().filter(|(k, _)| !a.contains_key(*k)) {
        out.insert(key.clone(), Delta::Added(new.clone()));
    }
    (!out.is_empty()).then_some(Delta::Object(out))
}

fn diff_arrays(a: &[Value], b: &[Value]) -> Option<Delta> {
    let head = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let tail = a[head..]
        .iter()
        .rev()
        .zip(b[head..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let old_mid = &a[head..a.len() - tail];
    let new_mid = &b[head..b.len() - tail];

    // Unmatched items between two consecutive matches are paired up in order
    // and changed in place; the surplus is removed or inserted.
    let mut out = BTreeMap::new();
    let (mut oi, mut nj) = (0, 0);
    let end = (old_mid.len(), new_mid.len());
    for (pi, pj) in lcs(old_mid, new_mid).into_iter().chain(std::iter::once(end)) {
        let paired = (pi - oi).min(pj - nj);
        for k in 0..paired {
            if let Some(d) = diff(&old_mid[oi + k], &new_mid[nj + k]) {
                out.insert(ArrayKey::At(head + nj + k), d);
            }
        }
        for (i, old) in old_mid.iter().enumerate().take(pi).skip(oi + paired) {
            out.insert(ArrayKey::Removed(head + i), Delta::Deleted(old.clone()));
        }
        for (j, new) in new_mid.iter().enumerate().take(pj).skip(nj + paired) {
            out.insert(ArrayKey::At(head + j), Delta::Added(new.clone()));
        }
        oi = pi + 1;
        nj = pj + 1;
    }
    (!out.is_empty()).then_some(Delta::Array(out))
}

/// Index pairs of a longest common subsequence of `a` and `b`, in order.
fn lcs(a: &[Value], b: &[Value]) -> Vec<(usize, usize)> {
    let (n, m) = (a.len(), b.len());
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if a[i] == b[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }
    let mut pairs = Vec::with_capacity(table[0][0]);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// Apply `delta` to `target` in place.
///
/// Deltas produced by [`diff`] against `target` always apply. A delta of the
/// wrong shape fails with [`DocError::PatchMismatch`] and may leave `target`
/// partially patched.
pub fn patch(target: &mut Value, delta: &Delta) -> DocResult<()> {
    match delta {
        Delta::Added(new) | Delta::Modified { new, .. } => {
            *target = new.clone();
            Ok(())
        }
        Delta::Deleted(_) => {
            *target = Value::Null;
            Ok(())
        }
        Delta::Object(entries) => {
            let Value::Object(map) = target else {
                return Err(DocError::patch_mismatch(Path::root()));
            };
            for (key, d) in entries {
                patch_object_entry(map, key, d)
                    .map_err(|e| e.with_prefix(&Path::root().key(key.as_str())))?;
            }
            Ok(())
        }
        Delta::Array(entries) => {
            let Value::Array(items) = target else {
                return Err(DocError::patch_mismatch(Path::root()));
            };
            patch_array(items, entries)
        }
    }
}

fn patch_object_entry(map: &mut Map<String, Value>, key: &str, delta: &Delta) -> DocResult<()> {
    match delta {
        Delta::Added(new) | Delta::Modified { new, .. } => {
            map.insert(key.to_owned(), new.clone());
        }
        Delta::Deleted(_) => {
            map.remove(key);
        }
        nested => {
            let slot = map
                .get_mut(key)
                .ok_or_else(|| DocError::patch_mismatch(Path::root()))?;
            patch(slot, nested)?;
        }
    }
    Ok(())
}

fn patch_array(items: &mut Vec<Value>, entries: &BTreeMap<ArrayKey, Delta>) -> DocResult<()> {
    // Removals address the old array: apply from the highest index down.
    for (key, d) in entries.iter().rev() {
        if let ArrayKey::Removed(index) = *key {
            if !matches!(d, Delta::Deleted(_)) || index >= items.len() {
                return Err(DocError::patch_mismatch(Path::root().index(index)));
            }
            items.remove(index);
        }
    }
    for (key, d) in entries {
        if let (ArrayKey::At(index), Delta::Added(new)) = (*key, d) {
            if index > items.len() {
                return Err(DocError::patch_mismatch(Path::root().index(index)));
            }
            items.insert(index, new.clone());
        }
    }
    for (key, d) in entries {
        let ArrayKey::At(index) = *key else { continue };
        if matches!(d, Delta::Added(_)) {
            continue;
        }
        let slot = items
            .get_mut(index)
            .filter(|_| !matches!(d, Delta::Deleted(_)))
            .ok_or_else(|| DocError::patch_mismatch(Path::root().index(index)))?;
        patch(slot, d).map_err(|e| e.with_prefix(&Path::root().index(index)))?;
    }
    Ok(())
}

/// Diff `target` against `new` and patch it in place.
///
/// Returns true if anything changed.
pub fn update_value(target: &mut Value, new: &Value) -> bool {
    match diff(target, new) {
        Some(delta) => {
            // A delta computed against `target` always fits it.
            let applied = patch(target, &delta);
            debug_assert!(applied.is_ok());
            true
        }
        None => false,
    }
}
