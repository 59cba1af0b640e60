//! Structural deltas between JSON values.
//!
//! A [`Delta`] describes how one value turns into another. Its JSON encoding is
//! the compact one used by jsondiffpatch:
//!
//! | Delta                   | JSON                          |
//! |-------------------------|-------------------------------|
//! | `Added(new)`            | `[new]`                       |
//! | `Modified { old, new }` | `[old, new]`                  |
//! | `Deleted(old)`          | `[old, 0, 0]`                 |
//! | `Object(map)`           | `{ "key": <delta>, ... }`     |
//! | `Array(map)`            | `{ "_t": "a", "3": <delta>, "_1": <delta> }` |
//!
//! Array deltas carry the `_t` discriminator so they are never confused with
//! an object that happens to have numeric keys. Inside an array delta a plain
//! key `"i"` addresses position `i` of the new array (an insertion or a change
//! in place) and an underscored key `"_i"` addresses position `i` of the old
//! array (a removal).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{DocError, DocResult};
use crate::path::Seg;

/// JSON key of the array-delta discriminator.
pub const ARRAY_MARKER_KEY: &str = "_t";
/// JSON value of the array-delta discriminator.
pub const ARRAY_MARKER: &str = "a";

/// Key of an entry inside an array delta.
///
/// Removals sort before positions so a delta iterates in application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArrayKey {
    /// Position in the old array (`"_i"`): the item there was removed.
    Removed(usize),
    /// Position in the new array (`"i"`): an insertion or an in-place change.
    At(usize),
}

impl ArrayKey {
    /// The index this key refers to, in the old or new array.
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            ArrayKey::Removed(i) | ArrayKey::At(i) => *i,
        }
    }

    /// Parse the JSON spelling of an array-delta key.
    pub fn parse(key: &str) -> Option<Self> {
        match key.strip_prefix('_') {
            Some(rest) => rest.parse().ok().map(ArrayKey::Removed),
            None => key.parse().ok().map(ArrayKey::At),
        }
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Removed(i) => write!(f, "_{}", i),
            ArrayKey::At(i) => write!(f, "{}", i),
        }
    }
}

/// A structural change to a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// The value was added.
    Added(Value),
    /// The value was replaced.
    Modified {
        /// Value before the change.
        old: Value,
        /// Value after the change.
        new: Value,
    },
    /// The value was removed.
    Deleted(Value),
    /// Per-key changes to an object.
    Object(BTreeMap<String, Delta>),
    /// Per-position changes to an array.
    Array(BTreeMap<ArrayKey, Delta>),
}

impl Delta {
    /// Create a modification delta.
    #[inline]
    pub fn modified(old: Value, new: Value) -> Self {
        Delta::Modified { old, new }
    }

    /// An object delta with a single entry.
    pub fn object_entry(key: impl Into<String>, inner: Delta) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.into(), inner);
        Delta::Object(map)
    }

    /// An array delta with a single entry.
    pub fn array_entry(key: ArrayKey, inner: Delta) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key, inner);
        Delta::Array(map)
    }

    /// Returns true for `Added`, `Modified` and `Deleted`.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Delta::Added(_) | Delta::Modified { .. } | Delta::Deleted(_)
        )
    }

    /// Returns true for an array delta.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Delta::Array(_))
    }

    /// The child delta addressed by `seg`.
    ///
    /// Object deltas are indexed by key. Array deltas are indexed by new
    /// position, which is how a delta re-based onto an element is shaped.
    pub fn child(&self, seg: &Seg) -> Option<&Delta> {
        match self {
            Delta::Object(map) => map.get(seg.as_key().as_ref()),
            Delta::Array(map) => seg.as_index().and_then(|i| map.get(&ArrayKey::At(i))),
            _ => None,
        }
    }

    /// Encode as jsondiffpatch-shaped JSON.
    pub fn to_value(&self) -> Value {
        match self {
            Delta::Added(new) => Value::Array(vec![new.clone()]),
            Delta::Modified { old, new } => Value::Array(vec![old.clone(), new.clone()]),
            Delta::Deleted(old) => Value::Array(vec![old.clone(), Value::from(0), Value::from(0)]),
            Delta::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, d)| (k.clone(), d.to_value()))
                    .collect(),
            ),
            Delta::Array(map) => {
                let mut out = Map::new();
                out.insert(ARRAY_MARKER_KEY.into(), Value::from(ARRAY_MARKER));
                for (k, d) in map {
                    out.insert(k.to_string(), d.to_value());
                }
                Value::Object(out)
            }
        }
    }

    /// Decode from jsondiffpatch-shaped JSON.
    pub fn from_value(value: &Value) -> DocResult<Self> {
        match value {
            Value::Array(items) => match items.as_slice() {
                [new] => Ok(Delta::Added(new.clone())),
                [old, new] => Ok(Delta::modified(old.clone(), new.clone())),
                [old, a, b] if is_zero(a) && is_zero(b) => Ok(Delta::Deleted(old.clone())),
                [_, _, kind] if kind.as_u64() == Some(3) => {
                    Err(DocError::invalid_delta("array moves are not supported"))
                }
                _ => Err(DocError::invalid_delta(format!(
                    "unrecognized leaf delta {}",
                    value
                ))),
            },
            Value::Object(map) if is_array_marker(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map.iter().filter(|(k, _)| k.as_str() != ARRAY_MARKER_KEY) {
                    let key = ArrayKey::parse(k).ok_or_else(|| {
                        DocError::invalid_delta(format!("invalid array delta key {:?}", k))
                    })?;
                    out.insert(key, Delta::from_value(v)?);
                }
                Ok(Delta::Array(out))
            }
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), Delta::from_value(v)?)))
                .collect::<DocResult<_>>()
                .map(Delta::Object),
            other => Err(DocError::invalid_delta(format!(
                "expected array or object, found {}",
                other
            ))),
        }
    }
}

fn is_zero(v: &Value) -> bool {
    v.as_u64() == Some(0)
}

fn is_array_marker(map: &Map<String, Value>) -> bool {
    map.get(ARRAY_MARKER_KEY).and_then(Value::as_str) == Some(ARRAY_MARKER)
}

impl Serialize for Delta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl TryFrom<Value> for Delta {
    type Error = DocError;

    fn try_from(value: Value) -> DocResult<Self> {
        Delta::from_value(&value)
    }
}

impl TryFrom<&Value> for Delta {
    type Error = DocError;

    fn try_from(value: &Value) -> DocResult<Self> {
        Delta::from_value(value)
    }
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}
