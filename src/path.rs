//! Property paths into JSON values.
//!
//! A path is a sequence of segments, each either an object key or an array
//! index. Lookups are lenient in the way property access is: an all-digit key
//! addresses an array element, and an index addresses the object key spelled
//! with the same digits.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single segment in a path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Object key.
    Key(String),
    /// Array index.
    Index(usize),
}

impl Seg {
    /// Create a key segment.
    #[inline]
    pub fn key(k: impl Into<String>) -> Self {
        Seg::Key(k.into())
    }

    /// Create an index segment.
    #[inline]
    pub fn index(i: usize) -> Self {
        Seg::Index(i)
    }

    /// The segment as an array index, if it is one or spells one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Index(i) => Some(*i),
            Seg::Key(k) if is_index_like(k) => k.parse().ok(),
            Seg::Key(_) => None,
        }
    }

    /// The segment as an object key.
    pub fn as_key(&self) -> Cow<'_, str> {
        match self {
            Seg::Key(k) => Cow::Borrowed(k),
            Seg::Index(i) => Cow::Owned(i.to_string()),
        }
    }

    /// Look this segment up in `value`.
    pub fn lookup<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        match value {
            Value::Object(map) => map.get(self.as_key().as_ref()),
            Value::Array(items) => self.as_index().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Look this segment up in `value`, mutably.
    pub fn lookup_mut<'v>(&self, value: &'v mut Value) -> Option<&'v mut Value> {
        match value {
            Value::Object(map) => map.get_mut(self.as_key().as_ref()),
            Value::Array(items) => self.as_index().and_then(move |i| items.get_mut(i)),
            _ => None,
        }
    }
}

fn is_index_like(k: &str) -> bool {
    !k.is_empty() && k.bytes().all(|b| b.is_ascii_digit()) && (k == "0" || !k.starts_with('0'))
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, "{}", k),
            Seg::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<&String> for Seg {
    fn from(s: &String) -> Self {
        Seg::Key(s.clone())
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A path from some base value to a nested value.
///
/// # Examples
///
/// ```
/// use json_cell::{path, Path, Seg};
///
/// let p = Path::root().key("users").index(0).key("name");
/// assert_eq!(p, path!("users", 0, "name"));
/// assert_eq!(p.to_string(), "users[0].name");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// Create an empty path (root).
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path such as `"a.b.0"`.
    ///
    /// Every part becomes a key segment. Keys containing `.` cannot be
    /// expressed, and the empty string parses to a single empty key; build
    /// paths from segments when keys are arbitrary.
    pub fn parse_dotted(dotted: &str) -> Self {
        Self(dotted.split('.').map(Seg::key).collect())
    }

    /// Append a key segment and return self.
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment and return self.
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment onto the path.
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Append a segment and return a new path.
    pub fn child(&self, seg: impl Into<Seg>) -> Path {
        let mut result = Path(Vec::with_capacity(self.0.len() + 1));
        result.0.extend(self.0.iter().cloned());
        result.0.push(seg.into());
        result
    }

    /// Join this path with another path.
    pub fn join(&self, other: &Path) -> Path {
        let mut result = self.clone();
        result.0.extend(other.0.iter().cloned());
        result
    }

    /// The segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Returns true for the root path.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the segments.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Seg> {
        self.0.iter()
    }

    /// Deep get.
    pub fn get_in<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(value, |v, seg| seg.lookup(v))
    }

    /// Deep get, mutably.
    pub fn get_in_mut<'v>(&self, value: &'v mut Value) -> Option<&'v mut Value> {
        self.0.iter().try_fold(value, |v, seg| seg.lookup_mut(v))
    }

    /// Deep has: every segment resolves.
    #[inline]
    pub fn has_in(&self, value: &Value) -> bool {
        self.get_in(value).is_some()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "$");
        }
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                Seg::Key(k) if i > 0 => write!(f, ".{}", k)?,
                _ => write!(f, "{}", seg)?,
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Seg>> for Path {
    fn from(segments: Vec<Seg>) -> Self {
        Path(segments)
    }
}

impl From<&str> for Path {
    fn from(dotted: &str) -> Self {
        Path::parse_dotted(dotted)
    }
}

/// Construct a [`Path`] from a sequence of segments.
///
/// String literals become key segments and integers become index segments.
///
/// ```
/// use json_cell::path;
///
/// let p = path!("items", 0, "name");
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_display() {
        assert_eq!(path!("users", 0, "name").to_string(), "users[0].name");
        assert_eq!(path!(0, "a").to_string(), "[0].a");
        assert_eq!(Path::root().to_string(), "$");
    }

    #[test]
    fn test_parse_dotted() {
        assert_eq!(Path::parse_dotted("a.b.0"), path!("a", "b", "0"));
        // Known limitation: the empty string is one empty key, not the root.
        assert_eq!(Path::parse_dotted(""), path!(""));
    }

    #[test]
    fn test_lenient_lookup() {
        let value = json!({"items": [10, 20], "0": "zero"});
        assert_eq!(path!("items", "1").get_in(&value), Some(&json!(20)));
        assert_eq!(path!("items", 1).get_in(&value), Some(&json!(20)));
        assert_eq!(path!(0).get_in(&value), Some(&json!("zero")));
        assert_eq!(path!("items", "01").get_in(&value), None);
        assert!(!path!("items", 2).has_in(&value));
        assert!(!path!("items", 0, "x").has_in(&value));
    }

    #[test]
    fn test_get_in_mut() {
        let mut value = json!({"a": {"b": 1}});
        *path!("a", "b").get_in_mut(&mut value).unwrap() = json!(2);
        assert_eq!(value, json!({"a": {"b": 2}}));
    }
}
