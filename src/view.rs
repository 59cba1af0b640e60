//! Path-scoped accessors over a document.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::document::{DocShared, Document};
use crate::error::DocResult;
use crate::path::{Path, Seg};

/// A handle on the value at one path of a document.
///
/// A view owns no data: every call looks the path up in the live document.
/// Reads register dependencies with the running computation; writes publish
/// a change. Views are created on each read and are not cached, so two reads
/// of the same path give two equal views over the same live value.
///
/// ```
/// use json_cell::{json_cell, Node};
/// use serde_json::json;
///
/// let data = json_cell(json!({"user": {"name": "ada"}}));
/// let user = data.get("user").and_then(Node::into_view).unwrap();
/// user.set("name", json!("grace")).unwrap();
/// assert_eq!(data.to_value(), json!({"user": {"name": "grace"}}));
/// ```
#[derive(Clone)]
pub struct View {
    doc: Arc<DocShared>,
    path: Path,
}

impl View {
    pub(crate) fn new(doc: Arc<DocShared>, path: Path) -> Self {
        Self { doc, path }
    }

    /// Path of this view, relative to the document value.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The document this view reads from.
    pub fn document(&self) -> Document {
        Document::from_shared(self.doc.clone())
    }

    /// Returns true if the value here is currently an array. Registers nothing.
    pub fn is_array(&self) -> bool {
        self.doc.snapshot(&self.path).is_some_and(|v| v.is_array())
    }

    /// Returns true if the value here is currently an object. Registers nothing.
    pub fn is_object(&self) -> bool {
        self.doc.snapshot(&self.path).is_some_and(|v| v.is_object())
    }

    /// Read the property `seg`.
    ///
    /// Objects and arrays come back as views, anything else as a value. A
    /// missing property is `None`; the dependency is registered either way, so
    /// a computation sees the property appear.
    pub fn get(&self, seg: impl Into<Seg>) -> Option<Node> {
        self.doc.get(&self.path, &seg.into())
    }

    /// Write the property `seg`.
    ///
    /// On arrays, `seg` must be an index no greater than the length; writing
    /// at the length appends. Writing a value equal to the current one
    /// publishes nothing.
    pub fn set(&self, seg: impl Into<Seg>, value: Value) -> DocResult<()> {
        self.doc.set(&self.path, &seg.into(), value)
    }

    /// Delete the property `seg`, returning whether it was present.
    ///
    /// Deleting an array element removes it, shifting the elements after it.
    pub fn delete(&self, seg: impl Into<Seg>) -> DocResult<bool> {
        self.doc.delete(&self.path, &seg.into())
    }

    /// Whether the property `seg` exists.
    ///
    /// The dependency only fires when presence flips.
    pub fn has(&self, seg: impl Into<Seg>) -> bool {
        self.doc.has(&self.path, &seg.into())
    }

    /// The keys of an object, or the indices of an array.
    ///
    /// The dependency fires when keys or elements are added or removed, not
    /// when an existing one changes value.
    pub fn keys(&self) -> Vec<Seg> {
        self.doc.keys(&self.path)
    }

    /// Length of an array, or number of keys of an object.
    ///
    /// For arrays the dependency fires only when the length changes.
    pub fn len(&self) -> usize {
        self.doc.len(&self.path)
    }

    /// Returns true if [`View::len`] is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to an array.
    pub fn push(&self, value: Value) -> DocResult<()> {
        let len = crate::reactive::untracked(|| self.len());
        self.set(len, value)
    }

    /// A copy of the value here, registering a dependency on all of it.
    pub fn to_value(&self) -> Value {
        self.doc.to_value(&self.path)
    }

    /// A copy of the value here. Registers nothing.
    pub fn snapshot(&self) -> Value {
        self.doc.snapshot(&self.path).unwrap_or(Value::Null)
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.doc, &other.doc) && self.path == other.path
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("path", &self.path)
            .field("value", &self.snapshot())
            .finish()
    }
}

/// The result of reading a property through a [`View`].
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// A scalar: null, bool, number or string.
    Value(Value),
    /// An object or array, observed through a view.
    View(View),
}

impl Node {
    /// Returns true for an observed object or array.
    pub fn is_view(&self) -> bool {
        matches!(self, Node::View(_))
    }

    /// The view, if this is one.
    pub fn as_view(&self) -> Option<&View> {
        match self {
            Node::View(view) => Some(view),
            Node::Value(_) => None,
        }
    }

    /// The view, if this is one.
    pub fn into_view(self) -> Option<View> {
        match self {
            Node::View(view) => Some(view),
            Node::Value(_) => None,
        }
    }

    /// The scalar, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Node::Value(value) => Some(value),
            Node::View(_) => None,
        }
    }

    /// A plain copy: the scalar itself, or an untracked snapshot of the view.
    pub fn into_value(self) -> Value {
        match self {
            Node::Value(value) => value,
            Node::View(view) => view.snapshot(),
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::Value(value)
    }
}

impl From<View> for Node {
    fn from(view: View) -> Self {
        Node::View(view)
    }
}
