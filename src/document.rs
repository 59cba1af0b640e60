//! The observable document core.
//!
//! A document owns a wrapper value `{"value": <data>}` for its whole lifetime.
//! Reads through a [`View`] register dependencies with the running computation
//! and writes publish a [`Delta`] rooted at the wrapper, so predicates can
//! decide from the delta alone whether the path they read was touched.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::delta::{ArrayKey, Delta};
use crate::derived::DerivedDocument;
use crate::diff::{diff, diff_entry};
use crate::error::{DocError, DocResult};
use crate::matcher::{keys_changed_at, patch_has, prefix};
use crate::path::{Path, Seg};
use crate::reactive::{self, Event};
use crate::source::SourceDocument;
use crate::view::{Node, View};

/// Key of the data inside the wrapper.
pub const VALUE_KEY: &str = "value";

/// Kind of write reported by [`UnsafeMutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    /// A property was written.
    Set,
    /// A property was deleted.
    Delete,
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOp::Set => write!(f, "set"),
            MutationOp::Delete => write!(f, "delete"),
        }
    }
}

/// Published on [`Document::on_unsafe_mutation`] when a document is written
/// while a computation is recording dependencies.
///
/// The write still happens. Writing from inside a computation usually means
/// the computation can invalidate itself, which loops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnsafeMutation {
    /// The kind of write.
    pub op: MutationOp,
    /// Path of the written property, relative to the document value.
    pub path: Path,
    /// The container being written to, before the write.
    pub target: Value,
    /// The value written; `None` for deletes.
    pub value: Option<Value>,
    /// The whole document value, before the write.
    pub base: Value,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for documents with customizable settings.
///
/// # Example
///
/// ```
/// use json_cell::DocumentBuilder;
/// use serde_json::json;
///
/// let doc = DocumentBuilder::new()
///     .label("settings")
///     .initial(json!({"theme": "dark"}))
///     .build_source();
/// assert_eq!(doc.label(), Some("settings"));
/// ```
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    label: Option<String>,
    warn_on_unsafe_mutation: bool,
    initial: Value,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            label: None,
            warn_on_unsafe_mutation: true,
            initial: Value::Object(Map::new()),
        }
    }

    /// Name the document in diagnostics.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether to log a warning on unsafe mutations (default `true`).
    ///
    /// [`Document::on_unsafe_mutation`] is published either way.
    pub fn warn_on_unsafe_mutation(mut self, warn: bool) -> Self {
        self.warn_on_unsafe_mutation = warn;
        self
    }

    /// The initial value (default `{}`).
    pub fn initial(mut self, value: Value) -> Self {
        self.initial = value;
        self
    }

    /// Build a mutable document.
    pub fn build_source(self) -> SourceDocument {
        SourceDocument::from_document(self.build(false))
    }

    pub(crate) fn build(self, read_only: bool) -> Document {
        let mut wrapper = Map::new();
        wrapper.insert(VALUE_KEY.to_owned(), self.initial);
        let shared = Arc::new_cyclic(|weak: &Weak<DocShared>| {
            let weak = weak.clone();
            DocShared {
                root: Mutex::new(Value::Object(wrapper)),
                on_change: Event::with_init(move || {
                    let shared = weak.upgrade()?;
                    let root = shared.root.lock();
                    diff(&Value::Object(Map::new()), &root)
                }),
                on_unsafe_mutation: Event::new(),
                read_only,
                updating: AtomicBool::new(false),
                label: self.label,
                warn_on_unsafe_mutation: self.warn_on_unsafe_mutation,
            }
        });
        Document { shared }
    }
}

// ============================================================================
// Document
// ============================================================================

pub(crate) struct DocShared {
    root: Mutex<Value>,
    on_change: Event<Delta>,
    on_unsafe_mutation: Event<UnsafeMutation>,
    read_only: bool,
    updating: AtomicBool,
    label: Option<String>,
    warn_on_unsafe_mutation: bool,
}

/// An observable JSON document.
///
/// This is a cheap handle; clones refer to the same document. Use
/// [`SourceDocument`] for a writable document and [`DerivedDocument`] for one
/// computed from others.
#[derive(Clone)]
pub struct Document {
    shared: Arc<DocShared>,
}

impl Document {
    pub(crate) fn from_shared(shared: Arc<DocShared>) -> Self {
        Self { shared }
    }

    /// The root view.
    ///
    /// Obtaining the view registers nothing; reading through it does.
    pub fn data(&self) -> View {
        View::new(self.shared.clone(), Path::root())
    }

    /// The current value, registering a dependency on all of it.
    pub fn value(&self) -> Value {
        self.data().to_value()
    }

    /// A detached deep copy of the current value. Registers nothing.
    pub fn snapshot(&self) -> Value {
        self.shared.snapshot(&Path::root()).unwrap_or(Value::Null)
    }

    /// Alias of [`Document::snapshot`].
    pub fn clone_raw(&self) -> Value {
        self.snapshot()
    }

    /// Untracked deep read of `path`, relative to the value.
    pub fn snap_get(&self, path: &Path) -> Option<Value> {
        self.shared.snapshot(path)
    }

    /// Tracked deep read of `path`, relative to the value.
    ///
    /// Descends one view at a time, registering one dependency per segment.
    pub fn read(&self, path: &Path) -> Option<Value> {
        let Some((last, init)) = path.segments().split_last() else {
            return Some(self.value());
        };
        let mut view = self.data();
        for seg in init {
            match view.get(seg.clone())? {
                Node::View(child) => view = child,
                Node::Value(_) => return None,
            }
        }
        view.get(last.clone()).map(Node::into_value)
    }

    /// Event carrying every change as a delta rooted at the wrapper
    /// (`{"value": ...}` in JSON form).
    ///
    /// A listener added with [`Event::listen`] first receives the delta from
    /// `{}` to the current wrapper.
    pub fn on_change(&self) -> Event<Delta> {
        self.shared.on_change.clone()
    }

    /// Event published when the document is written while a computation is
    /// recording dependencies.
    pub fn on_unsafe_mutation(&self) -> Event<UnsafeMutation> {
        self.shared.on_unsafe_mutation.clone()
    }

    /// A read-only document mirroring this one.
    pub fn readonly(&self) -> DerivedDocument {
        let source = self.clone();
        DerivedDocument::new(move || source.value())
    }

    /// The label given at construction.
    pub fn label(&self) -> Option<&str> {
        self.shared.label.as_deref()
    }

    /// Returns true if writes fail outside the document's own recompute.
    pub fn is_read_only(&self) -> bool {
        self.shared.read_only
    }

    /// Returns true if both handles refer to the same document.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub(crate) fn shared(&self) -> &Arc<DocShared> {
        &self.shared
    }

    /// Replace the whole value, publishing the delta if there is one.
    pub(crate) fn replace(&self, new: Value) -> bool {
        self.shared.replace(new)
    }

    /// Run `f` with writes allowed on a read-only document.
    pub(crate) fn updating<R>(&self, f: impl FnOnce() -> R) -> R {
        reactive::mutating(|| {
            let was = self.shared.updating.swap(true, Ordering::SeqCst);
            let _restore =
                reactive::scopeguard(|| self.shared.updating.store(was, Ordering::SeqCst));
            f()
        })
    }

    pub(crate) fn is_updating(&self) -> bool {
        self.shared.updating.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("label", &self.shared.label)
            .field("read_only", &self.shared.read_only)
            .field("value", &self.snapshot())
            .finish()
    }
}

// ============================================================================
// Operations
// ============================================================================

fn absolute(path: &Path) -> Path {
    Path::root().key(VALUE_KEY).join(path)
}

/// The canonical segment for `seg` inside `container`: an index into arrays,
/// a key into anything else.
pub(crate) fn normalize(container: &Value, seg: &Seg) -> Seg {
    match (container, seg.as_index()) {
        (Value::Array(_), Some(index)) => Seg::Index(index),
        _ => Seg::Key(seg.as_key().into_owned()),
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

impl DocShared {
    fn name(&self) -> &str {
        self.label.as_deref().unwrap_or("<unnamed>")
    }

    pub(crate) fn snapshot(&self, path: &Path) -> Option<Value> {
        absolute(path).get_in(&self.root.lock()).cloned()
    }

    /// Register a dependency on `path`, dirty whenever a delta touches it.
    fn depend(&self, path: &Path) {
        let abs = absolute(path);
        reactive::subscribe(&self.on_change, move |delta| patch_has(delta, &abs));
    }

    pub(crate) fn get(self: &Arc<Self>, base: &Path, seg: &Seg) -> Option<Node> {
        let (path, value) = {
            let root = self.root.lock();
            let container = absolute(base).get_in(&root);
            let path = base.child(container.map_or_else(|| seg.clone(), |c| normalize(c, seg)));
            let value = container.and_then(|c| seg.lookup(c)).map(|v| {
                if is_container(v) {
                    None
                } else {
                    Some(v.clone())
                }
            });
            (path, value)
        };
        self.depend(&path);
        match value? {
            Some(scalar) => Some(Node::Value(scalar)),
            None => Some(Node::View(View::new(self.clone(), path))),
        }
    }

    pub(crate) fn to_value(&self, path: &Path) -> Value {
        self.depend(path);
        self.snapshot(path).unwrap_or(Value::Null)
    }

    pub(crate) fn has(self: &Arc<Self>, base: &Path, seg: &Seg) -> bool {
        let abs = absolute(&base.child(seg.clone()));
        let present = abs.has_in(&self.root.lock());
        let doc = Arc::downgrade(self);
        reactive::subscribe(&self.on_change, move |delta| {
            if !patch_has(delta, &abs) {
                return false;
            }
            doc.upgrade()
                .is_some_and(|doc| abs.has_in(&doc.root.lock()) != present)
        });
        present
    }

    pub(crate) fn keys(&self, base: &Path) -> Vec<Seg> {
        let abs = absolute(base);
        let keys = {
            let root = self.root.lock();
            match abs.get_in(&root) {
                Some(Value::Object(map)) => map.keys().map(Seg::key).collect(),
                Some(Value::Array(items)) => (0..items.len()).map(Seg::Index).collect(),
                _ => Vec::new(),
            }
        };
        reactive::subscribe(&self.on_change, move |delta| keys_changed_at(delta, &abs));
        keys
    }

    pub(crate) fn len(self: &Arc<Self>, base: &Path) -> usize {
        let abs = absolute(base);
        let current = abs.get_in(&self.root.lock()).map(|v| match v {
            Value::Array(items) => Some(items.len()),
            _ => None,
        });
        let observed = match current {
            Some(Some(len)) => len,
            Some(None) => return self.keys(base).len(),
            None => 0,
        };
        let doc = Arc::downgrade(self);
        reactive::subscribe(&self.on_change, move |delta| {
            if !patch_has(delta, &abs) {
                return false;
            }
            let Some(doc) = doc.upgrade() else {
                return false;
            };
            let len = match abs.get_in(&doc.root.lock()) {
                Some(Value::Array(items)) => items.len(),
                _ => 0,
            };
            len != observed
        });
        observed
    }

    fn check_writable(&self, path: &Path) -> DocResult<()> {
        if self.read_only && !self.updating.load(Ordering::SeqCst) {
            return Err(DocError::mutation(path.clone()));
        }
        Ok(())
    }

    fn report_unsafe(&self, op: MutationOp, base: &Path, seg: &Seg, value: Option<&Value>) {
        if !reactive::is_recording() || self.updating.load(Ordering::SeqCst) {
            return;
        }
        let path = base.child(seg.clone());
        if self.warn_on_unsafe_mutation {
            tracing::warn!(
                document = self.name(),
                op = %op,
                path = %path,
                "document mutated while a computation is recording dependencies"
            );
        }
        let (target, whole) = {
            let root = self.root.lock();
            (
                absolute(base).get_in(&root).cloned().unwrap_or(Value::Null),
                root.get(VALUE_KEY).cloned().unwrap_or(Value::Null),
            )
        };
        self.on_unsafe_mutation.publish(&UnsafeMutation {
            op,
            path,
            target,
            value: value.cloned(),
            base: whole,
        });
    }

    fn publish(&self, delta: Delta) {
        tracing::trace!(document = self.name(), delta = %delta, "publishing change");
        self.on_change.publish(&delta);
    }

    pub(crate) fn set(&self, base: &Path, seg: &Seg, new: Value) -> DocResult<()> {
        self.check_writable(&base.child(seg.clone()))?;
        self.report_unsafe(MutationOp::Set, base, seg, Some(&new));
        reactive::mutating(|| {
            let delta = {
                let mut root = self.root.lock();
                let abs = absolute(base);
                let container = abs
                    .get_in_mut(&mut root)
                    .ok_or_else(|| DocError::not_a_container(base.clone()))?;
                let entry = match container {
                    Value::Object(map) => {
                        let key = seg.as_key().into_owned();
                        let changed = diff_entry(map.get(&key), Some(&new));
                        changed.map(|d| {
                            map.insert(key.clone(), new);
                            Delta::object_entry(key, d)
                        })
                    }
                    Value::Array(items) => {
                        let index = seg
                            .as_index()
                            .ok_or_else(|| DocError::invalid_key(base.clone(), seg.as_key()))?;
                        let len = items.len();
                        if index > len {
                            return Err(DocError::index_out_of_bounds(base.clone(), index, len));
                        }
                        let changed = diff_entry(items.get(index), Some(&new));
                        changed.map(|d| {
                            if index == len {
                                items.push(new);
                            } else {
                                items[index] = new;
                            }
                            Delta::array_entry(ArrayKey::At(index), d)
                        })
                    }
                    _ => return Err(DocError::not_a_container(base.clone())),
                };
                entry.map(|entry| prefix(&abs, entry))
            };
            if let Some(delta) = delta {
                self.publish(delta);
            }
            Ok(())
        })
    }

    pub(crate) fn delete(&self, base: &Path, seg: &Seg) -> DocResult<bool> {
        self.check_writable(&base.child(seg.clone()))?;
        self.report_unsafe(MutationOp::Delete, base, seg, None);
        reactive::mutating(|| {
            let delta = {
                let mut root = self.root.lock();
                let abs = absolute(base);
                let container = abs
                    .get_in_mut(&mut root)
                    .ok_or_else(|| DocError::not_a_container(base.clone()))?;
                let entry = match container {
                    Value::Object(map) => {
                        let key = seg.as_key().into_owned();
                        map.remove(&key)
                            .map(|old| Delta::object_entry(key, Delta::Deleted(old)))
                    }
                    Value::Array(items) => match seg.as_index() {
                        Some(index) if index < items.len() => {
                            let old = items.remove(index);
                            Some(Delta::array_entry(ArrayKey::Removed(index), Delta::Deleted(old)))
                        }
                        _ => None,
                    },
                    _ => return Err(DocError::not_a_container(base.clone())),
                };
                entry.map(|entry| prefix(&abs, entry))
            };
            let deleted = delta.is_some();
            if let Some(delta) = delta {
                self.publish(delta);
            }
            Ok(deleted)
        })
    }

    fn replace(&self, new: Value) -> bool {
        let mut wrapper = Map::new();
        wrapper.insert(VALUE_KEY.to_owned(), new);
        let wrapper = Value::Object(wrapper);
        let unsafe_write = reactive::is_recording() && !self.updating.load(Ordering::SeqCst);
        reactive::untracked(|| {
            reactive::mutating(|| {
                let (delta, before) = {
                    let mut root = self.root.lock();
                    let Some(delta) = diff(&root, &wrapper) else {
                        return false;
                    };
                    let before = std::mem::replace(&mut *root, wrapper);
                    (delta, before)
                };
                if unsafe_write {
                    self.report_replace(&delta, before);
                }
                self.publish(delta);
                true
            })
        })
    }

    fn report_replace(&self, delta: &Delta, before: Value) {
        if self.warn_on_unsafe_mutation {
            tracing::warn!(
                document = self.name(),
                delta = %delta,
                "document replaced while a computation is recording dependencies"
            );
        }
        let base = match before {
            Value::Object(mut wrapper) => wrapper.remove(VALUE_KEY).unwrap_or(Value::Null),
            _ => Value::Null,
        };
        let value = self.snapshot(&Path::root());
        self.on_unsafe_mutation.publish(&UnsafeMutation {
            op: MutationOp::Set,
            path: Path::root(),
            target: base.clone(),
            value,
            base,
        });
    }
}
