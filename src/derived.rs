//! Documents computed from other documents.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde_json::Value;

use crate::document::{Document, DocumentBuilder};
use crate::reactive::{bind, Bound, Subscription};

struct Binding {
    cell: Bound<Value>,
    listener: Subscription,
}

impl Binding {
    fn release(&self) {
        self.listener.unsubscribe();
        self.cell.dispose();
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.release();
    }
}

/// A read-only document whose value is produced by a reactive computation.
///
/// The producer runs immediately and again whenever something it read
/// changes; each new output replaces the document value, publishing the delta
/// like a source update. Writes through the document's views fail with
/// [`DocError::Mutation`](crate::DocError::Mutation) except while the document
/// applies its own recomputation.
///
/// Clones share the computation, which stops when the last clone is dropped
/// or [`DerivedDocument::dispose`] is called.
///
/// ```
/// use json_cell::{DerivedDocument, SourceDocument};
/// use serde_json::json;
///
/// let source = SourceDocument::new(json!({"a": 1, "b": {"c": 2}}));
/// let sum = DerivedDocument::new({
///     let source = source.clone();
///     move || {
///         let a = source.read(&json_cell::path!("a")).and_then(|v| v.as_i64()).unwrap_or(0);
///         let c = source.read(&json_cell::path!("b", "c")).and_then(|v| v.as_i64()).unwrap_or(0);
///         json!(a + c)
///     }
/// });
/// assert_eq!(sum.snapshot(), json!(3));
///
/// source.data().set("a", json!(5)).unwrap();
/// assert_eq!(sum.snapshot(), json!(7));
/// assert!(sum.data().set("x", json!(1)).is_err());
/// ```
#[derive(Clone)]
pub struct DerivedDocument {
    doc: Document,
    binding: Arc<Binding>,
}

impl DerivedDocument {
    /// Bind `producer` into a new derived document.
    pub fn new<F>(producer: F) -> Self
    where
        F: FnMut() -> Value + Send + 'static,
    {
        Self::from_builder(DocumentBuilder::new(), producer)
    }

    /// Like [`DerivedDocument::new`], starting from `initial` before the first
    /// output is applied.
    pub fn with_initial<F>(initial: Value, producer: F) -> Self
    where
        F: FnMut() -> Value + Send + 'static,
    {
        Self::from_builder(DocumentBuilder::new().initial(initial), producer)
    }

    /// Bind `producer` into a derived document configured by `builder`.
    pub fn from_builder<F>(builder: DocumentBuilder, producer: F) -> Self
    where
        F: FnMut() -> Value + Send + 'static,
    {
        let doc = builder.build(true);
        let cell = bind(producer);
        let target = doc.clone();
        let listener = cell.on_set().listen(move |(_, new)| {
            tracing::trace!(document = target.label().unwrap_or("<unnamed>"), "recomputed");
            target.updating(|| target.replace(new.clone()));
        });
        Self {
            doc,
            binding: Arc::new(Binding { cell, listener }),
        }
    }

    /// Returns true while the document applies its own recomputation.
    pub fn is_recomputing(&self) -> bool {
        self.doc.is_updating()
    }

    /// Stop recomputing. The last value stays readable.
    pub fn dispose(&self) {
        self.binding.release();
    }

    /// Returns true once the computation was stopped.
    pub fn is_disposed(&self) -> bool {
        self.binding.cell.is_disposed()
    }

    /// The underlying document handle.
    pub fn document(&self) -> &Document {
        &self.doc
    }
}

impl Deref for DerivedDocument {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.doc
    }
}

impl fmt::Debug for DerivedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedDocument")
            .field("doc", &self.doc)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocError, SourceDocument};
    use serde_json::json;

    #[test]
    fn test_initial_value_applied() {
        let derived = DerivedDocument::with_initial(json!({"pending": true}), || json!([1, 2]));
        assert_eq!(derived.snapshot(), json!([1, 2]));
        assert!(derived.is_read_only());
        assert!(!derived.is_recomputing());
    }

    #[test]
    fn test_writes_rejected() {
        let derived = DerivedDocument::new(|| json!({"a": {"b": 1}}));
        let a = derived.data().get("a").and_then(|n| n.into_view()).unwrap();
        assert_eq!(
            a.set("b", json!(2)),
            Err(DocError::mutation(crate::path!("a", "b")))
        );
        assert!(a.delete("b").unwrap_err().is_mutation());
        assert_eq!(derived.snapshot(), json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_dispose_stops_recomputing() {
        let source = SourceDocument::new(json!({"n": 1}));
        let derived = {
            let source = source.clone();
            DerivedDocument::new(move || source.value())
        };
        derived.dispose();
        assert!(derived.is_disposed());
        source.update(json!({"n": 2}));
        assert_eq!(derived.snapshot(), json!({"n": 1}));
    }

    #[test]
    fn test_drop_releases_source_dependencies() {
        let source = SourceDocument::new(json!({"n": 1}));
        let derived = {
            let source = source.clone();
            DerivedDocument::new(move || source.value())
        };
        assert_eq!(source.on_change().subscriber_count(), 1);
        drop(derived);
        assert_eq!(source.on_change().subscriber_count(), 0);
    }
}
