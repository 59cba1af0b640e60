//! Writable documents.

use std::ops::Deref;

use serde_json::Value;

use crate::document::{Document, DocumentBuilder};
use crate::view::View;

/// A mutable observable document, the entry point for externally driven state.
///
/// ```
/// use json_cell::SourceDocument;
/// use serde_json::json;
///
/// let doc = SourceDocument::new(json!({"a": 1, "b": {"c": 2}}));
/// doc.update(json!({"a": 1, "b": {"c": 3}}));
/// assert_eq!(doc.snapshot(), json!({"a": 1, "b": {"c": 3}}));
/// ```
#[derive(Clone, Debug)]
pub struct SourceDocument {
    doc: Document,
}

impl SourceDocument {
    /// Create a document holding `value`.
    pub fn new(value: Value) -> Self {
        Self::builder().initial(value).build_source()
    }

    /// Create a builder for a labelled or otherwise configured document.
    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }

    pub(crate) fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// Replace the whole value.
    ///
    /// Publishes one delta covering exactly the paths that differ, so only
    /// dependents of those paths recompute. Returns false, publishing nothing,
    /// if `value` equals the current value.
    pub fn update(&self, value: Value) -> bool {
        self.doc.replace(value)
    }

    /// Alias of [`SourceDocument::update`].
    pub fn set_data(&self, value: Value) -> bool {
        self.update(value)
    }

    /// The underlying document handle.
    pub fn document(&self) -> &Document {
        &self.doc
    }
}

impl Deref for SourceDocument {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.doc
    }
}

/// Create a source document holding `value` and return its root view.
///
/// The document lives as long as any view on it.
pub fn json_cell(value: Value) -> View {
    SourceDocument::new(value).data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_update_publishes_minimal_delta() {
        let doc = SourceDocument::new(json!({"a": 1, "list": [1, 2]}));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        doc.on_change().attach(move |d| s.lock().push(d.to_value()));

        assert!(doc.update(json!({"a": 1, "list": [1, 2, 3]})));
        assert!(!doc.set_data(json!({"a": 1, "list": [1, 2, 3]})));
        assert_eq!(
            *seen.lock(),
            vec![json!({"value": {"list": {"_t": "a", "2": [3]}}})]
        );
    }

    #[test]
    fn test_update_changes_root_type() {
        let doc = SourceDocument::new(json!({"a": 1}));
        assert!(doc.update(json!([1, 2])));
        assert!(doc.data().is_array());
        assert!(doc.update(json!("text")));
        assert_eq!(doc.value(), json!("text"));
    }

    #[test]
    fn test_builder_label() {
        let doc = SourceDocument::builder().label("state").build_source();
        assert_eq!(doc.label(), Some("state"));
        assert_eq!(doc.snapshot(), json!({}));
        assert!(!doc.is_read_only());
    }
}
