//! Tests for which writes invalidate which reads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use json_cell::reactive::{bind, is_recording, untracked, Bound};
use json_cell::{path, MutationOp, Node, SourceDocument, View};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Bind `read` and count how many times it runs.
fn watch<F>(mut read: F) -> (Bound<Value>, Arc<AtomicUsize>)
where
    F: FnMut() -> Value + Send + 'static,
{
    let runs = Arc::new(AtomicUsize::new(0));
    let r = runs.clone();
    let cell = bind(move || {
        r.fetch_add(1, Ordering::SeqCst);
        read()
    });
    (cell, runs)
}

fn view(node: Option<Node>) -> View {
    node.and_then(Node::into_view).expect("expected a view")
}

fn runs(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

// ============================================================================
// Property dependencies
// ============================================================================

#[test]
fn test_sibling_writes_do_not_invalidate() {
    let doc = SourceDocument::new(json!({"a": 1, "b": {"c": 2, "d": 0}}));
    let b = view(doc.data().get("b"));
    let (cell, count) = watch({
        let b = b.clone();
        move || b.get("c").map(Node::into_value).unwrap_or(Value::Null)
    });
    assert_eq!(runs(&count), 1);

    doc.data().set("a", json!(5)).unwrap();
    b.set("d", json!(1)).unwrap();
    assert_eq!(runs(&count), 1);

    b.set("c", json!(3)).unwrap();
    assert_eq!(runs(&count), 2);
    assert_eq!(cell.peek(), json!(3));
}

#[test]
fn test_reading_through_container_depends_on_it() {
    let doc = SourceDocument::new(json!({"a": 1, "b": {"c": 2, "d": 0}}));
    let (_cell, count) = watch({
        let doc = doc.clone();
        move || doc.read(&path!("b", "c")).unwrap_or(Value::Null)
    });

    doc.data().set("a", json!(5)).unwrap();
    assert_eq!(runs(&count), 1);

    // Reading `b` on the way to `b.c` is a dependency on all of `b`.
    view(doc.data().get("b")).set("d", json!(1)).unwrap();
    assert_eq!(runs(&count), 2);
}

#[test]
fn test_update_invalidates_only_changed_paths() {
    let doc = SourceDocument::new(json!({"a": 1, "b": {"c": 2}}));
    let (_cell, count) = watch({
        let doc = doc.clone();
        move || doc.read(&path!("b", "c")).unwrap_or(Value::Null)
    });

    doc.update(json!({"a": 2, "b": {"c": 2}}));
    assert_eq!(runs(&count), 1);

    doc.update(json!({"a": 2, "b": {"c": 4}}));
    assert_eq!(runs(&count), 2);
}

#[test]
fn test_replacing_ancestor_invalidates() {
    let doc = SourceDocument::new(json!({"b": {"c": 2}}));
    let (cell, count) = watch({
        let doc = doc.clone();
        move || doc.read(&path!("b", "c")).unwrap_or(Value::Null)
    });

    doc.data().set("b", json!(7)).unwrap();
    assert_eq!(runs(&count), 2);
    assert_eq!(cell.peek(), Value::Null);

    doc.data().set("b", json!({"c": 9})).unwrap();
    assert_eq!(runs(&count), 3);
    assert_eq!(cell.peek(), json!(9));
}

#[test]
fn test_missing_property_invalidated_when_added() {
    let doc = SourceDocument::new(json!({}));
    let (cell, _) = watch({
        let doc = doc.clone();
        move || doc.read(&path!("later")).unwrap_or(json!("none"))
    });
    assert_eq!(cell.peek(), json!("none"));
    doc.data().set("later", json!("here")).unwrap();
    assert_eq!(cell.peek(), json!("here"));
}

#[test]
fn test_element_after_removal_is_invalidated() {
    let doc = SourceDocument::new(json!({"list": ["a", "b", "c"]}));
    let list = view(doc.data().get("list"));
    let (cell, _) = watch({
        let list = list.clone();
        move || list.get(1).map(Node::into_value).unwrap_or(Value::Null)
    });
    assert_eq!(cell.peek(), json!("b"));

    list.delete(0).unwrap();
    assert_eq!(cell.peek(), json!("c"));

    list.set(0, json!("z")).unwrap();
    assert_eq!(cell.peek(), json!("c"));
}

// ============================================================================
// Length, enumeration and presence
// ============================================================================

#[test]
fn test_length_dependency_fires_on_length_change_only() {
    let doc = SourceDocument::new(json!({"list": [1, 2, 3]}));
    let list = view(doc.data().get("list"));
    let (cell, count) = watch({
        let list = list.clone();
        move || json!(list.len())
    });

    list.set(0, json!(10)).unwrap();
    doc.update(json!({"list": [10, 20, 30]}));
    assert_eq!(runs(&count), 1);

    list.push(json!(4)).unwrap();
    assert_eq!(runs(&count), 2);
    assert_eq!(cell.peek(), json!(4));

    list.delete(0).unwrap();
    assert_eq!(runs(&count), 3);
    assert_eq!(cell.peek(), json!(3));
}

#[test]
fn test_enumeration_fires_on_key_changes_only() {
    let doc = SourceDocument::new(json!({"obj": {"x": 1, "y": 2}}));
    let obj = view(doc.data().get("obj"));
    let (cell, count) = watch({
        let obj = obj.clone();
        move || {
            let keys: Vec<String> = obj.keys().iter().map(|k| k.to_string()).collect();
            json!(keys)
        }
    });
    assert_eq!(cell.peek(), json!(["x", "y"]));

    obj.set("x", json!(100)).unwrap();
    assert_eq!(runs(&count), 1);

    obj.set("z", json!(3)).unwrap();
    assert_eq!(runs(&count), 2);
    assert_eq!(cell.peek(), json!(["x", "y", "z"]));

    obj.delete("y").unwrap();
    assert_eq!(runs(&count), 3);
    assert_eq!(cell.peek(), json!(["x", "z"]));
}

#[test]
fn test_array_enumeration() {
    let doc = SourceDocument::new(json!({"list": [{"v": 1}, {"v": 2}]}));
    let list = view(doc.data().get("list"));
    let (_cell, count) = watch({
        let list = list.clone();
        move || json!(list.keys().len())
    });

    view(list.get(0)).set("v", json!(5)).unwrap();
    list.set(1, json!({"v": 6})).unwrap();
    assert_eq!(runs(&count), 1);

    list.push(json!({"v": 7})).unwrap();
    assert_eq!(runs(&count), 2);
}

#[test]
fn test_has_fires_on_presence_flip_only() {
    let doc = SourceDocument::new(json!({"obj": {"x": 1, "y": 2}}));
    let obj = view(doc.data().get("obj"));
    let (cell, count) = watch({
        let obj = obj.clone();
        move || json!(obj.has("x"))
    });

    obj.set("y", json!(3)).unwrap();
    obj.set("x", json!(5)).unwrap();
    assert_eq!(runs(&count), 1);

    obj.delete("x").unwrap();
    assert_eq!(runs(&count), 2);
    assert_eq!(cell.peek(), json!(false));

    obj.set("x", json!(0)).unwrap();
    assert_eq!(runs(&count), 3);
    assert_eq!(cell.peek(), json!(true));
}

// ============================================================================
// Unsafe mutation
// ============================================================================

#[test]
fn test_mutation_inside_computation_is_reported() {
    let target = SourceDocument::builder()
        .label("target")
        .initial(json!({"log": []}))
        .warn_on_unsafe_mutation(false)
        .build_source();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let r = reports.clone();
    target.on_unsafe_mutation().listen(move |m| r.lock().push(m.clone()));

    let input = SourceDocument::new(json!({"n": 1}));
    let _cell = bind({
        let (input, target) = (input.clone(), target.clone());
        move || {
            let n = input.read(&path!("n")).unwrap_or(Value::Null);
            assert!(is_recording());
            untracked(|| target.data().set("last", n.clone())).unwrap();
            n
        }
    });

    // The write is flagged but not blocked.
    assert_eq!(target.snapshot(), json!({"log": [], "last": 1}));
    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].op, MutationOp::Set);
    assert_eq!(reports[0].path, path!("last"));
    assert_eq!(reports[0].value, Some(json!(1)));
    assert_eq!(reports[0].base, json!({"log": []}));
    assert_eq!(reports[0].target, json!({"log": []}));
}

#[test]
fn test_delete_inside_computation_is_reported() {
    let target = SourceDocument::builder()
        .initial(json!({"log": [], "last": 0}))
        .warn_on_unsafe_mutation(false)
        .build_source();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let r = reports.clone();
    target.on_unsafe_mutation().listen(move |m| r.lock().push(m.clone()));

    let _cell = bind({
        let target = target.clone();
        move || {
            untracked(|| target.data().delete("last")).unwrap();
            Value::Null
        }
    });

    assert_eq!(target.snapshot(), json!({"log": []}));
    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].op, MutationOp::Delete);
    assert_eq!(reports[0].path, path!("last"));
    assert_eq!(reports[0].value, None);
    assert_eq!(reports[0].base, json!({"log": [], "last": 0}));
    assert_eq!(reports[0].target, json!({"log": [], "last": 0}));
}

#[test]
fn test_update_inside_computation_is_reported() {
    let target = SourceDocument::builder()
        .initial(json!({"a": 0}))
        .warn_on_unsafe_mutation(false)
        .build_source();
    let reports = Arc::new(Mutex::new(Vec::new()));
    let r = reports.clone();
    target.on_unsafe_mutation().listen(move |m| r.lock().push(m.clone()));

    let input = SourceDocument::new(json!({"n": 1}));
    let _cell = bind({
        let (input, target) = (input.clone(), target.clone());
        move || {
            let n = input.read(&path!("n")).unwrap_or(Value::Null);
            untracked(|| target.update(json!({"n": n.clone()})));
            n
        }
    });

    assert_eq!(target.snapshot(), json!({"n": 1}));
    let reports = reports.lock();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].op, MutationOp::Set);
    assert_eq!(reports[0].path, path!());
    assert_eq!(reports[0].path.to_string(), "$");
    assert_eq!(reports[0].value, Some(json!({"n": 1})));
    assert_eq!(reports[0].base, json!({"a": 0}));
}

#[test]
fn test_mutation_outside_computation_is_not_reported() {
    let doc = SourceDocument::new(json!({}));
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    doc.on_unsafe_mutation().listen(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    doc.data().set("a", json!(1)).unwrap();
    doc.data().delete("a").unwrap();
    doc.update(json!({"b": 2}));
    assert_eq!(runs(&count), 0);
}
