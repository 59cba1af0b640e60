//! Dependency recording and mutation scopes.
//!
//! The recorder is thread-local. While a computation runs, it sits on the
//! recording stack and every [`subscribe`] call attaches a conditional
//! dependency to it. Writes run inside [`mutating`] scopes; computations
//! invalidated inside a scope are refreshed once the outermost scope exits, so
//! they observe the fully applied write.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use super::event::{Event, Subscription};

/// A recomputable node the recorder can attach dependencies to.
pub(crate) trait Computation: Send + Sync {
    /// Keep `subscription` until the next recompute.
    fn track(&self, subscription: Subscription);

    /// Mark dirty; returns true if the computation was clean before.
    fn mark_dirty(&self) -> bool;

    /// Recompute if dirty.
    fn refresh(self: Arc<Self>);
}

#[derive(Default)]
struct Recorder {
    stack: Vec<Arc<dyn Computation>>,
    ignoring: usize,
    mutating: usize,
    flushing: bool,
    pending: VecDeque<Arc<dyn Computation>>,
}

thread_local! {
    static RECORDER: RefCell<Recorder> = RefCell::new(Recorder::default());
}

/// Returns true while a computation is recording dependencies on this thread,
/// including inside [`untracked`] sections of that computation.
pub fn is_recording() -> bool {
    recording_depth() > 0
}

/// Number of computations currently on the recording stack.
pub fn recording_depth() -> usize {
    RECORDER.with(|r| r.borrow().stack.len())
}

/// Returns true inside a [`mutating`] scope.
pub fn is_mutating() -> bool {
    RECORDER.with(|r| r.borrow().mutating > 0)
}

/// Run `f` without registering any dependencies.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    RECORDER.with(|r| r.borrow_mut().ignoring += 1);
    let _guard = scopeguard(|| RECORDER.with(|r| r.borrow_mut().ignoring -= 1));
    f()
}

/// Run `f` as a mutation.
///
/// Scopes nest. Computations invalidated while any scope is open are queued
/// and refreshed, in invalidation order, when the outermost scope exits.
pub fn mutating<R>(f: impl FnOnce() -> R) -> R {
    RECORDER.with(|r| r.borrow_mut().mutating += 1);
    let result = {
        let _guard = scopeguard(|| RECORDER.with(|r| r.borrow_mut().mutating -= 1));
        f()
    };
    if !is_mutating() {
        flush();
    }
    result
}

/// Register a dependency of the running computation on `event`.
///
/// Each publication is passed to `predicate`; when it returns true the
/// computation is invalidated. Outside a computation, or inside
/// [`untracked`], this does nothing.
pub fn subscribe<P: 'static>(event: &Event<P>, mut predicate: impl FnMut(&P) -> bool + Send + 'static) {
    let Some(current) = current() else {
        return;
    };
    let computation = Arc::downgrade(&current);
    let subscription = event.attach(move |payload| {
        if predicate(payload) {
            if let Some(computation) = computation.upgrade() {
                invalidate(computation);
            }
        }
    });
    current.track(subscription);
}

fn current() -> Option<Arc<dyn Computation>> {
    RECORDER.with(|r| {
        let r = r.borrow();
        if r.ignoring > 0 {
            None
        } else {
            r.stack.last().cloned()
        }
    })
}

/// Invalidate `computation`, refreshing it now or once mutations settle.
pub(crate) fn invalidate(computation: Arc<dyn Computation>) {
    if !computation.mark_dirty() {
        return;
    }
    let deferred = RECORDER.with(|r| {
        let mut r = r.borrow_mut();
        if r.mutating > 0 || r.flushing {
            r.pending.push_back(computation.clone());
            true
        } else {
            false
        }
    });
    if !deferred {
        computation.refresh();
    }
}

/// Run `f` with `frame` recording dependencies.
pub(crate) fn with_frame<R>(frame: Arc<dyn Computation>, f: impl FnOnce() -> R) -> R {
    let ignoring = RECORDER.with(|r| {
        let mut r = r.borrow_mut();
        r.stack.push(frame);
        std::mem::take(&mut r.ignoring)
    });
    let _guard = scopeguard(move || {
        RECORDER.with(|r| {
            let mut r = r.borrow_mut();
            r.stack.pop();
            r.ignoring = ignoring;
        })
    });
    f()
}

/// Refresh queued computations with a clean recording context.
fn flush() {
    let saved = RECORDER.with(|r| {
        let mut r = r.borrow_mut();
        if r.flushing || r.pending.is_empty() {
            return None;
        }
        r.flushing = true;
        Some((std::mem::take(&mut r.stack), std::mem::take(&mut r.ignoring)))
    });
    let Some((stack, ignoring)) = saved else {
        return;
    };
    let _guard = scopeguard(move || {
        RECORDER.with(|r| {
            let mut r = r.borrow_mut();
            r.flushing = false;
            r.stack = stack;
            r.ignoring = ignoring;
        })
    });
    while let Some(next) = RECORDER.with(|r| r.borrow_mut().pending.pop_front()) {
        next.refresh();
    }
}

/// Runs its closure on drop, so state is restored on unwind too.
pub(crate) struct ScopeGuard<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

pub(crate) fn scopeguard<F: FnOnce()>(f: F) -> ScopeGuard<F> {
    ScopeGuard(Some(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Probe {
        dirty: AtomicBool,
        refreshes: AtomicUsize,
        subscriptions: Mutex<Vec<Subscription>>,
    }

    impl Computation for Probe {
        fn track(&self, subscription: Subscription) {
            self.subscriptions.lock().push(subscription);
        }

        fn mark_dirty(&self) -> bool {
            !self.dirty.swap(true, Ordering::SeqCst)
        }

        fn refresh(self: Arc<Self>) {
            if self.dirty.swap(false, Ordering::SeqCst) {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_subscribe_outside_computation_is_noop() {
        let event = Event::<u32>::new();
        subscribe(&event, |_| true);
        assert_eq!(event.subscriber_count(), 0);
        assert!(!is_recording());
    }

    #[test]
    fn test_predicate_controls_invalidation() {
        let event = Event::<u32>::new();
        let probe = Arc::new(Probe::default());
        with_frame(probe.clone(), || {
            assert!(is_recording());
            subscribe(&event, |n| *n > 10);
        });
        assert_eq!(probe.subscriptions.lock().len(), 1);

        event.publish(&1);
        assert_eq!(probe.refreshes.load(Ordering::SeqCst), 0);
        event.publish(&11);
        assert_eq!(probe.refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_untracked_suppresses_subscribe() {
        let event = Event::<u32>::new();
        let probe = Arc::new(Probe::default());
        with_frame(probe.clone(), || {
            untracked(|| {
                assert!(is_recording());
                subscribe(&event, |_| true);
            });
        });
        assert_eq!(event.subscriber_count(), 0);
    }

    #[test]
    fn test_mutating_defers_refresh_until_outermost_exit() {
        let event = Event::<()>::new();
        let probe = Arc::new(Probe::default());
        with_frame(probe.clone(), || subscribe(&event, |_| true));

        mutating(|| {
            mutating(|| event.publish(&()));
            assert!(is_mutating());
            event.publish(&());
            assert_eq!(probe.refreshes.load(Ordering::SeqCst), 0);
        });
        assert!(!is_mutating());
        assert_eq!(probe.refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_runs_with_clean_stack() {
        let event = Event::<()>::new();
        let depth = Arc::new(AtomicUsize::new(usize::MAX));

        struct DepthProbe {
            dirty: AtomicBool,
            depth: Arc<AtomicUsize>,
        }
        impl Computation for DepthProbe {
            fn track(&self, _subscription: Subscription) {}
            fn mark_dirty(&self) -> bool {
                !self.dirty.swap(true, Ordering::SeqCst)
            }
            fn refresh(self: Arc<Self>) {
                self.depth.store(recording_depth(), Ordering::SeqCst);
            }
        }

        let probe = Arc::new(DepthProbe {
            dirty: AtomicBool::new(false),
            depth: depth.clone(),
        });
        let weak = Arc::downgrade(&(probe.clone() as Arc<dyn Computation>));
        event.attach(move |_| {
            if let Some(c) = weak.upgrade() {
                invalidate(c);
            }
        });

        let outer = Arc::new(Probe::default());
        with_frame(outer, || mutating(|| event.publish(&())));
        assert_eq!(depth.load(Ordering::SeqCst), 0);
    }
}
