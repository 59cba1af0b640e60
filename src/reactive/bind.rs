//! Auto-recomputing cells.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::event::{Event, Subscription};
use super::recorder::{self, Computation};

type Producer<T> = Box<dyn FnMut() -> T + Send>;

struct BoundInner<T> {
    producer: Mutex<Producer<T>>,
    value: Mutex<T>,
    dirty: AtomicBool,
    running: AtomicBool,
    disposed: AtomicBool,
    subscriptions: Mutex<Vec<Subscription>>,
    on_set: Event<(T, T)>,
}

/// A cell holding the output of a producer function, recomputed whenever a
/// dependency the producer registered is invalidated.
///
/// Created with [`bind`]. Clones share the same cell.
pub struct Bound<T> {
    inner: Arc<BoundInner<T>>,
}

impl<T> Clone for Bound<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Run `producer` as a reactive computation and keep its output up to date.
///
/// The producer runs once immediately. Every dependency it registers while
/// running (see [`subscribe`](super::subscribe)) is kept until the next run;
/// when one is invalidated the old dependencies are dropped, the producer runs
/// again, and [`Bound::on_set`] fires with `(old, new)` if the output changed.
///
/// ```
/// use json_cell::reactive::{bind, subscribe, Event};
/// use std::sync::Arc;
/// use parking_lot::Mutex;
///
/// let input = Arc::new(Mutex::new(2));
/// let changed = Event::<()>::new();
///
/// let doubled = bind({
///     let (input, changed) = (input.clone(), changed.clone());
///     move || {
///         subscribe(&changed, |_| true);
///         *input.lock() * 2
///     }
/// });
/// assert_eq!(doubled.peek(), 4);
///
/// *input.lock() = 5;
/// changed.publish(&());
/// assert_eq!(doubled.peek(), 10);
/// ```
pub fn bind<T, F>(producer: F) -> Bound<T>
where
    T: Clone + Default + PartialEq + Send + 'static,
    F: FnMut() -> T + Send + 'static,
{
    let inner = Arc::new_cyclic(|weak: &std::sync::Weak<BoundInner<T>>| {
        let weak = weak.clone();
        BoundInner {
            producer: Mutex::new(Box::new(producer)),
            value: Mutex::new(T::default()),
            dirty: AtomicBool::new(true),
            running: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
            on_set: Event::with_init(move || {
                let inner = weak.upgrade()?;
                let current = inner.value.lock().clone();
                Some((T::default(), current))
            }),
        }
    });
    inner.clone().refresh();
    Bound { inner }
}

impl<T> Bound<T>
where
    T: Clone + Default + PartialEq + Send + 'static,
{
    /// The current value, registering a dependency on this cell.
    pub fn get(&self) -> T {
        recorder::subscribe(&self.inner.on_set, |_| true);
        self.peek()
    }

    /// The current value, without registering a dependency.
    pub fn peek(&self) -> T {
        self.inner.value.lock().clone()
    }

    /// Event fired with `(old, new)` whenever the output changes.
    ///
    /// A listener added with [`Event::listen`] first receives
    /// `(T::default(), current)`.
    pub fn on_set(&self) -> Event<(T, T)> {
        self.inner.on_set.clone()
    }

    /// Stop recomputing and drop all dependencies. The last value stays
    /// readable.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.release();
    }

    /// Returns true once [`Bound::dispose`] was called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

impl<T> BoundInner<T> {
    fn release(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in &subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl<T> Computation for BoundInner<T>
where
    T: Clone + Default + PartialEq + Send + 'static,
{
    fn track(&self, subscription: Subscription) {
        if self.disposed.load(Ordering::SeqCst) {
            subscription.unsubscribe();
        } else {
            self.subscriptions.lock().push(subscription);
        }
    }

    fn mark_dirty(&self) -> bool {
        !self.disposed.load(Ordering::SeqCst) && !self.dirty.swap(true, Ordering::SeqCst)
    }

    fn refresh(self: Arc<Self>) {
        if self.disposed.load(Ordering::SeqCst) || self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let _running = recorder::scopeguard(|| self.running.store(false, Ordering::SeqCst));
        // Invalidations during a run are picked up by the next iteration.
        while self.dirty.swap(false, Ordering::SeqCst) && !self.disposed.load(Ordering::SeqCst) {
            self.release();
            let next = {
                let mut producer = self.producer.lock();
                let frame: Arc<dyn Computation> = self.clone();
                recorder::with_frame(frame, || (*producer)())
            };
            let previous = {
                let mut value = self.value.lock();
                if *value == next {
                    None
                } else {
                    Some(std::mem::replace(&mut *value, next.clone()))
                }
            };
            match previous {
                Some(old) => {
                    tracing::trace!("bound value changed");
                    self.on_set.publish(&(old, next));
                }
                None => tracing::trace!("bound value unchanged"),
            }
        }
    }
}

impl<T> Drop for BoundInner<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for Bound<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("value", &*self.inner.value.lock())
            .field("disposed", &self.inner.disposed.load(Ordering::SeqCst))
            .finish()
    }
}
