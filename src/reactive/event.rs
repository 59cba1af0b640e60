//! Publishable events.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slab::Slab;

type Callback<P> = Box<dyn FnMut(&P) + Send>;
type Init<P> = Box<dyn Fn() -> Option<P> + Send + Sync>;

/// Listener ids disambiguate slab slots that were freed and reused.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

struct Listener<P> {
    id: u64,
    active: AtomicBool,
    callback: Mutex<Callback<P>>,
}

struct EventShared<P> {
    listeners: Mutex<Slab<Arc<Listener<P>>>>,
    init: Option<Init<P>>,
}

/// Type-erased removal, so a [`Subscription`] does not carry the payload type.
trait Detach: Send + Sync {
    fn detach(&self, key: usize, id: u64);
}

impl<P> Detach for EventShared<P> {
    fn detach(&self, key: usize, id: u64) {
        let mut listeners = self.listeners.lock();
        if listeners.get(key).is_some_and(|l| l.id == id) {
            let listener = listeners.remove(key);
            listener.active.store(false, Ordering::SeqCst);
        }
    }
}

/// An event carrying payloads of type `P` to its listeners.
///
/// This is cheap to clone; clones publish to and listen on the same event.
///
/// Publication is synchronous. Listeners run in registration order on a
/// snapshot of the listener list, so a listener may subscribe or unsubscribe
/// while the event is being published. Listeners added during a publication
/// first see the next one.
pub struct Event<P> {
    shared: Arc<EventShared<P>>,
}

impl<P> Clone for Event<P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<P: 'static> Default for Event<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for Event<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("listeners", &self.shared.listeners.lock().len())
            .finish()
    }
}

impl<P: 'static> Event<P> {
    /// Create an event without an initial payload.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an event whose listeners receive `init()` once, when they
    /// subscribe through [`Event::listen`].
    ///
    /// `init` returning `None` delivers nothing.
    pub fn with_init(init: impl Fn() -> Option<P> + Send + Sync + 'static) -> Self {
        Self::build(Some(Box::new(init)))
    }

    fn build(init: Option<Init<P>>) -> Self {
        Self {
            shared: Arc::new(EventShared {
                listeners: Mutex::new(Slab::new()),
                init,
            }),
        }
    }

    /// Subscribe `callback` to every publication, delivering the initial
    /// payload first if the event has one.
    pub fn listen(&self, callback: impl FnMut(&P) + Send + 'static) -> Subscription {
        let (subscription, listener) = self.insert(Box::new(callback));
        if let Some(payload) = self.shared.init.as_ref().and_then(|init| init()) {
            let mut callback = listener.callback.lock();
            (*callback)(&payload);
        }
        subscription
    }

    /// Subscribe `callback` without delivering the initial payload.
    pub(crate) fn attach(&self, callback: impl FnMut(&P) + Send + 'static) -> Subscription {
        self.insert(Box::new(callback)).0
    }

    fn insert(&self, callback: Callback<P>) -> (Subscription, Arc<Listener<P>>) {
        let listener = Arc::new(Listener {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            callback: Mutex::new(callback),
        });
        let key = self.shared.listeners.lock().insert(listener.clone());
        let event: Weak<dyn Detach> = Arc::downgrade(&self.shared) as Weak<dyn Detach>;
        let subscription = Subscription {
            event,
            key,
            id: listener.id,
        };
        (subscription, listener)
    }

    /// Deliver `payload` to every current listener.
    pub fn publish(&self, payload: &P) {
        let listeners: Vec<Arc<Listener<P>>> = self
            .shared
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            if !listener.active.load(Ordering::SeqCst) {
                continue;
            }
            match listener.callback.try_lock() {
                Some(mut callback) => (*callback)(payload),
                None => tracing::warn!(
                    listener = listener.id,
                    "skipping listener re-entered by its own publication"
                ),
            }
        }
    }

    /// Number of subscribed listeners.
    pub fn subscriber_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }
}

/// Handle to a listener registered on an [`Event`].
///
/// Dropping the handle leaves the listener subscribed; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    event: Weak<dyn Detach>,
    key: usize,
    id: u64,
}

impl Subscription {
    /// Remove the listener. Idempotent, and a no-op once the event is gone.
    pub fn unsubscribe(&self) {
        if let Some(event) = self.event.upgrade() {
            event.detach(self.key, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
