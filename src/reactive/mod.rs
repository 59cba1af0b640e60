//! A minimal reactive runtime: events, conditional dependencies and
//! auto-recomputing cells.
//!
//! Documents publish a [`Delta`](crate::Delta) on every write. Reads made
//! while a [`bind`] producer runs register a dependency whose predicate decides,
//! per published delta, whether the producer has to run again.

mod bind;
mod event;
mod recorder;

pub use bind::{bind, Bound};
pub use event::{Event, Subscription};
pub(crate) use recorder::scopeguard;
pub use recorder::{is_mutating, is_recording, mutating, recording_depth, subscribe, untracked};
