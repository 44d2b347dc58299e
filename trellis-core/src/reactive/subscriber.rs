//! Subscriber types for the reactive system.
//!
//! A subscriber is anything a signal can notify: effects (and the effects
//! owned by memos) as well as plain callbacks registered through
//! `Signal::subscribe`. Signals only ever store a [`SubscriberId`]; the
//! runtime registry maps ids back to the [`Reactive`] that should run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ReactiveError;

/// Unique identifier for a subscriber.
///
/// Each subscriber (memo, effect, or manual callback) gets a unique ID when
/// created. Signals use it to keep their subscriber sets free of duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A computation the runtime can notify when a dependency changes.
pub trait Reactive {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// React to a dependency change.
    fn notify(&self) -> Result<(), ReactiveError>;

    /// Stop reacting and release every dependency edge.
    fn dispose(&self);
}

/// Something that can be read inside a tracked computation.
///
/// The observer stack records sources so an effect can diff the sources it
/// read on consecutive runs and drop the edges it no longer needs.
pub(crate) trait Source {
    fn source_id(&self) -> u64;

    fn unsubscribe(&self, subscriber: SubscriberId);
}

/// A manual subscriber that invokes a callback on every notification.
///
/// Created by `Signal::subscribe`. Unlike effects, callbacks do not track
/// what they read.
pub struct Subscriber {
    id: SubscriberId,
    notify: Box<dyn Fn()>,
}

impl Subscriber {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Box::new(notify),
        }
    }

    /// Get the subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Reactive for Subscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn notify(&self) -> Result<(), ReactiveError> {
        (self.notify)();
        Ok(())
    }

    fn dispose(&self) {}
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_notify_calls_callback() {
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();

        let subscriber = Subscriber::new(move || called_clone.set(true));

        assert!(!called.get());
        subscriber.notify().unwrap();
        assert!(called.get());
    }
}
