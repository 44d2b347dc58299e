//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracked computation (memo/effect), the
//!    signal registers that computation as a subscriber.
//!
//! 2. When a signal's value changes, its subscribers are handed to the
//!    runtime, which runs them (immediately or in the next frame flush,
//!    depending on the flush mode).
//!
//! 3. Writes equal to the current value are dropped under the default
//!    equality policy.
//!
//! # History
//!
//! Every accepted write pushes the prior value into a bounded history
//! buffer (oldest evicted first). [`WriteSignal::undo`] restores the most
//! recent entry.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Debug};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;

use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::{Source, Subscriber, SubscriberId};
use crate::config::EqualityPolicy;

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique signal ID.
fn next_signal_id() -> u64 {
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct SignalInner<T> {
    id: u64,
    runtime: WeakRuntime,
    value: RefCell<T>,
    subscribers: RefCell<IndexSet<SubscriberId>>,
    /// Subscribers added through `subscribe`, owned by the registry.
    callbacks: RefCell<Vec<SubscriberId>>,
    /// Subscriptions on other signals that feed this one.
    upstream: RefCell<Vec<Unsubscribe>>,
    history: RefCell<VecDeque<T>>,
    derived: RefCell<HashMap<&'static str, Box<dyn Any>>>,
}

impl<T> Source for SignalInner<T> {
    fn source_id(&self) -> u64 {
        self.id
    }

    fn unsubscribe(&self, subscriber: SubscriberId) {
        self.subscribers.borrow_mut().shift_remove(&subscriber);
        self.callbacks.borrow_mut().retain(|id| *id != subscriber);
    }
}

/// A reactive signal holding a value of type T.
///
/// Cloning a signal shares its state.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: next_signal_id(),
                runtime: runtime.downgrade(),
                value: RefCell::new(value),
                subscribers: RefCell::new(IndexSet::new()),
                callbacks: RefCell::new(Vec::new()),
                upstream: RefCell::new(Vec::new()),
                history: RefCell::new(VecDeque::new()),
                derived: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Split into read and write halves sharing this signal.
    pub fn split(self) -> (ReadSignal<T>, WriteSignal<T>) {
        (ReadSignal(self.clone()), WriteSignal(self))
    }

    /// A read-only view of this signal.
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal(self.clone())
    }

    /// Register the running computation, if any, as a subscriber.
    fn track(&self) {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return;
        };
        let source: Rc<dyn Source> = self.inner.clone();
        if let Some(subscriber_id) = runtime.observer().track(source) {
            self.inner.subscribers.borrow_mut().insert(subscriber_id);
        }
    }

    /// Borrow the value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Borrow the value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Register a callback invoked after every accepted write.
    ///
    /// Callbacks run wherever effects would run: in the next frame flush in
    /// batched mode, inside the write in synchronous mode.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn() + 'static,
    {
        let subscriber = Subscriber::new(callback);
        let id = subscriber.id();
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.register(Rc::new(subscriber));
            self.inner.subscribers.borrow_mut().insert(id);
            self.inner.callbacks.borrow_mut().push(id);
        }
        Unsubscribe {
            id,
            source: Rc::downgrade(&(self.inner.clone() as Rc<dyn Source>)),
            runtime: self.inner.runtime.clone(),
        }
    }

    /// Drop every subscriber and the derived cache, and release the
    /// subscriptions this signal holds on its sources.
    pub fn cleanup(&self) {
        self.inner.subscribers.borrow_mut().clear();
        self.inner.derived.borrow_mut().clear();

        let callbacks = std::mem::take(&mut *self.inner.callbacks.borrow_mut());
        if let Some(runtime) = self.inner.runtime.upgrade() {
            for id in callbacks {
                runtime.unregister(id);
            }
        }
        let upstream = std::mem::take(&mut *self.inner.upstream.borrow_mut());
        for subscription in upstream {
            subscription.unsubscribe();
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Number of prior values available to `undo`.
    pub fn history_len(&self) -> usize {
        self.inner.history.borrow().len()
    }

    /// Hand every subscriber to the runtime.
    fn notify(&self, runtime: &Runtime) {
        let subscribers: Vec<SubscriberId> =
            self.inner.subscribers.borrow().iter().copied().collect();
        runtime.notify_subscribers(subscribers);
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value.
    ///
    /// If called within a tracked computation, this also registers the
    /// computation as a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Alias of [`peek`](Self::peek).
    pub fn get_untracked(&self) -> T {
        self.peek()
    }

    /// A projection of the current value, cached under `key` until the next
    /// accepted write.
    pub fn derive<U, F>(&self, key: &'static str, f: F) -> U
    where
        U: Clone + 'static,
        F: FnOnce(&T) -> U,
    {
        let cached = self
            .inner
            .derived
            .borrow()
            .get(key)
            .and_then(|value| value.downcast_ref::<U>().cloned());
        if let Some(value) = cached {
            return value;
        }

        let value = f(&self.inner.value.borrow());
        self.inner
            .derived
            .borrow_mut()
            .insert(key, Box::new(value.clone()));
        value
    }
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        self.write(value, true);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Restore the most recent history entry.
    ///
    /// Returns whether an undo occurred. The restored write does not record
    /// history of its own.
    pub fn undo(&self) -> bool {
        let previous = self.inner.history.borrow_mut().pop_back();
        match previous {
            Some(value) => {
                self.write(value, false);
                true
            }
            None => false,
        }
    }

    /// A signal holding `f` applied to this signal's value, kept in sync
    /// through a manual subscription.
    ///
    /// Cleaning up the returned signal ends the subscription.
    pub fn map<U, F>(&self, f: F) -> ReadSignal<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        let initial = self.with_untracked(|value| f(value));
        let mapped = match self.inner.runtime.upgrade() {
            Some(runtime) => Signal::new(&runtime, initial),
            None => return ReadSignal(Signal::detached(initial)),
        };

        let source = self.clone();
        let target = mapped.clone();
        let subscription = self.subscribe(move || {
            let next = source.with_untracked(|value| f(value));
            target.set(next);
        });
        mapped.inner.upstream.borrow_mut().push(subscription);
        ReadSignal(mapped)
    }

    fn write(&self, value: T, record_history: bool) {
        let runtime = self.inner.runtime.upgrade();
        let config = runtime.as_ref().map(|rt| rt.config().clone());
        let (policy, capacity) = config
            .map(|c| (c.equality, c.history_capacity))
            .unwrap_or((EqualityPolicy::SkipIdentical, 0));

        if policy == EqualityPolicy::SkipIdentical && *self.inner.value.borrow() == value {
            return;
        }

        let previous = self.inner.value.replace(value);
        if record_history && capacity > 0 {
            let mut history = self.inner.history.borrow_mut();
            if history.len() >= capacity {
                history.pop_front();
            }
            history.push_back(previous);
        }
        self.inner.derived.borrow_mut().clear();

        if let Some(runtime) = runtime {
            self.notify(&runtime);
        }
    }
}

impl<T: 'static> Signal<T> {
    /// A signal not attached to any runtime; it never notifies.
    fn detached(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                id: next_signal_id(),
                runtime: WeakRuntime::default(),
                value: RefCell::new(value),
                subscribers: RefCell::new(IndexSet::new()),
                callbacks: RefCell::new(Vec::new()),
                upstream: RefCell::new(Vec::new()),
                history: RefCell::new(VecDeque::new()),
                derived: RefCell::new(HashMap::new()),
            }),
        }
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Handle returned by [`Signal::subscribe`].
#[derive(Clone)]
pub struct Unsubscribe {
    id: SubscriberId,
    source: std::rc::Weak<dyn Source>,
    runtime: WeakRuntime,
}

impl Unsubscribe {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the subscription. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(source) = self.source.upgrade() {
            source.unsubscribe(self.id);
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.unregister(self.id);
        }
    }
}

/// The read half of a signal.
pub struct ReadSignal<T: 'static>(Signal<T>);

/// The write half of a signal.
pub struct WriteSignal<T: 'static>(Signal<T>);

impl<T: 'static> ReadSignal<T> {
    pub fn id(&self) -> u64 {
        self.0.id()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.0.with(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.0.with_untracked(f)
    }

    pub fn subscribe<F: Fn() + 'static>(&self, callback: F) -> Unsubscribe {
        self.0.subscribe(callback)
    }

    pub fn cleanup(&self) {
        self.0.cleanup()
    }

    pub fn subscriber_count(&self) -> usize {
        self.0.subscriber_count()
    }

    pub fn history_len(&self) -> usize {
        self.0.history_len()
    }
}

impl<T: Clone + 'static> ReadSignal<T> {
    pub fn get(&self) -> T {
        self.0.get()
    }

    pub fn peek(&self) -> T {
        self.0.peek()
    }

    pub fn derive<U: Clone + 'static, F: FnOnce(&T) -> U>(&self, key: &'static str, f: F) -> U {
        self.0.derive(key, f)
    }
}

impl<T: Clone + PartialEq + 'static> ReadSignal<T> {
    pub fn map<U, F>(&self, f: F) -> ReadSignal<U>
    where
        U: Clone + PartialEq + 'static,
        F: Fn(&T) -> U + 'static,
    {
        self.0.map(f)
    }
}

impl<T: Clone + PartialEq + 'static> WriteSignal<T> {
    pub fn set(&self, value: T) {
        self.0.set(value)
    }

    pub fn update<F: FnOnce(&T) -> T>(&self, f: F) {
        self.0.update(f)
    }

    pub fn undo(&self) -> bool {
        self.0.undo()
    }
}

impl<T: 'static> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> From<Signal<T>> for ReadSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        ReadSignal(signal)
    }
}

impl<T: Debug + 'static> Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadSignal").field(&self.0).finish()
    }
}

impl<T: Debug + 'static> Debug for WriteSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WriteSignal").field(&self.0).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
