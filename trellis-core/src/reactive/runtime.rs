//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns everything that would otherwise be process-wide state:
//! the observer stack, the registry of live subscribers, the pending-work
//! collections and the host task queues.
//!
//! # How It Works
//!
//! 1. Signals and effects hold a weak handle to the runtime that created
//!    them.
//!
//! 2. When a signal is written, the runtime receives the ids of its
//!    subscribers. In batched mode it queues them and opens a batch; in
//!    synchronous mode it runs them on the spot.
//!
//! 3. Opening a batch queues a microtask. The microtask closes the batch and
//!    requests a single frame flush, no matter how many signals changed.
//!
//! 4. The frame flush drains the pending work (each subscriber once), then
//!    the effects whose first run was deferred because they were created
//!    while a batch was open.
//!
//! # Ownership
//!
//! The registry holds the only strong reference to a live effect, so an
//! effect stays alive until it is disposed even if its handle is dropped.
//! Signals and effects only hold weak references back to the runtime.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use tracing::{debug, error, trace, warn};

use super::context::ObserverStack;
use super::effect::{Cleanup, Effect, EffectOptions};
use super::memo::{Memo, MemoKey};
use super::signal::{ReadSignal, Signal, WriteSignal};
use super::subscriber::{Reactive, SubscriberId};
use crate::config::{FlushMode, RuntimeConfig};
use crate::error::ReactiveError;
use crate::render::NodePool;
use crate::scheduler::{Scheduler, Tier};

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) observer: ObserverStack,
    pub(crate) scheduler: Scheduler,
    pub(crate) pool: RefCell<NodePool>,

    registry: RefCell<HashMap<SubscriberId, Rc<dyn Reactive>>>,
    pending_work: RefCell<IndexSet<SubscriberId>>,
    pending_effects: RefCell<IndexSet<SubscriberId>>,
    batching: Cell<bool>,
    frame_pending: Cell<bool>,
    frame_flushes: Cell<usize>,

    memo_cache: RefCell<HashMap<MemoKey, CachedMemo>>,
    next_memo_key: Cell<u64>,
}

/// A type-erased keyed memo plus the means to dispose it.
struct CachedMemo {
    memo: Rc<dyn Any>,
    dispose: Box<dyn Fn()>,
}

/// Handle to a reactive runtime.
///
/// Cloning the handle shares the runtime. Everything created through a
/// runtime stops reacting once the last handle is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let (count, set_count) = rt.create_signal(0);
///
/// let doubled = rt.create_memo(move || count.get() * 2);
/// rt.effect(move || println!("doubled: {}", doubled.get()));
///
/// set_count.set(5);
/// rt.tick(); // prints "doubled: 10"
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Weak handle to a runtime, held by signals, effects and host tasks.
#[derive(Clone, Default)]
pub struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with the given configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let pool = NodePool::new(config.pool_capacity);
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                observer: ObserverStack::new(),
                scheduler: Scheduler::new(),
                pool: RefCell::new(pool),
                registry: RefCell::new(HashMap::new()),
                pending_work: RefCell::new(IndexSet::new()),
                pending_effects: RefCell::new(IndexSet::new()),
                batching: Cell::new(false),
                frame_pending: Cell::new(false),
                frame_flushes: Cell::new(0),
                memo_cache: RefCell::new(HashMap::new()),
                next_memo_key: Cell::new(0),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn observer(&self) -> &ObserverStack {
        &self.inner.observer
    }

    /// The host task queues driving this runtime.
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub(crate) fn pool(&self) -> &RefCell<NodePool> {
        &self.inner.pool
    }

    // ------------------------------------------------------------------
    // Primitives
    // ------------------------------------------------------------------

    /// Create a signal and return its combined read/write handle.
    pub fn signal<T: 'static>(&self, initial: T) -> Signal<T> {
        Signal::new(self, initial)
    }

    /// Create a signal and return its read and write halves.
    pub fn create_signal<T: 'static>(&self, initial: T) -> (ReadSignal<T>, WriteSignal<T>) {
        Signal::new(self, initial).split()
    }

    /// Create an effect whose body may return a cleanup callback.
    ///
    /// The effect runs immediately, unless a batch is open, in which case
    /// its first run happens in the next frame flush.
    pub fn create_effect<F>(&self, body: F) -> Effect
    where
        F: FnMut() -> Option<Cleanup> + 'static,
    {
        Effect::create(self, body, EffectOptions::default())
    }

    /// Create an effect without a cleanup callback.
    pub fn effect<F>(&self, mut body: F) -> Effect
    where
        F: FnMut() + 'static,
    {
        self.create_effect(move || {
            body();
            None
        })
    }

    /// Create a memo over `compute`.
    pub fn create_memo<T, F>(&self, compute: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        Memo::new(self, compute, true)
    }

    /// Issue a new cache key for [`create_memo_keyed`](Self::create_memo_keyed).
    pub fn memo_key(&self) -> MemoKey {
        let key = self.inner.next_memo_key.get();
        self.inner.next_memo_key.set(key + 1);
        MemoKey::new(key)
    }

    /// Return the memo cached under `key`, creating it on first use.
    ///
    /// Keyed memos are not owned by the running effect; they live until
    /// disposed or evicted with [`forget_memo`](Self::forget_memo).
    pub fn create_memo_keyed<T, F>(&self, key: MemoKey, compute: F) -> Memo<T>
    where
        T: Clone + PartialEq + 'static,
        F: Fn() -> T + 'static,
    {
        let cached = self
            .inner
            .memo_cache
            .borrow()
            .get(&key)
            .and_then(|entry| entry.memo.downcast_ref::<Memo<T>>().cloned());

        match cached {
            Some(memo) if !memo.is_disposed() => memo,
            _ => {
                let memo = Memo::new(self, compute, false);
                let disposer = memo.clone();
                let previous = self.inner.memo_cache.borrow_mut().insert(
                    key,
                    CachedMemo {
                        memo: Rc::new(memo.clone()),
                        dispose: Box::new(move || disposer.dispose()),
                    },
                );
                // A key reused with a different value type replaces the old memo.
                if let Some(previous) = previous {
                    (previous.dispose)();
                }
                memo
            }
        }
    }

    /// Drop the memo cached under `key`, disposing it.
    pub fn forget_memo(&self, key: MemoKey) -> bool {
        let entry = self.inner.memo_cache.borrow_mut().remove(&key);
        match entry {
            Some(entry) => {
                (entry.dispose)();
                true
            }
            None => false,
        }
    }

    /// Run `f` without tracking any signal it reads.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.observer.untracked(f)
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    pub(crate) fn register(&self, reactive: Rc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        self.inner.registry.borrow_mut().insert(id, reactive);
    }

    /// Remove a subscriber from the registry and every pending collection.
    pub(crate) fn unregister(&self, id: SubscriberId) {
        self.inner.registry.borrow_mut().remove(&id);
        self.inner.pending_work.borrow_mut().shift_remove(&id);
        self.inner.pending_effects.borrow_mut().shift_remove(&id);
    }

    pub(crate) fn is_registered(&self, id: SubscriberId) -> bool {
        self.inner.registry.borrow().contains_key(&id)
    }

    /// Number of live subscribers (effects, memo effects and callbacks).
    pub fn live_subscribers(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    fn lookup(&self, id: SubscriberId) -> Option<Rc<dyn Reactive>> {
        self.inner.registry.borrow().get(&id).cloned()
    }

    fn run_subscriber(&self, id: SubscriberId) {
        // Release the registry borrow before running user code.
        let Some(reactive) = self.lookup(id) else {
            trace!(?id, "skipping subscriber that is no longer registered");
            return;
        };

        match reactive.notify() {
            Ok(()) => {}
            Err(ReactiveError::Reentrant(id)) => {
                trace!(?id, "re-entrant run skipped");
            }
            Err(ReactiveError::Disposed(id)) => {
                debug!(?id, "disposed subscriber did not run");
            }
            Err(err) => {
                error!(?id, %err, "subscriber failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Propagation and batching
    // ------------------------------------------------------------------

    /// Whether a batch is currently open.
    pub fn is_batching(&self) -> bool {
        self.inner.batching.get()
    }

    /// Number of frame flushes performed so far.
    pub fn frame_flushes(&self) -> usize {
        self.inner.frame_flushes.get()
    }

    /// Number of subscribers waiting for the next flush.
    pub fn pending_work(&self) -> usize {
        self.inner.pending_work.borrow().len() + self.inner.pending_effects.borrow().len()
    }

    /// Called by a signal after its value changed.
    pub(crate) fn notify_subscribers(&self, subscribers: Vec<SubscriberId>) {
        match self.inner.config.flush_mode {
            FlushMode::Synchronous => {
                for id in subscribers {
                    self.run_subscriber(id);
                }
            }
            FlushMode::Batched => {
                if !self.inner.batching.get() {
                    self.auto_batch();
                }
                self.inner.pending_work.borrow_mut().extend(subscribers);
            }
        }
    }

    /// Queue an effect's first run for the end of the current batch.
    pub(crate) fn defer_effect(&self, id: SubscriberId) {
        self.inner.pending_effects.borrow_mut().insert(id);
    }

    /// Open a batch and close it at the next microtask checkpoint.
    pub fn auto_batch(&self) {
        self.inner.batching.set(true);
        let weak = self.downgrade();
        self.inner.scheduler.queue(Tier::Microtask, move || {
            if let Some(rt) = weak.upgrade() {
                rt.inner.batching.set(false);
                rt.schedule_render();
            }
        });
    }

    /// Request a frame flush unless one is already pending.
    pub fn schedule_render(&self) {
        if self.inner.frame_pending.replace(true) {
            return;
        }

        debug!("frame flush requested");
        let weak = self.downgrade();
        self.inner.scheduler.queue(Tier::Frame, move || {
            if let Some(rt) = weak.upgrade() {
                rt.inner.frame_pending.set(false);
                rt.inner
                    .frame_flushes
                    .set(rt.inner.frame_flushes.get() + 1);
                rt.process_batch();
                rt.flush_effects();
            }
        });
    }

    /// Run every queued subscriber exactly once.
    ///
    /// Work queued while draining waits for the next flush.
    pub fn process_batch(&self) -> usize {
        let updates = std::mem::take(&mut *self.inner.pending_work.borrow_mut());
        if updates.is_empty() {
            return 0;
        }

        debug!(count = updates.len(), "processing batched updates");
        for &id in &updates {
            self.run_subscriber(id);
        }
        updates.len()
    }

    /// Run the effects whose first run was deferred by an open batch.
    pub fn flush_effects(&self) -> usize {
        let effects = std::mem::take(&mut *self.inner.pending_effects.borrow_mut());
        if effects.is_empty() {
            return 0;
        }

        debug!(count = effects.len(), "flushing deferred effects");
        for &id in &effects {
            self.run_subscriber(id);
        }
        effects.len()
    }

    // ------------------------------------------------------------------
    // Host loop
    // ------------------------------------------------------------------

    /// Run pending microtasks, then one frame.
    pub fn tick(&self) -> usize {
        let scheduler = &self.inner.scheduler;
        scheduler.run_microtasks() + scheduler.run_frame()
    }

    /// Run all three tiers until no work is left.
    ///
    /// Returns the number of rounds taken, or
    /// [`ReactiveError::FlushLimit`] if work kept reappearing past
    /// `max_flush_rounds`.
    pub fn run_until_idle(&self) -> Result<usize, ReactiveError> {
        let scheduler = &self.inner.scheduler;
        let limit = self.inner.config.max_flush_rounds;
        let mut rounds = 0;

        loop {
            scheduler.run_microtasks();
            let progressed = if scheduler.pending(Tier::Frame) > 0 {
                scheduler.run_frame() > 0
            } else {
                scheduler.run_idle()
            };
            if !progressed {
                return Ok(rounds);
            }

            rounds += 1;
            if rounds >= limit {
                warn!(rounds, "host loop did not settle");
                return Err(ReactiveError::FlushLimit { rounds });
            }
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("live_subscribers", &self.live_subscribers())
            .field("batching", &self.is_batching())
            .field("frame_flushes", &self.frame_flushes())
            .field("pending_work", &self.pending_work())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct MockReactive {
        id: SubscriberId,
        notified: Cell<usize>,
    }

    impl MockReactive {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: SubscriberId::new(),
                notified: Cell::new(0),
            })
        }
    }

    impl Reactive for MockReactive {
        fn subscriber_id(&self) -> SubscriberId {
            self.id
        }

        fn notify(&self) -> Result<(), ReactiveError> {
            self.notified.set(self.notified.get() + 1);
            Ok(())
        }

        fn dispose(&self) {}
    }

    #[test]
    fn runtime_registers_and_unregisters() {
        let rt = Runtime::new();
        let reactive = MockReactive::new();
        let id = reactive.id;

        rt.register(reactive);
        assert!(rt.is_registered(id));

        rt.unregister(id);
        assert!(!rt.is_registered(id));
    }

    #[test]
    fn batched_notifications_are_deduplicated() {
        let rt = Runtime::new();
        let reactive = MockReactive::new();
        rt.register(reactive.clone());

        rt.notify_subscribers(vec![reactive.id]);
        rt.notify_subscribers(vec![reactive.id]);
        assert!(rt.is_batching());
        assert_eq!(reactive.notified.get(), 0);

        rt.tick();
        assert_eq!(reactive.notified.get(), 1);
        assert_eq!(rt.frame_flushes(), 1);
        assert!(!rt.is_batching());
    }

    #[test]
    fn synchronous_mode_notifies_inline() {
        let rt = Runtime::with_config(RuntimeConfig::minimal());
        let reactive = MockReactive::new();
        rt.register(reactive.clone());

        rt.notify_subscribers(vec![reactive.id]);
        assert_eq!(reactive.notified.get(), 1);
        assert_eq!(rt.scheduler().pending(Tier::Microtask), 0);
    }

    #[test]
    fn unregistered_subscriber_is_removed_from_pending_work() {
        let rt = Runtime::new();
        let reactive = MockReactive::new();
        rt.register(reactive.clone());

        rt.notify_subscribers(vec![reactive.id]);
        rt.unregister(reactive.id);
        rt.tick();

        assert_eq!(reactive.notified.get(), 0);
        assert_eq!(rt.pending_work(), 0);
    }

    #[test]
    fn render_is_requested_once_per_frame() {
        let rt = Runtime::new();
        rt.schedule_render();
        rt.schedule_render();
        rt.schedule_render();

        assert_eq!(rt.scheduler().pending(Tier::Frame), 1);
        rt.tick();
        assert_eq!(rt.frame_flushes(), 1);
    }

    #[test]
    fn run_until_idle_reports_runaway_loops() {
        let config = RuntimeConfig {
            max_flush_rounds: 5,
            ..RuntimeConfig::default()
        };
        let rt = Runtime::with_config(config);

        fn requeue(rt: WeakRuntime) {
            if let Some(strong) = rt.upgrade() {
                let next = rt.clone();
                strong.scheduler().queue(Tier::Idle, move || requeue(next));
            }
        }
        requeue(rt.downgrade());

        assert_eq!(
            rt.run_until_idle(),
            Err(ReactiveError::FlushLimit { rounds: 5 })
        );
    }
}
