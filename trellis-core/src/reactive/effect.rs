//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies. If a batch is open, the first run is deferred to
//!    the batch flush instead.
//!
//! 2. When any dependency changes, the runtime re-runs the effect.
//!
//! 3. Dependencies are dynamic. Each run records the sources it read; after
//!    the run, the effect unsubscribes from every source it read last time
//!    but not this time.
//!
//! # Cleanup
//!
//! The body can return a cleanup callback. It runs before the next run and
//! when the effect is disposed, exactly once per run.
//!
//! # Ownership
//!
//! Effects created while another effect is running belong to it. They are
//! disposed before the owner runs again and when the owner is disposed.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::{trace, warn};

use super::context::SourceList;
use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::{Reactive, SubscriberId};
use crate::error::ReactiveError;

/// Callback returned by an effect body, run before the next run.
pub type Cleanup = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct EffectOptions {
    /// Run the first time even if a batch is open.
    pub(crate) immediate: bool,
    /// Attach to the running effect, if any.
    pub(crate) owned: bool,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self {
            immediate: false,
            owned: true,
        }
    }
}

struct EffectInner {
    id: SubscriberId,
    runtime: WeakRuntime,
    body: RefCell<Box<dyn FnMut() -> Option<Cleanup>>>,
    cleanup: RefCell<Option<Cleanup>>,
    /// Sources read during the last run.
    sources: RefCell<SourceList>,
    /// Effects created during the last run.
    children: RefCell<Vec<Effect>>,
    running: Cell<bool>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
}

/// A side-effecting computation that runs when dependencies change.
///
/// The handle doubles as the disposer: [`Effect::dispose`] stops the effect
/// for good. Dropping the handle does not.
///
/// # Example
///
/// ```rust,ignore
/// let count = rt.signal(0);
///
/// let effect = rt.effect({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);
/// rt.tick(); // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

/// Resets the running flag even if the body panics.
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Effect {
    pub(crate) fn create<F>(runtime: &Runtime, body: F, options: EffectOptions) -> Self
    where
        F: FnMut() -> Option<Cleanup> + 'static,
    {
        let effect = Self {
            inner: Rc::new(EffectInner {
                id: SubscriberId::new(),
                runtime: runtime.downgrade(),
                body: RefCell::new(Box::new(body)),
                cleanup: RefCell::new(None),
                sources: RefCell::new(SmallVec::new()),
                children: RefCell::new(Vec::new()),
                running: Cell::new(false),
                disposed: Cell::new(false),
                run_count: Cell::new(0),
            }),
        };

        runtime.register(Rc::new(effect.clone()));
        if options.owned {
            // Root effects are owned by whoever holds the handle.
            let _ = runtime.observer().adopt(effect.clone());
        }

        if runtime.is_batching() && !options.immediate {
            trace!(id = ?effect.id(), "effect created during batch; first run deferred");
            runtime.defer_effect(effect.id());
        } else if let Err(err) = effect.run() {
            warn!(id = ?effect.id(), %err, "initial effect run failed");
        }

        effect
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Execute the effect function.
    ///
    /// Runs the previous cleanup and disposes owned effects, then runs the
    /// body inside a tracked context and reconciles dependency edges.
    pub fn run(&self) -> Result<(), ReactiveError> {
        let inner = &self.inner;
        if inner.disposed.get() {
            return Err(ReactiveError::Disposed(inner.id));
        }
        if inner.running.get() {
            warn!(id = ?inner.id, "effect triggered itself while running; skipping");
            return Err(ReactiveError::Reentrant(inner.id));
        }
        let runtime = inner.runtime.upgrade().ok_or(ReactiveError::RuntimeDropped)?;

        let previous_cleanup = inner.cleanup.borrow_mut().take();
        if let Some(cleanup) = previous_cleanup {
            cleanup();
        }
        let previous_children = std::mem::take(&mut *inner.children.borrow_mut());
        for child in previous_children {
            child.dispose();
        }

        inner.running.set(true);
        let running = RunningGuard(&inner.running);
        let context = runtime.observer().enter(inner.id);
        let cleanup = {
            let mut body = inner.body.borrow_mut();
            (&mut **body)()
        };
        let record = context.finish();
        drop(running);

        inner.run_count.set(inner.run_count.get() + 1);
        trace!(id = ?inner.id, sources = record.sources.len(), "effect ran");

        // Drop edges to sources this run did not read.
        let previous = inner.sources.replace(record.sources);
        {
            let current = inner.sources.borrow();
            for source in previous {
                let id = source.source_id();
                if !current.iter().any(|s| s.source_id() == id) {
                    source.unsubscribe(inner.id);
                }
            }
        }
        *inner.children.borrow_mut() = record.owned;

        if inner.disposed.get() {
            // Disposed from inside its own body.
            self.release();
            if let Some(cleanup) = cleanup {
                cleanup();
            }
            return Ok(());
        }

        *inner.cleanup.borrow_mut() = cleanup;
        Ok(())
    }

    /// Dispose of the effect.
    ///
    /// Runs the pending cleanup, removes the effect from every signal it
    /// subscribed to and from any pending flush. Calling it again is a no-op.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.replace(true) {
            return;
        }

        if let Some(runtime) = inner.runtime.upgrade() {
            runtime.unregister(inner.id);
        }
        self.release();

        let cleanup = inner.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    fn release(&self) {
        let inner = &self.inner;
        let sources = std::mem::take(&mut *inner.sources.borrow_mut());
        for source in sources {
            source.unsubscribe(inner.id);
        }
        let children = std::mem::take(&mut *inner.children.borrow_mut());
        for child in children {
            child.dispose();
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Get the number of sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.borrow().len()
    }

    /// Number of effects created during the last run.
    pub fn owned_count(&self) -> usize {
        self.inner.children.borrow().len()
    }
}

impl Reactive for Effect {
    fn subscriber_id(&self) -> SubscriberId {
        self.inner.id
    }

    fn notify(&self) -> Result<(), ReactiveError> {
        self.run()
    }

    fn dispose(&self) {
        Effect::dispose(self)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
