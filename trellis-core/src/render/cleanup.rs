//! Auto-cleanup observer.
//!
//! Nodes removed with [`Node::remove`] bypass [`Runtime::dispose_node`], so
//! their cleanups (listener removal, reactive regions) would never run. The
//! observer watches a root for such removals and disposes each removed
//! subtree at the next microtask checkpoint.
//!
//! A removed node is skipped if, by the time the queue drains, it was
//! disposed, recycled (its generation moved on) or inserted somewhere else.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use super::node::{Node, ObserverId, WeakNode};
use crate::reactive::{Runtime, WeakRuntime};
use crate::scheduler::Tier;

struct Inner {
    runtime: WeakRuntime,
    root: WeakNode,
    observer: Cell<Option<ObserverId>>,
    /// Removed nodes with their generation at removal time.
    queue: RefCell<Vec<(Node, u64)>>,
    scheduled: Cell<bool>,
    disposed: Cell<usize>,
}

/// Handle to an active removal observer.
///
/// Dropping the handle stops the observer from disposing anything; call
/// [`disconnect`](Self::disconnect) to unregister it from the root as well.
pub struct AutoCleanup {
    inner: Rc<Inner>,
}

impl AutoCleanup {
    /// Start watching `root` for raw removals.
    pub fn observe(rt: &Runtime, root: &Node) -> Self {
        let inner = Rc::new(Inner {
            runtime: rt.downgrade(),
            root: root.downgrade(),
            observer: Cell::new(None),
            queue: RefCell::new(Vec::new()),
            scheduled: Cell::new(false),
            disposed: Cell::new(0),
        });

        let weak = Rc::downgrade(&inner);
        let id = root.observe_removals(move |node| {
            if let Some(inner) = weak.upgrade() {
                Self::record(&inner, node);
            }
        });
        inner.observer.set(Some(id));
        Self { inner }
    }

    fn record(inner: &Rc<Inner>, node: &Node) {
        trace!(generation = node.generation(), "removal recorded");
        inner
            .queue
            .borrow_mut()
            .push((node.clone(), node.generation()));

        if inner.scheduled.replace(true) {
            return;
        }
        let Some(rt) = inner.runtime.upgrade() else {
            return;
        };
        let weak: Weak<Inner> = Rc::downgrade(inner);
        rt.scheduler().queue(Tier::Microtask, move || {
            if let Some(inner) = weak.upgrade() {
                Self::drain(&inner);
            }
        });
    }

    fn drain(inner: &Inner) -> usize {
        inner.scheduled.set(false);
        let records = std::mem::take(&mut *inner.queue.borrow_mut());
        let Some(rt) = inner.runtime.upgrade() else {
            return 0;
        };

        let mut disposed = 0;
        for (node, generation) in records {
            if node.is_disposed() || node.generation() != generation || node.parent().is_some() {
                continue;
            }
            rt.dispose_node(&node);
            disposed += 1;
        }
        if disposed > 0 {
            debug!(disposed, "removed subtrees disposed");
        }
        inner.disposed.set(inner.disposed.get() + disposed);
        disposed
    }

    /// Process queued removals now instead of at the next checkpoint.
    pub fn flush(&self) -> usize {
        Self::drain(&self.inner)
    }

    /// Removals queued and not yet processed.
    pub fn pending(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Total subtrees disposed by this observer.
    pub fn disposed_count(&self) -> usize {
        self.inner.disposed.get()
    }

    /// Stop observing the root. Already queued removals are still processed.
    pub fn disconnect(&self) {
        if let (Some(id), Some(root)) = (self.inner.observer.take(), self.inner.root.upgrade()) {
            root.unobserve_removals(id);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.observer.get().is_some()
    }
}
