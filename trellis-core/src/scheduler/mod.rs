//! Host Task Scheduler
//!
//! The scheduler models the three task tiers a host event loop offers:
//!
//! - **Microtask**: runs at the next checkpoint, before any frame work.
//!   Batches close here.
//! - **Frame**: runs once per rendered frame. Batched updates flush here.
//! - **Idle**: runs when the host has spare time. Large child lists are
//!   appended here in chunks.
//!
//! Within a tier, tasks run in the order they were queued. A task may queue
//! more tasks; microtasks queued by a microtask run in the same checkpoint,
//! while frame tasks queued by a frame task wait for the next frame.
//!
//! The scheduler does not own a clock. Something has to pump it: tests call
//! [`Runtime::tick`](crate::reactive::Runtime::tick) or
//! [`Runtime::run_until_idle`](crate::reactive::Runtime::run_until_idle),
//! and [`FrameDriver`] pumps it from a tokio timer.

pub mod driver;

pub use driver::{run_frames, FrameDriver};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use tracing::trace;

type Task = Box<dyn FnOnce()>;

/// Which queue a task goes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Microtask,
    Frame,
    Idle,
}

/// FIFO queues for the three host tiers.
#[derive(Default)]
pub struct Scheduler {
    microtasks: RefCell<VecDeque<Task>>,
    frame: RefCell<VecDeque<Task>>,
    idle: RefCell<VecDeque<Task>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_for(&self, tier: Tier) -> &RefCell<VecDeque<Task>> {
        match tier {
            Tier::Microtask => &self.microtasks,
            Tier::Frame => &self.frame,
            Tier::Idle => &self.idle,
        }
    }

    /// Queue a task on the given tier.
    pub fn queue(&self, tier: Tier, task: impl FnOnce() + 'static) {
        trace!(?tier, "task queued");
        self.queue_for(tier).borrow_mut().push_back(Box::new(task));
    }

    /// Number of tasks waiting on a tier.
    pub fn pending(&self, tier: Tier) -> usize {
        self.queue_for(tier).borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.microtasks.borrow().is_empty()
            && self.frame.borrow().is_empty()
            && self.idle.borrow().is_empty()
    }

    fn pop(&self, tier: Tier) -> Option<Task> {
        // The borrow ends here, so the task may queue more work.
        self.queue_for(tier).borrow_mut().pop_front()
    }

    /// Run microtasks until the queue is empty, including ones queued along
    /// the way.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop(Tier::Microtask) {
            task();
            ran += 1;
        }
        ran
    }

    /// Run the frame tasks queued before this call, draining microtasks
    /// after each one.
    pub fn run_frame(&self) -> usize {
        let batch = std::mem::take(&mut *self.frame.borrow_mut());
        let ran = batch.len();
        for task in batch {
            task();
            self.run_microtasks();
        }
        ran
    }

    /// Run a single idle task followed by any microtasks it queued.
    ///
    /// Returns false when there was nothing to run.
    pub fn run_idle(&self) -> bool {
        match self.pop(Tier::Idle) {
            Some(task) => {
                task();
                self.run_microtasks();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("microtasks", &self.pending(Tier::Microtask))
            .field("frame", &self.pending(Tier::Frame))
            .field("idle", &self.pending(Tier::Idle))
            .finish()
    }
}
