//! Observer Stack
//!
//! The observer stack tracks which computation is currently running. This
//! enables automatic dependency tracking: when a signal is read, the
//! innermost running computation is registered as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`](super::Runtime) owns one stack. Running an effect pushes
//! a frame and hands back a [`ContextGuard`]; the frame is popped when the
//! guard is finished or dropped, so a panicking effect body cannot leave a
//! stale observer behind.
//!
//! A frame collects two things while it is on top:
//!
//! - the sources read during the run, so the effect can unsubscribe from
//!   sources it stopped reading;
//! - the effects created during the run, which the running effect owns and
//!   disposes before its next run.
//!
//! Untracked frames (see [`ObserverStack::untracked`]) suspend dependency
//! tracking without changing ownership.

use std::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use super::effect::Effect;
use super::subscriber::{Source, SubscriberId};

pub(crate) type SourceList = SmallVec<[Rc<dyn Source>; 4]>;

/// An entry in the observer stack.
struct Frame {
    /// The running computation, or `None` for an untracked region.
    subscriber_id: Option<SubscriberId>,
    /// Sources read during this computation, deduplicated.
    sources: SourceList,
    /// Effects created during this computation.
    owned: Vec<Effect>,
}

/// What a finished frame collected.
pub(crate) struct FrameRecord {
    pub(crate) sources: SourceList,
    pub(crate) owned: Vec<Effect>,
}

/// The stack of running computations.
#[derive(Default)]
pub struct ObserverStack {
    frames: RefCell<Vec<Frame>>,
}

impl ObserverStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a tracked context for the given subscriber.
    ///
    /// While the guard is alive, signal reads register the subscriber as a
    /// dependent.
    pub fn enter(&self, subscriber_id: SubscriberId) -> ContextGuard<'_> {
        self.push(Some(subscriber_id));
        ContextGuard {
            stack: self,
            subscriber_id: Some(subscriber_id),
            finished: false,
        }
    }

    /// Run `f` with dependency tracking suspended.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.push(None);
        let _guard = ContextGuard {
            stack: self,
            subscriber_id: None,
            finished: false,
        };
        f()
    }

    fn push(&self, subscriber_id: Option<SubscriberId>) {
        self.frames.borrow_mut().push(Frame {
            subscriber_id,
            sources: SmallVec::new(),
            owned: Vec::new(),
        });
    }

    /// Check if a tracked computation is on top of the stack.
    pub fn is_active(&self) -> bool {
        self.current_subscriber().is_some()
    }

    /// The subscriber reads are currently attributed to, if any.
    pub fn current_subscriber(&self) -> Option<SubscriberId> {
        self.frames
            .borrow()
            .last()
            .and_then(|frame| frame.subscriber_id)
    }

    /// Whether the subscriber is anywhere on the stack.
    pub fn contains(&self, subscriber_id: SubscriberId) -> bool {
        self.frames
            .borrow()
            .iter()
            .any(|frame| frame.subscriber_id == Some(subscriber_id))
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Record a read of `source` by the current computation.
    ///
    /// Returns the subscriber the source must add to its subscriber set, or
    /// `None` when nothing is tracking.
    pub(crate) fn track(&self, source: Rc<dyn Source>) -> Option<SubscriberId> {
        let mut frames = self.frames.borrow_mut();
        let frame = frames.last_mut()?;
        let subscriber_id = frame.subscriber_id?;

        let id = source.source_id();
        if !frame.sources.iter().any(|s| s.source_id() == id) {
            frame.sources.push(source);
        }
        Some(subscriber_id)
    }

    /// Hand a newly created effect to the innermost running computation.
    ///
    /// Returns the effect back when no computation is running.
    pub(crate) fn adopt(&self, effect: Effect) -> Option<Effect> {
        let mut frames = self.frames.borrow_mut();
        match frames
            .iter_mut()
            .rev()
            .find(|frame| frame.subscriber_id.is_some())
        {
            Some(frame) => {
                frame.owned.push(effect);
                None
            }
            None => Some(effect),
        }
    }

    fn pop(&self, expected: Option<SubscriberId>) -> Option<FrameRecord> {
        let popped = self.frames.borrow_mut().pop();

        // Catch bugs where guards are dropped out of order.
        if let Some(frame) = &popped {
            debug_assert_eq!(
                frame.subscriber_id, expected,
                "observer stack mismatch: expected {:?}, got {:?}",
                expected, frame.subscriber_id
            );
        }

        popped.map(|frame| FrameRecord {
            sources: frame.sources,
            owned: frame.owned,
        })
    }
}

/// Guard that pops its frame when finished or dropped.
pub struct ContextGuard<'a> {
    stack: &'a ObserverStack,
    subscriber_id: Option<SubscriberId>,
    finished: bool,
}

impl ContextGuard<'_> {
    /// Pop the frame and return what it collected.
    pub(crate) fn finish(mut self) -> FrameRecord {
        self.finished = true;
        self.stack
            .pop(self.subscriber_id)
            .unwrap_or_else(|| FrameRecord {
                sources: SmallVec::new(),
                owned: Vec::new(),
            })
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(record) = self.stack.pop(self.subscriber_id) {
                // Effects created by an aborted run have no owner left.
                for effect in record.owned {
                    effect.dispose();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeSource {
        id: u64,
        unsubscribed: Cell<usize>,
    }

    impl Source for FakeSource {
        fn source_id(&self) -> u64 {
            self.id
        }

        fn unsubscribe(&self, _subscriber: SubscriberId) {
            self.unsubscribed.set(self.unsubscribed.get() + 1);
        }
    }

    fn source(id: u64) -> Rc<dyn Source> {
        Rc::new(FakeSource {
            id,
            unsubscribed: Cell::new(0),
        })
    }

    #[test]
    fn context_tracks_subscriber() {
        let stack = ObserverStack::new();
        let id = SubscriberId::new();

        assert!(!stack.is_active());
        assert!(stack.current_subscriber().is_none());

        {
            let _ctx = stack.enter(id);

            assert!(stack.is_active());
            assert_eq!(stack.current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!stack.is_active());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn context_tracks_sources_once() {
        let stack = ObserverStack::new();
        let ctx = stack.enter(SubscriberId::new());

        stack.track(source(1));
        stack.track(source(2));
        stack.track(source(1));

        let record = ctx.finish();
        let ids: Vec<u64> = record.sources.iter().map(|s| s.source_id()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn nested_contexts() {
        let stack = ObserverStack::new();
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();

        {
            let _ctx1 = stack.enter(id1);
            assert_eq!(stack.current_subscriber(), Some(id1));

            {
                let _ctx2 = stack.enter(id2);
                assert_eq!(stack.current_subscriber(), Some(id2));
                assert!(stack.contains(id1));
            }

            // After inner context drops, outer should be current
            assert_eq!(stack.current_subscriber(), Some(id1));
        }

        assert!(stack.current_subscriber().is_none());
    }

    #[test]
    fn untracked_region_suspends_tracking() {
        let stack = ObserverStack::new();
        let _ctx = stack.enter(SubscriberId::new());

        let tracked = stack.untracked(|| stack.track(source(7)));
        assert!(tracked.is_none());
        assert!(stack.is_active());
    }

    #[test]
    fn reads_outside_any_context_are_not_tracked() {
        let stack = ObserverStack::new();
        assert!(stack.track(source(3)).is_none());
    }

    #[test]
    fn guard_pops_during_unwind() {
        let stack = ObserverStack::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ctx = stack.enter(SubscriberId::new());
            panic!("body failed");
        }));

        assert!(result.is_err());
        assert_eq!(stack.depth(), 0);
    }
}
