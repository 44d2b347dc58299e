//! Memo Implementation
//!
//! A Memo is a derived, read-only value. It pairs a signal with an owned
//! effect: the effect runs the computation inside a tracked context, so it
//! subscribes to whatever the computation reads, and writes the result into
//! the signal. Readers of the memo subscribe to that signal.
//!
//! # Why This Matters
//!
//! - The computation runs once per change of its inputs, not once per read.
//! - Because the signal applies the runtime's equality policy, a recompute
//!   that yields an equal value does not wake the memo's readers.
//!
//! The owned effect always runs its first computation synchronously, even
//! inside an open batch, so a memo never lacks a value.
//!
//! # Caching
//!
//! [`Runtime::create_memo_keyed`] deduplicates memos by an explicit
//! [`MemoKey`] issued by [`Runtime::memo_key`].

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::effect::{Effect, EffectOptions};
use super::runtime::Runtime;
use super::signal::{ReadSignal, Signal};

/// Token identifying a cached memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoKey(u64);

impl MemoKey {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + PartialEq.
///
/// The PartialEq bound is needed to detect when the computed value actually
/// changed (some memos return the same value even if inputs changed).
pub struct Memo<T: 'static> {
    signal: Signal<T>,
    effect: Effect,
}

impl<T> Memo<T>
where
    T: Clone + PartialEq + 'static,
{
    pub(crate) fn new<F>(runtime: &Runtime, compute: F, owned: bool) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let slot: Rc<RefCell<Option<Signal<T>>>> = Rc::default();
        let weak = runtime.downgrade();

        let effect = Effect::create(
            runtime,
            {
                let slot = slot.clone();
                move || {
                    let value = compute();
                    let existing = slot.borrow().clone();
                    match existing {
                        Some(signal) => signal.set(value),
                        None => {
                            if let Some(runtime) = weak.upgrade() {
                                *slot.borrow_mut() = Some(Signal::new(&runtime, value));
                            }
                        }
                    }
                    None
                }
            },
            EffectOptions {
                immediate: true,
                owned,
            },
        );

        let signal = slot
            .borrow()
            .clone()
            .expect("memo effect runs synchronously on creation");
        Self { signal, effect }
    }

    /// Get the current value, subscribing the running computation.
    pub fn get(&self) -> T {
        self.signal.get()
    }

    /// Get the current value without subscribing.
    pub fn peek(&self) -> T {
        self.signal.peek()
    }
}

impl<T: 'static> Memo<T> {
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    /// The memo's value as a read-only signal.
    pub fn signal(&self) -> ReadSignal<T> {
        self.signal.read_only()
    }

    /// Number of times the computation has run.
    pub fn compute_count(&self) -> usize {
        self.effect.run_count()
    }

    /// Get the number of dependents.
    pub fn dependent_count(&self) -> usize {
        self.signal.subscriber_count()
    }

    /// Stop recomputing and drop every reader subscription.
    pub fn dispose(&self) {
        self.effect.dispose();
        self.signal.cleanup();
    }

    pub fn is_disposed(&self) -> bool {
        self.effect.is_disposed()
    }

    /// Whether two handles refer to the same memo.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.effect.id() == other.effect.id()
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            effect: self.effect.clone(),
        }
    }
}

impl<T: Debug + 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("signal", &self.signal)
            .field("compute_count", &self.compute_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
