//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, memos, and effects.
//! These primitives form the foundation of Trellis's fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only when
//! one of its dependencies changes.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its dependencies
//! change. Effects are used to synchronize reactive state with the node tree.
//! An effect created while another effect runs is owned by it and disposed
//! before the owner's next run.
//!
//! # Implementation Notes
//!
//! Dependency tracking goes through the [`ObserverStack`] owned by each
//! [`Runtime`]. When a signal is read, the innermost tracked computation on
//! the stack is registered as a dependent. Dependencies are recomputed on
//! every run, so a branch that stops being read stops triggering.

mod signal;
mod context;
mod subscriber;
mod memo;
mod effect;
mod runtime;

pub use signal::{ReadSignal, Signal, Unsubscribe, WriteSignal};
pub use context::{ContextGuard, ObserverStack};
pub use subscriber::{Reactive, Subscriber, SubscriberId};
pub use memo::{Memo, MemoKey};
pub use effect::{Cleanup, Effect};
pub use runtime::{Runtime, WeakRuntime};
