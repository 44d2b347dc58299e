//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis reactive rendering
//! engine. It implements:
//!
//! - Reactive primitives (signals, memos, effects) with automatic,
//!   dynamic dependency tracking
//! - A three-tier host scheduler (microtask, frame, idle) with batched
//!   propagation
//! - A retained node tree with marker-based reconciliation of reactive
//!   children, element pooling and an auto-cleanup observer
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `scheduler`: Host task queues and the tokio frame driver
//! - `render`: Node tree, reconciler and tree builder
//! - `config`: Runtime tunables, loadable from JSON
//! - `error`: Error types
//!
//! Everything is single-threaded. A [`Runtime`](reactive::Runtime) owns the
//! state that ties the primitives together; handles are `Rc`-based and not
//! `Send`.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::prelude::*;
//!
//! let rt = Runtime::new();
//! let (count, set_count) = rt.create_signal(0);
//! let doubled = rt.create_memo(move || count.get() * 2);
//!
//! let view = h(&rt, "p", None, vec![Child::from("Doubled: "), Child::from(doubled)]);
//!
//! set_count.set(5);
//! rt.tick();
//! assert_eq!(view.to_html(), "<p>Doubled: 10</p>");
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod render;
pub mod scheduler;

pub use config::{EqualityPolicy, FlushMode, RuntimeConfig};
pub use error::{ConfigError, ReactiveError, TreeError};

/// The types most programs need.
pub mod prelude {
    pub use crate::config::{EqualityPolicy, FlushMode, RuntimeConfig};
    pub use crate::reactive::{Cleanup, Effect, Memo, ReadSignal, Runtime, Signal, WriteSignal};
    pub use crate::render::{build, h, AutoCleanup, Child, ElementType, Event, Node, Props};
    pub use crate::scheduler::{FrameDriver, Tier};
}
