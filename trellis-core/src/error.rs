//! Error types for the runtime, the render tree and configuration.

use thiserror::Error;

use crate::reactive::SubscriberId;

/// Errors raised by the reactive core.
///
/// None of these are fatal: the runtime logs them and keeps going. They are
/// returned so that callers driving effects or the host loop by hand can
/// observe what happened.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    /// The effect was triggered while its own body was still running.
    #[error("effect {0:?} re-entered while running; run skipped")]
    Reentrant(SubscriberId),

    /// The effect has already been disposed.
    #[error("effect {0:?} has been disposed")]
    Disposed(SubscriberId),

    /// The host loop kept producing work past the configured round limit.
    #[error("host loop did not settle after {rounds} rounds")]
    FlushLimit { rounds: usize },

    /// The owning runtime no longer exists.
    #[error("runtime has been dropped")]
    RuntimeDropped,
}

/// Errors raised by structural operations on the render tree.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TreeError {
    /// The reference node is not a child of the given parent.
    #[error("node is not a child of this parent")]
    NotAChild,

    /// The node has no parent to insert relative to.
    #[error("node has no parent")]
    NoParent,

    /// Text and marker nodes cannot hold children.
    #[error("{0} nodes cannot have children")]
    CannotHaveChildren(&'static str),
}

/// Errors raised while loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
