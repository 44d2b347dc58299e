//! Rendering
//!
//! The render layer connects the reactive core to a retained node tree:
//!
//! - [`node`]: the tree itself (elements, text, markers, fragments).
//! - [`child`]: the [`Child`] values elements accept as children.
//! - [`reconciler`]: inserts children and keeps reactive regions current.
//! - [`builder`]: `build` / `h`, turning element types and props into nodes.
//! - [`pool`]: recycles disposed elements per tag.
//! - [`cleanup`]: disposes subtrees removed behind the runtime's back.

pub mod builder;
pub mod child;
pub mod cleanup;
pub mod node;
pub mod pool;
pub mod reconciler;

pub use builder::{build, h, ElementType, PropValue, Props};
pub use child::Child;
pub use cleanup::AutoCleanup;
pub use node::{Event, Handler, ListenerId, Namespace, Node, NodeKind, NodeSnapshot, ObserverId, WeakNode};
pub use pool::NodePool;
pub use reconciler::{insert_children, mount_reactive};
