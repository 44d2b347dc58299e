//! Child Reconciler
//!
//! Inserts [`Child`] values into the tree and keeps reactive children up to
//! date.
//!
//! # Reactive Regions
//!
//! Each reactive child gets an invisible marker node and an effect. The
//! effect computes the child value; when it changes, the nodes inserted last
//! time that are not part of the new value are detached and disposed, and
//! the new nodes are inserted in order right after the marker. Disposing the
//! marker disposes the effect and detaches the region's current nodes.
//!
//! Under [`EqualityPolicy::SkipIdentical`] a recomputed value that is
//! [`same_as`](Child::same_as) the previous one leaves the region alone.
//!
//! # Chunked Insertion
//!
//! Long lists of children are split into chunks of `child_chunk_size`. The
//! first chunk is inserted right away; each remaining chunk is inserted by
//! its own idle-tier task. A chunk is abandoned if its parent was disposed
//! or recycled in the meantime. Fragments are always filled at once.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{trace, warn};

use super::child::Child;
use super::node::Node;
use crate::config::EqualityPolicy;
use crate::error::TreeError;
use crate::reactive::{Effect, Runtime};
use crate::scheduler::Tier;

/// Append `children` to `parent`, mounting reactive children as regions.
pub fn insert_children(rt: &Runtime, parent: &Node, children: Child) {
    let mut items = Vec::new();
    flatten(children, &mut items);

    // A fragment hands its children to another parent as soon as it is
    // inserted, so chunks queued against it would be stranded.
    let chunk_size = rt.config().child_chunk_size.max(1);
    if items.len() <= chunk_size || parent.is_fragment() {
        for item in items {
            insert_static(rt, parent, item);
        }
        return;
    }

    let mut chunks = Vec::new();
    let mut rest = items.into_iter().peekable();
    while rest.peek().is_some() {
        chunks.push(rest.by_ref().take(chunk_size).collect::<Vec<_>>());
    }

    let mut chunks = chunks.into_iter();
    if let Some(first) = chunks.next() {
        for item in first {
            insert_static(rt, parent, item);
        }
    }

    let generation = parent.generation();
    trace!(deferred = chunks.len(), chunk_size, "child insertion chunked");
    for chunk in chunks {
        let weak_rt = rt.downgrade();
        let weak_parent = parent.downgrade();
        rt.scheduler().queue(Tier::Idle, move || {
            let (Some(rt), Some(parent)) = (weak_rt.upgrade(), weak_parent.upgrade()) else {
                return;
            };
            if parent.is_disposed() || parent.generation() != generation {
                trace!("parent recycled; chunk dropped");
                return;
            }
            for item in chunk {
                insert_static(&rt, &parent, item);
            }
        });
    }
}

fn flatten(child: Child, out: &mut Vec<Child>) {
    match child {
        Child::Empty => {}
        Child::Sequence(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        other => out.push(other),
    }
}

fn insert_static(rt: &Runtime, parent: &Node, child: Child) {
    let result = match child {
        Child::Empty => Ok(()),
        Child::Node(node) => parent.append_child(&node),
        Child::Text(text) => parent.append_child(&Node::text(text)),
        Child::Reactive(compute) => mount_reactive(rt, parent, compute).map(|_| ()),
        Child::Sequence(items) => {
            for item in items {
                insert_static(rt, parent, item);
            }
            Ok(())
        }
    };
    if let Err(err) = result {
        warn!(%err, "child not inserted");
    }
}

/// Nodes inserted by one reactive region.
#[derive(Default)]
struct Region {
    previous: Option<Child>,
    nodes: Vec<Node>,
}

/// Mount a reactive child under `parent` and return the effect keeping it
/// current.
pub fn mount_reactive(
    rt: &Runtime,
    parent: &Node,
    compute: Rc<dyn Fn() -> Child>,
) -> Result<Effect, TreeError> {
    let marker = Node::marker();
    parent.append_child(&marker)?;

    let skip_identical = rt.config().equality == EqualityPolicy::SkipIdentical;
    let region = Rc::new(RefCell::new(Region::default()));
    let weak_rt = rt.downgrade();
    let weak_marker = marker.downgrade();

    let effect = rt.effect({
        let region = region.clone();
        let weak_rt = weak_rt.clone();
        move || {
            let (Some(rt), Some(marker)) = (weak_rt.upgrade(), weak_marker.upgrade()) else {
                return;
            };
            update_region(&rt, &marker, &region, compute(), skip_identical);
        }
    });

    // A region nested in another region's fragment owns nodes the outer
    // region never saw, so they leave with the marker.
    marker.on_cleanup({
        let effect = effect.clone();
        move || {
            effect.dispose();
            let nodes = std::mem::take(&mut region.borrow_mut().nodes);
            for node in nodes {
                match weak_rt.upgrade() {
                    Some(rt) => rt.detach_node(&node),
                    None => {
                        node.remove_quiet();
                    }
                }
            }
        }
    });
    Ok(effect)
}

fn update_region(
    rt: &Runtime,
    marker: &Node,
    region: &RefCell<Region>,
    value: Child,
    skip_identical: bool,
) {
    {
        let mut region = region.borrow_mut();
        if skip_identical
            && region
                .previous
                .as_ref()
                .is_some_and(|previous| previous.same_as(&value))
        {
            return;
        }
        region.previous = Some(value.clone());
    }

    let mut nodes = Vec::new();
    resolve(value, &mut nodes);

    // Nodes carried into the new value are moved, not disposed.
    let previous = std::mem::take(&mut region.borrow_mut().nodes);
    for node in previous {
        if !nodes.iter().any(|kept| kept.ptr_eq(&node)) {
            rt.detach_node(&node);
        }
    }

    match marker.parent() {
        Some(parent) => {
            let mut cursor = marker.clone();
            for node in &nodes {
                match parent.insert_after(node, &cursor) {
                    Ok(Some(last)) => cursor = last,
                    Ok(None) => {}
                    Err(err) => warn!(%err, "reactive child not inserted"),
                }
            }
        }
        None => trace!("marker detached; region left empty"),
    }
    trace!(nodes = nodes.len(), "reactive region updated");
    region.borrow_mut().nodes = nodes;
}

/// Turn a computed child into the concrete nodes to insert.
///
/// Runs inside the region's effect, so reactive values nested in the result
/// are tracked by that effect.
fn resolve(child: Child, out: &mut Vec<Node>) {
    match child {
        Child::Empty => {}
        Child::Node(node) if node.is_fragment() => out.extend(node.children()),
        Child::Node(node) => out.push(node),
        Child::Text(text) => out.push(Node::text(text)),
        Child::Reactive(compute) => resolve(compute(), out),
        Child::Sequence(items) => {
            for item in items {
                resolve(item, out);
            }
        }
    }
}
