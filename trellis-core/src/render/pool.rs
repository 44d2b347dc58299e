//! Element pool.
//!
//! Released elements are wiped and kept per tag, up to a fixed capacity per
//! tag, so the builder can reuse them instead of allocating. Only elements
//! are pooled; text nodes, markers and fragments are cheap and dropped.

use std::collections::HashMap;

use tracing::trace;

use super::node::Node;

#[derive(Debug)]
pub struct NodePool {
    capacity: usize,
    entries: HashMap<String, Vec<Node>>,
    dropped: usize,
}

impl NodePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            dropped: 0,
        }
    }

    /// Take a clean element for `tag`, if one is pooled.
    pub fn acquire(&mut self, tag: &str) -> Option<Node> {
        let node = self.entries.get_mut(tag)?.pop()?;
        node.revive();
        trace!(tag, generation = node.generation(), "pooled element reused");
        Some(node)
    }

    /// Wipe `node` and keep it for reuse.
    ///
    /// Returns false when the node is not an element or the tag's slot is
    /// full; the node is still wiped in the latter case.
    pub fn release(&mut self, node: &Node) -> bool {
        let Some(tag) = node.tag().map(str::to_owned) else {
            return false;
        };
        node.recycle();

        let slot = self.entries.entry(tag).or_default();
        if slot.len() >= self.capacity {
            self.dropped += 1;
            trace!(tag = node.tag(), "pool full; element dropped");
            return false;
        }
        slot.push(node.clone());
        true
    }

    /// Number of pooled elements for `tag`.
    pub fn len(&self, tag: &str) -> usize {
        self.entries.get(tag).map_or(0, Vec::len)
    }

    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Elements released while their slot was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
