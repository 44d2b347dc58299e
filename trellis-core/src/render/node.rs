//! Render Nodes
//!
//! A minimal retained node tree: elements, text nodes, markers and
//! fragments. Nodes are reference-counted handles; a parent owns its
//! children and a child holds a weak link back to its parent.
//!
//! # Node Kinds
//!
//! - **Element**: a tagged node with attributes, inline style, event
//!   listeners and children. Tags recognised as SVG get the SVG namespace.
//! - **Text**: a leaf holding a string.
//! - **Marker**: an invisible placeholder anchoring a reactive region.
//! - **Fragment**: a transient container. Appending a fragment moves its
//!   children into the target and leaves the fragment empty.
//!
//! # Lifecycle
//!
//! Every node carries a list of cleanup callbacks and a generation counter.
//! Disposing a node runs its cleanups once; releasing it to the pool wipes
//! its state and bumps the generation, so anything that remembered the old
//! generation can tell the node has been recycled.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::TreeError;
use crate::reactive::Cleanup;

/// Tags created in the SVG namespace.
const SVG_TAGS: &[&str] = &[
    "svg", "path", "circle", "rect", "line", "polygon", "polyline", "ellipse", "g", "text",
    "defs", "use",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Html,
    Svg,
}

impl Namespace {
    pub fn for_tag(tag: &str) -> Self {
        if SVG_TAGS.contains(&tag) {
            Namespace::Svg
        } else {
            Namespace::Html
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Namespace::Html => "http://www.w3.org/1999/xhtml",
            Namespace::Svg => "http://www.w3.org/2000/svg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element { tag: String, namespace: Namespace },
    Text,
    Marker,
    Fragment,
}

impl NodeKind {
    fn name(&self) -> &'static str {
        match self {
            NodeKind::Element { .. } => "element",
            NodeKind::Text => "text",
            NodeKind::Marker => "marker",
            NodeKind::Fragment => "fragment",
        }
    }
}

/// An event delivered to listeners by [`Node::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub payload: Option<String>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

pub type Handler = Rc<dyn Fn(&Event)>;

type RemovalObserver = Rc<dyn Fn(&Node)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Listener {
    id: ListenerId,
    event: String,
    handler: Handler,
}

struct NodeInner {
    kind: NodeKind,
    text: RefCell<String>,
    attributes: RefCell<IndexMap<String, String>>,
    style: RefCell<IndexMap<String, String>>,
    listeners: RefCell<Vec<Listener>>,
    children: RefCell<Vec<Node>>,
    parent: RefCell<Weak<NodeInner>>,
    cleanups: RefCell<SmallVec<[Cleanup; 2]>>,
    removal_observers: RefCell<Vec<(ObserverId, RemovalObserver)>>,
    next_handle: Cell<u64>,
    generation: Cell<u64>,
    disposed: Cell<bool>,
    poolable: Cell<bool>,
}

/// Handle to a node in the render tree.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeInner>,
}

/// Weak handle to a node.
#[derive(Clone, Default)]
pub struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(|inner| Node { inner })
    }
}

impl Node {
    fn with_kind(kind: NodeKind, text: String) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                kind,
                text: RefCell::new(text),
                attributes: RefCell::new(IndexMap::new()),
                style: RefCell::new(IndexMap::new()),
                listeners: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                parent: RefCell::new(Weak::new()),
                cleanups: RefCell::new(SmallVec::new()),
                removal_observers: RefCell::new(Vec::new()),
                next_handle: Cell::new(0),
                generation: Cell::new(0),
                disposed: Cell::new(false),
                poolable: Cell::new(false),
            }),
        }
    }

    /// Create an element, picking the namespace from the tag.
    pub fn element(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let namespace = Namespace::for_tag(&tag);
        Self::with_kind(NodeKind::Element { tag, namespace }, String::new())
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Text, content.into())
    }

    pub fn marker() -> Self {
        Self::with_kind(NodeKind::Marker, String::new())
    }

    pub fn fragment() -> Self {
        Self::with_kind(NodeKind::Fragment, String::new())
    }

    pub fn kind(&self) -> &NodeKind {
        &self.inner.kind
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.inner.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn namespace(&self) -> Option<Namespace> {
        match &self.inner.kind {
            NodeKind::Element { namespace, .. } => Some(*namespace),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Element { .. })
    }

    pub fn is_fragment(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Fragment)
    }

    pub fn is_marker(&self) -> bool {
        matches!(self.inner.kind, NodeKind::Marker)
    }

    /// Whether two handles refer to the same node.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.inner))
    }

    fn next_handle(&self) -> u64 {
        let handle = self.inner.next_handle.get();
        self.inner.next_handle.set(handle + 1);
        handle
    }

    // ------------------------------------------------------------------
    // Tree structure
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.borrow().upgrade().map(|inner| Node { inner })
    }

    pub fn children(&self) -> Vec<Node> {
        self.inner.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub fn first_child(&self) -> Option<Node> {
        self.inner.children.borrow().first().cloned()
    }

    fn index_of(&self, child: &Node) -> Option<usize> {
        self.inner
            .children
            .borrow()
            .iter()
            .position(|c| c.ptr_eq(child))
    }

    pub fn next_sibling(&self) -> Option<Node> {
        let parent = self.parent()?;
        let index = parent.index_of(self)?;
        let next = parent.inner.children.borrow().get(index + 1).cloned();
        next
    }

    fn accepts_children(&self) -> Result<(), TreeError> {
        match &self.inner.kind {
            NodeKind::Element { .. } | NodeKind::Fragment => Ok(()),
            kind => Err(TreeError::CannotHaveChildren(kind.name())),
        }
    }

    /// Nodes to insert in place of `node`: a fragment gives up its children.
    fn expand(node: &Node) -> Vec<Node> {
        if node.is_fragment() {
            let children = std::mem::take(&mut *node.inner.children.borrow_mut());
            for child in &children {
                *child.inner.parent.borrow_mut() = Weak::new();
            }
            children
        } else {
            node.remove_quiet();
            vec![node.clone()]
        }
    }

    fn adopt(&self, child: &Node) {
        *child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);
    }

    /// Append `child` as the last child. Appending a fragment moves its
    /// children instead.
    pub fn append_child(&self, child: &Node) -> Result<(), TreeError> {
        self.accepts_children()?;
        for node in Self::expand(child) {
            self.adopt(&node);
            self.inner.children.borrow_mut().push(node);
        }
        Ok(())
    }

    /// Insert `node` right after `reference`, which must be a child of this
    /// node. Returns the last node inserted, for chaining insertions.
    pub fn insert_after(&self, node: &Node, reference: &Node) -> Result<Option<Node>, TreeError> {
        self.accepts_children()?;
        if self.index_of(reference).is_none() {
            return Err(TreeError::NotAChild);
        }
        let nodes = Self::expand(node);
        let mut index = self.index_of(reference).ok_or(TreeError::NotAChild)? + 1;
        let last = nodes.last().cloned();
        for node in nodes {
            self.adopt(&node);
            self.inner.children.borrow_mut().insert(index, node);
            index += 1;
        }
        Ok(last)
    }

    /// Detach from the parent without notifying removal observers.
    pub(crate) fn remove_quiet(&self) -> bool {
        let Some(parent) = self.parent() else {
            return false;
        };
        parent
            .inner
            .children
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(&c.inner, &self.inner));
        *self.inner.parent.borrow_mut() = Weak::new();
        true
    }

    /// Detach from the parent. Removal observers on every former ancestor
    /// are told about it.
    ///
    /// This does not dispose the node; see
    /// [`Runtime::detach_node`](crate::reactive::Runtime::detach_node).
    pub fn remove(&self) -> Result<(), TreeError> {
        let parent = self.parent().ok_or(TreeError::NoParent)?;
        self.remove_quiet();

        let mut observers: Vec<RemovalObserver> = Vec::new();
        let mut ancestor = Some(parent);
        while let Some(node) = ancestor {
            observers.extend(
                node.inner
                    .removal_observers
                    .borrow()
                    .iter()
                    .map(|(_, observer)| observer.clone()),
            );
            ancestor = node.parent();
        }
        for observer in observers {
            observer(self);
        }
        Ok(())
    }

    /// Call `observer` with every subtree root removed below this node
    /// through [`Node::remove`].
    pub fn observe_removals(&self, observer: impl Fn(&Node) + 'static) -> ObserverId {
        let id = ObserverId(self.next_handle());
        self.inner
            .removal_observers
            .borrow_mut()
            .push((id, Rc::new(observer)));
        id
    }

    pub fn unobserve_removals(&self, id: ObserverId) -> bool {
        let mut observers = self.inner.removal_observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(other, _)| *other != id);
        observers.len() != before
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    /// The node's text: its own for text nodes, its descendants' otherwise.
    pub fn text_content(&self) -> String {
        match self.inner.kind {
            NodeKind::Text => self.inner.text.borrow().clone(),
            NodeKind::Marker => String::new(),
            _ => self
                .inner
                .children
                .borrow()
                .iter()
                .map(Node::text_content)
                .collect(),
        }
    }

    /// Replace the content of a text node. Other kinds are left untouched.
    pub fn set_text(&self, content: impl Into<String>) {
        if matches!(self.inner.kind, NodeKind::Text) {
            *self.inner.text.borrow_mut() = content.into();
        }
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner
            .attributes
            .borrow_mut()
            .insert(name.into(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner.attributes.borrow().get(name).cloned()
    }

    pub fn remove_attribute(&self, name: &str) -> Option<String> {
        self.inner.attributes.borrow_mut().shift_remove(name)
    }

    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .attributes
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Set one inline style property, keeping the others.
    pub fn set_style(&self, property: impl Into<String>, value: impl Into<String>) {
        self.inner
            .style
            .borrow_mut()
            .insert(property.into(), value.into());
    }

    pub fn style(&self, property: &str) -> Option<String> {
        self.inner.style.borrow().get(property).cloned()
    }

    pub fn styles(&self) -> Vec<(String, String)> {
        self.inner
            .style
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn add_listener(&self, event: impl Into<String>, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_handle());
        self.inner.listeners.borrow_mut().push(Listener {
            id,
            event: event.into(),
            handler,
        });
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Call every listener registered for the event. Returns how many ran.
    pub fn dispatch(&self, event: &Event) -> usize {
        let handlers: Vec<Handler> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .filter(|listener| listener.event == event.name)
            .map(|listener| listener.handler.clone())
            .collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Register a callback to run when the node is disposed.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        self.inner.cleanups.borrow_mut().push(Box::new(cleanup));
    }

    pub fn cleanup_count(&self) -> usize {
        self.inner.cleanups.borrow().len()
    }

    /// Run and clear the registered cleanups.
    pub(crate) fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.inner.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Mark disposed, returning whether it already was.
    pub(crate) fn mark_disposed(&self) -> bool {
        self.inner.disposed.replace(true)
    }

    pub(crate) fn is_poolable(&self) -> bool {
        self.inner.poolable.get()
    }

    pub(crate) fn set_poolable(&self, poolable: bool) {
        self.inner.poolable.set(poolable);
    }

    /// Wipe all state for reuse and bump the generation.
    pub(crate) fn recycle(&self) {
        self.remove_quiet();
        let children = std::mem::take(&mut *self.inner.children.borrow_mut());
        for child in children {
            *child.inner.parent.borrow_mut() = Weak::new();
        }
        self.inner.text.borrow_mut().clear();
        self.inner.attributes.borrow_mut().clear();
        self.inner.style.borrow_mut().clear();
        self.inner.listeners.borrow_mut().clear();
        self.inner.cleanups.borrow_mut().clear();
        self.inner.removal_observers.borrow_mut().clear();
        self.inner.generation.set(self.inner.generation.get() + 1);
    }

    /// Make a recycled node usable again.
    pub(crate) fn revive(&self) {
        self.inner.disposed.set(false);
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Capture the subtree as plain data.
    pub fn snapshot(&self) -> NodeSnapshot {
        match &self.inner.kind {
            NodeKind::Element { tag, namespace } => NodeSnapshot::Element {
                tag: tag.clone(),
                namespace: *namespace,
                attributes: self.attributes(),
                style: self.styles(),
                children: self.children().iter().map(Node::snapshot).collect(),
            },
            NodeKind::Text => NodeSnapshot::Text {
                content: self.inner.text.borrow().clone(),
            },
            NodeKind::Marker => NodeSnapshot::Marker,
            NodeKind::Fragment => NodeSnapshot::Fragment {
                children: self.children().iter().map(Node::snapshot).collect(),
            },
        }
    }

    /// Render the subtree as markup. Markers are omitted.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match &self.inner.kind {
            NodeKind::Element { tag, .. } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in self.inner.attributes.borrow().iter() {
                    out.push_str(&format!(" {}=\"{}\"", name, escape(value)));
                }
                let style = self.inner.style.borrow();
                if !style.is_empty() {
                    let css: Vec<String> = style.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                    out.push_str(&format!(" style=\"{}\"", escape(&css.join("; "))));
                }
                out.push('>');
                for child in self.inner.children.borrow().iter() {
                    child.write_html(out);
                }
                out.push_str(&format!("</{}>", tag));
            }
            NodeKind::Text => out.push_str(&escape(&self.inner.text.borrow())),
            NodeKind::Marker => {}
            NodeKind::Fragment => {
                for child in self.inner.children.borrow().iter() {
                    child.write_html(out);
                }
            }
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.inner.kind)
            .field("children", &self.child_count())
            .field("generation", &self.generation())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Serializable copy of a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeSnapshot {
    Element {
        tag: String,
        namespace: Namespace,
        attributes: Vec<(String, String)>,
        style: Vec<(String, String)>,
        children: Vec<NodeSnapshot>,
    },
    Text {
        content: String,
    },
    Marker,
    Fragment {
        children: Vec<NodeSnapshot>,
    },
}
