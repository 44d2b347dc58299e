//! Tree Builder
//!
//! Turns an element type plus props into a node. This is the target of the
//! `h(type, props, children)` calling convention:
//!
//! ```rust,ignore
//! let button = h(
//!     &rt,
//!     "button",
//!     Some(Props::new().class("primary").on("click", move |_| count.update(|n| n + 1))),
//!     vec![Child::from("Clicked "), Child::from(count_signal)],
//! );
//! ```
//!
//! # Props
//!
//! A few keys are reserved:
//!
//! - `children`: inserted through the reconciler.
//! - `ref`: called with the finished node, after its children were inserted.
//! - `style`: merged into the inline style property by property.
//! - `class` / `className`: the `class` attribute.
//! - `on*` with a handler: an event listener for the lower-cased suffix.
//!   Removing the listener is registered as a node cleanup.
//!
//! Any other plain value becomes an attribute. Callback values under other
//! keys are ignored.
//!
//! # Pooling
//!
//! HTML elements are taken from the runtime's [`NodePool`](super::NodePool)
//! when one is available and go back to it when disposed.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::child::Child;
use super::node::{Event, Handler, Namespace, Node};
use super::reconciler::insert_children;
use crate::reactive::Runtime;

/// A single prop value.
#[derive(Clone)]
pub enum PropValue {
    Value(String),
    Handler(Handler),
    Style(Vec<(String, String)>),
    Ref(Rc<dyn Fn(&Node)>),
    Children(Child),
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            PropValue::Handler(_) => f.write_str("Handler(..)"),
            PropValue::Style(style) => f.debug_tuple("Style").field(style).finish(),
            PropValue::Ref(_) => f.write_str("Ref(..)"),
            PropValue::Children(child) => f.debug_tuple("Children").field(child).finish(),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Value(value.to_owned())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Value(value)
    }
}

/// Ordered element props.
#[derive(Clone, Debug, Default)]
pub struct Props {
    values: IndexMap<String, PropValue>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// A plain attribute.
    pub fn attr(self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.set(key, PropValue::Value(value.to_string()))
    }

    pub fn class(self, value: impl Into<String>) -> Self {
        self.set("class", PropValue::Value(value.into()))
    }

    /// An event handler stored under `on<event>`.
    pub fn on(self, event: &str, handler: impl Fn(&Event) + 'static) -> Self {
        self.set(format!("on{}", event), PropValue::Handler(Rc::new(handler)))
    }

    pub fn style<K, V>(self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let style = properties
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.set("style", PropValue::Style(style))
    }

    pub fn reference(self, f: impl Fn(&Node) + 'static) -> Self {
        self.set("ref", PropValue::Ref(Rc::new(f)))
    }

    pub fn children(self, children: impl Into<Child>) -> Self {
        self.set("children", PropValue::Children(children.into()))
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.values.get(key)
    }

    /// A plain value prop as a string slice.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(PropValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// Remove and return the children prop.
    pub fn take_children(&mut self) -> Child {
        match self.values.shift_remove("children") {
            Some(PropValue::Children(child)) => child,
            Some(PropValue::Value(text)) => Child::Text(text),
            _ => Child::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What [`build`] creates.
#[derive(Clone)]
pub enum ElementType {
    Tag(String),
    Component(Rc<dyn Fn(Props) -> Child>),
    Fragment,
}

impl ElementType {
    pub fn component<F, C>(f: F) -> Self
    where
        F: Fn(Props) -> C + 'static,
        C: Into<Child>,
    {
        ElementType::Component(Rc::new(move |props| f(props).into()))
    }
}

impl From<&str> for ElementType {
    fn from(tag: &str) -> Self {
        ElementType::Tag(tag.to_owned())
    }
}

impl From<String> for ElementType {
    fn from(tag: String) -> Self {
        ElementType::Tag(tag)
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::Tag(tag) => f.debug_tuple("Tag").field(tag).finish(),
            ElementType::Component(_) => f.write_str("Component(..)"),
            ElementType::Fragment => f.write_str("Fragment"),
        }
    }
}

/// Build a node from an element type and props.
pub fn build(rt: &Runtime, ty: impl Into<ElementType>, mut props: Props) -> Node {
    match ty.into() {
        ElementType::Fragment => {
            let fragment = Node::fragment();
            insert_children(rt, &fragment, props.take_children());
            fragment
        }
        ElementType::Component(component) => match component(props) {
            Child::Node(node) => node,
            other => {
                let fragment = Node::fragment();
                insert_children(rt, &fragment, other);
                fragment
            }
        },
        ElementType::Tag(tag) => build_element(rt, &tag, props),
    }
}

fn build_element(rt: &Runtime, tag: &str, mut props: Props) -> Node {
    let element = rt.acquire_element(tag);
    let children = props.take_children();
    let mut reference = None;

    for (key, value) in props.values {
        match (key.as_str(), value) {
            ("ref", PropValue::Ref(f)) => reference = Some(f),
            ("style", PropValue::Style(properties)) => {
                for (property, value) in properties {
                    element.set_style(property, value);
                }
            }
            ("style", PropValue::Value(css)) => {
                for (property, value) in parse_style(&css) {
                    element.set_style(property, value);
                }
            }
            ("class" | "className", PropValue::Value(value)) => {
                element.set_attribute("class", value);
            }
            (key, PropValue::Handler(handler)) if key.len() > 2 && key.starts_with("on") => {
                let event = key[2..].to_lowercase();
                let id = element.add_listener(event, handler);
                let weak = element.downgrade();
                element.on_cleanup(move || {
                    if let Some(element) = weak.upgrade() {
                        element.remove_listener(id);
                    }
                });
            }
            (name, PropValue::Value(value)) => element.set_attribute(name, value),
            (name, _) => trace!(key = name, "non-attribute prop ignored"),
        }
    }

    insert_children(rt, &element, children);
    if let Some(reference) = reference {
        reference(&element);
    }
    element
}

/// Split `a: b; c: d` into property pairs.
fn parse_style(css: &str) -> Vec<(String, String)> {
    css.split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let property = property.trim();
            (!property.is_empty()).then(|| (property.to_owned(), value.trim().to_owned()))
        })
        .collect()
}

/// Build with children given separately, overriding any `children` prop.
pub fn h(
    rt: &Runtime,
    ty: impl Into<ElementType>,
    props: Option<Props>,
    mut children: Vec<Child>,
) -> Node {
    let mut props = props.unwrap_or_default();
    if !children.is_empty() {
        let child = if children.len() == 1 {
            children.remove(0)
        } else {
            Child::Sequence(children)
        };
        props = props.children(child);
    }
    build(rt, ty, props)
}

impl Runtime {
    /// An element for `tag`, reused from the pool when possible.
    pub fn acquire_element(&self, tag: &str) -> Node {
        if Namespace::for_tag(tag) == Namespace::Svg {
            return Node::element(tag);
        }
        let pooled = self.pool().borrow_mut().acquire(tag);
        let element = pooled.unwrap_or_else(|| Node::element(tag));
        element.set_poolable(true);
        element
    }

    /// Run the cleanups of `node` and its whole subtree, then return pooled
    /// elements to the pool.
    ///
    /// Disposing an already disposed node does nothing.
    pub fn dispose_node(&self, node: &Node) {
        if node.mark_disposed() {
            return;
        }
        node.run_cleanups();
        for child in node.children() {
            self.dispose_node(&child);
        }
        if node.is_poolable() {
            self.pool().borrow_mut().release(node);
        }
    }

    /// Remove `node` from its parent and dispose it.
    pub fn detach_node(&self, node: &Node) {
        node.remove_quiet();
        self.dispose_node(node);
    }

    /// Number of elements waiting in the pool.
    pub fn pooled_elements(&self) -> usize {
        self.pool().borrow().total()
    }
}

impl Node {
    /// Remove this node from the tree and dispose it.
    pub fn detach(&self, rt: &Runtime) {
        rt.detach_node(self);
    }
}
