//! Child values.
//!
//! Everything that can appear as a child of an element is converted into a
//! [`Child`] up front, so the reconciler resolves children with a single
//! exhaustive match instead of inspecting values at runtime.
//!
//! Conversions are permissive: strings, numbers and chars become text,
//! `bool` and `None` become nothing, vectors become sequences, and signals
//! and memos become reactive children that re-render when they change. Any
//! other `Display` value can be turned into text with [`Child::display`].

use std::fmt::{self, Display};
use std::rc::Rc;

use super::node::Node;
use crate::reactive::{Memo, ReadSignal, Signal};

#[derive(Clone, Default)]
pub enum Child {
    /// Renders nothing.
    #[default]
    Empty,
    /// An existing node. Fragments contribute their children.
    Node(Node),
    /// A text node.
    Text(String),
    /// Recomputed by an effect whenever the signals it reads change.
    Reactive(Rc<dyn Fn() -> Child>),
    /// Several children in order.
    Sequence(Vec<Child>),
}

impl Child {
    pub fn text(content: impl Into<String>) -> Self {
        Child::Text(content.into())
    }

    /// Text from any displayable value.
    pub fn display(value: impl Display) -> Self {
        Child::Text(value.to_string())
    }

    /// A child recomputed whenever what `f` reads changes.
    pub fn reactive<F, C>(f: F) -> Self
    where
        F: Fn() -> C + 'static,
        C: Into<Child>,
    {
        Child::Reactive(Rc::new(move || f().into()))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Child::Empty => true,
            Child::Sequence(items) => items.iter().all(Child::is_empty),
            _ => false,
        }
    }

    /// Identity comparison used to skip redundant re-renders.
    ///
    /// Nodes and reactive closures compare by pointer, text by content.
    pub fn same_as(&self, other: &Child) -> bool {
        match (self, other) {
            (Child::Empty, Child::Empty) => true,
            (Child::Text(a), Child::Text(b)) => a == b,
            (Child::Node(a), Child::Node(b)) => a.ptr_eq(b),
            (Child::Reactive(a), Child::Reactive(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            (Child::Sequence(a), Child::Sequence(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Empty => f.write_str("Empty"),
            Child::Node(node) => f.debug_tuple("Node").field(node).finish(),
            Child::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Child::Reactive(_) => f.write_str("Reactive(..)"),
            Child::Sequence(items) => f.debug_tuple("Sequence").field(items).finish(),
        }
    }
}

impl From<&str> for Child {
    fn from(value: &str) -> Self {
        Child::Text(value.to_owned())
    }
}

impl From<String> for Child {
    fn from(value: String) -> Self {
        Child::Text(value)
    }
}

impl From<&String> for Child {
    fn from(value: &String) -> Self {
        Child::Text(value.clone())
    }
}

impl From<char> for Child {
    fn from(value: char) -> Self {
        Child::Text(value.to_string())
    }
}

impl From<Node> for Child {
    fn from(value: Node) -> Self {
        Child::Node(value)
    }
}

impl From<&Node> for Child {
    fn from(value: &Node) -> Self {
        Child::Node(value.clone())
    }
}

impl From<()> for Child {
    fn from(_: ()) -> Self {
        Child::Empty
    }
}

/// Booleans render nothing, so `cond && child` patterns can be passed as is.
impl From<bool> for Child {
    fn from(_: bool) -> Self {
        Child::Empty
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(value: Option<T>) -> Self {
        value.map_or(Child::Empty, Into::into)
    }
}

impl<T: Into<Child>> From<Vec<T>> for Child {
    fn from(value: Vec<T>) -> Self {
        Child::Sequence(value.into_iter().map(Into::into).collect())
    }
}

macro_rules! child_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Child {
                fn from(value: $ty) -> Self {
                    Child::Text(value.to_string())
                }
            }
        )*
    };
}

child_from_number!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl<T> From<ReadSignal<T>> for Child
where
    T: Clone + Into<Child> + 'static,
{
    fn from(signal: ReadSignal<T>) -> Self {
        Child::Reactive(Rc::new(move || signal.get().into()))
    }
}

impl<T> From<Signal<T>> for Child
where
    T: Clone + Into<Child> + 'static,
{
    fn from(signal: Signal<T>) -> Self {
        Child::from(signal.read_only())
    }
}

impl<T> From<Memo<T>> for Child
where
    T: Clone + PartialEq + Into<Child> + 'static,
{
    fn from(memo: Memo<T>) -> Self {
        Child::Reactive(Rc::new(move || memo.get().into()))
    }
}
