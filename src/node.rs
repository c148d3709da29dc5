//! Virtual tree representation
//!
//! Immutable, reference-counted snapshot of a UI tree. A new tree is built
//! per render by view code; the previous one is kept only until the next
//! diff. Cloning a [`Node`] shares the subtree, so reference identity is a
//! valid "nothing changed" short-circuit.
//!
//! Every Element, Keyed element and Tagger records its exact descendant
//! count at construction. Text, Thunk and Custom nodes are leaves for the
//! purpose of preorder numbering.
//!
//! Author: Moroya Sakamoto

use std::any::Any;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::dom::{Dom, LiveNode};
use crate::facts::{sanitize, Fact, Facts};
use crate::patch::CustomPatch;

/// Application message, opaque to the engine.
pub type Message = Box<dyn Any>;

/// Mapper chain collected from consecutive taggers, outermost first.
pub type MapperChain = SmallVec<[Mapper; 2]>;

// ── Mapper ─────────────────────────────────────────────────────────────

/// Message remapping function carried by a Tagger.
///
/// Compared by reference: build a mapper once and reuse it across renders,
/// otherwise every render produces a `Retag` patch.
#[derive(Clone)]
pub struct Mapper(Rc<dyn Fn(Message) -> Message>);

impl Mapper {
    /// Wrap a typed function. Messages of any other type pass through untouched.
    pub fn new<A: 'static, B: 'static>(f: impl Fn(A) -> B + 'static) -> Self {
        Self(Rc::new(move |message: Message| match message.downcast::<A>() {
            Ok(a) => Box::new(f(*a)) as Message,
            Err(other) => {
                tracing::debug!(
                    expected = std::any::type_name::<A>(),
                    "mapper received a message of another type; passing through"
                );
                other
            }
        }))
    }

    /// Wrap an untyped function.
    pub fn from_fn(f: impl Fn(Message) -> Message + 'static) -> Self {
        Self(Rc::new(f))
    }

    #[inline]
    pub fn apply(&self, message: Message) -> Message {
        (self.0)(message)
    }

    #[inline]
    pub fn same_as(&self, other: &Mapper) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mapper({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

/// Pairwise reference equality of two mapper chains.
pub fn same_chain(a: &[Mapper], b: &[Mapper]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
}

// ── Memo keys ──────────────────────────────────────────────────────────

/// Opaque value a Thunk is memoized on, compared by reference.
#[derive(Clone)]
pub struct MemoKey(Rc<dyn Any>);

impl MemoKey {
    /// Fresh key; only equal to its own clones.
    pub fn new<T: 'static>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Key sharing an existing allocation.
    pub fn from_rc<T: 'static>(value: &Rc<T>) -> Self {
        Self(value.clone() as Rc<dyn Any>)
    }

    #[inline]
    pub fn same_as(&self, other: &MemoKey) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for MemoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoKey({:p})", Rc::as_ptr(&self.0) as *const ())
    }
}

// ── Node kinds ─────────────────────────────────────────────────────────

/// Element with positional children.
pub struct Element {
    pub tag: String,
    pub namespace: Option<String>,
    pub facts: Facts,
    pub children: Vec<Node>,
    descendants: usize,
}

impl Element {
    pub(crate) fn new(
        tag: String,
        namespace: Option<String>,
        facts: Facts,
        children: Vec<Node>,
    ) -> Self {
        let descendants = children.iter().map(|c| 1 + c.descendant_count()).sum();
        Self {
            tag,
            namespace,
            facts,
            children,
            descendants,
        }
    }
}

/// Element whose children carry keys unique within this one list.
pub struct KeyedElement {
    pub tag: String,
    pub namespace: Option<String>,
    pub facts: Facts,
    pub children: Vec<(String, Node)>,
    descendants: usize,
}

impl KeyedElement {
    pub(crate) fn new(
        tag: String,
        namespace: Option<String>,
        facts: Facts,
        children: Vec<(String, Node)>,
    ) -> Self {
        let descendants = children
            .iter()
            .map(|(_, c)| 1 + c.descendant_count())
            .sum();
        Self {
            tag,
            namespace,
            facts,
            children,
            descendants,
        }
    }

    /// Same element with keys stripped and child order kept.
    pub fn dekey(&self) -> Element {
        Element {
            tag: self.tag.clone(),
            namespace: self.namespace.clone(),
            facts: self.facts.clone(),
            children: self.children.iter().map(|(_, n)| n.clone()).collect(),
            descendants: self.descendants,
        }
    }
}

/// Wrapper remapping the messages of a child subtree.
pub struct Tagger {
    pub mapper: Mapper,
    pub child: Node,
    descendants: usize,
}

impl Tagger {
    /// Collapse consecutive taggers into one chain (outermost first) and
    /// return the first non-tagger node beneath them.
    pub fn collapse(&self) -> (MapperChain, &Node) {
        let mut chain = MapperChain::new();
        chain.push(self.mapper.clone());
        let mut child = &self.child;
        while let NodeKind::Tagger(inner) = child.kind() {
            chain.push(inner.mapper.clone());
            child = &inner.child;
        }
        (chain, child)
    }
}

/// Lazily produced subtree, memoized on reference-identical keys.
pub struct Thunk {
    memo: Vec<MemoKey>,
    producer: Rc<dyn Fn() -> Node>,
    cached: OnceCell<Node>,
}

impl Thunk {
    pub fn memo_keys(&self) -> &[MemoKey] {
        &self.memo
    }

    /// Produce the subtree on first call, reuse it afterwards.
    pub fn force(&self) -> &Node {
        self.cached.get_or_init(|| (self.producer)())
    }

    pub fn cached(&self) -> Option<&Node> {
        self.cached.get()
    }

    pub(crate) fn same_memo(&self, other: &Thunk) -> bool {
        self.memo.len() == other.memo.len()
            && self.memo.iter().zip(&other.memo).all(|(a, b)| a.same_as(b))
    }

    /// Carry an older thunk's forced subtree forward.
    pub(crate) fn adopt(&self, older: &Thunk) {
        if let Some(node) = older.cached.get() {
            let _ = self.cached.set(node.clone());
        }
    }
}

/// Renders an externally managed widget from its model.
pub type CustomRender = Rc<dyn Fn(&dyn Any, &mut dyn Dom) -> LiveNode>;
/// Diffs two widget models; `None` means nothing to do.
pub type CustomDiff = Rc<dyn Fn(&dyn Any, &dyn Any) -> Option<CustomPatch>>;

/// Render/diff pair shared by every instance of one custom widget type.
///
/// Identity of the widget decides whether two custom nodes are comparable,
/// so build it once.
#[derive(Clone)]
pub struct Widget {
    render: CustomRender,
    diff: CustomDiff,
}

impl Widget {
    pub fn new(
        render: impl Fn(&dyn Any, &mut dyn Dom) -> LiveNode + 'static,
        diff: impl Fn(&dyn Any, &dyn Any) -> Option<CustomPatch> + 'static,
    ) -> Self {
        Self {
            render: Rc::new(render),
            diff: Rc::new(diff),
        }
    }

    #[inline]
    pub fn same_as(&self, other: &Widget) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

/// Escape hatch for externally managed widgets.
pub struct Custom {
    pub facts: Facts,
    pub model: Rc<dyn Any>,
    pub widget: Widget,
}

impl Custom {
    pub fn render(&self, dom: &mut dyn Dom) -> LiveNode {
        (self.widget.render)(&*self.model, dom)
    }

    pub fn diff(&self, newer: &Custom) -> Option<CustomPatch> {
        (newer.widget.diff)(&*self.model, &*newer.model)
    }
}

/// Closed set of node kinds.
pub enum NodeKind {
    Text(String),
    Element(Element),
    Keyed(KeyedElement),
    Tagger(Tagger),
    Thunk(Thunk),
    Custom(Custom),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Text(_) => "text",
            NodeKind::Element(_) => "element",
            NodeKind::Keyed(_) => "keyed",
            NodeKind::Tagger(_) => "tagger",
            NodeKind::Thunk(_) => "thunk",
            NodeKind::Custom(_) => "custom",
        }
    }
}

// ── Node handle ────────────────────────────────────────────────────────

/// Shared handle to an immutable virtual node.
#[derive(Clone)]
pub struct Node(Rc<NodeKind>);

impl Node {
    fn wrap(kind: NodeKind) -> Self {
        Self(Rc::new(kind))
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::wrap(NodeKind::Text(content.into()))
    }

    pub fn element(tag: &str, facts: Vec<Fact>, children: Vec<Node>) -> Self {
        Self::wrap(NodeKind::Element(Element::new(
            sanitize::no_script(tag).to_owned(),
            None,
            Facts::organize(facts),
            children,
        )))
    }

    pub fn element_ns(namespace: &str, tag: &str, facts: Vec<Fact>, children: Vec<Node>) -> Self {
        Self::wrap(NodeKind::Element(Element::new(
            sanitize::no_script(tag).to_owned(),
            Some(namespace.to_owned()),
            Facts::organize(facts),
            children,
        )))
    }

    pub fn keyed<K: Into<String>>(tag: &str, facts: Vec<Fact>, children: Vec<(K, Node)>) -> Self {
        Self::wrap(NodeKind::Keyed(KeyedElement::new(
            sanitize::no_script(tag).to_owned(),
            None,
            Facts::organize(facts),
            children.into_iter().map(|(k, n)| (k.into(), n)).collect(),
        )))
    }

    pub fn keyed_ns<K: Into<String>>(
        namespace: &str,
        tag: &str,
        facts: Vec<Fact>,
        children: Vec<(K, Node)>,
    ) -> Self {
        Self::wrap(NodeKind::Keyed(KeyedElement::new(
            sanitize::no_script(tag).to_owned(),
            Some(namespace.to_owned()),
            Facts::organize(facts),
            children.into_iter().map(|(k, n)| (k.into(), n)).collect(),
        )))
    }

    /// Wrap `child` so its messages go through `mapper` on the way out.
    pub fn tagged(mapper: &Mapper, child: Node) -> Self {
        let descendants = 1 + child.descendant_count();
        Self::wrap(NodeKind::Tagger(Tagger {
            mapper: mapper.clone(),
            child,
            descendants,
        }))
    }

    /// Convenience for [`Node::tagged`] with a fresh mapper.
    pub fn map<A: 'static, B: 'static>(self, f: impl Fn(A) -> B + 'static) -> Self {
        Self::tagged(&Mapper::new(f), self)
    }

    /// Memoized subtree. Include the view function's identity in `memo` if
    /// several views share the same arguments.
    pub fn lazy(memo: Vec<MemoKey>, producer: impl Fn() -> Node + 'static) -> Self {
        Self::wrap(NodeKind::Thunk(Thunk {
            memo,
            producer: Rc::new(producer),
            cached: OnceCell::new(),
        }))
    }

    pub fn custom(widget: &Widget, facts: Vec<Fact>, model: Rc<dyn Any>) -> Self {
        Self::wrap(NodeKind::Custom(Custom {
            facts: Facts::organize(facts),
            model,
            widget: widget.clone(),
        }))
    }

    pub(crate) fn from_element(element: Element) -> Self {
        Self::wrap(NodeKind::Element(element))
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.0
    }

    /// Number of nodes strictly beneath this one in preorder numbering.
    #[inline]
    pub fn descendant_count(&self) -> usize {
        match self.kind() {
            NodeKind::Element(e) => e.descendants,
            NodeKind::Keyed(k) => k.descendants,
            NodeKind::Tagger(t) => t.descendants,
            NodeKind::Text(_) | NodeKind::Thunk(_) | NodeKind::Custom(_) => 0,
        }
    }

    #[inline]
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            NodeKind::Text(s) => f.debug_tuple("Text").field(s).finish(),
            NodeKind::Element(e) => f
                .debug_struct("Element")
                .field("tag", &e.tag)
                .field("namespace", &e.namespace)
                .field("facts", &e.facts)
                .field("children", &e.children)
                .finish(),
            NodeKind::Keyed(k) => f
                .debug_struct("Keyed")
                .field("tag", &k.tag)
                .field("namespace", &k.namespace)
                .field("facts", &k.facts)
                .field("children", &k.children)
                .finish(),
            NodeKind::Tagger(t) => f
                .debug_struct("Tagger")
                .field("mapper", &t.mapper)
                .field("child", &t.child)
                .finish(),
            NodeKind::Thunk(t) => f
                .debug_struct("Thunk")
                .field("memo", &t.memo)
                .field("cached", &t.cached.get())
                .finish(),
            NodeKind::Custom(c) => f
                .debug_struct("Custom")
                .field("facts", &c.facts)
                .finish_non_exhaustive(),
        }
    }
}
