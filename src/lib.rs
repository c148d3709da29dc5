//! ALICE-VDOM — Keyed Virtual Tree Reconciliation
//!
//! Don't re-render the tree, patch it.
//!
//! Diff two immutable snapshots of a UI tree and apply the result to a live
//! tree with minimal traversal:
//! - Tagged-tree diff with reference-identity short-circuits
//! - Keyed list reconciliation with move detection
//! - Index-addressed patches bound in one skipping preorder walk
//! - Message remapping through tagger chains held in a generational arena
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`node`] | Immutable virtual tree (Text, Element, Keyed, Tagger, Thunk, Custom) |
//! | [`facts`] | Styles, properties, attributes, handlers, and their diff |
//! | [`diff`] | Recursive tree diff producing index-addressed patches |
//! | [`keyed`] | Two-pointer keyed children reconciliation |
//! | [`patch`] | Patch kinds and keyed reorder payloads |
//! | [`event`] | Listener registry, dispatch contexts, and sweep |
//! | [`dom`] | Host live-tree capability trait |
//! | [`memory`] | Arena-backed in-memory live tree |
//! | [`renderer`] | Mounted view: update passes and event dispatch |
//! | [`virtualize`] | Read existing markup back into a virtual tree |
//!
//! Patch location and application are internal to [`Renderer::update`].
//!
//! # Quick Start
//!
//! ```
//! use alice_vdom::{Dom, Fact, MemoryDom, Node, Renderer, RendererConfig};
//!
//! let mut dom = MemoryDom::new();
//! let body = dom.create_element("body", None);
//!
//! let view = |items: &[&str]| {
//!     Node::keyed(
//!         "ul",
//!         vec![Fact::attribute("class", "todo")],
//!         items.iter().map(|i| (*i, Node::text(*i))).collect(),
//!     )
//! };
//!
//! let mut renderer = Renderer::mount(
//!     &mut dom, body, view(&["a", "b"]), RendererConfig::default(), |_| {},
//! );
//!
//! // Swapping two keyed entries moves the live nodes.
//! let stats = renderer.update(&mut dom, view(&["b", "a"])).unwrap();
//! assert_eq!(stats.patches, 2);
//! assert_eq!(dom.to_markup(body), "<body><ul class=\"todo\">ba</ul></body>");
//! ```
//!
//! Author: Moroya Sakamoto

mod apply;
mod locate;
mod render;

pub mod diff;
pub mod dom;
pub mod error;
pub mod event;
pub mod facts;
pub mod keyed;
pub mod memory;
pub mod node;
pub mod patch;
pub mod renderer;
pub mod virtualize;

pub use diff::diff;
pub use dom::{Dom, ListenerId, ListenerOptions, LiveNode, NodeView};
pub use error::{DecodeError, RenderError};
pub use event::{ContextId, DispatchContext, Registry, Routed, SweepResult};
pub use facts::{
    diff_facts, CustomDecoded, Decoded, Decoder, Fact, Facts, FactsDiff, Handler, HandlerKind,
};
pub use memory::MemoryDom;
pub use node::{Mapper, MemoKey, Message, Node, NodeKind, Widget};
pub use patch::{patch_count, CustomPatch, Patch, PatchKind, Reorder};
pub use renderer::{Capabilities, EventOutcome, RenderStats, Renderer, RendererConfig};
pub use virtualize::virtualize;
