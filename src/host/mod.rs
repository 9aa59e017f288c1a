//! The display tree and event-subscription primitives the wrapper is built on.
//!
//! A [`Host`] owns node lifetime. Handles only ever carry a [`NodeId`], so every
//! primitive takes the id and reports [`DomError::StaleReference`] once the node
//! has been removed.

mod blitz;

use std::rc::Rc;

use crate::error::DomResult;
use crate::events::RawEvent;

pub use blitz::BlitzHost;

pub type NodeId = usize;

/// Closure registered with the host. Removal matches on `Rc` identity, so the
/// same allocation handed to [`Host::add_listener`] must be handed back to
/// [`Host::remove_listener`].
pub type HostCallback = dyn Fn(Rc<RawEvent>) -> anyhow::Result<()>;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ClientRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

pub trait Host {
    /// The `<body>` element, if the document has one.
    fn body(&self) -> Option<NodeId>;

    fn is_live(&self, node: NodeId) -> bool;

    fn ensure_live(&self, node: NodeId) -> DomResult<()> {
        if self.is_live(node) {
            Ok(())
        } else {
            Err(crate::error::DomError::StaleReference(node))
        }
    }

    fn create_element(&mut self, tag: &str) -> DomResult<NodeId>;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()>;
    /// Detach `node` from its parent. The node and its subtree become stale.
    fn remove_node(&mut self, node: NodeId) -> DomResult<()>;

    /// Parent in the node tree, including the document node itself.
    fn parent_node(&self, node: NodeId) -> DomResult<Option<NodeId>>;
    /// Parent only when it is an element.
    fn parent_element(&self, node: NodeId) -> DomResult<Option<NodeId>>;
    fn element_children(&self, node: NodeId) -> DomResult<Vec<NodeId>>;

    fn tag_name(&self, node: NodeId) -> DomResult<String>;
    fn text_content(&self, node: NodeId) -> DomResult<String>;
    fn set_text_content(&mut self, node: NodeId, value: &str) -> DomResult<()>;

    fn attribute(&self, node: NodeId, name: &str) -> DomResult<Option<String>>;
    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()>;
    fn remove_attribute(&mut self, node: NodeId, name: &str) -> DomResult<()>;

    fn client_rect(&self, node: NodeId) -> DomResult<ClientRect>;

    /// Descendants of `scope` matching `selector`, in document order.
    fn query_selector_all(&self, scope: NodeId, selector: &str) -> DomResult<Vec<NodeId>>;

    fn add_listener(
        &mut self,
        node: NodeId,
        event_name: &str,
        callback: Rc<HostCallback>,
    ) -> DomResult<()>;

    /// Returns whether a matching `(event_name, callback)` pair was found.
    fn remove_listener(
        &mut self,
        node: NodeId,
        event_name: &str,
        callback: &Rc<HostCallback>,
    ) -> DomResult<bool>;

    /// Snapshot of the callbacks currently registered for `event_name` on `node`.
    fn listeners(&self, node: NodeId, event_name: &str) -> Vec<Rc<HostCallback>>;

    /// Outer HTML of `node`, or the whole document for the document node.
    fn serialize(&self, node: NodeId) -> DomResult<String>;

    fn document_node(&self) -> NodeId;
}
