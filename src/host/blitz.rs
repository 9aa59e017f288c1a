use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use blitz_dom::node::{Node, NodeData};
use blitz_dom::{ns, DocumentConfig, LocalName, QualName};
use blitz_html::HtmlDocument;
use html_escape::{encode_double_quoted_attribute, encode_text};
use tracing::debug;

use super::{ClientRect, Host, HostCallback, NodeId};
use crate::error::{DomError, DomResult};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

struct HostListener {
    event_name: String,
    callback: Rc<HostCallback>,
}

/// [`Host`] backed by a blitz [`HtmlDocument`].
pub struct BlitzHost {
    document: HtmlDocument,
    removed: HashSet<NodeId>,
    listeners: HashMap<NodeId, Vec<HostListener>>,
}

impl BlitzHost {
    pub fn new(document: HtmlDocument) -> Self {
        Self {
            document,
            removed: HashSet::new(),
            listeners: HashMap::new(),
        }
    }

    pub fn from_html(html: &str, base_url: Option<String>) -> Self {
        let document = HtmlDocument::from_html(
            html,
            DocumentConfig {
                base_url,
                ..Default::default()
            },
        );
        Self::new(document)
    }

    pub fn document(&self) -> &HtmlDocument {
        &self.document
    }

    fn node(&self, node_id: NodeId) -> DomResult<&Node> {
        if self.removed.contains(&node_id) {
            return Err(DomError::StaleReference(node_id));
        }
        self.document
            .get_node(node_id)
            .ok_or(DomError::StaleReference(node_id))
    }

    fn is_element(&self, node_id: NodeId) -> bool {
        self.document
            .get_node(node_id)
            .map(|node| matches!(node.data, NodeData::Element(_)))
            .unwrap_or(false)
    }

    fn is_descendant_of(&self, node_id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.document.get_node(node_id).and_then(|node| node.parent);
        while let Some(parent_id) = current {
            if parent_id == ancestor {
                return true;
            }
            current = self.document.get_node(parent_id).and_then(|node| node.parent);
        }
        false
    }

    fn collect_subtree(&self, root_id: NodeId) -> Vec<NodeId> {
        let mut collected = Vec::new();
        let mut stack = vec![root_id];
        while let Some(node_id) = stack.pop() {
            if let Some(node) = self.document.get_node(node_id) {
                collected.push(node_id);
                stack.extend(node.children.iter().copied());
            }
        }
        collected
    }

    fn retire(&mut self, nodes: Vec<NodeId>) {
        for node_id in nodes {
            self.listeners.remove(&node_id);
            self.removed.insert(node_id);
        }
    }

    fn html_name(name: &str) -> QualName {
        QualName::new(None, ns!(html), LocalName::from(name))
    }

    /// Parsed HTML attributes carry no namespace.
    fn attribute_name(name: &str) -> QualName {
        QualName::new(None, ns!(), LocalName::from(name.to_ascii_lowercase()))
    }

    fn serialize_children(&self, node_id: NodeId, output: &mut String) -> DomResult<()> {
        let node = self.node(node_id)?;
        for child in &node.children {
            self.serialize_node(*child, output)?;
        }
        Ok(())
    }

    fn serialize_node(&self, node_id: NodeId, output: &mut String) -> DomResult<()> {
        let node = self.node(node_id)?;

        match &node.data {
            NodeData::Document | NodeData::AnonymousBlock(_) => {
                self.serialize_children(node_id, output)?;
            }
            NodeData::Element(data) => {
                let tag = data.name.local.as_ref();
                output.push('<');
                output.push_str(tag);
                for attr in data.attrs.iter() {
                    output.push(' ');
                    output.push_str(attr.name.local.as_ref());
                    output.push_str("=\"");
                    output.push_str(&encode_double_quoted_attribute(&attr.value));
                    output.push('"');
                }
                output.push('>');
                if VOID_ELEMENTS.contains(&tag) {
                    return Ok(());
                }
                self.serialize_children(node_id, output)?;
                output.push_str("</");
                output.push_str(tag);
                output.push('>');
            }
            NodeData::Text(text) => {
                output.push_str(&encode_text(&text.content));
            }
            NodeData::Comment => {
                output.push_str("<!---->");
            }
        }

        Ok(())
    }
}

/// Mirrors the name production `createElement` accepts.
fn is_valid_element_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

impl Host for BlitzHost {
    fn body(&self) -> Option<NodeId> {
        self.document.query_selector("body").ok().flatten()
    }

    fn is_live(&self, node: NodeId) -> bool {
        !self.removed.contains(&node) && self.document.get_node(node).is_some()
    }

    fn create_element(&mut self, tag: &str) -> DomResult<NodeId> {
        if !is_valid_element_name(tag) {
            return Err(DomError::InvalidElementType(tag.to_string()));
        }
        let name = Self::html_name(&tag.to_ascii_lowercase());
        let node_id = self.document.mutate().create_element(name, Vec::new());
        Ok(node_id)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.node(parent)?;
        self.node(child)?;
        if parent == child || self.is_descendant_of(parent, child) {
            return Err(DomError::InvalidHierarchy { parent, child });
        }
        self.document.mutate().append_children(parent, &[child]);
        Ok(())
    }

    fn remove_node(&mut self, node: NodeId) -> DomResult<()> {
        self.node(node)?;
        let subtree = self.collect_subtree(node);
        self.document.mutate().remove_node(node);
        self.retire(subtree);
        Ok(())
    }

    fn parent_node(&self, node: NodeId) -> DomResult<Option<NodeId>> {
        Ok(self.node(node)?.parent)
    }

    fn parent_element(&self, node: NodeId) -> DomResult<Option<NodeId>> {
        Ok(self
            .node(node)?
            .parent
            .filter(|parent_id| self.is_element(*parent_id)))
    }

    fn element_children(&self, node: NodeId) -> DomResult<Vec<NodeId>> {
        Ok(self
            .node(node)?
            .children
            .iter()
            .copied()
            .filter(|child_id| self.is_element(*child_id))
            .collect())
    }

    fn tag_name(&self, node: NodeId) -> DomResult<String> {
        let name = match &self.node(node)?.data {
            NodeData::Document => "#document".to_string(),
            NodeData::Element(data) | NodeData::AnonymousBlock(data) => {
                data.name.local.as_ref().to_string()
            }
            NodeData::Text(_) => "#text".to_string(),
            NodeData::Comment => "#comment".to_string(),
        };
        Ok(name)
    }

    fn text_content(&self, node: NodeId) -> DomResult<String> {
        Ok(self.node(node)?.text_content())
    }

    fn set_text_content(&mut self, node: NodeId, value: &str) -> DomResult<()> {
        if self.node(node)?.text_content() == value {
            return Ok(());
        }

        let mut dropped = self.collect_subtree(node);
        dropped.retain(|id| *id != node);

        {
            let mut mutator = self.document.mutate();
            mutator.remove_and_drop_all_children(node);
            if !value.is_empty() {
                let text_id = mutator.create_text_node(value);
                mutator.append_children(node, &[text_id]);
            }
        }

        self.retire(dropped);
        Ok(())
    }

    fn attribute(&self, node: NodeId, name: &str) -> DomResult<Option<String>> {
        let node = self.node(node)?;
        let name = Self::attribute_name(name);
        Ok(node.attr(name.local).map(|value| value.to_string()))
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        self.node(node)?;
        self.document
            .mutate()
            .set_attribute(node, Self::attribute_name(name), value);
        Ok(())
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) -> DomResult<()> {
        self.node(node)?;
        self.document
            .mutate()
            .clear_attribute(node, Self::attribute_name(name));
        Ok(())
    }

    fn client_rect(&self, node: NodeId) -> DomResult<ClientRect> {
        let target = self.node(node)?;
        let layout = &target.final_layout;
        let mut rect = ClientRect {
            x: layout.location.x,
            y: layout.location.y,
            width: layout.size.width,
            height: layout.size.height,
        };

        let mut current = target.parent;
        while let Some(parent_id) = current {
            let Some(parent) = self.document.get_node(parent_id) else {
                break;
            };
            rect.x += parent.final_layout.location.x;
            rect.y += parent.final_layout.location.y;
            current = parent.parent;
        }

        Ok(rect)
    }

    fn query_selector_all(&self, scope: NodeId, selector: &str) -> DomResult<Vec<NodeId>> {
        self.node(scope)?;
        let matches = self
            .document
            .query_selector_all(selector)
            .map_err(|_| DomError::InvalidSelector(selector.to_string()))?;
        Ok(matches
            .into_iter()
            .filter(|node_id| self.is_live(*node_id) && self.is_descendant_of(*node_id, scope))
            .collect())
    }

    fn add_listener(
        &mut self,
        node: NodeId,
        event_name: &str,
        callback: Rc<HostCallback>,
    ) -> DomResult<()> {
        self.node(node)?;
        let entries = self.listeners.entry(node).or_default();
        let duplicate = entries
            .iter()
            .any(|entry| entry.event_name == event_name && Rc::ptr_eq(&entry.callback, &callback));
        if duplicate {
            debug!(node, event = event_name, "listener already registered");
            return Ok(());
        }
        entries.push(HostListener {
            event_name: event_name.to_string(),
            callback,
        });
        Ok(())
    }

    fn remove_listener(
        &mut self,
        node: NodeId,
        event_name: &str,
        callback: &Rc<HostCallback>,
    ) -> DomResult<bool> {
        self.node(node)?;
        let Some(entries) = self.listeners.get_mut(&node) else {
            return Ok(false);
        };
        let position = entries
            .iter()
            .position(|entry| entry.event_name == event_name && Rc::ptr_eq(&entry.callback, callback));
        let Some(position) = position else {
            return Ok(false);
        };
        entries.remove(position);
        if entries.is_empty() {
            self.listeners.remove(&node);
        }
        Ok(true)
    }

    fn listeners(&self, node: NodeId, event_name: &str) -> Vec<Rc<HostCallback>> {
        self.listeners
            .get(&node)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| entry.event_name == event_name)
                    .map(|entry| Rc::clone(&entry.callback))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn serialize(&self, node: NodeId) -> DomResult<String> {
        let mut output = String::new();
        if node == self.document_node() {
            output.push_str("<!DOCTYPE html>");
        }
        self.serialize_node(node, &mut output)?;
        Ok(output)
    }

    fn document_node(&self) -> NodeId {
        self.document.root_node().id
    }
}
