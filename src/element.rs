use std::fmt;
use std::future::Future;
use std::rc::Rc;

use crate::document::Document;
use crate::error::DomResult;
use crate::events::{Event, RawEvent};
use crate::host::{HostCallback, NodeId};
use crate::registry::{ListenerId, Reconciliation};

/// Optional attributes for [`ElementHandle::add_child`].
#[derive(Debug, Default, Clone)]
pub struct ChildOptions {
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub text: Option<String>,
}

impl ChildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn class(mut self, class_name: impl Into<String>) -> Self {
        self.classes.push(class_name.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A view onto one host element. Handles are cheap and disposable; several
/// may point at the same node. Every accessor fails with
/// [`crate::DomError::StaleReference`] once the node has been removed.
#[derive(Clone)]
pub struct ElementHandle {
    document: Document,
    node: NodeId,
}

impl ElementHandle {
    pub(crate) fn new(document: Document, node: NodeId) -> Self {
        Self { document, node }
    }

    fn wrap(&self, node: NodeId) -> Self {
        Self::new(self.document.clone(), node)
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn is_live(&self) -> bool {
        self.document.host().is_live(self.node)
    }

    /// The `id` attribute, empty when unset.
    pub fn id(&self) -> DomResult<String> {
        Ok(self
            .document
            .host()
            .attribute(self.node, "id")?
            .unwrap_or_default())
    }

    pub fn width(&self) -> DomResult<u32> {
        let rect = self.document.host().client_rect(self.node)?;
        Ok(rect.width.max(0.0).round() as u32)
    }

    pub fn height(&self) -> DomResult<u32> {
        let rect = self.document.host().client_rect(self.node)?;
        Ok(rect.height.max(0.0).round() as u32)
    }

    /// Lowercase tag name, e.g. `"div"`.
    pub fn element_type(&self) -> DomResult<String> {
        self.document.host().tag_name(self.node)
    }

    pub fn text(&self) -> DomResult<String> {
        self.document.host().text_content(self.node)
    }

    /// Replaces the content with a single text node. Child elements are
    /// deleted first so their listeners leave the registry.
    pub fn set_text(&self, value: &str) -> DomResult<()> {
        for child in self.children()? {
            child.delete()?;
        }
        self.document.host_mut().set_text_content(self.node, value)
    }

    pub fn attribute(&self, name: &str) -> DomResult<Option<String>> {
        self.document.host().attribute(self.node, name)
    }

    pub fn set_attribute(&self, name: &str, value: &str) -> DomResult<()> {
        self.document.host_mut().set_attribute(self.node, name, value)
    }

    /// `None` for the root element.
    pub fn parent(&self) -> DomResult<Option<ElementHandle>> {
        let parent = self.document.host().parent_element(self.node)?;
        Ok(parent.map(|node| self.wrap(node)))
    }

    pub fn children(&self) -> DomResult<Vec<ElementHandle>> {
        let children = self.document.host().element_children(self.node)?;
        Ok(children.into_iter().map(|node| self.wrap(node)).collect())
    }

    pub fn add_child(&self, element_type: &str, options: ChildOptions) -> DomResult<ElementHandle> {
        let mut host = self.document.host_mut();
        host.ensure_live(self.node)?;

        let child = host.create_element(element_type)?;
        if !options.classes.is_empty() {
            host.set_attribute(child, "class", &options.classes.join(" "))?;
        }
        if let Some(id) = &options.id {
            host.set_attribute(child, "id", id)?;
        }
        if let Some(text) = &options.text {
            host.set_text_content(child, text)?;
        }
        host.append_child(self.node, child)?;
        drop(host);

        Ok(self.wrap(child))
    }

    /// First descendant matching `selector`, in document order.
    pub fn find_one(&self, selector: &str) -> DomResult<Option<ElementHandle>> {
        Ok(self.find_many(selector)?.into_iter().next())
    }

    pub fn find_many(&self, selector: &str) -> DomResult<Vec<ElementHandle>> {
        let nodes = self
            .document
            .host()
            .query_selector_all(self.node, selector)?;
        Ok(nodes.into_iter().map(|node| self.wrap(node)).collect())
    }

    pub fn classes(&self) -> DomResult<Vec<String>> {
        let value = self.attribute("class")?.unwrap_or_default();
        let mut classes: Vec<String> = Vec::new();
        for class_name in value.split_ascii_whitespace() {
            if !classes.iter().any(|existing| existing == class_name) {
                classes.push(class_name.to_string());
            }
        }
        Ok(classes)
    }

    fn write_classes(&self, classes: &[String]) -> DomResult<()> {
        self.set_attribute("class", &classes.join(" "))
    }

    pub fn add_class(&self, class_name: &str) -> DomResult<()> {
        let mut classes = self.classes()?;
        if !classes.iter().any(|existing| existing == class_name) {
            classes.push(class_name.to_string());
            self.write_classes(&classes)?;
        }
        Ok(())
    }

    pub fn remove_class(&self, class_name: &str) -> DomResult<()> {
        let mut classes = self.classes()?;
        let before = classes.len();
        classes.retain(|existing| existing != class_name);
        if classes.len() != before {
            self.write_classes(&classes)?;
        }
        Ok(())
    }

    /// Returns whether the class is present afterwards.
    pub fn toggle_class(&self, class_name: &str) -> DomResult<bool> {
        if self.has_class(class_name)? {
            self.remove_class(class_name)?;
            Ok(false)
        } else {
            self.add_class(class_name)?;
            Ok(true)
        }
    }

    pub fn has_class(&self, class_name: &str) -> DomResult<bool> {
        Ok(self
            .classes()?
            .iter()
            .any(|existing| existing == class_name))
    }

    /// Ids persisted on the node for listeners attached through handles.
    pub fn active_listeners(&self) -> DomResult<Vec<ListenerId>> {
        let host = self.document.host();
        self.document.registry().persisted_ids(&**host, self.node)
    }

    fn attach(
        &self,
        event_name: &str,
        make_adapter: impl FnOnce(&ListenerId) -> Rc<HostCallback>,
    ) -> DomResult<ListenerId> {
        let mut host = self.document.host_mut();
        self.document
            .registry_mut()
            .attach(&mut **host, self.node, event_name, make_adapter)
    }

    /// Calls `callback` with the classified event each time `event_name`
    /// reaches this element. The returned id removes it again.
    pub fn add_event_listener<F>(&self, event_name: &str, callback: F) -> DomResult<ListenerId>
    where
        F: Fn(Event) -> anyhow::Result<()> + 'static,
    {
        let weak = self.document.downgrade();
        self.attach(event_name, move |_| {
            let adapter: Rc<HostCallback> = Rc::new(move |raw: Rc<RawEvent>| {
                let Some(document) = Document::upgrade(&weak) else {
                    return Ok(());
                };
                let target = ElementHandle::new(document, raw.target());
                callback(Event::classify(raw, target))
            });
            adapter
        })
    }

    /// Like [`Self::add_event_listener`], for callbacks returning a future.
    /// The future runs up to its first suspension point inside dispatch and
    /// is then parked as a detached task; see [`Document::pump`].
    pub fn add_async_event_listener<F, Fut>(
        &self,
        event_name: &str,
        callback: F,
    ) -> DomResult<ListenerId>
    where
        F: Fn(Event) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let weak = self.document.downgrade();
        self.attach(event_name, move |id| {
            let id = id.clone();
            let adapter: Rc<HostCallback> = Rc::new(move |raw: Rc<RawEvent>| {
                let Some(document) = Document::upgrade(&weak) else {
                    return Ok(());
                };
                let event_type = raw.event_type().to_string();
                let target = ElementHandle::new(document.clone(), raw.target());
                let future = callback(Event::classify(raw, target));
                document
                    .tasks()
                    .spawn(id.clone(), &event_type, Box::pin(future))
            });
            adapter
        })
    }

    pub fn remove_event_listener(&self, id: &ListenerId) -> DomResult<()> {
        let mut host = self.document.host_mut();
        self.document
            .registry_mut()
            .detach(&mut **host, self.node, id)
    }

    /// Returns how many listeners were detached.
    pub fn remove_all_event_listeners(&self) -> DomResult<usize> {
        let mut host = self.document.host_mut();
        self.document.registry_mut().detach_all(&mut **host, self.node)
    }

    /// Rewrites the persisted listener ids from registry state.
    pub fn reconcile_listeners(&self) -> DomResult<Reconciliation> {
        let mut host = self.document.host_mut();
        self.document.registry_mut().reconcile(&mut **host, self.node)
    }

    /// Deletes descendants first, then this element's listeners, then detaches
    /// the node. The handle and every handle into the subtree become stale.
    pub fn delete(&self) -> DomResult<()> {
        for child in self.children()? {
            child.delete()?;
        }
        self.remove_all_event_listeners()?;
        self.document.host_mut().remove_node(self.node)
    }

    pub fn outer_html(&self) -> DomResult<String> {
        self.document.host().serialize(self.node)
    }
}

impl PartialEq for ElementHandle {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.document.same_document(&other.document)
    }
}

impl Eq for ElementHandle {}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementHandle")
            .field("node", &self.node)
            .finish()
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(element_type) = self.element_type() else {
            return write!(f, "HtmlElement<stale>");
        };
        match self.id() {
            Ok(id) if !id.is_empty() => write!(f, "HtmlElement<{element_type} #{id}>"),
            _ => write!(f, "HtmlElement<{element_type}>"),
        }
    }
}
