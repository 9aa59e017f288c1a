//! Bookkeeping for listeners attached through element handles.
//!
//! Every attachment gets a [`ListenerId`]. The registry maps it to the event
//! name and the exact adapter closure handed to the host, so the same closure
//! can be handed back for removal. The ids attached to a node are also written
//! to a comma-joined attribute on that node. That attribute mirrors registry
//! state for the node; [`ListenerRegistry::reconcile`] repairs it when the two
//! drift apart.
//!
//! Ids are not scoped by element: detaching through the wrong element still
//! drops the record, while the host-side listener stays on the element it was
//! attached to.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DomError, DomResult};
use crate::host::{Host, HostCallback, NodeId};

pub const DEFAULT_LISTENER_ATTRIBUTE: &str = "data-listener-ids";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(String);

impl ListenerId {
    /// A random v4 UUID in 32-digit hex form. Uniqueness is not checked.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ListenerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct EventRecord {
    node: NodeId,
    event_name: String,
    adapter: Rc<HostCallback>,
}

impl EventRecord {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn event_name(&self) -> &str {
        &self.event_name
    }
}

/// Outcome of [`ListenerRegistry::reconcile`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Listed on the node but unknown to the registry.
    pub dropped: Vec<ListenerId>,
    /// Known to the registry for the node but missing from its attribute.
    pub restored: Vec<ListenerId>,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty() && self.restored.is_empty()
    }
}

pub struct ListenerRegistry {
    records: HashMap<ListenerId, EventRecord>,
    attribute: String,
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER_ATTRIBUTE)
    }
}

impl ListenerRegistry {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            records: HashMap::new(),
            attribute: attribute.into(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &ListenerId) -> bool {
        self.records.contains_key(id)
    }

    pub fn record(&self, id: &ListenerId) -> Option<&EventRecord> {
        self.records.get(id)
    }

    /// Ids the registry holds for `node`, sorted.
    pub fn ids_for(&self, node: NodeId) -> Vec<ListenerId> {
        let mut ids: Vec<_> = self
            .records
            .iter()
            .filter(|(_, record)| record.node == node)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Ids persisted on the node's attribute, in attachment order.
    pub fn persisted_ids(&self, host: &dyn Host, node: NodeId) -> DomResult<Vec<ListenerId>> {
        let value = host.attribute(node, &self.attribute)?;
        Ok(value
            .as_deref()
            .map(parse_id_list)
            .unwrap_or_default())
    }

    /// An empty list clears the attribute.
    fn write_ids(&self, host: &mut dyn Host, node: NodeId, ids: &[ListenerId]) -> DomResult<()> {
        if ids.is_empty() {
            return host.remove_attribute(node, &self.attribute);
        }
        let joined = ids
            .iter()
            .map(ListenerId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        host.set_attribute(node, &self.attribute, &joined)
    }

    /// Registers a listener. `make_adapter` receives the fresh id and returns
    /// the closure the host will call; that same `Rc` is kept for removal.
    pub fn attach(
        &mut self,
        host: &mut dyn Host,
        node: NodeId,
        event_name: &str,
        make_adapter: impl FnOnce(&ListenerId) -> Rc<HostCallback>,
    ) -> DomResult<ListenerId> {
        host.ensure_live(node)?;

        let id = ListenerId::generate();
        let adapter = make_adapter(&id);
        self.records.insert(
            id.clone(),
            EventRecord {
                node,
                event_name: event_name.to_string(),
                adapter: Rc::clone(&adapter),
            },
        );

        let mut ids = self.persisted_ids(host, node)?;
        ids.push(id.clone());
        self.write_ids(host, node, &ids)?;

        if let Err(err) = host.add_listener(node, event_name, adapter) {
            self.records.remove(&id);
            ids.retain(|existing| *existing != id);
            self.write_ids(host, node, &ids)?;
            return Err(err);
        }

        debug!(listener = %id, node, event = event_name, "attached listener");
        Ok(id)
    }

    pub fn detach(&mut self, host: &mut dyn Host, node: NodeId, id: &ListenerId) -> DomResult<()> {
        host.ensure_live(node)?;

        let record = self
            .records
            .remove(id)
            .ok_or_else(|| DomError::UnknownListener(id.clone()))?;

        if record.node != node {
            warn!(
                listener = %id,
                node,
                owner = record.node,
                "detaching listener through a different element"
            );
        }

        let removed = host.remove_listener(node, &record.event_name, &record.adapter)?;
        if !removed {
            warn!(listener = %id, node, "host had no matching listener");
        }
        drop(record);

        let mut ids = self.persisted_ids(host, node)?;
        ids.retain(|existing| existing != id);
        self.write_ids(host, node, &ids)?;

        debug!(listener = %id, node, "detached listener");
        Ok(())
    }

    /// Detaches every id persisted on `node`. Ids with no record are skipped.
    pub fn detach_all(&mut self, host: &mut dyn Host, node: NodeId) -> DomResult<usize> {
        let ids = self.persisted_ids(host, node)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut detached = 0;
        for id in ids {
            let Some(record) = self.records.remove(&id) else {
                debug!(listener = %id, node, "listener already removed");
                continue;
            };
            host.remove_listener(node, &record.event_name, &record.adapter)?;
            detached += 1;
        }

        self.write_ids(host, node, &[])?;
        Ok(detached)
    }

    /// Rewrites the node's attribute from registry state.
    pub fn reconcile(&mut self, host: &mut dyn Host, node: NodeId) -> DomResult<Reconciliation> {
        let persisted = self.persisted_ids(host, node)?;
        let known = self.ids_for(node);

        let mut report = Reconciliation::default();
        let mut rebuilt = Vec::with_capacity(known.len());

        for id in persisted {
            if self.records.get(&id).map(|record| record.node) == Some(node) {
                if !rebuilt.contains(&id) {
                    rebuilt.push(id);
                }
            } else {
                report.dropped.push(id);
            }
        }

        for id in known {
            if !rebuilt.contains(&id) {
                report.restored.push(id.clone());
                rebuilt.push(id);
            }
        }

        if !report.is_clean() {
            warn!(
                node,
                dropped = report.dropped.len(),
                restored = report.restored.len(),
                "listener attribute out of sync with registry"
            );
            self.write_ids(host, node, &rebuilt)?;
        }

        Ok(report)
    }
}

fn parse_id_list(value: &str) -> Vec<ListenerId> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ListenerId::from)
        .collect()
}
