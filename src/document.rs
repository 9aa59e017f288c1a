use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};
use std::task::Poll;
use std::time::Instant;

use blitz_traits::events::DomEvent;
use futures_util::future::poll_fn;
use tracing::error;

use crate::config::TrellisConfig;
use crate::element::ElementHandle;
use crate::error::DomResult;
use crate::events::{family_of, EventFamily, RawEvent};
use crate::host::{BlitzHost, Host, NodeId};
use crate::registry::{ListenerId, ListenerRegistry};
use crate::tasks::{TaskFailure, TaskQueue};

pub(crate) struct DocumentInner {
    host: RefCell<Box<dyn Host>>,
    registry: RefCell<ListenerRegistry>,
    tasks: TaskQueue,
    clock: Instant,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Listener callbacks that ran.
    pub invoked: usize,
    /// Callbacks that returned an error before any suspension point.
    pub listener_errors: usize,
    pub default_prevented: bool,
    pub propagation_stopped: bool,
}

/// Root context: owns the host, the listener registry and the detached task
/// queue. Clones share the same state.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl Document {
    pub fn from_html(html: &str, config: &TrellisConfig) -> Self {
        Self::with_host(BlitzHost::from_html(html, config.base_url.clone()), config)
    }

    pub fn with_host(host: impl Host + 'static, config: &TrellisConfig) -> Self {
        let inner = DocumentInner {
            host: RefCell::new(Box::new(host)),
            registry: RefCell::new(ListenerRegistry::new(config.listener_attribute.clone())),
            tasks: TaskQueue::new(),
            clock: Instant::now(),
        };
        Self {
            inner: Rc::new(inner),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<DocumentInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn downgrade(&self) -> Weak<DocumentInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn host(&self) -> Ref<'_, Box<dyn Host>> {
        self.inner.host.borrow()
    }

    pub(crate) fn host_mut(&self) -> RefMut<'_, Box<dyn Host>> {
        self.inner.host.borrow_mut()
    }

    pub(crate) fn registry(&self) -> Ref<'_, ListenerRegistry> {
        self.inner.registry.borrow()
    }

    pub(crate) fn registry_mut(&self) -> RefMut<'_, ListenerRegistry> {
        self.inner.registry.borrow_mut()
    }

    pub(crate) fn tasks(&self) -> &TaskQueue {
        &self.inner.tasks
    }

    pub(crate) fn same_document(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn body(&self) -> Option<ElementHandle> {
        let body = self.host().body()?;
        Some(ElementHandle::new(self.clone(), body))
    }

    /// Wraps an existing node.
    pub fn element(&self, node: NodeId) -> DomResult<ElementHandle> {
        self.host().ensure_live(node)?;
        Ok(ElementHandle::new(self.clone(), node))
    }

    pub fn find_one(&self, selector: &str) -> DomResult<Option<ElementHandle>> {
        Ok(self.find_many(selector)?.into_iter().next())
    }

    pub fn find_many(&self, selector: &str) -> DomResult<Vec<ElementHandle>> {
        let nodes = {
            let host = self.host();
            host.query_selector_all(host.document_node(), selector)?
        };
        Ok(nodes
            .into_iter()
            .map(|node| ElementHandle::new(self.clone(), node))
            .collect())
    }

    /// Delivers `event` to its target and, when it bubbles, to each ancestor.
    /// Listeners are snapshotted per node before any of them runs.
    pub fn dispatch(&self, mut event: RawEvent) -> DomResult<DispatchOutcome> {
        let target = event.target();
        let path = {
            let host = self.host();
            host.ensure_live(target)?;
            let mut path = vec![target];
            if event.bubbles() {
                let mut current = host.parent_node(target)?;
                while let Some(node) = current {
                    path.push(node);
                    current = host.parent_node(node)?;
                }
            }
            path
        };

        event.stamp(self.inner.clock.elapsed().as_secs_f64() * 1_000.0);
        let event = Rc::new(event);
        let mut outcome = DispatchOutcome::default();

        for node in path {
            let listeners = self.host().listeners(node, event.event_type());
            for listener in listeners {
                let still_attached = self
                    .host()
                    .listeners(node, event.event_type())
                    .iter()
                    .any(|current| Rc::ptr_eq(current, &listener));
                if !still_attached {
                    continue;
                }

                outcome.invoked += 1;
                if let Err(err) = listener(Rc::clone(&event)) {
                    outcome.listener_errors += 1;
                    error!(
                        event = event.event_type(),
                        node,
                        error = %err,
                        "listener failed during dispatch"
                    );
                }
            }

            if event.propagation_stopped() {
                break;
            }
        }

        outcome.default_prevented = event.default_prevented();
        outcome.propagation_stopped = event.propagation_stopped();
        Ok(outcome)
    }

    /// Dispatches a blitz UI event, rebasing pointer offsets onto the
    /// target's box.
    pub fn dispatch_dom_event(&self, event: &DomEvent) -> DomResult<DispatchOutcome> {
        let mut raw = RawEvent::from_dom_event(event);
        if matches!(
            family_of(raw.event_type()),
            EventFamily::Mouse | EventFamily::Wheel
        ) {
            let rect = self.host().client_rect(raw.target())?;
            raw.rebase_offset(rect.x, rect.y);
        }
        self.dispatch(raw)
    }

    /// Polls parked async listeners until none makes progress.
    pub fn pump(&self) -> bool {
        let mut did_work = false;
        while self.inner.tasks.run_ready() {
            did_work = true;
        }
        did_work
    }

    /// Resolves once every parked async listener has finished.
    pub async fn settle(&self) {
        poll_fn(|cx| {
            self.inner.tasks.register_waker(cx.waker());
            self.pump();
            if self.inner.tasks.has_pending() {
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .await
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.inner.tasks.has_pending()
    }

    /// Replaces the default hook, which logs failures of async listeners
    /// that happen after their first suspension point.
    pub fn set_task_error_hook(&self, hook: impl Fn(&TaskFailure) + 'static) {
        self.inner.tasks.set_hook(Rc::new(hook));
    }

    pub fn listener_count(&self) -> usize {
        self.registry().len()
    }

    pub fn is_registered(&self, id: &ListenerId) -> bool {
        self.registry().contains(id)
    }

    pub fn to_html(&self) -> DomResult<String> {
        let host = self.host();
        host.serialize(host.document_node())
    }
}
