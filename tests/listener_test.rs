use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;
use trellis::host::{ClientRect, HostCallback};
use trellis::{
    BlitzHost, ChildOptions, Document, DomError, DomResult, Event, EventFamily, Host, ListenerId,
    MouseButton, NodeId, RawEvent, TrellisConfig,
};

const PAGE: &str = "<!DOCTYPE html><html><body><div id=\"outer\"><button id=\"btn\">Click</button></div></body></html>";

fn document() -> Document {
    Document::from_html(PAGE, &TrellisConfig::default())
}

/// Forwards to a [`BlitzHost`] while counting listener removals.
struct CountingHost {
    inner: BlitzHost,
    removals: Rc<Cell<usize>>,
}

impl Host for CountingHost {
    fn body(&self) -> Option<NodeId> {
        self.inner.body()
    }

    fn is_live(&self, node: NodeId) -> bool {
        self.inner.is_live(node)
    }

    fn create_element(&mut self, tag: &str) -> DomResult<NodeId> {
        self.inner.create_element(tag)
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.inner.append_child(parent, child)
    }

    fn remove_node(&mut self, node: NodeId) -> DomResult<()> {
        self.inner.remove_node(node)
    }

    fn parent_node(&self, node: NodeId) -> DomResult<Option<NodeId>> {
        self.inner.parent_node(node)
    }

    fn parent_element(&self, node: NodeId) -> DomResult<Option<NodeId>> {
        self.inner.parent_element(node)
    }

    fn element_children(&self, node: NodeId) -> DomResult<Vec<NodeId>> {
        self.inner.element_children(node)
    }

    fn tag_name(&self, node: NodeId) -> DomResult<String> {
        self.inner.tag_name(node)
    }

    fn text_content(&self, node: NodeId) -> DomResult<String> {
        self.inner.text_content(node)
    }

    fn set_text_content(&mut self, node: NodeId, value: &str) -> DomResult<()> {
        self.inner.set_text_content(node, value)
    }

    fn attribute(&self, node: NodeId, name: &str) -> DomResult<Option<String>> {
        self.inner.attribute(node, name)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        self.inner.set_attribute(node, name, value)
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) -> DomResult<()> {
        self.inner.remove_attribute(node, name)
    }

    fn client_rect(&self, node: NodeId) -> DomResult<ClientRect> {
        self.inner.client_rect(node)
    }

    fn query_selector_all(&self, scope: NodeId, selector: &str) -> DomResult<Vec<NodeId>> {
        self.inner.query_selector_all(scope, selector)
    }

    fn add_listener(
        &mut self,
        node: NodeId,
        event_name: &str,
        callback: Rc<HostCallback>,
    ) -> DomResult<()> {
        self.inner.add_listener(node, event_name, callback)
    }

    fn remove_listener(
        &mut self,
        node: NodeId,
        event_name: &str,
        callback: &Rc<HostCallback>,
    ) -> DomResult<bool> {
        self.removals.set(self.removals.get() + 1);
        self.inner.remove_listener(node, event_name, callback)
    }

    fn listeners(&self, node: NodeId, event_name: &str) -> Vec<Rc<HostCallback>> {
        self.inner.listeners(node, event_name)
    }

    fn serialize(&self, node: NodeId) -> DomResult<String> {
        self.inner.serialize(node)
    }

    fn document_node(&self) -> NodeId {
        self.inner.document_node()
    }
}

fn counting_document() -> (Document, Rc<Cell<usize>>) {
    let removals = Rc::new(Cell::new(0));
    let host = CountingHost {
        inner: BlitzHost::from_html(PAGE, None),
        removals: Rc::clone(&removals),
    };
    (Document::with_host(host, &TrellisConfig::default()), removals)
}

fn counter() -> (Rc<Cell<usize>>, impl Fn(Event) -> anyhow::Result<()>) {
    let count = Rc::new(Cell::new(0));
    let inner = Rc::clone(&count);
    (count, move |_event: Event| {
        inner.set(inner.get() + 1);
        Ok(())
    })
}

#[test]
fn click_on_example_paragraph_is_classified() {
    let document = document();
    let body = document.body().expect("body");
    let example = body
        .add_child(
            "p",
            ChildOptions::new()
                .id("example")
                .class("example")
                .text("Example Text"),
        )
        .unwrap();

    let seen = Rc::new(RefCell::new(None));
    let seen_in_handler = Rc::clone(&seen);
    let expected_target = example.clone();
    example
        .add_event_listener("click", move |event| {
            let mouse = event.as_mouse().ok_or_else(|| anyhow!("not a mouse event"))?;
            assert_eq!(event.target(), &expected_target);
            *seen_in_handler.borrow_mut() = Some((
                event.event_type().to_string(),
                mouse.x(),
                mouse.y(),
                mouse.button(),
                event.to_string(),
            ));
            Ok(())
        })
        .unwrap();

    let outcome = document
        .dispatch(
            RawEvent::new("click", example.node_id())
                .with_offset(10.0, 20.0)
                .with_button(MouseButton::Left),
        )
        .unwrap();

    assert_eq!(outcome.invoked, 1);
    assert_eq!(outcome.listener_errors, 0);
    let (event_type, x, y, button, rendered) = seen.borrow_mut().take().expect("handler ran");
    assert_eq!(event_type, "click");
    assert_eq!((x, y), (10.0, 20.0));
    assert_eq!(button, Some(MouseButton::Left));
    assert_eq!(rendered, "[MouseEvent - click]");
}

#[test]
fn attach_then_detach_leaves_no_trace() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();

    for event_name in ["click", "keydown", "wheel", "custom"] {
        let id = button.add_event_listener(event_name, |_| Ok(())).unwrap();
        assert!(document.is_registered(&id));
        assert!(button.active_listeners().unwrap().contains(&id));

        button.remove_event_listener(&id).unwrap();

        assert!(!document.is_registered(&id));
        assert!(!button.active_listeners().unwrap().contains(&id));
    }
    assert_eq!(document.listener_count(), 0);
}

#[test]
fn detaching_an_unknown_id_fails() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let id = button.add_event_listener("click", |_| Ok(())).unwrap();
    button.remove_event_listener(&id).unwrap();

    let err = button.remove_event_listener(&id).unwrap_err();
    assert!(matches!(err, DomError::UnknownListener(missing) if missing == id));

    let never = ListenerId::from("00000000000000000000000000000000");
    assert!(matches!(
        button.remove_event_listener(&never),
        Err(DomError::UnknownListener(_))
    ));
}

#[test]
fn detached_listener_stops_firing() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let (count, handler) = counter();
    let id = button.add_event_listener("click", handler).unwrap();

    document.dispatch(RawEvent::new("click", button.node_id())).unwrap();
    button.remove_event_listener(&id).unwrap();
    document.dispatch(RawEvent::new("click", button.node_id())).unwrap();

    assert_eq!(count.get(), 1);
}

#[test]
fn remove_all_detaches_every_event_name() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let (clicks, on_click) = counter();
    let (keys, on_key) = counter();
    button.add_event_listener("click", on_click).unwrap();
    button.add_event_listener("keydown", on_key).unwrap();
    assert_eq!(button.active_listeners().unwrap().len(), 2);

    assert_eq!(button.remove_all_event_listeners().unwrap(), 2);

    let click = document.dispatch(RawEvent::new("click", button.node_id())).unwrap();
    let key = document
        .dispatch(RawEvent::new("keydown", button.node_id()).with_key("a", "KeyA"))
        .unwrap();
    assert_eq!(click.invoked + key.invoked, 0);
    assert_eq!((clicks.get(), keys.get()), (0, 0));
    assert!(button.active_listeners().unwrap().is_empty());
    assert_eq!(document.listener_count(), 0);
}

#[test]
fn delete_issues_one_host_removal_per_listener() {
    let (document, removals) = counting_document();
    let outer = document.find_one("#outer").unwrap().unwrap();
    let button = outer.find_one("#btn").unwrap().unwrap();

    outer.add_event_listener("click", |_| Ok(())).unwrap();
    outer.add_event_listener("mouseover", |_| Ok(())).unwrap();
    button.add_event_listener("click", |_| Ok(())).unwrap();
    let survivor = document.body().unwrap();
    survivor.add_event_listener("click", |_| Ok(())).unwrap();
    assert_eq!(document.listener_count(), 4);

    outer.delete().unwrap();

    assert_eq!(removals.get(), 3);
    assert_eq!(document.listener_count(), 1);
    assert!(!button.is_live());
}

#[test]
fn delete_without_listeners_issues_no_removals() {
    let (document, removals) = counting_document();
    let outer = document.find_one("#outer").unwrap().unwrap();
    outer.delete().unwrap();
    assert_eq!(removals.get(), 0);
}

#[test]
fn events_bubble_until_propagation_stops() {
    let document = document();
    let outer = document.find_one("#outer").unwrap().unwrap();
    let button = outer.find_one("#btn").unwrap().unwrap();
    let (outer_count, on_outer) = counter();
    outer.add_event_listener("click", on_outer).unwrap();

    document.dispatch(RawEvent::new("click", button.node_id())).unwrap();
    assert_eq!(outer_count.get(), 1);

    document
        .dispatch(RawEvent::new("click", button.node_id()).with_bubbles(false))
        .unwrap();
    assert_eq!(outer_count.get(), 1);

    button
        .add_event_listener("click", |event| {
            event.stop_propagation();
            event.prevent_default();
            Ok(())
        })
        .unwrap();
    let outcome = document.dispatch(RawEvent::new("click", button.node_id())).unwrap();
    assert_eq!(outer_count.get(), 1);
    assert!(outcome.propagation_stopped);
    assert!(outcome.default_prevented);
}

#[test]
fn listener_errors_are_reported_without_stopping_dispatch() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("trellis=debug"))
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let (count, handler) = counter();
    button
        .add_event_listener("click", |_| Err(anyhow!("handler failed")))
        .unwrap();
    button.add_event_listener("click", handler).unwrap();

    let outcome = document.dispatch(RawEvent::new("click", button.node_id())).unwrap();

    assert_eq!(outcome.invoked, 2);
    assert_eq!(outcome.listener_errors, 1);
    assert_eq!(count.get(), 1);
}

#[test]
fn listener_removed_during_dispatch_is_skipped() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let (count, handler) = counter();
    let victim = Rc::new(RefCell::new(None::<ListenerId>));

    let victim_in_handler = Rc::clone(&victim);
    button
        .add_event_listener("click", move |event| {
            if let Some(id) = victim_in_handler.borrow_mut().take() {
                event.target().remove_event_listener(&id)?;
            }
            Ok(())
        })
        .unwrap();
    *victim.borrow_mut() = Some(button.add_event_listener("click", handler).unwrap());

    let outcome = document.dispatch(RawEvent::new("click", button.node_id())).unwrap();

    assert_eq!(outcome.invoked, 1);
    assert_eq!(count.get(), 0);
}

#[test]
fn handler_may_delete_its_own_element() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    button
        .add_event_listener("click", |event| {
            event.target().delete()?;
            Ok(())
        })
        .unwrap();

    let outcome = document.dispatch(RawEvent::new("click", button.node_id())).unwrap();

    assert_eq!(outcome.listener_errors, 0);
    assert!(!button.is_live());
    assert_eq!(document.listener_count(), 0);
    assert!(matches!(
        document.dispatch(RawEvent::new("click", button.node_id())),
        Err(DomError::StaleReference(_))
    ));
}

#[test]
fn event_families_expose_their_fields() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let families = Rc::new(RefCell::new(Vec::new()));

    for event_name in ["wheel", "keydown", "input"] {
        let families = Rc::clone(&families);
        button
            .add_event_listener(event_name, move |event| {
                match &event {
                    Event::Wheel(wheel) => {
                        assert_eq!((wheel.delta_x(), wheel.delta_y()), (0.0, -120.0));
                        assert_eq!((wheel.x(), wheel.y()), (4.0, 8.0));
                        assert!(wheel.ctrl_pressed());
                    }
                    Event::Keyboard(key) => {
                        assert_eq!(key.key(), "Enter");
                        assert_eq!(key.code(), "Enter");
                        assert!(key.shift_pressed());
                        assert!(!key.alt_pressed());
                        assert!(key.repeat());
                    }
                    Event::Generic(generic) => {
                        assert_eq!(generic.event_type(), "input");
                    }
                    Event::Mouse(_) => panic!("unexpected mouse event"),
                }
                assert!(event.timestamp() >= 0.0);
                families.borrow_mut().push(event.family());
                Ok(())
            })
            .unwrap();
    }

    let node = button.node_id();
    let modifiers = |ctrl, shift| trellis::events::Modifiers {
        ctrl,
        shift,
        ..Default::default()
    };
    document
        .dispatch(
            RawEvent::new("wheel", node)
                .with_offset(4.0, 8.0)
                .with_wheel_delta(0.0, -120.0)
                .with_modifiers(modifiers(true, false)),
        )
        .unwrap();
    document
        .dispatch(
            RawEvent::new("keydown", node)
                .with_key("Enter", "Enter")
                .with_repeat(true)
                .with_modifiers(modifiers(false, true)),
        )
        .unwrap();
    let outcome = document.dispatch(RawEvent::new("input", node)).unwrap();
    assert_eq!(outcome.listener_errors, 0);

    assert_eq!(
        *families.borrow(),
        vec![EventFamily::Wheel, EventFamily::Keyboard, EventFamily::Generic]
    );
}

#[test]
fn detaching_through_another_element_only_drops_the_record() {
    let document = document();
    let outer = document.find_one("#outer").unwrap().unwrap();
    let button = document.find_one("#btn").unwrap().unwrap();
    let (count, handler) = counter();
    let id = button.add_event_listener("focus", handler).unwrap();

    outer.remove_event_listener(&id).unwrap();

    assert!(!document.is_registered(&id));
    assert_eq!(button.active_listeners().unwrap(), vec![id.clone()]);
    document
        .dispatch(RawEvent::new("focus", button.node_id()).with_bubbles(false))
        .unwrap();
    assert_eq!(count.get(), 1);

    let report = button.reconcile_listeners().unwrap();
    assert_eq!(report.dropped, vec![id]);
    assert!(button.active_listeners().unwrap().is_empty());
}

#[test]
fn reconcile_restores_a_cleared_attribute() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let id = button.add_event_listener("click", |_| Ok(())).unwrap();

    button.set_attribute("data-listener-ids", "").unwrap();
    assert!(button.active_listeners().unwrap().is_empty());

    let report = button.reconcile_listeners().unwrap();
    assert_eq!(report.restored, vec![id.clone()]);
    assert_eq!(button.active_listeners().unwrap(), vec![id.clone()]);

    button.remove_all_event_listeners().unwrap();
    assert!(!document.is_registered(&id));
}

#[test]
fn custom_listener_attribute_is_used() {
    let config = TrellisConfig {
        listener_attribute: "data-pyids".to_string(),
        ..Default::default()
    };
    let document = Document::from_html(PAGE, &config);
    let button = document.find_one("#btn").unwrap().unwrap();
    let first = button.add_event_listener("click", |_| Ok(())).unwrap();
    let second = button.add_event_listener("click", |_| Ok(())).unwrap();

    assert_eq!(
        button.attribute("data-pyids").unwrap(),
        Some(format!("{first},{second}"))
    );
    assert_eq!(button.attribute("data-listener-ids").unwrap(), None);
}

#[test]
fn mixed_case_attribute_from_config_keeps_every_id() {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    writeln!(file, "listener_attribute: dataIds").expect("write config");
    let config = TrellisConfig::load(Some(file.path().to_path_buf())).expect("load config");
    let removals = Rc::new(Cell::new(0));
    let host = CountingHost {
        inner: BlitzHost::from_html(PAGE, None),
        removals: Rc::clone(&removals),
    };
    let document = Document::with_host(host, &config);
    let outer = document.find_one("#outer").unwrap().unwrap();

    let first = outer.add_event_listener("click", |_| Ok(())).unwrap();
    let second = outer.add_event_listener("keyup", |_| Ok(())).unwrap();
    assert_eq!(outer.active_listeners().unwrap(), vec![first, second]);

    outer.delete().unwrap();

    assert_eq!(removals.get(), 2);
    assert_eq!(document.listener_count(), 0);
}

#[test]
fn set_text_releases_listeners_of_replaced_children() {
    let (document, removals) = counting_document();
    let outer = document.find_one("#outer").unwrap().unwrap();
    let button = outer.find_one("#btn").unwrap().unwrap();
    let (count, handler) = counter();
    button.add_event_listener("click", handler).unwrap();
    outer.add_event_listener("click", |_| Ok(())).unwrap();

    outer.set_text("replaced").unwrap();

    assert_eq!(removals.get(), 1);
    assert_eq!(document.listener_count(), 1);
    assert!(!button.is_live());
    assert_eq!(outer.text().unwrap(), "replaced");
    assert_eq!(count.get(), 0);

    outer.delete().unwrap();
    assert_eq!(document.listener_count(), 0);
}

#[test]
fn detaching_the_last_listener_clears_the_attribute() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let id = button.add_event_listener("click", |_| Ok(())).unwrap();
    assert!(button.attribute("data-listener-ids").unwrap().is_some());

    button.remove_event_listener(&id).unwrap();

    assert_eq!(button.attribute("data-listener-ids").unwrap(), None);
    assert!(!button.outer_html().unwrap().contains("data-listener-ids"));
}

#[test]
fn timestamps_increase_across_dispatches() {
    let document = document();
    let button = document.find_one("#btn").unwrap().unwrap();
    let stamps = Rc::new(RefCell::new(Vec::new()));
    let stamps_in_handler = Rc::clone(&stamps);
    button
        .add_event_listener("click", move |event| {
            stamps_in_handler.borrow_mut().push(event.timestamp());
            Ok(())
        })
        .unwrap();

    document.dispatch(RawEvent::new("click", button.node_id())).unwrap();
    document.dispatch(RawEvent::new("click", button.node_id())).unwrap();

    let stamps = stamps.borrow();
    assert_eq!(stamps.len(), 2);
    assert!(stamps[0] >= 0.0);
    assert!(stamps[1] >= stamps[0]);
}
