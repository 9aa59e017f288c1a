//! Raw host events and their classification into event families.
//!
//! The host hands every listener a [`RawEvent`]. Before the caller's callback
//! sees it, the adapter classifies it by event name through [`EVENT_FAMILIES`]
//! into the richest matching [`Event`] variant. Supporting a new family means
//! one table entry and one wrapper type.

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use blitz_traits::events::{DomEvent, DomEventData, MouseEventButton};

use crate::element::ElementHandle;
use crate::host::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Mouse,
    Wheel,
    Keyboard,
    Generic,
}

pub const EVENT_FAMILIES: &[(&str, EventFamily)] = &[
    ("click", EventFamily::Mouse),
    ("contextmenu", EventFamily::Mouse),
    ("dblclick", EventFamily::Mouse),
    ("mousedown", EventFamily::Mouse),
    ("mouseenter", EventFamily::Mouse),
    ("mouseleave", EventFamily::Mouse),
    ("mousemove", EventFamily::Mouse),
    ("mouseout", EventFamily::Mouse),
    ("mouseover", EventFamily::Mouse),
    ("mouseup", EventFamily::Mouse),
    ("wheel", EventFamily::Wheel),
    ("keydown", EventFamily::Keyboard),
    ("keypress", EventFamily::Keyboard),
    ("keyup", EventFamily::Keyboard),
];

pub fn family_of(event_type: &str) -> EventFamily {
    EVENT_FAMILIES
        .iter()
        .find(|(name, _)| *name == event_type)
        .map(|(_, family)| *family)
        .unwrap_or(EventFamily::Generic)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Wheel,
    Right,
    Back,
    Forward,
}

impl MouseButton {
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(Self::Left),
            1 => Some(Self::Wheel),
            2 => Some(Self::Right),
            3 => Some(Self::Back),
            4 => Some(Self::Forward),
            _ => None,
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Self::Left => 0,
            Self::Wheel => 1,
            Self::Right => 2,
            Self::Back => 3,
            Self::Forward => 4,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl From<&keyboard_types::Modifiers> for Modifiers {
    fn from(mods: &keyboard_types::Modifiers) -> Self {
        Self {
            alt: mods.alt(),
            ctrl: mods.ctrl(),
            meta: mods.meta(),
            shift: mods.shift(),
        }
    }
}

/// An event as the host delivers it, before classification.
#[derive(Debug)]
pub struct RawEvent {
    event_type: String,
    target: NodeId,
    time_stamp: f64,
    bubbles: bool,
    offset_x: f32,
    offset_y: f32,
    client_x: f32,
    client_y: f32,
    button: i16,
    buttons: u32,
    modifiers: Modifiers,
    delta_x: f64,
    delta_y: f64,
    key: String,
    code: String,
    repeat: bool,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, target: NodeId) -> Self {
        Self {
            event_type: event_type.into(),
            target,
            time_stamp: 0.0,
            bubbles: true,
            offset_x: 0.0,
            offset_y: 0.0,
            client_x: 0.0,
            client_y: 0.0,
            button: 0,
            buttons: 0,
            modifiers: Modifiers::default(),
            delta_x: 0.0,
            delta_y: 0.0,
            key: String::new(),
            code: String::new(),
            repeat: false,
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }
    }

    /// Converts a blitz UI event. Offsets are left equal to the client
    /// position; [`crate::Document::dispatch_dom_event`] rebases them onto the
    /// target's box.
    pub fn from_dom_event(event: &DomEvent) -> Self {
        let mut raw = Self::new(event.data.name(), event.target);
        raw.bubbles = event.bubbles;

        match &event.data {
            DomEventData::MouseMove(data)
            | DomEventData::MouseDown(data)
            | DomEventData::MouseUp(data)
            | DomEventData::Click(data) => {
                raw.client_x = data.x;
                raw.client_y = data.y;
                raw.offset_x = data.x;
                raw.offset_y = data.y;
                raw.button = mouse_button_code(data.button);
                raw.buttons = data.buttons.bits().into();
                raw.modifiers = Modifiers::from(&data.mods);
            }
            DomEventData::KeyDown(data) | DomEventData::KeyUp(data) | DomEventData::KeyPress(data) => {
                raw.modifiers = Modifiers::from(&data.modifiers);
                raw.key = data.key.to_string();
                raw.code = data.code.to_string();
                raw.repeat = data.is_auto_repeating;
            }
            DomEventData::Input(_) | DomEventData::Ime(_) => {}
        }

        raw
    }

    pub fn with_offset(mut self, x: f32, y: f32) -> Self {
        self.offset_x = x;
        self.offset_y = y;
        self
    }

    pub fn with_client(mut self, x: f32, y: f32) -> Self {
        self.client_x = x;
        self.client_y = y;
        self
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button.code();
        self.buttons |= 1 << button.code();
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_wheel_delta(mut self, delta_x: f64, delta_y: f64) -> Self {
        self.delta_x = delta_x;
        self.delta_y = delta_y;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>, code: impl Into<String>) -> Self {
        self.key = key.into();
        self.code = code.into();
        self
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_bubbles(mut self, bubbles: bool) -> Self {
        self.bubbles = bubbles;
        self
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn time_stamp(&self) -> f64 {
        self.time_stamp
    }

    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    pub fn client_position(&self) -> (f32, f32) {
        (self.client_x, self.client_y)
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub(crate) fn stamp(&mut self, time_stamp: f64) {
        self.time_stamp = time_stamp;
    }

    pub(crate) fn rebase_offset(&mut self, origin_x: f32, origin_y: f32) {
        self.offset_x = self.client_x - origin_x;
        self.offset_y = self.client_y - origin_y;
    }
}

fn mouse_button_code(button: MouseEventButton) -> i16 {
    match button {
        MouseEventButton::Main => 0,
        MouseEventButton::Auxiliary => 1,
        MouseEventButton::Secondary => 2,
        MouseEventButton::Fourth => 3,
        MouseEventButton::Fifth => 4,
    }
}

/// Fields every event family shares.
#[derive(Clone)]
pub struct EventBase {
    raw: Rc<RawEvent>,
    target: ElementHandle,
}

impl EventBase {
    pub fn event_type(&self) -> &str {
        &self.raw.event_type
    }

    /// Milliseconds since the owning document was created.
    pub fn timestamp(&self) -> f64 {
        self.raw.time_stamp
    }

    pub fn target(&self) -> &ElementHandle {
        &self.target
    }

    pub fn prevent_default(&self) {
        self.raw.prevent_default();
    }

    pub fn stop_propagation(&self) {
        self.raw.stop_propagation();
    }

    pub fn default_prevented(&self) -> bool {
        self.raw.default_prevented()
    }

    pub fn raw(&self) -> &RawEvent {
        &self.raw
    }
}

#[derive(Clone)]
pub struct GenericEvent(EventBase);

impl Deref for GenericEvent {
    type Target = EventBase;

    fn deref(&self) -> &EventBase {
        &self.0
    }
}

#[derive(Clone)]
pub struct MouseEvent(EventBase);

impl Deref for MouseEvent {
    type Target = EventBase;

    fn deref(&self) -> &EventBase {
        &self.0
    }
}

impl MouseEvent {
    pub fn button(&self) -> Option<MouseButton> {
        MouseButton::from_code(self.raw.button)
    }

    /// Bit mask of pressed buttons, bit `n` for button code `n`.
    pub fn buttons(&self) -> u32 {
        self.raw.buttons
    }

    /// Position relative to the target's box.
    pub fn x(&self) -> f32 {
        self.raw.offset_x
    }

    pub fn y(&self) -> f32 {
        self.raw.offset_y
    }

    /// Position relative to the viewport.
    pub fn screen_x(&self) -> f32 {
        self.raw.client_x
    }

    pub fn screen_y(&self) -> f32 {
        self.raw.client_y
    }

    pub fn modifiers(&self) -> Modifiers {
        self.raw.modifiers
    }

    pub fn alt_pressed(&self) -> bool {
        self.raw.modifiers.alt
    }

    pub fn ctrl_pressed(&self) -> bool {
        self.raw.modifiers.ctrl
    }

    pub fn meta_pressed(&self) -> bool {
        self.raw.modifiers.meta
    }

    pub fn shift_pressed(&self) -> bool {
        self.raw.modifiers.shift
    }
}

#[derive(Clone)]
pub struct WheelEvent(MouseEvent);

impl Deref for WheelEvent {
    type Target = MouseEvent;

    fn deref(&self) -> &MouseEvent {
        &self.0
    }
}

impl WheelEvent {
    pub fn delta_x(&self) -> f64 {
        self.raw.delta_x
    }

    pub fn delta_y(&self) -> f64 {
        self.raw.delta_y
    }
}

#[derive(Clone)]
pub struct KeyboardEvent(EventBase);

impl Deref for KeyboardEvent {
    type Target = EventBase;

    fn deref(&self) -> &EventBase {
        &self.0
    }
}

impl KeyboardEvent {
    /// Either a named key ("Backspace", "Enter", "ArrowLeft", ...) or the text
    /// the key produces.
    pub fn key(&self) -> &str {
        &self.raw.key
    }

    /// Physical key code, e.g. "KeyA".
    pub fn code(&self) -> &str {
        &self.raw.code
    }

    pub fn repeat(&self) -> bool {
        self.raw.repeat
    }

    pub fn modifiers(&self) -> Modifiers {
        self.raw.modifiers
    }

    pub fn alt_pressed(&self) -> bool {
        self.raw.modifiers.alt
    }

    pub fn ctrl_pressed(&self) -> bool {
        self.raw.modifiers.ctrl
    }

    pub fn meta_pressed(&self) -> bool {
        self.raw.modifiers.meta
    }

    pub fn shift_pressed(&self) -> bool {
        self.raw.modifiers.shift
    }
}

/// A classified event, as delivered to listener callbacks.
#[derive(Clone)]
pub enum Event {
    Mouse(MouseEvent),
    Wheel(WheelEvent),
    Keyboard(KeyboardEvent),
    Generic(GenericEvent),
}

impl Event {
    pub fn classify(raw: Rc<RawEvent>, target: ElementHandle) -> Self {
        let family = family_of(raw.event_type());
        let base = EventBase { raw, target };
        match family {
            EventFamily::Mouse => Self::Mouse(MouseEvent(base)),
            EventFamily::Wheel => Self::Wheel(WheelEvent(MouseEvent(base))),
            EventFamily::Keyboard => Self::Keyboard(KeyboardEvent(base)),
            EventFamily::Generic => Self::Generic(GenericEvent(base)),
        }
    }

    pub fn family(&self) -> EventFamily {
        match self {
            Self::Mouse(_) => EventFamily::Mouse,
            Self::Wheel(_) => EventFamily::Wheel,
            Self::Keyboard(_) => EventFamily::Keyboard,
            Self::Generic(_) => EventFamily::Generic,
        }
    }

    pub fn base(&self) -> &EventBase {
        match self {
            Self::Mouse(event) => &event.0,
            Self::Wheel(event) => &event.0 .0,
            Self::Keyboard(event) => &event.0,
            Self::Generic(event) => &event.0,
        }
    }

    /// Mouse fields, for both plain mouse and wheel events.
    pub fn as_mouse(&self) -> Option<&MouseEvent> {
        match self {
            Self::Mouse(event) => Some(event),
            Self::Wheel(event) => Some(&event.0),
            _ => None,
        }
    }

    pub fn as_wheel(&self) -> Option<&WheelEvent> {
        match self {
            Self::Wheel(event) => Some(event),
            _ => None,
        }
    }

    pub fn as_keyboard(&self) -> Option<&KeyboardEvent> {
        match self {
            Self::Keyboard(event) => Some(event),
            _ => None,
        }
    }
}

impl Deref for Event {
    type Target = EventBase;

    fn deref(&self) -> &EventBase {
        self.base()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Mouse(_) => "MouseEvent",
            Self::Wheel(_) => "WheelEvent",
            Self::Keyboard(_) => "KeyboardEvent",
            Self::Generic(_) => "Event",
        };
        write!(f, "[{kind} - {}]", self.event_type())
    }
}
