//! Element handles and listener bookkeeping over a host display tree.

pub mod config;
pub mod document;
pub mod element;
pub mod error;
pub mod events;
pub mod host;
pub mod registry;
pub mod tasks;

pub use config::{ConfigError, TrellisConfig};
pub use document::{DispatchOutcome, Document};
pub use element::{ChildOptions, ElementHandle};
pub use error::{DomError, DomResult};
pub use events::{Event, EventFamily, MouseButton, RawEvent};
pub use host::{BlitzHost, Host, NodeId};
pub use registry::{ListenerId, Reconciliation};
pub use tasks::TaskFailure;
