use thiserror::Error;

use crate::host::NodeId;
use crate::registry::ListenerId;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("node {0} is no longer part of the document")]
    StaleReference(NodeId),
    #[error("invalid element type '{0}'")]
    InvalidElementType(String),
    #[error("unknown listener '{0}'")]
    UnknownListener(ListenerId),
    #[error("invalid selector '{0}'")]
    InvalidSelector(String),
    #[error("node {child} cannot be appended to node {parent}")]
    InvalidHierarchy { parent: NodeId, child: NodeId },
}

pub type DomResult<T> = Result<T, DomError>;
