use thiserror::Error;

use crate::engine::arena::NodeId;
use crate::field::FieldType;

#[derive(Debug, Error)]
pub enum VrmlError {
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: FieldType, found: String },

    #[error("{node_type} has no interface \"{interface}\"")]
    UnsupportedInterface { node_type: String, interface: String },

    #[error("interface \"{0}\" conflicts with an interface already in the set")]
    DuplicateInterface(String),

    #[error("unknown node type \"{0}\"")]
    UnknownNodeType(String),

    #[error("no node named \"{name}\" in scope {scope}")]
    UnknownNode { name: String, scope: String },

    #[error("node {0} does not exist")]
    InvalidNode(NodeId),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("invalid VRML:\n{0}")]
    InvalidVrml(String),

    #[error("no world is loaded")]
    NotLoaded,

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl VrmlError {
    pub fn type_mismatch(expected: FieldType, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.into(),
        }
    }

    pub fn unsupported(node_type: impl Into<String>, interface: impl Into<String>) -> Self {
        Self::UnsupportedInterface {
            node_type: node_type.into(),
            interface: interface.into(),
        }
    }
}

/// Errors raised by the resource layer.
///
/// These cross the worker-thread boundary, so they carry text rather than
/// source errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    #[error("could not load {url}: {reason}")]
    UnreachableUrl { url: String, reason: String },

    #[error("{0} is not UTF-8 text")]
    NotText(String),

    #[error("stream for {0} was destroyed before it completed")]
    Interrupted(String),
}

impl ResourceError {
    pub fn unreachable(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::UnreachableUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VrmlError>;
