//! Error types for trellis-core.
//!
//! Structural errors abort the call that raised them and leave the graph
//! untouched. Port value reads never error: they return `None` and leave the
//! null-check to the caller.

use thiserror::Error;

use crate::graph::Direction;

/// Result type for trellis-core operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur while building or updating a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node was added with an id that is already in use.
    #[error("node id already used: '{id}'")]
    DuplicateId { id: String },

    /// A node id is not present in the graph.
    #[error("unknown node id: '{id}'")]
    UnknownId { id: String },

    /// A port was used against its declared direction.
    #[error("port '{port}' on node '{node}' must be an {expected} port")]
    InvalidDirection {
        node: String,
        port: String,
        expected: Direction,
    },

    /// No port carries the requested label.
    #[error("port '{label}' not found on node '{node}'")]
    PortNotFound { node: String, label: String },

    /// A port index is past the end of the node's port list.
    #[error("port index {index} out of range on node '{node}' ({len} ports)")]
    IndexOutOfRange {
        node: String,
        index: usize,
        len: usize,
    },

    /// A port was written at a type other than the one it stores.
    #[error("port '{port}' on node '{node}' stores {stored}, not {requested}")]
    TypeMismatch {
        node: String,
        port: String,
        stored: String,
        requested: &'static str,
    },

    /// A typed node lookup did not match the stored operator.
    #[error("node '{id}' is not a {requested}")]
    NodeTypeMismatch { id: String, requested: &'static str },

    /// The destination input already has an upstream link.
    #[error("input '{port}' on node '{node}' is already connected")]
    InputAlreadyConnected { node: String, port: String },

    /// The link would close a dependency cycle.
    #[error("linking '{from}' to '{to}' would create a cycle")]
    CycleDetected { from: String, to: String },

    /// JSON (de)serialization failed, e.g. a malformed configuration.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
