//! Links
//!
//! A link records which output port feeds which input port. It is a passive
//! record: the live connection is the input port's observer, installed when
//! the link is created and cleared when it is removed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A directed edge from an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Link {
    /// Source node id.
    pub from: String,
    /// Output port index on the source node.
    pub port_from: usize,
    /// Destination node id.
    pub to: String,
    /// Input port index on the destination node.
    pub port_to: usize,
}

impl Link {
    pub fn new(from: impl Into<String>, port_from: usize, to: impl Into<String>, port_to: usize) -> Self {
        Self {
            from: from.into(),
            port_from,
            to: to.into(),
            port_to,
        }
    }

    /// Check whether either endpoint is `node_id`.
    pub fn touches(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }

    /// Check whether this link ends at the given input.
    pub fn targets(&self, node_id: &str, port: usize) -> bool {
        self.to == node_id && self.port_to == port
    }

    /// Check whether this link starts at the given output.
    pub fn sources(&self, node_id: &str, port: usize) -> bool {
        self.from == node_id && self.port_from == port
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "from: {}({}) to: {}({})",
            self.from, self.port_from, self.to, self.port_to
        )
    }
}
