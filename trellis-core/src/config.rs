//! Graph Configuration
//!
//! Hosts configure a graph with a small, serde-deserializable struct. All
//! fields have defaults so a partial JSON document (or `{}`) is valid.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What the engine does about dependency cycles.
///
/// Kahn's algorithm never schedules nodes that sit on a cycle, so a pass over
/// a cyclic subgraph completes with those nodes still dirty. The policy
/// decides whether that is silent, reported, or prevented up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Leave cyclic nodes dirty without saying anything.
    Ignore,

    /// Leave cyclic nodes dirty and emit a warning naming them.
    #[default]
    Warn,

    /// Refuse any link that would close a cycle.
    Reject,
}

/// Configuration for a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Human readable name, used in logs and exports.
    pub label: String,

    /// Cycle handling policy.
    pub cycle_policy: CyclePolicy,

    /// Emit a trace event around every node update.
    pub trace_updates: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            label: "graph".to_string(),
            cycle_policy: CyclePolicy::default(),
            trace_updates: true,
        }
    }
}

impl GraphConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the cycle policy.
    pub fn with_cycle_policy(mut self, policy: CyclePolicy) -> Self {
        self.cycle_policy = policy;
        self
    }
}
