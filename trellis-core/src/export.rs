//! Graph Export
//!
//! Read-only views of a graph for host applications: a serializable snapshot
//! (nodes, ports, dirty flags, links) and Graphviz / Mermaid text. Nothing
//! here feeds back into scheduling, and nothing touches the filesystem.

use std::collections::HashSet;
use std::fmt::Write;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::Result;
use crate::graph::{Direction, Graph, Link, Node, Port};

/// Serializable view of a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSnapshot {
    pub label: String,
    pub direction: Direction,
    pub type_tag: String,
    pub connected: bool,
}

impl From<&Port> for PortSnapshot {
    fn from(port: &Port) -> Self {
        Self {
            label: port.label().to_string(),
            direction: port.direction(),
            type_tag: port.type_tag().to_string(),
            connected: port.is_connected(),
        }
    }
}

/// Serializable view of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub label: String,
    pub dirty: bool,
    pub ports: Vec<PortSnapshot>,
}

impl From<&Node> for NodeSnapshot {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id().to_string(),
            label: node.label().to_string(),
            dirty: node.is_dirty(),
            ports: node.ports().iter().map(PortSnapshot::from).collect(),
        }
    }
}

/// Serializable view of a whole graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub label: String,
    pub nodes: Vec<NodeSnapshot>,
    pub links: Vec<Link>,
}

impl GraphSnapshot {
    /// Capture the current state of `graph`.
    pub fn capture(graph: &Graph) -> Self {
        Self {
            label: graph.label().to_string(),
            nodes: graph.nodes().map(NodeSnapshot::from).collect(),
            links: graph.links().to_vec(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Render the graph as a Graphviz `digraph`.
///
/// Convert with e.g. `dot export.dot -Tsvg > output.svg`.
pub fn to_graphviz(graph: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph root {{");
    let _ = writeln!(out, "label=\"{}\";", escape(graph.label()));
    let _ = writeln!(out, "labelloc=\"t\";");
    let _ = writeln!(out, "rankdir=TD;");
    let _ = writeln!(out, "ranksep=0.5;");
    let _ = writeln!(out, "node [shape=record];");

    for node in graph.nodes() {
        let _ = writeln!(
            out,
            "\"{}\" [label=\"{}\"];",
            escape(node.id()),
            escape(node.label())
        );
    }

    for (from, targets) in &graph.get_connectivity_downstream() {
        for to in targets {
            let _ = writeln!(out, "\"{}\" -> \"{}\";", escape(from), escape(to));
        }
    }

    out.push_str("}\n");
    out
}

/// Render the graph as a Mermaid flowchart.
///
/// Node ids that are not plain identifiers are rewritten to unique ones;
/// labels are quoted so any text is accepted.
pub fn to_mermaid(graph: &Graph) -> String {
    let ids = mermaid_ids(graph);

    let mut out = String::new();
    let _ = writeln!(out, "---");
    let _ = writeln!(out, "title: \"{}\"", escape(graph.label()));
    let _ = writeln!(out, "---");
    let _ = writeln!(out, "flowchart LR");

    for (node, id) in graph.nodes().zip(ids.values()) {
        let _ = writeln!(out, "    {id}([\"{}\"])", mermaid_text(node.label()));
    }

    for (from, targets) in &graph.get_connectivity_downstream() {
        for to in targets {
            if let (Some(from), Some(to)) = (ids.get(from), ids.get(to)) {
                let _ = writeln!(out, "    {from} --> {to}");
            }
        }
    }

    out
}

/// Map every node id to a unique Mermaid-safe identifier.
fn mermaid_ids(graph: &Graph) -> IndexMap<String, String> {
    let plain = |id: &str| {
        !id.is_empty()
            && id != "end"
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let mut taken: HashSet<String> = graph
        .node_ids()
        .filter(|&id| plain(id))
        .map(str::to_string)
        .collect();

    let mut ids = IndexMap::with_capacity(graph.len());
    for id in graph.node_ids() {
        let safe = if plain(id) {
            id.to_string()
        } else {
            let base: String = id
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            let mut candidate = format!("n_{base}");
            let mut suffix = 1;
            while taken.contains(&candidate) {
                candidate = format!("n_{base}_{suffix}");
                suffix += 1;
            }
            taken.insert(candidate.clone());
            candidate
        };
        ids.insert(id.to_string(), safe);
    }
    ids
}

/// Escape text for use inside a quoted Mermaid string.
fn mermaid_text(text: &str) -> String {
    text.replace('"', "#quot;")
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
