//! Dataflow Graph
//!
//! This module implements the node graph and its incremental update engine.
//!
//! # Overview
//!
//! The graph is a directed graph where:
//!
//! - Nodes are units of computation with typed input and output ports
//! - Links connect one node's output port to another node's input port
//!
//! When a node's state changes, the engine walks the links downstream to find
//! every node that may be affected, marks them dirty, and recomputes them in
//! topological order. Nodes outside that set are never touched.
//!
//! # Design Decisions
//!
//! 1. Values live in the output port that produces them. Inputs only observe
//!    them through weak handles, so removing a producer can never leave a
//!    consumer reading freed storage: the input simply reads as absent.
//!
//! 2. Nodes are indexed by id in insertion order. That order is also the
//!    tie-break between nodes that become ready at the same time, which keeps
//!    execution order deterministic.
//!
//! 3. Connectivity is derived from the link list on demand, in both
//!    directions, rather than cached on the nodes.

mod engine;
mod link;
mod node;
mod port;
mod scheduler;
mod value;

pub use engine::{Graph, PostUpdateHook, UpdateCallback, UpdatePhase, UpdateReport, UpdateStatus};
pub use link::Link;
pub use node::{id_to_label, AsAny, GraphId, Node, Operator};
pub use port::{Direction, Port, PortRef, Ports};
pub use scheduler::{Connectivity, Schedule, UpdateScheduler};
pub use value::ValueCell;
