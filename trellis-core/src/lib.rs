//! Trellis Core
//!
//! This crate provides an embeddable incremental dataflow engine. Callers
//! define nodes with typed input and output ports, link them into a graph,
//! and let the engine re-run only the nodes whose inputs may have changed,
//! in dependency order.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: nodes, ports, value cells, links, the graph and its scheduler
//! - `config`: graph configuration, including the cycle policy
//! - `export`: read-only snapshots and Graphviz / Mermaid text for host UIs
//! - `error`: the error type shared by all of the above
//!
//! Execution is single-threaded and synchronous. Logging goes through
//! `tracing`; install a subscriber to see it.
//!
//! # Example
//!
//! ```rust
//! use trellis_core::graph::{Graph, Node, Operator, Ports};
//!
//! struct Value;
//! impl Operator for Value {
//!     fn compute(&mut self, _ports: &mut Ports) {}
//! }
//!
//! struct Add;
//! impl Operator for Add {
//!     fn compute(&mut self, ports: &mut Ports) {
//!         let a = ports.get_value::<f32>("a");
//!         let b = ports.get_value::<f32>("b");
//!         if let (Some(a), Some(b)) = (a, b) {
//!             let _ = ports.set_value("a + b", a + b);
//!         }
//!     }
//! }
//!
//! let mut graph = Graph::new();
//! let v1 = graph.add_node(Node::new("Value", Value).with_output("value", 3.0f32))?;
//! let v2 = graph.add_node(Node::new("Value", Value).with_output("value", 4.0f32))?;
//! let add = graph.add_node(
//!     Node::new("Add", Add)
//!         .with_input::<f32>("a")
//!         .with_input::<f32>("b")
//!         .with_output("a + b", 0.0f32),
//! )?;
//!
//! graph.new_link(&v1, "value", &add, "a")?;
//! graph.new_link(&v2, "value", &add, "b")?;
//! graph.update();
//! assert_eq!(graph.node(&add)?.get_value::<f32>("a + b"), Some(7.0));
//!
//! // Change one input and recompute only what depends on it
//! graph.node_mut(&v1)?.set_value("value", 10.0f32)?;
//! graph.update_node(&v1)?;
//! assert_eq!(graph.node(&add)?.get_value::<f32>("a + b"), Some(14.0));
//! # Ok::<(), trellis_core::GraphError>(())
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod graph;

pub use config::{CyclePolicy, GraphConfig};
pub use error::{GraphError, Result};
pub use graph::{Direction, Graph, Node, Operator, Ports, UpdatePhase, UpdateReport, UpdateStatus};
