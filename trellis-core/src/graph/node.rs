//! Graph Nodes
//!
//! This module defines the node type that lives in a [`Graph`](super::Graph).
//!
//! A node pairs an ordered port list with a dirty flag and a user supplied
//! [`Operator`]. The engine drives the operator through [`Node::update`]; the
//! operator reads its inputs and writes its outputs through [`Ports`].

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::port::{Direction, Port, PortRef, Ports};
use crate::error::Result;

/// Unique identifier for a graph instance.
///
/// Nodes record the id of the graph that owns them instead of a pointer back
/// to it, so graphs can be moved freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl GraphId {
    /// Generate a new unique graph ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

/// Upcast helper so boxed operators can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The unit of work behind a node.
///
/// `compute` reads input ports and writes output ports. Inputs may be absent
/// (unlinked, or their upstream node was removed), so implementations must
/// handle `None` from the port accessors. Operators must not try to change
/// the graph topology.
pub trait Operator: AsAny + Send {
    fn compute(&mut self, ports: &mut Ports);
}

/// Return a label derived from an id: everything from the first `"##"` on is
/// dropped.
pub fn id_to_label(id: &str) -> &str {
    match id.find("##") {
        Some(pos) => &id[..pos],
        None => id,
    }
}

/// A node in the dataflow graph.
pub struct Node {
    /// Identifier, assigned by the graph on insertion.
    id: String,

    /// Display label.
    label: String,

    /// Outputs must be recomputed before they can be trusted.
    dirty: bool,

    /// Ports in insertion order.
    ports: Ports,

    /// The graph this node currently belongs to.
    graph: Option<GraphId>,

    /// User supplied computation.
    operator: Box<dyn Operator>,
}

impl Node {
    /// Create a node with no ports. Nodes start dirty so they run at least
    /// once before their outputs are read.
    pub fn new(label: impl Into<String>, operator: impl Operator) -> Self {
        Self {
            id: String::new(),
            label: label.into(),
            dirty: true,
            ports: Ports::new(),
            graph: None,
            operator: Box::new(operator),
        }
    }

    /// Add an input port expecting a `T`. Returns the port index.
    pub fn add_input<T: Any>(&mut self, label: impl Into<String>) -> usize {
        self.ports.add_input::<T>(label)
    }

    /// Add an output port holding `value`. Returns the port index.
    pub fn add_output<T>(&mut self, label: impl Into<String>, value: T) -> usize
    where
        T: Any + Send + Sync,
    {
        self.ports.add_output(label, value)
    }

    /// Add a port of either direction; outputs start at `T::default()`.
    pub fn add_port<T>(&mut self, direction: Direction, label: impl Into<String>) -> usize
    where
        T: Any + Default + Send + Sync,
    {
        self.ports.add_port::<T>(direction, label)
    }

    /// Builder form of [`add_input`](Self::add_input).
    pub fn with_input<T: Any>(mut self, label: impl Into<String>) -> Self {
        self.add_input::<T>(label);
        self
    }

    /// Builder form of [`add_output`](Self::add_output).
    pub fn with_output<T>(mut self, label: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.add_output(label, value);
        self
    }

    /// Get the node's ID. Empty until the node is added to a graph.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
        self.ports.set_node(id);
        if self.label.is_empty() {
            self.label = id_to_label(id).to_string();
        }
    }

    /// Get the node's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// ID of the owning graph, if the node has been added to one.
    pub fn graph_id(&self) -> Option<GraphId> {
        self.graph
    }

    pub(crate) fn attach(&mut self, graph: GraphId) {
        self.graph = Some(graph);
    }

    /// Leave the graph: forget the owner and drop every upstream observer.
    pub(crate) fn detach(&mut self) {
        self.graph = None;
        self.ports.detach_inputs();
    }

    /// Check if the node must recompute.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the node as needing recomputation.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Run the operator if the node is dirty, then mark it clean.
    ///
    /// Returns whether `compute` ran. A clean node is a no-op.
    pub fn update(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.operator.compute(&mut self.ports);
        self.dirty = false;
        true
    }

    /// The port list.
    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    /// Mutable access to the port list.
    pub fn ports_mut(&mut self) -> &mut Ports {
        &mut self.ports
    }

    pub(crate) fn port_mut(&mut self, index: usize) -> Option<&mut Port> {
        self.ports.get_mut(index)
    }

    /// Number of ports with the given direction.
    pub fn port_count(&self, direction: Direction) -> usize {
        self.ports.count(direction)
    }

    /// Index of the first port carrying `label`.
    pub fn port_index(&self, label: &str) -> Result<usize> {
        self.ports.resolve(&PortRef::from(label))
    }

    /// Label of the port at `index`.
    pub fn port_label(&self, index: usize) -> Result<&str> {
        Ok(self.ports.get(index)?.label())
    }

    /// Direction of a port.
    pub fn port_direction(&self, port: impl Into<PortRef>) -> Result<Direction> {
        Ok(self.ports.get(port)?.direction())
    }

    /// Declared type of a port.
    pub fn port_type_tag(&self, port: impl Into<PortRef>) -> Result<&'static str> {
        Ok(self.ports.get(port)?.type_tag())
    }

    /// Read a port's value as a `T`; `None` if the port is missing, holds
    /// another type, or is an input with no live upstream value.
    pub fn get_value_ref<T, R>(&self, port: impl Into<PortRef>, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: Any,
    {
        self.ports.get_value_ref(port, f)
    }

    /// Clone a port's value out as a `T`.
    pub fn get_value<T>(&self, port: impl Into<PortRef>) -> Option<T>
    where
        T: Any + Clone,
    {
        self.ports.get_value(port)
    }

    /// Mutate an output value in place.
    pub fn get_value_mut<T, R>(
        &mut self,
        port: impl Into<PortRef>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R>
    where
        T: Any,
    {
        self.ports.get_value_mut(port, f)
    }

    /// Overwrite an output value.
    pub fn set_value<T>(&mut self, port: impl Into<PortRef>, value: T) -> Result<()>
    where
        T: Any,
    {
        self.ports.set_value(port, value)
    }

    /// Check whether a port takes part in a live connection.
    pub fn is_port_connected(&self, port: impl Into<PortRef>) -> bool {
        self.ports.is_connected(port)
    }

    /// Borrow the operator as its concrete type.
    pub fn operator<T: Operator>(&self) -> Option<&T> {
        (*self.operator).as_any().downcast_ref::<T>()
    }

    /// Mutably borrow the operator as its concrete type.
    pub fn operator_mut<T: Operator>(&mut self) -> Option<&mut T> {
        (*self.operator).as_any_mut().downcast_mut::<T>()
    }

    /// Name of the operator's type, for diagnostics.
    pub(crate) fn operator_type_name<T: Operator>() -> &'static str {
        type_name::<T>()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("dirty", &self.dirty)
            .field("ports", &self.ports)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}
