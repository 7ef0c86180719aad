//! Ports
//!
//! Ports are the typed pins of a node. An output port owns a [`ValueCell`];
//! an input port observes the cell of whichever output it is linked to.
//!
//! Ports live in a single ordered list per node. A port's position in that
//! list is its stable index, and either the index or the label can be used to
//! address it (see [`PortRef`]).

use std::any::{type_name, Any};
use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use super::value::{CellObserver, SharedCell, ValueCell};
use crate::error::{GraphError, Result};

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Reads a value produced upstream.
    In,

    /// Produces a value for downstream nodes.
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => f.write_str("input"),
            Direction::Out => f.write_str("output"),
        }
    }
}

/// Address of a port within a node, by index or by label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PortRef {
    Index(usize),
    Label(String),
}

impl From<usize> for PortRef {
    fn from(index: usize) -> Self {
        PortRef::Index(index)
    }
}

impl From<&str> for PortRef {
    fn from(label: &str) -> Self {
        PortRef::Label(label.to_string())
    }
}

impl From<String> for PortRef {
    fn from(label: String) -> Self {
        PortRef::Label(label)
    }
}

impl From<&String> for PortRef {
    fn from(label: &String) -> Self {
        PortRef::Label(label.clone())
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRef::Index(index) => write!(f, "#{index}"),
            PortRef::Label(label) => f.write_str(label),
        }
    }
}

/// Where a port's value lives.
#[derive(Debug)]
enum Slot {
    /// Output: the port owns the cell.
    Owned(SharedCell),

    /// Input: a view of an upstream cell, empty until linked.
    Observed(CellObserver),
}

/// A typed pin on a node.
#[derive(Debug)]
pub struct Port {
    label: String,
    direction: Direction,
    type_tag: &'static str,
    slot: Slot,
}

impl Port {
    /// Create an output port owning a cell initialised with `value`.
    pub fn output<T>(label: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            label: label.into(),
            direction: Direction::Out,
            type_tag: type_name::<T>(),
            slot: Slot::Owned(ValueCell::shared(value)),
        }
    }

    /// Create an unconnected input port expecting a `T`.
    pub fn input<T: Any>(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            direction: Direction::In,
            type_tag: type_name::<T>(),
            slot: Slot::Observed(Weak::new()),
        }
    }

    /// The port label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The port direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Name of the declared value type.
    pub fn type_tag(&self) -> &'static str {
        self.type_tag
    }

    /// Check whether the port takes part in a live connection.
    ///
    /// An input is connected while its observer resolves. An output is
    /// connected while at least one input observes its cell.
    pub fn is_connected(&self) -> bool {
        match &self.slot {
            Slot::Owned(cell) => Arc::weak_count(cell) > 0,
            Slot::Observed(observer) => observer.strong_count() > 0,
        }
    }

    /// Resolve the cell behind this port, if any.
    pub(crate) fn cell(&self) -> Option<SharedCell> {
        match &self.slot {
            Slot::Owned(cell) => Some(Arc::clone(cell)),
            Slot::Observed(observer) => observer.upgrade(),
        }
    }

    /// The owned cell of an output port.
    pub(crate) fn owned_cell(&self) -> Option<&SharedCell> {
        match &self.slot {
            Slot::Owned(cell) => Some(cell),
            Slot::Observed(_) => None,
        }
    }

    /// Point an input port at an upstream cell.
    pub(crate) fn observe(&mut self, cell: &SharedCell) {
        if let Slot::Observed(observer) = &mut self.slot {
            *observer = Arc::downgrade(cell);
        }
    }

    /// Reset an input port to "absent".
    pub(crate) fn detach(&mut self) {
        if let Slot::Observed(observer) = &mut self.slot {
            *observer = Weak::new();
        }
    }
}

/// The ordered port list of a node.
#[derive(Debug, Default)]
pub struct Ports {
    /// Id of the owning node, for error messages.
    node: String,
    ports: Vec<Port>,
}

impl Ports {
    /// Create an empty port list.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_node(&mut self, node: &str) {
        self.node = node.to_string();
    }

    /// Append a port and return its index.
    pub fn push(&mut self, port: Port) -> usize {
        self.ports.push(port);
        self.ports.len() - 1
    }

    /// Append an input port expecting a `T`.
    pub fn add_input<T: Any>(&mut self, label: impl Into<String>) -> usize {
        self.push(Port::input::<T>(label))
    }

    /// Append an output port holding `value`.
    pub fn add_output<T>(&mut self, label: impl Into<String>, value: T) -> usize
    where
        T: Any + Send + Sync,
    {
        self.push(Port::output(label, value))
    }

    /// Append a port of either direction. Outputs start at `T::default()`.
    pub fn add_port<T>(&mut self, direction: Direction, label: impl Into<String>) -> usize
    where
        T: Any + Default + Send + Sync,
    {
        match direction {
            Direction::In => self.add_input::<T>(label),
            Direction::Out => self.add_output(label, T::default()),
        }
    }

    /// Number of ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Check if the node has no ports.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Number of ports with the given direction.
    pub fn count(&self, direction: Direction) -> usize {
        self.ports
            .iter()
            .filter(|port| port.direction == direction)
            .count()
    }

    /// Iterate over the ports in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Port> {
        self.ports.iter()
    }

    /// Index of the first port carrying `label`.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.ports.iter().position(|port| port.label == label)
    }

    /// Resolve a port address to an index.
    pub fn resolve(&self, port: &PortRef) -> Result<usize> {
        match port {
            PortRef::Index(index) if *index < self.ports.len() => Ok(*index),
            PortRef::Index(index) => Err(GraphError::IndexOutOfRange {
                node: self.node.clone(),
                index: *index,
                len: self.ports.len(),
            }),
            PortRef::Label(label) => self.index_of(label).ok_or_else(|| GraphError::PortNotFound {
                node: self.node.clone(),
                label: label.clone(),
            }),
        }
    }

    /// Look up a port.
    pub fn get(&self, port: impl Into<PortRef>) -> Result<&Port> {
        let index = self.resolve(&port.into())?;
        Ok(&self.ports[index])
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Port> {
        self.ports.get_mut(index)
    }

    /// Reset every input port to "absent".
    pub(crate) fn detach_inputs(&mut self) {
        for port in &mut self.ports {
            port.detach();
        }
    }

    /// Read a port's value as a `T`.
    ///
    /// Returns `None` if the port does not exist, if it does not hold a `T`,
    /// or if it is an input whose upstream cell is absent. Callers are
    /// expected to handle `None` rather than assume a value.
    pub fn get_value_ref<T, R>(&self, port: impl Into<PortRef>, f: impl FnOnce(&T) -> R) -> Option<R>
    where
        T: Any,
    {
        let index = self.resolve(&port.into()).ok()?;
        let cell = self.ports[index].cell()?;
        let guard = cell.read();
        let value = guard.downcast_ref::<T>().map(f);
        value
    }

    /// Clone a port's value out as a `T`. Same failure rules as
    /// [`get_value_ref`](Self::get_value_ref).
    pub fn get_value<T>(&self, port: impl Into<PortRef>) -> Option<T>
    where
        T: Any + Clone,
    {
        self.get_value_ref(port, T::clone)
    }

    /// Mutate an output port's value in place.
    ///
    /// Returns `None` for inputs, unknown ports and type mismatches.
    pub fn get_value_mut<T, R>(
        &mut self,
        port: impl Into<PortRef>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<R>
    where
        T: Any,
    {
        let index = self.resolve(&port.into()).ok()?;
        let cell = self.ports[index].owned_cell()?;
        let mut guard = cell.write();
        let value = guard.downcast_mut::<T>().map(f);
        value
    }

    /// Overwrite an output port's value.
    pub fn set_value<T>(&mut self, port: impl Into<PortRef>, value: T) -> Result<()>
    where
        T: Any,
    {
        let index = self.resolve(&port.into())?;
        let port = &self.ports[index];
        let cell = port.owned_cell().ok_or_else(|| GraphError::InvalidDirection {
            node: self.node.clone(),
            port: port.label.clone(),
            expected: Direction::Out,
        })?;

        let mut guard = cell.write();
        let stored = guard.type_tag();
        let Some(slot) = guard.downcast_mut::<T>() else {
            return Err(GraphError::TypeMismatch {
                node: self.node.clone(),
                port: port.label.clone(),
                stored: stored.to_string(),
                requested: type_name::<T>(),
            });
        };
        *slot = value;
        Ok(())
    }

    /// Check whether a port takes part in a live connection. Unknown ports
    /// are reported as unconnected.
    pub fn is_connected(&self, port: impl Into<PortRef>) -> bool {
        self.get(port).map(Port::is_connected).unwrap_or(false)
    }
}
