//! Graph
//!
//! The graph owns every node and link and drives updates. All mutation goes
//! through `&mut Graph`, so the graph always knows when its state may have
//! changed: each mutable access bumps a revision counter, and a full update on
//! a graph that is unchanged since its last clean full pass does nothing.

use std::fmt;

use indexmap::{IndexMap, IndexSet};

use super::link::Link;
use super::node::{GraphId, Node, Operator};
use super::port::{Direction, PortRef};
use super::scheduler::{Connectivity, Schedule, UpdateScheduler};
use crate::config::{CyclePolicy, GraphConfig};
use crate::error::{GraphError, Result};

/// Which side of a node update a callback is invoked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Before,
    After,
}

/// How an update pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// The pass ran its schedule.
    Completed,

    /// Nothing changed since the last clean full pass; no node was computed.
    Unchanged,

    /// An incremental update was refused because an upstream neighbour is
    /// still dirty. Nothing was touched.
    Deferred,
}

/// Outcome of an update pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub status: UpdateStatus,

    /// Nodes updated, in execution order.
    pub order: Vec<String>,

    /// Dirty nodes the scheduler could not order (cycles). They stay dirty.
    pub unscheduled: Vec<String>,

    /// For deferred updates, the dirty upstream neighbours that blocked it.
    pub blocked_by: Vec<String>,
}

impl UpdateReport {
    fn completed(schedule: Schedule) -> Self {
        Self {
            status: UpdateStatus::Completed,
            order: schedule.order,
            unscheduled: schedule.unscheduled,
            blocked_by: Vec::new(),
        }
    }

    fn unchanged() -> Self {
        Self {
            status: UpdateStatus::Unchanged,
            order: Vec::new(),
            unscheduled: Vec::new(),
            blocked_by: Vec::new(),
        }
    }

    fn deferred(blocked_by: Vec<String>) -> Self {
        Self {
            status: UpdateStatus::Deferred,
            order: Vec::new(),
            unscheduled: Vec::new(),
            blocked_by,
        }
    }

    /// Check whether the pass was refused.
    pub fn is_deferred(&self) -> bool {
        self.status == UpdateStatus::Deferred
    }

    /// Check whether every scheduled node ran and none were left behind.
    pub fn is_complete(&self) -> bool {
        self.status != UpdateStatus::Deferred && self.unscheduled.is_empty()
    }
}

/// Called before and after each node update with the node id and the full
/// execution order.
pub type UpdateCallback = Box<dyn FnMut(&str, &[String], UpdatePhase) + Send>;

/// Called once after every update pass that ran.
pub type PostUpdateHook = Box<dyn FnMut(&UpdateReport) + Send>;

/// A dataflow graph.
pub struct Graph {
    id: GraphId,
    config: GraphConfig,

    /// Nodes by id, in insertion order.
    nodes: IndexMap<String, Node>,

    links: Vec<Link>,

    /// Source of generated node ids.
    id_counter: u64,

    /// Bumped on every mutable access.
    revision: u64,

    /// Revision at which the last full pass left every node clean.
    clean_revision: Option<u64>,

    update_callback: Option<UpdateCallback>,
    post_update: Option<PostUpdateHook>,
}

impl Graph {
    /// Create an empty graph with the default configuration.
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Create an empty graph with the given configuration.
    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            id: GraphId::new(),
            config,
            nodes: IndexMap::new(),
            links: Vec::new(),
            id_counter: 0,
            revision: 0,
            clean_revision: None,
            update_callback: None,
            post_update: None,
        }
    }

    /// This graph's unique id.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// The graph configuration.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// The graph label.
    pub fn label(&self) -> &str {
        &self.config.label
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // ------------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------------

    /// Add a node under a generated id (the next counter value).
    pub fn add_node(&mut self, node: Node) -> Result<String> {
        self.add_node_with_id(node, "")
    }

    /// Add a node under `id`, or under a generated id if `id` is empty.
    pub fn add_node_with_id(&mut self, mut node: Node, id: &str) -> Result<String> {
        let id = if id.is_empty() {
            let generated = self.id_counter.to_string();
            self.id_counter += 1;
            generated
        } else {
            id.to_string()
        };

        if !self.is_node_id_available(&id) {
            return Err(GraphError::DuplicateId { id });
        }

        node.set_id(&id);
        node.attach(self.id);
        tracing::debug!(graph = %self.config.label, node = %id, label = node.label(), "node added");

        self.nodes.insert(id.clone(), node);
        self.touch();
        Ok(id)
    }

    /// Remove a node and every link touching it.
    ///
    /// Inputs fed by the node are reset to "absent", and so are the removed
    /// node's own inputs, so the returned node no longer observes the graph.
    /// Downstream nodes are not marked dirty; the caller decides when to
    /// update again.
    pub fn remove_node(&mut self, id: &str) -> Result<Node> {
        if !self.contains_node(id) {
            return Err(GraphError::UnknownId { id: id.to_string() });
        }

        for link in self.links.iter().filter(|link| link.from == id) {
            if let Some(port) = self
                .nodes
                .get_mut(&link.to)
                .and_then(|node| node.port_mut(link.port_to))
            {
                port.detach();
            }
        }
        self.links.retain(|link| !link.touches(id));

        let mut node = self
            .nodes
            .shift_remove(id)
            .ok_or_else(|| GraphError::UnknownId { id: id.to_string() })?;
        node.detach();

        tracing::debug!(graph = %self.config.label, node = %id, "node removed");
        self.touch();
        Ok(node)
    }

    /// Remove every node and link and reset the id counter.
    pub fn clear(&mut self) {
        for node in self.nodes.values_mut() {
            node.detach();
        }
        self.nodes.clear();
        self.links.clear();
        self.id_counter = 0;
        self.touch();
    }

    /// Check whether `id` is free for a new node.
    pub fn is_node_id_available(&self, id: &str) -> bool {
        !self.nodes.contains_key(id)
    }

    /// Check whether a node with `id` exists.
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Look up a node.
    pub fn node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| GraphError::UnknownId { id: id.to_string() })
    }

    /// Look up a node for mutation (for example to change a stored value).
    pub fn node_mut(&mut self, id: &str) -> Result<&mut Node> {
        if !self.contains_node(id) {
            return Err(GraphError::UnknownId { id: id.to_string() });
        }
        self.touch();
        self.nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownId { id: id.to_string() })
    }

    /// Look up a node's operator as its concrete type.
    pub fn get_node_ref_by_id<T: Operator>(&self, id: &str) -> Result<&T> {
        self.node(id)?
            .operator::<T>()
            .ok_or_else(|| GraphError::NodeTypeMismatch {
                id: id.to_string(),
                requested: Node::operator_type_name::<T>(),
            })
    }

    /// Mutable form of [`get_node_ref_by_id`](Self::get_node_ref_by_id).
    pub fn get_node_mut_by_id<T: Operator>(&mut self, id: &str) -> Result<&mut T> {
        self.node_mut(id)?
            .operator_mut::<T>()
            .ok_or_else(|| GraphError::NodeTypeMismatch {
                id: id.to_string(),
                requested: Node::operator_type_name::<T>(),
            })
    }

    // ------------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------------

    /// All links, in creation order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Resolve both endpoints of a prospective link and check directions.
    fn resolve_link(&self, from: &str, port_from: PortRef, to: &str, port_to: PortRef) -> Result<Link> {
        let from_node = self.node(from)?;
        let to_node = self.node(to)?;

        let from_index = from_node.ports().resolve(&port_from)?;
        let from_port = from_node.ports().get(from_index)?;
        if from_port.direction() != Direction::Out {
            return Err(GraphError::InvalidDirection {
                node: from.to_string(),
                port: from_port.label().to_string(),
                expected: Direction::Out,
            });
        }

        let to_index = to_node.ports().resolve(&port_to)?;
        let to_port = to_node.ports().get(to_index)?;
        if to_port.direction() != Direction::In {
            return Err(GraphError::InvalidDirection {
                node: to.to_string(),
                port: to_port.label().to_string(),
                expected: Direction::In,
            });
        }

        Ok(Link::new(from, from_index, to, to_index))
    }

    /// Connect an output port to an input port. Ports are addressed by index
    /// or label.
    ///
    /// Returns `Ok(false)` without changing anything if the identical link
    /// already exists. Value types are not checked: a mismatched input simply
    /// reads as absent.
    pub fn new_link(
        &mut self,
        from: &str,
        port_from: impl Into<PortRef>,
        to: &str,
        port_to: impl Into<PortRef>,
    ) -> Result<bool> {
        let link = self.resolve_link(from, port_from.into(), to, port_to.into())?;

        if self.links.contains(&link) {
            tracing::debug!(graph = %self.config.label, %link, "link already exists");
            return Ok(false);
        }

        if self.links.iter().any(|l| l.targets(&link.to, link.port_to)) {
            let port = self.node(to)?.port_label(link.port_to)?.to_string();
            return Err(GraphError::InputAlreadyConnected {
                node: to.to_string(),
                port,
            });
        }

        if self.config.cycle_policy == CyclePolicy::Reject
            && self.scheduler().would_cycle(&link.from, &link.to)
        {
            return Err(GraphError::CycleDetected {
                from: link.from,
                to: link.to,
            });
        }

        let cell = self
            .node(from)?
            .ports()
            .get(link.port_from)?
            .owned_cell()
            .cloned()
            .ok_or_else(|| GraphError::InvalidDirection {
                node: from.to_string(),
                port: link.port_from.to_string(),
                expected: Direction::Out,
            })?;

        if let Some(port) = self
            .nodes
            .get_mut(to)
            .and_then(|node| node.port_mut(link.port_to))
        {
            port.observe(&cell);
        }

        tracing::debug!(graph = %self.config.label, %link, "link created");
        self.links.push(link);
        self.touch();
        Ok(true)
    }

    /// Disconnect an output port from an input port.
    ///
    /// Returns `Ok(false)` if no such link exists.
    pub fn remove_link(
        &mut self,
        from: &str,
        port_from: impl Into<PortRef>,
        to: &str,
        port_to: impl Into<PortRef>,
    ) -> Result<bool> {
        let link = self.resolve_link(from, port_from.into(), to, port_to.into())?;

        let Some(position) = self.links.iter().position(|l| *l == link) else {
            return Ok(false);
        };

        if let Some(port) = self
            .nodes
            .get_mut(to)
            .and_then(|node| node.port_mut(link.port_to))
        {
            port.detach();
        }
        self.links.remove(position);

        tracing::debug!(graph = %self.config.label, %link, "link removed");
        self.touch();
        Ok(true)
    }

    /// Check whether a port has a link, according to the link list.
    pub fn is_port_connected(&self, node_id: &str, port: impl Into<PortRef>) -> Result<bool> {
        let node = self.node(node_id)?;
        let index = node.ports().resolve(&port.into())?;
        let connected = match node.ports().get(index)?.direction() {
            Direction::In => self.links.iter().any(|l| l.targets(node_id, index)),
            Direction::Out => self.links.iter().any(|l| l.sources(node_id, index)),
        };
        Ok(connected)
    }

    // ------------------------------------------------------------------------
    // Connectivity
    // ------------------------------------------------------------------------

    fn connectivity<'a>(&'a self, edge: impl Fn(&'a Link) -> (&'a str, &'a str)) -> Connectivity {
        // Every node is a key, even without neighbours
        let mut connectivity: Connectivity = self
            .nodes
            .keys()
            .map(|id| (id.clone(), Vec::new()))
            .collect();

        for link in &self.links {
            let (key, neighbour) = edge(link);
            if let Some(list) = connectivity.get_mut(key) {
                list.push(neighbour.to_string());
            }
        }
        connectivity
    }

    /// For every node, the ids of the nodes feeding it.
    pub fn get_connectivity_upstream(&self) -> Connectivity {
        self.connectivity(|link| (link.to.as_str(), link.from.as_str()))
    }

    /// For every node, the ids of the nodes it feeds.
    pub fn get_connectivity_downstream(&self) -> Connectivity {
        self.connectivity(|link| (link.from.as_str(), link.to.as_str()))
    }

    /// A scheduler over the current connectivity.
    pub fn scheduler(&self) -> UpdateScheduler {
        UpdateScheduler::new(self.get_connectivity_upstream(), self.get_connectivity_downstream())
    }

    /// Check whether the graph contains a dependency cycle.
    pub fn is_cyclic(&self) -> bool {
        self.scheduler().is_cyclic()
    }

    // ------------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------------

    /// Install a callback invoked before and after every node update.
    pub fn set_update_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&str, &[String], UpdatePhase) + Send + 'static,
    {
        self.update_callback = Some(Box::new(callback));
    }

    /// Install a hook invoked once after every update pass.
    pub fn set_post_update<F>(&mut self, hook: F)
    where
        F: FnMut(&UpdateReport) + Send + 'static,
    {
        self.post_update = Some(Box::new(hook));
    }

    /// Mark every node dirty and recompute the whole graph in topological
    /// order.
    ///
    /// If nothing has changed since the last full pass that left the graph
    /// clean, no node is computed. "Changed" means a mutable access through
    /// the graph (`node_mut`, linking, adding or removing nodes, ...). An
    /// operator that reads state from outside the graph, such as a captured
    /// `Arc`, is not re-run by this call until the host signals the change,
    /// e.g. with `graph.node_mut(id)?.mark_dirty()`.
    pub fn update(&mut self) -> UpdateReport {
        if self.clean_revision == Some(self.revision) {
            tracing::debug!(graph = %self.config.label, "graph unchanged, nothing to update");
            let report = UpdateReport::unchanged();
            self.run_post_update(&report);
            return report;
        }

        tracing::debug!(graph = %self.config.label, nodes = self.nodes.len(), "full update");

        for node in self.nodes.values_mut() {
            node.mark_dirty();
        }
        let dirty: IndexSet<String> = self.nodes.keys().cloned().collect();
        let schedule = self.scheduler().topological_sort(&dirty);

        let report = self.execute(schedule);
        if report.unscheduled.is_empty() {
            self.clean_revision = Some(self.revision);
        }
        report
    }

    /// Recompute `id` and everything downstream of it.
    ///
    /// Refused (status [`UpdateStatus::Deferred`], no node touched) when any
    /// direct upstream neighbour of `id` is still dirty, since `id` would read
    /// stale inputs.
    pub fn update_node(&mut self, id: &str) -> Result<UpdateReport> {
        if !self.contains_node(id) {
            return Err(GraphError::UnknownId { id: id.to_string() });
        }

        let scheduler = self.scheduler();

        let blocked_by: IndexSet<String> = scheduler
            .upstream(id)
            .iter()
            .filter(|up| self.nodes.get(up.as_str()).is_some_and(Node::is_dirty))
            .cloned()
            .collect();
        if !blocked_by.is_empty() {
            tracing::debug!(graph = %self.config.label, node = %id, blocked_by = ?blocked_by, "upstream not ready, update deferred");
            return Ok(UpdateReport::deferred(blocked_by.into_iter().collect()));
        }

        let affected = scheduler.collect_downstream(id);
        for node_id in &affected {
            if let Some(node) = self.nodes.get_mut(node_id) {
                node.mark_dirty();
            }
        }

        tracing::debug!(graph = %self.config.label, node = %id, affected = affected.len(), "incremental update");
        let schedule = scheduler.topological_sort(&affected);
        Ok(self.execute(schedule))
    }

    /// Run a schedule, then report and fire the post-update hook.
    fn execute(&mut self, schedule: Schedule) -> UpdateReport {
        tracing::trace!(graph = %self.config.label, order = ?schedule.order, "execution order");

        for node_id in &schedule.order {
            if let Some(callback) = self.update_callback.as_mut() {
                callback(node_id, &schedule.order, UpdatePhase::Before);
            }

            if let Some(node) = self.nodes.get_mut(node_id) {
                node.mark_dirty();
                if self.config.trace_updates {
                    tracing::trace!(node = %node_id, label = node.label(), "updating node");
                }
                node.update();
            }

            if let Some(callback) = self.update_callback.as_mut() {
                callback(node_id, &schedule.order, UpdatePhase::After);
            }
        }

        if !schedule.unscheduled.is_empty() && self.config.cycle_policy != CyclePolicy::Ignore {
            tracing::warn!(
                graph = %self.config.label,
                nodes = ?schedule.unscheduled,
                "cyclic dependency, nodes left dirty"
            );
        }

        let report = UpdateReport::completed(schedule);
        self.run_post_update(&report);
        report
    }

    fn run_post_update(&mut self, report: &UpdateReport) {
        if let Some(hook) = self.post_update.as_mut() {
            hook(report);
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("nodes", &self.nodes)
            .field("links", &self.links)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Nodes:")?;
        for (id, node) in &self.nodes {
            writeln!(f, "id: {}, label: {}, is_dirty: {}", id, node.label(), node.is_dirty())?;
        }
        writeln!(f, "Links:")?;
        for link in &self.links {
            writeln!(f, "{link}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Ports;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Holds a constant in its "value" output.
    struct Value;

    impl Operator for Value {
        fn compute(&mut self, _ports: &mut Ports) {}
    }

    fn value(v: f32) -> Node {
        Node::new("Value", Value).with_output("value", v)
    }

    /// Adds "a" and "b" into "a + b", counting runs.
    struct Add {
        runs: Arc<AtomicUsize>,
    }

    impl Operator for Add {
        fn compute(&mut self, ports: &mut Ports) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let a = ports.get_value::<f32>("a");
            let b = ports.get_value::<f32>("b");
            if let (Some(a), Some(b)) = (a, b) {
                ports.set_value("a + b", a + b).unwrap();
            }
        }
    }

    fn add() -> (Node, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let node = Node::new("Add", Add { runs: runs.clone() })
            .with_input::<f32>("a")
            .with_input::<f32>("b")
            .with_output("a + b", 0.0f32);
        (node, runs)
    }

    #[test]
    fn generated_ids_count_up() {
        let mut graph = Graph::new();
        assert_eq!(graph.add_node(value(1.0)).unwrap(), "0");
        assert_eq!(graph.add_node(value(2.0)).unwrap(), "1");
        assert_eq!(graph.add_node_with_id(value(3.0), "custom").unwrap(), "custom");
        assert_eq!(graph.add_node(value(4.0)).unwrap(), "2");

        let node = graph.node("custom").unwrap();
        assert_eq!(node.id(), "custom");
        assert_eq!(node.graph_id(), Some(graph.id()));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut graph = Graph::new();
        graph.add_node_with_id(value(1.0), "v").unwrap();
        let err = graph.add_node_with_id(value(2.0), "v").unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId { ref id } if id == "v"));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.node("v").unwrap().get_value::<f32>("value"), Some(1.0));
    }

    #[test]
    fn link_validates_directions() {
        let mut graph = Graph::new();
        let v = graph.add_node(value(1.0)).unwrap();
        let (node, _) = add();
        let a = graph.add_node(node).unwrap();

        let err = graph.new_link(&a, "a", &v, "value").unwrap_err();
        assert!(matches!(err, GraphError::InvalidDirection { expected: Direction::Out, .. }));

        let err = graph.new_link(&v, "value", &a, "a + b").unwrap_err();
        assert!(matches!(err, GraphError::InvalidDirection { expected: Direction::In, .. }));

        let err = graph.new_link(&v, "value", "ghost", "a").unwrap_err();
        assert!(matches!(err, GraphError::UnknownId { .. }));

        let err = graph.new_link(&v, 3usize, &a, "a").unwrap_err();
        assert!(matches!(err, GraphError::IndexOutOfRange { .. }));

        assert!(graph.links().is_empty());
    }

    #[test]
    fn duplicate_link_is_refused() {
        let mut graph = Graph::new();
        let v = graph.add_node(value(1.0)).unwrap();
        let (node, _) = add();
        let a = graph.add_node(node).unwrap();

        assert!(graph.new_link(&v, "value", &a, "a").unwrap());
        assert!(!graph.new_link(&v, 0usize, &a, 0usize).unwrap());
        assert_eq!(graph.links().len(), 1);
    }

    #[test]
    fn occupied_input_is_refused() {
        let mut graph = Graph::new();
        let v1 = graph.add_node(value(1.0)).unwrap();
        let v2 = graph.add_node(value(2.0)).unwrap();
        let (node, _) = add();
        let a = graph.add_node(node).unwrap();

        graph.new_link(&v1, "value", &a, "a").unwrap();
        let err = graph.new_link(&v2, "value", &a, "a").unwrap_err();
        assert!(matches!(err, GraphError::InputAlreadyConnected { ref port, .. } if port == "a"));
        assert_eq!(graph.node(&a).unwrap().get_value::<f32>("a"), Some(1.0));

        graph.remove_link(&v1, "value", &a, "a").unwrap();
        assert!(graph.new_link(&v2, "value", &a, "a").unwrap());
        assert_eq!(graph.node(&a).unwrap().get_value::<f32>("a"), Some(2.0));
    }

    #[test]
    fn remove_link_clears_the_input() {
        let mut graph = Graph::new();
        let v = graph.add_node(value(5.0)).unwrap();
        let (node, _) = add();
        let a = graph.add_node(node).unwrap();

        graph.new_link(&v, "value", &a, "b").unwrap();
        assert!(graph.is_port_connected(&a, "b").unwrap());
        assert!(graph.is_port_connected(&v, "value").unwrap());
        assert!(graph.node(&v).unwrap().is_port_connected("value"));

        assert!(graph.remove_link(&v, "value", &a, "b").unwrap());
        assert!(!graph.remove_link(&v, "value", &a, "b").unwrap());
        assert_eq!(graph.node(&a).unwrap().get_value::<f32>("b"), None);
        assert!(!graph.is_port_connected(&a, "b").unwrap());
        assert!(!graph.node(&v).unwrap().is_port_connected("value"));
    }

    #[test]
    fn connectivity_lists_every_node() {
        let mut graph = Graph::new();
        let v1 = graph.add_node(value(1.0)).unwrap();
        let v2 = graph.add_node(value(2.0)).unwrap();
        let (node, _) = add();
        let a = graph.add_node(node).unwrap();
        let lonely = graph.add_node(value(0.0)).unwrap();

        graph.new_link(&v1, "value", &a, "a").unwrap();
        graph.new_link(&v2, "value", &a, "b").unwrap();

        let up = graph.get_connectivity_upstream();
        assert_eq!(up.len(), 4);
        assert_eq!(up[&a], vec![v1.clone(), v2.clone()]);
        assert!(up[&lonely].is_empty());

        let down = graph.get_connectivity_downstream();
        assert_eq!(down[&v1], vec![a.clone()]);
        assert!(down[&a].is_empty());
    }

    #[test]
    fn update_computes_in_order_and_reports() {
        let mut graph = Graph::new();
        let v1 = graph.add_node(value(3.0)).unwrap();
        let v2 = graph.add_node(value(4.0)).unwrap();
        let (node, runs) = add();
        let a = graph.add_node(node).unwrap();
        graph.new_link(&v1, "value", &a, "a").unwrap();
        graph.new_link(&v2, "value", &a, "b").unwrap();

        let report = graph.update();
        assert_eq!(report.status, UpdateStatus::Completed);
        assert_eq!(report.order, vec![v1, v2, a.clone()]);
        assert!(report.is_complete());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(graph.node(&a).unwrap().get_value::<f32>("a + b"), Some(7.0));
        assert!(graph.nodes().all(|n| !n.is_dirty()));
    }

    #[test]
    fn second_update_is_a_no_op() {
        let mut graph = Graph::new();
        let (node, runs) = add();
        graph.add_node(node).unwrap();

        graph.update();
        let report = graph.update();
        assert_eq!(report.status, UpdateStatus::Unchanged);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Any mutable access invalidates the clean state
        graph.node_mut("0").unwrap();
        graph.update();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    /// Emits a value held outside the graph.
    struct External {
        source: Arc<Mutex<f32>>,
    }

    impl Operator for External {
        fn compute(&mut self, ports: &mut Ports) {
            let v = *self.source.lock().unwrap();
            ports.set_value("value", v).unwrap();
        }
    }

    #[test]
    fn external_state_needs_an_explicit_dirty_mark() {
        let source = Arc::new(Mutex::new(1.0f32));
        let mut graph = Graph::new();
        let ext = graph
            .add_node(Node::new("External", External { source: source.clone() }).with_output("value", 0.0f32))
            .unwrap();
        graph.update();
        assert_eq!(graph.node(&ext).unwrap().get_value::<f32>("value"), Some(1.0));

        // The graph cannot see this change
        *source.lock().unwrap() = 2.0;
        assert_eq!(graph.update().status, UpdateStatus::Unchanged);
        assert_eq!(graph.node(&ext).unwrap().get_value::<f32>("value"), Some(1.0));

        graph.node_mut(&ext).unwrap().mark_dirty();
        assert_eq!(graph.update().status, UpdateStatus::Completed);
        assert_eq!(graph.node(&ext).unwrap().get_value::<f32>("value"), Some(2.0));
    }

    #[test]
    fn callbacks_bracket_each_node() {
        let mut graph = Graph::new();
        let v = graph.add_node(value(1.0)).unwrap();
        let (node, _) = add();
        let a = graph.add_node(node).unwrap();
        graph.new_link(&v, "value", &a, "a").unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        graph.set_update_callback(move |id, order, phase| {
            sink.lock().unwrap().push((id.to_string(), order.len(), phase));
        });
        let passes = Arc::new(AtomicUsize::new(0));
        let counter = passes.clone();
        graph.set_post_update(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        graph.update();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (v.clone(), 2, UpdatePhase::Before),
                (v, 2, UpdatePhase::After),
                (a.clone(), 2, UpdatePhase::Before),
                (a, 2, UpdatePhase::After),
            ]
        );
        assert_eq!(passes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reject_policy_blocks_cycles() {
        let config = GraphConfig::default().with_cycle_policy(CyclePolicy::Reject);
        let mut graph = Graph::with_config(config);
        let (n1, _) = add();
        let (n2, _) = add();
        let a = graph.add_node(n1).unwrap();
        let b = graph.add_node(n2).unwrap();

        graph.new_link(&a, "a + b", &b, "a").unwrap();
        let err = graph.new_link(&b, "a + b", &a, "a").unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
        let err = graph.new_link(&a, "a + b", &a, "b").unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
        assert_eq!(graph.links().len(), 1);
        assert!(!graph.is_cyclic());
    }

    #[test]
    fn typed_lookup() {
        let mut graph = Graph::new();
        let v = graph.add_node(value(1.0)).unwrap();
        assert!(graph.get_node_ref_by_id::<Value>(&v).is_ok());
        assert!(matches!(
            graph.get_node_ref_by_id::<Add>(&v),
            Err(GraphError::NodeTypeMismatch { .. })
        ));
        assert!(matches!(
            graph.get_node_mut_by_id::<Value>("nope"),
            Err(GraphError::UnknownId { .. })
        ));
    }

    #[test]
    fn clear_resets_everything() {
        let mut graph = Graph::new();
        let v = graph.add_node(value(1.0)).unwrap();
        let (node, _) = add();
        let a = graph.add_node(node).unwrap();
        graph.new_link(&v, "value", &a, "a").unwrap();
        assert!(graph.node(&v).unwrap().is_port_connected("value"));

        graph.clear();
        assert!(graph.is_empty());
        assert!(graph.links().is_empty());
        assert_eq!(graph.add_node(value(2.0)).unwrap(), "0");
    }

    #[test]
    fn display_lists_nodes_and_links() {
        let mut graph = Graph::new();
        let v = graph.add_node(value(1.0)).unwrap();
        let (node, _) = add();
        let a = graph.add_node(node).unwrap();
        graph.new_link(&v, "value", &a, "b").unwrap();

        let text = graph.to_string();
        assert_eq!(
            text,
            "Nodes:\n\
             id: 0, label: Value, is_dirty: true\n\
             id: 1, label: Add, is_dirty: true\n\
             Links:\n\
             from: 0(0) to: 1(1)\n"
        );
    }
}
