//! Update Scheduler
//!
//! The scheduler determines the order in which dirty nodes should be updated.
//! It ensures that upstream nodes are always updated before their downstream
//! nodes.
//!
//! # Algorithm
//!
//! 1. For an incremental update, walk the downstream connectivity depth-first
//!    from the changed node to collect every node it can affect.
//! 2. Sort that set topologically with Kahn's algorithm, counting only edges
//!    whose both ends are in the set. Upstream nodes outside the set are
//!    already clean and act as fixed inputs.
//! 3. Nodes on a cycle never reach in-degree zero. They are reported as
//!    unscheduled instead of being executed.
//!
//! Ties between nodes that become ready together are broken by node insertion
//! order, which is the iteration order of the connectivity maps.

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use smallvec::SmallVec;

/// For every node id, the ids of its neighbours in one direction. Every node
/// appears as a key, in insertion order; neighbour lists follow link order and
/// keep duplicates when two nodes share several links.
pub type Connectivity = IndexMap<String, Vec<String>>;

/// Neighbour positions within the connectivity maps.
type Adjacency = Vec<SmallVec<[usize; 4]>>;

/// The result of sorting a dirty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Nodes in execution order.
    pub order: Vec<String>,

    /// Dirty nodes that could not be ordered (they sit on or behind a cycle).
    pub unscheduled: Vec<String>,
}

/// Computes execution orders over a snapshot of the graph connectivity.
#[derive(Debug, Clone)]
pub struct UpdateScheduler {
    upstream: Connectivity,
    downstream: Connectivity,
}

impl UpdateScheduler {
    /// Create a scheduler from upstream and downstream connectivity maps.
    ///
    /// Both maps must list the same nodes in the same order.
    pub fn new(upstream: Connectivity, downstream: Connectivity) -> Self {
        Self {
            upstream,
            downstream,
        }
    }

    /// Ids of the nodes feeding `node_id`.
    pub fn upstream(&self, node_id: &str) -> &[String] {
        self.upstream.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids of the nodes fed by `node_id`.
    pub fn downstream(&self, node_id: &str) -> &[String] {
        self.downstream.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Get the total number of nodes known to the scheduler.
    pub fn node_count(&self) -> usize {
        self.upstream.len()
    }

    /// Collect `start` and every node reachable downstream from it, in
    /// depth-first discovery order.
    pub fn collect_downstream(&self, start: &str) -> IndexSet<String> {
        let mut visited = IndexSet::new();
        let mut stack = vec![start];

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id.to_string()) {
                continue;
            }
            // Reverse so the first listed neighbour is explored first
            for next in self.downstream(node_id).iter().rev() {
                if !visited.contains(next.as_str()) {
                    stack.push(next);
                }
            }
        }

        visited
    }

    /// Perform a topological sort of the nodes in `dirty`.
    ///
    /// Returns nodes in order such that upstream nodes come before downstream
    /// ones. Ids in `dirty` that the scheduler does not know are ignored.
    pub fn topological_sort(&self, dirty: &IndexSet<String>) -> Schedule {
        let upstream = self.adjacency(&self.upstream);
        let downstream = self.adjacency(&self.downstream);

        // `None` marks nodes outside the dirty set
        let mut in_degree: Vec<Option<usize>> = self
            .upstream
            .keys()
            .map(|id| dirty.contains(id).then_some(0))
            .collect();

        // Calculate in-degrees (only counting edges within the dirty set)
        let mut queue = VecDeque::new();
        for index in 0..in_degree.len() {
            if in_degree[index].is_none() {
                continue;
            }
            let degree = upstream[index]
                .iter()
                .filter(|&&up| in_degree[up].is_some())
                .count();
            in_degree[index] = Some(degree);
            if degree == 0 {
                queue.push_back(index);
            }
        }

        // Kahn's algorithm
        let mut scheduled = vec![false; in_degree.len()];
        let mut order = Vec::new();
        while let Some(index) = queue.pop_front() {
            scheduled[index] = true;
            order.push(index);

            for &next in &downstream[index] {
                if let Some(degree) = in_degree[next].as_mut() {
                    if *degree > 0 {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(next);
                        }
                    }
                }
            }
        }

        let unscheduled = (0..in_degree.len())
            .filter(|&index| in_degree[index].is_some() && !scheduled[index])
            .map(|index| self.key(index))
            .collect();

        Schedule {
            order: order.into_iter().map(|index| self.key(index)).collect(),
            unscheduled,
        }
    }

    /// Check whether the whole graph contains a cycle.
    pub fn is_cyclic(&self) -> bool {
        let all: IndexSet<String> = self.upstream.keys().cloned().collect();
        !self.topological_sort(&all).unscheduled.is_empty()
    }

    /// Check whether a new edge `from -> to` would close a cycle.
    pub fn would_cycle(&self, from: &str, to: &str) -> bool {
        from == to || self.collect_downstream(to).contains(from)
    }

    fn adjacency(&self, connectivity: &Connectivity) -> Adjacency {
        connectivity
            .values()
            .map(|neighbours| {
                neighbours
                    .iter()
                    .filter_map(|id| self.upstream.get_index_of(id))
                    .collect()
            })
            .collect()
    }

    fn key(&self, index: usize) -> String {
        self.upstream
            .get_index(index)
            .map(|(id, _)| id.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a scheduler from node ids and `(from, to)` edges.
    fn scheduler(nodes: &[&str], edges: &[(&str, &str)]) -> UpdateScheduler {
        let mut upstream = Connectivity::new();
        let mut downstream = Connectivity::new();
        for node in nodes {
            upstream.insert(node.to_string(), Vec::new());
            downstream.insert(node.to_string(), Vec::new());
        }
        for (from, to) in edges {
            downstream[*from].push(to.to_string());
            upstream[*to].push(from.to_string());
        }
        UpdateScheduler::new(upstream, downstream)
    }

    fn set(ids: &[&str]) -> IndexSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn chain_sorts_in_dependency_order() {
        let s = scheduler(&["c", "b", "a"], &[("a", "b"), ("b", "c")]);
        let schedule = s.topological_sort(&set(&["a", "b", "c"]));
        assert_eq!(schedule.order, vec!["a", "b", "c"]);
        assert!(schedule.unscheduled.is_empty());
    }

    #[test]
    fn ties_follow_insertion_order() {
        let s = scheduler(&["v2", "v1", "add"], &[("v1", "add"), ("v2", "add")]);
        let schedule = s.topological_sort(&set(&["add", "v1", "v2"]));
        assert_eq!(schedule.order, vec!["v2", "v1", "add"]);
    }

    #[test]
    fn diamond_respects_every_edge() {
        let edges = [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")];
        let s = scheduler(&["d", "c", "b", "a"], &edges);
        let schedule = s.topological_sort(&set(&["a", "b", "c", "d"]));
        assert_eq!(schedule.order.len(), 4);
        for (from, to) in edges {
            assert!(position(&schedule.order, from) < position(&schedule.order, to));
        }
    }

    #[test]
    fn nodes_outside_the_set_are_boundaries() {
        // "a" is clean, so "b" is ready immediately
        let s = scheduler(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let schedule = s.topological_sort(&set(&["b", "c"]));
        assert_eq!(schedule.order, vec!["b", "c"]);
    }

    #[test]
    fn parallel_links_count_once_per_link() {
        let s = scheduler(&["a", "b"], &[("a", "b"), ("a", "b")]);
        let schedule = s.topological_sort(&set(&["a", "b"]));
        assert_eq!(schedule.order, vec!["a", "b"]);
    }

    #[test]
    fn cycles_are_left_unscheduled() {
        let s = scheduler(&["src", "a", "b", "sink"], &[("src", "a"), ("a", "b"), ("b", "a"), ("b", "sink")]);
        let schedule = s.topological_sort(&set(&["src", "a", "b", "sink"]));
        assert_eq!(schedule.order, vec!["src"]);
        assert_eq!(schedule.unscheduled, vec!["a", "b", "sink"]);
        assert!(s.is_cyclic());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let s = scheduler(&["a"], &[("a", "a")]);
        assert!(s.is_cyclic());
        assert!(s.topological_sort(&set(&["a"])).order.is_empty());
    }

    #[test]
    fn collect_downstream_is_transitive() {
        let s = scheduler(
            &["v1", "v2", "add", "print", "other"],
            &[("v1", "add"), ("v2", "add"), ("add", "print")],
        );
        let reached = s.collect_downstream("v1");
        assert_eq!(reached, set(&["v1", "add", "print"]));
        assert!(!reached.contains("v2"));
        assert!(!reached.contains("other"));
    }

    #[test]
    fn collect_downstream_terminates_on_cycles() {
        let s = scheduler(&["a", "b"], &[("a", "b"), ("b", "a")]);
        assert_eq!(s.collect_downstream("a"), set(&["a", "b"]));
    }

    #[test]
    fn cycle_prediction() {
        let s = scheduler(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        assert!(s.would_cycle("c", "a"));
        assert!(s.would_cycle("b", "b"));
        assert!(!s.would_cycle("a", "c"));
        assert!(!s.is_cyclic());
    }

    #[test]
    fn neighbour_queries() {
        let s = scheduler(&["a", "b"], &[("a", "b")]);
        assert_eq!(s.upstream("b"), ["a".to_string()]);
        assert_eq!(s.downstream("a"), ["b".to_string()]);
        assert!(s.upstream("missing").is_empty());
        assert_eq!(s.node_count(), 2);
    }
}
