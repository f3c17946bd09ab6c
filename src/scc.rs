//! Strongly connected components and cycle detection.
//!
//! The algorithms here only see a graph through `DirectedGraph`: a node count
//! and a successor list per node, with edges identified by their position in
//! that list.  They know nothing about locks or stacks, so they run equally
//! well on a lock `Graph`, on an `EdgeRemoved` view of one, or on a synthetic
//! adjacency list in a test.
//!
//! The SCC computation itself is petgraph's Kosaraju, driven through a thin
//! adapter that implements petgraph's visitor traits on top of
//! `DirectedGraph`.  Kosaraju walks with explicit stacks, so arbitrarily long
//! chains of locks do not exhaust the thread's stack.

use std::collections::HashSet;
use std::ops::Range;

use petgraph::visit::{
    GraphBase, GraphRef, IntoNeighbors, IntoNeighborsDirected, IntoNodeIdentifiers, Visitable,
};
use petgraph::Direction;
use serde_json::{json, Value};

use crate::graph::{node_name, EdgeRef};

/// A directed multigraph over dense node ids `0..num_nodes()`.
pub trait DirectedGraph {
    fn num_nodes(&self) -> usize;

    /// Targets of the out-edges of `node`; the position in the slice is the
    /// edge index.
    fn out(&self, node: usize) -> &[usize];
}

/// Plain adjacency lists.
impl DirectedGraph for Vec<Vec<usize>> {
    fn num_nodes(&self) -> usize {
        self.len()
    }

    fn out(&self, node: usize) -> &[usize] {
        &self[node]
    }
}

/// Predecessor lists of `g`, one entry per edge.
fn incoming<G: DirectedGraph + ?Sized>(g: &G) -> Vec<Vec<usize>> {
    let mut incoming = vec![vec![]; g.num_nodes()];
    for node in 0..g.num_nodes() {
        for &target in g.out(node) {
            incoming[target].push(node);
        }
    }
    incoming
}

/// Borrowed `DirectedGraph` wearing petgraph's visitor traits.
struct Petgraph<'a, G: ?Sized> {
    graph: &'a G,
    incoming: &'a [Vec<usize>],
}

impl<'a, G: ?Sized> Clone for Petgraph<'a, G> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, G: ?Sized> Copy for Petgraph<'a, G> {}

impl<'a, G: DirectedGraph + ?Sized> GraphBase for Petgraph<'a, G> {
    type EdgeId = (usize, usize);
    type NodeId = usize;
}

impl<'a, G: DirectedGraph + ?Sized> GraphRef for Petgraph<'a, G> {}

impl<'a, G: DirectedGraph + ?Sized> IntoNeighbors for Petgraph<'a, G> {
    type Neighbors = std::iter::Copied<std::slice::Iter<'a, usize>>;

    fn neighbors(self, node: usize) -> Self::Neighbors {
        self.graph.out(node).iter().copied()
    }
}

impl<'a, G: DirectedGraph + ?Sized> IntoNeighborsDirected for Petgraph<'a, G> {
    type NeighborsDirected = std::iter::Copied<std::slice::Iter<'a, usize>>;

    fn neighbors_directed(self, node: usize, dir: Direction) -> Self::NeighborsDirected {
        match dir {
            Direction::Outgoing => self.graph.out(node).iter().copied(),
            Direction::Incoming => self.incoming[node].iter().copied(),
        }
    }
}

impl<'a, G: DirectedGraph + ?Sized> IntoNodeIdentifiers for Petgraph<'a, G> {
    type NodeIdentifiers = Range<usize>;

    fn node_identifiers(self) -> Range<usize> {
        0..self.graph.num_nodes()
    }
}

impl<'a, G: DirectedGraph + ?Sized> Visitable for Petgraph<'a, G> {
    type Map = HashSet<usize>;

    fn visit_map(&self) -> HashSet<usize> {
        HashSet::with_capacity(self.graph.num_nodes())
    }

    fn reset_map(&self, map: &mut HashSet<usize>) {
        map.clear();
    }
}

/// The strongly connected components of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components {
    /// Components in topological order: an edge between two different
    /// components always goes from an earlier one to a later one.  Members
    /// are sorted by node id.
    pub components: Vec<Vec<usize>>,
    /// `component_of[n]` is the index into `components` of node `n`'s
    /// component.
    pub component_of: Vec<usize>,
}

impl Components {
    pub fn new<G: DirectedGraph + ?Sized>(g: &G) -> Components {
        let preds = incoming(g);
        // Kosaraju yields components in reverse topological order.
        let mut components = petgraph::algo::kosaraju_scc(Petgraph {
            graph: g,
            incoming: &preds,
        });
        components.reverse();

        let mut component_of = vec![0; g.num_nodes()];
        for (c, members) in components.iter_mut().enumerate() {
            members.sort_unstable();
            for &n in members.iter() {
                component_of[n] = c;
            }
        }
        Components {
            components,
            component_of,
        }
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn same_component(&self, a: usize, b: usize) -> bool {
        self.component_of[a] == self.component_of[b]
    }
}

/// The nodes and edges of a graph that lie on at least one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSet {
    pub nodes: Vec<usize>,
    pub edges: Vec<EdgeRef>,
}

impl CycleSet {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rewrites edge refs, e.g. from a view back to its underlying graph.
    pub fn map_edges(self, f: impl Fn(EdgeRef) -> EdgeRef) -> CycleSet {
        CycleSet {
            nodes: self.nodes,
            edges: self.edges.into_iter().map(f).collect(),
        }
    }

    /// `{"nodes": ["n0", ...], "edges": ["e0-1", ...]}`
    pub fn to_json(&self) -> Value {
        json!({
            "nodes": self.nodes.iter().map(|&n| node_name(n)).collect::<Vec<_>>(),
            "edges": self.edges.iter().map(|e| e.to_string()).collect::<Vec<_>>(),
        })
    }
}

/// Finds every node and edge participating in a cycle.
///
/// A node is on a cycle when its strongly connected component has more than
/// one member.  A node whose only cycle is a self-loop is therefore *not*
/// reported.  An edge is reported when both of its endpoints are in the same
/// such component; an edge joining two different cyclic components is not.
///
/// Nodes come out grouped by component in topological order, ascending
/// within a component; edges follow their source nodes.
pub fn cycles<G: DirectedGraph + ?Sized>(g: &G) -> CycleSet {
    let comps = Components::new(g);

    let mut set = CycleSet::default();
    for members in comps.components.iter().filter(|m| m.len() > 1) {
        set.nodes.extend_from_slice(members);
    }
    for &node in &set.nodes {
        for (i, &target) in g.out(node).iter().enumerate() {
            if comps.same_component(node, target) {
                set.edges.push(EdgeRef::new(node, i));
            }
        }
    }
    debug!(
        nodes = set.nodes.len(),
        edges = set.edges.len(),
        components = comps.len(),
        "cycle detection done"
    );
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(node: usize, edge: usize) -> EdgeRef {
        EdgeRef::new(node, edge)
    }

    #[test]
    fn test_triangle_plus_isolated_node() {
        // A -> B -> C -> A, D alone.
        let g: Vec<Vec<usize>> = vec![vec![1], vec![2], vec![0], vec![]];
        let set = cycles(&g);
        assert_eq!(set.nodes, vec![0, 1, 2]);
        assert_eq!(set.edges, vec![e(0, 0), e(1, 0), e(2, 0)]);
    }

    #[test]
    fn test_acyclic() {
        let g: Vec<Vec<usize>> = vec![vec![1, 2], vec![2], vec![]];
        assert_eq!(cycles(&g), CycleSet::default());
    }

    #[test]
    fn test_two_node_cycle() {
        let g: Vec<Vec<usize>> = vec![vec![1], vec![0]];
        let set = cycles(&g);
        assert_eq!(set.nodes, vec![0, 1]);
        assert_eq!(set.edges, vec![e(0, 0), e(1, 0)]);
    }

    #[test]
    fn test_self_loop_is_not_a_cycle() {
        // A lone self-loop forms a one-node component, which does not count.
        let g: Vec<Vec<usize>> = vec![vec![0], vec![]];
        assert!(cycles(&g).is_empty());
        assert!(cycles(&g).edges.is_empty());
    }

    #[test]
    fn test_self_loop_inside_cycle_is_reported() {
        let g: Vec<Vec<usize>> = vec![vec![0, 1], vec![0]];
        let set = cycles(&g);
        assert_eq!(set.nodes, vec![0, 1]);
        assert_eq!(set.edges, vec![e(0, 0), e(0, 1), e(1, 0)]);
    }

    #[test]
    fn test_edges_between_cyclic_components_are_excluded() {
        // {0,1} and {2,3} are separate cycles joined by 1 -> 2.
        let g: Vec<Vec<usize>> = vec![vec![1], vec![0, 2], vec![3], vec![2]];
        let set = cycles(&g);
        assert_eq!(set.nodes, vec![0, 1, 2, 3]);
        assert_eq!(set.edges, vec![e(0, 0), e(1, 0), e(2, 0), e(3, 0)]);
    }

    #[test]
    fn test_parallel_edges() {
        let g: Vec<Vec<usize>> = vec![vec![1, 1], vec![0]];
        let set = cycles(&g);
        assert_eq!(set.edges, vec![e(0, 0), e(0, 1), e(1, 0)]);
    }

    #[test]
    fn test_components_are_topologically_ordered() {
        // 3 -> {0 <-> 1} -> 2
        let g: Vec<Vec<usize>> = vec![vec![1], vec![0, 2], vec![], vec![0]];
        let comps = Components::new(&g);
        assert_eq!(comps.components, vec![vec![3], vec![0, 1], vec![2]]);
        assert_eq!(comps.component_of, vec![1, 1, 2, 0]);
        for (n, out) in g.iter().enumerate() {
            for &t in out {
                assert!(comps.component_of[n] <= comps.component_of[t]);
            }
        }
    }

    #[test]
    fn test_long_ring() {
        let n = 100_000;
        let g: Vec<Vec<usize>> = (0..n).map(|i| vec![(i + 1) % n]).collect();
        let set = cycles(&g);
        assert_eq!(set.nodes.len(), n);
        assert_eq!(set.edges.len(), n);
        assert_eq!(Components::new(&g).len(), 1);
    }

    #[test]
    fn test_long_chain() {
        let n = 100_000;
        let g: Vec<Vec<usize>> = (0..n)
            .map(|i| if i + 1 < n { vec![i + 1] } else { vec![] })
            .collect();
        let comps = Components::new(&g);
        assert_eq!(comps.len(), n);
        assert_eq!(comps.components[0], vec![0]);
        assert_eq!(comps.components[n - 1], vec![n - 1]);
        assert!(cycles(&g).is_empty());
    }

    #[test]
    fn test_cycle_set_json() {
        let set = CycleSet {
            nodes: vec![0, 4],
            edges: vec![e(0, 1), e(4, 0)],
        };
        assert_eq!(
            set.to_json(),
            json!({"nodes": ["n0", "n4"], "edges": ["e0-1", "e4-0"]})
        );
    }
}
