use std::collections::HashSet;

use crate::graph::EdgeRef;
use crate::scc::DirectedGraph;

/// A view of a graph with a set of edges removed.  Node ids are unchanged;
/// edge indices are renumbered, and `original_edge` maps them back.
///
/// This is how "what if we ignore these edges" questions get answered:
/// compute `cycles` over the view, then map its edges back to the full graph.
pub struct EdgeRemoved {
    to: Vec<Vec<usize>>,
    /// `edge_map[n][i]` is the index in the underlying graph of this view's
    /// edge `(n, i)`.
    edge_map: Vec<Vec<usize>>,
}

impl EdgeRemoved {
    pub fn new<G: DirectedGraph + ?Sized>(g: &G, excluded: &[EdgeRef]) -> EdgeRemoved {
        let excluded: HashSet<EdgeRef> = excluded.iter().copied().collect();
        let mut to = Vec::with_capacity(g.num_nodes());
        let mut edge_map = Vec::with_capacity(g.num_nodes());
        for node in 0..g.num_nodes() {
            let (kept_to, kept_idx): (Vec<usize>, Vec<usize>) = g
                .out(node)
                .iter()
                .enumerate()
                .filter(|(i, _)| !excluded.contains(&EdgeRef::new(node, *i)))
                .map(|(i, &target)| (target, i))
                .unzip();
            to.push(kept_to);
            edge_map.push(kept_idx);
        }
        EdgeRemoved { to, edge_map }
    }

    pub fn original_edge(&self, edge: EdgeRef) -> EdgeRef {
        EdgeRef::new(edge.node, self.edge_map[edge.node][edge.edge])
    }
}

impl DirectedGraph for EdgeRemoved {
    fn num_nodes(&self) -> usize {
        self.to.len()
    }

    fn out(&self, node: usize) -> &[usize] {
        &self.to[node]
    }
}
