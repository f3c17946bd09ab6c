//! The lock-class graph.
//!
//! Nodes are lock classes identified by dense `usize` ids.  An edge `A -> B`
//! means that B was observed being acquired while A was held, and carries
//! every pair of acquiring stacks that demonstrated it.  The graph is a
//! multigraph; nothing stops two `Edge`s from joining the same ordered pair
//! of nodes, although `GraphBuilder` always merges them.
//!
//! `Edges[n]` and `To[n]` are parallel arrays, so an edge is addressed by its
//! source node plus its position in that node's arrays (`EdgeRef`).
//!
//! The JSON field names (`Labels`, `Edges`, `To`, `StackTable`, `Stacks`,
//! `S1`, `S2`, `Count`, `Files`, `Funcs`) are the dump format and must not
//! change.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ReportConfig;
use crate::errors::{ErrorLayer, LockGraphError, Result};
use crate::scc::DirectedGraph;
use crate::stack::{null_as_default, Stack, StackTable};

/// Evidence for one edge: stack `s1` acquired the source lock, then with it
/// still held, stack `s2` acquired the target lock, `count` times.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackPair {
    #[serde(deserialize_with = "null_as_default")]
    pub s1: Stack,
    #[serde(deserialize_with = "null_as_default")]
    pub s2: Stack,
    pub count: u64,
}

/// All of the evidence for one edge, in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Edge {
    #[serde(deserialize_with = "null_as_default")]
    pub stacks: Vec<StackPair>,
}

impl Edge {
    pub fn new(stacks: Vec<StackPair>) -> Self {
        Edge { stacks }
    }

    /// Total number of observations across all stack pairs.
    pub fn total_count(&self) -> u64 {
        self.stacks.iter().map(|sp| sp.count).sum()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Graph {
    #[serde(deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
    /// `edges[n][e]` is the evidence for the `e`th out-edge of node `n`.
    /// `Edge`s are shared with graphs derived through `filter`.
    #[serde(deserialize_with = "nested_null_as_empty")]
    pub edges: Vec<Vec<Arc<Edge>>>,
    /// `to[n][e]` is the target node of `edges[n][e]`.
    #[serde(deserialize_with = "nested_null_as_empty")]
    pub to: Vec<Vec<usize>>,
    pub stack_table: Arc<StackTable>,
}

/// Addresses an edge by its source node and its index among that node's
/// out-edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeRef {
    pub node: usize,
    pub edge: usize,
}

impl EdgeRef {
    pub fn new(node: usize, edge: usize) -> Self {
        EdgeRef { node, edge }
    }
}

/// Edges print as `e<node>-<edge>`, the ids the viewer used in SVG output.
impl fmt::Display for EdgeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}-{}", self.node, self.edge)
    }
}

lazy_static! {
    static ref EDGE_ID_RE: Regex = Regex::new(r"^e(\d+)-(\d+)$").unwrap();
}

impl FromStr for EdgeRef {
    type Err = LockGraphError;

    fn from_str(s: &str) -> Result<EdgeRef> {
        let caps = EDGE_ID_RE
            .captures(s)
            .ok_or_else(|| LockGraphError::bad_input(format!("malformed edge ID: {:?}", s)))?;
        let parse = |i: usize| {
            caps[i]
                .parse::<usize>()
                .map_err(|e| LockGraphError::bad_input(format!("edge ID {:?}: {}", s, e)))
        };
        Ok(EdgeRef::new(parse(1)?, parse(2)?))
    }
}

/// Nodes print as `n<node>`.
pub fn node_name(node: usize) -> String {
    format!("n{}", node)
}

impl Graph {
    /// An empty graph whose stacks will be interned in `stack_table`.
    pub fn new(stack_table: Arc<StackTable>) -> Self {
        Graph {
            labels: vec![],
            edges: vec![],
            to: vec![],
            stack_table,
        }
    }

    pub fn add_node(&mut self, label: &str) -> usize {
        self.labels.push(label.to_string());
        self.edges.push(vec![]);
        self.to.push(vec![]);
        self.labels.len() - 1
    }

    /// Appends an edge.  Panics if either endpoint is not a node.
    pub fn add_edge(&mut self, from: usize, to: usize, edge: Edge) -> EdgeRef {
        assert!(
            from < self.labels.len() && to < self.labels.len(),
            "edge {} -> {} outside of graph with {} nodes",
            from,
            to,
            self.labels.len()
        );
        self.edges[from].push(Arc::new(edge));
        self.to[from].push(to);
        EdgeRef::new(from, self.to[from].len() - 1)
    }

    pub fn num_nodes(&self) -> usize {
        self.labels.len()
    }

    pub fn num_edges(&self) -> usize {
        self.to.iter().map(|out| out.len()).sum()
    }

    /// Successors of `node`, one per out-edge (so duplicates for parallel
    /// edges).
    pub fn out(&self, node: usize) -> &[usize] {
        &self.to[node]
    }

    /// Display label of `node` with the default prefix stripped.
    pub fn label(&self, node: usize) -> String {
        self.label_with(node, &ReportConfig::default())
    }

    pub fn label_with(&self, node: usize, config: &ReportConfig) -> String {
        let label = &self.labels[node];
        label
            .strip_prefix(config.label_prefix.as_str())
            .unwrap_or(label)
            .to_string()
    }

    pub fn edge(&self, edge: EdgeRef) -> &Arc<Edge> {
        &self.edges[edge.node][edge.edge]
    }

    pub fn target(&self, edge: EdgeRef) -> usize {
        self.to[edge.node][edge.edge]
    }

    /// Every edge, ordered by source node then edge index.
    pub fn edge_refs(&self) -> impl Iterator<Item = EdgeRef> + '_ {
        self.to
            .iter()
            .enumerate()
            .flat_map(|(node, out)| (0..out.len()).map(move |edge| EdgeRef::new(node, edge)))
    }

    pub fn num_stack_pairs(&self) -> usize {
        self.edges
            .iter()
            .flatten()
            .map(|edge| edge.stacks.len())
            .sum()
    }

    /// Projects the graph onto `nodes` and `edges`.  The `i`th entry of
    /// `nodes` becomes node `i` of the result.  Edge evidence and the stack
    /// table are shared with `self`, not copied.
    ///
    /// Every edge's source and target must be listed in `nodes`; passing a
    /// dangling edge is a caller bug and panics.
    pub fn filter(&self, nodes: &[usize], edges: &[EdgeRef]) -> Graph {
        let mut new_ids = HashMap::with_capacity(nodes.len());
        let mut out = Graph::new(Arc::clone(&self.stack_table));
        for &old in nodes {
            let new = out.add_node(&self.labels[old]);
            new_ids.insert(old, new);
        }

        for &edge in edges {
            let old_target = self.target(edge);
            let source = match new_ids.get(&edge.node) {
                Some(&n) => n,
                None => panic!("filter: source of edge {} is not in the node set", edge),
            };
            let target = match new_ids.get(&old_target) {
                Some(&n) => n,
                None => panic!(
                    "filter: target n{} of edge {} is not in the node set",
                    old_target, edge
                ),
            };
            out.edges[source].push(Arc::clone(self.edge(edge)));
            out.to[source].push(target);
        }
        out
    }

    /// Checks the structural invariants a decoded graph must satisfy.
    pub fn validate(&self) -> Result<()> {
        let structure = |message: String| LockGraphError::decode(ErrorLayer::Structure, message);

        let n = self.labels.len();
        if self.edges.len() != n || self.to.len() != n {
            return Err(structure(format!(
                "{} labels but {} edge lists and {} target lists",
                n,
                self.edges.len(),
                self.to.len()
            )));
        }
        for node in 0..n {
            if self.edges[node].len() != self.to[node].len() {
                return Err(structure(format!(
                    "node {} has {} edges but {} targets",
                    node,
                    self.edges[node].len(),
                    self.to[node].len()
                )));
            }
            if let Some(&bad) = self.to[node].iter().find(|&&t| t >= n) {
                return Err(structure(format!(
                    "node {} has an edge to nonexistent node {}",
                    node, bad
                )));
            }
        }
        for edge_ref in self.edge_refs() {
            for pair in &self.edge(edge_ref).stacks {
                if pair.count == 0 {
                    return Err(structure(format!("edge {} has a zero-count stack pair", edge_ref)));
                }
                for pos in pair.s1.frames().iter().chain(pair.s2.frames()) {
                    self.stack_table
                        .check_pos(pos)
                        .map_err(|e| structure(format!("edge {}: {}", edge_ref, e)))?;
                }
            }
        }
        Ok(())
    }
}

impl DirectedGraph for Graph {
    fn num_nodes(&self) -> usize {
        self.labels.len()
    }

    fn out(&self, node: usize) -> &[usize] {
        &self.to[node]
    }
}

/// A required list of per-node lists, where Go may have encoded the outer
/// list or any inner one as `null`.
fn nested_null_as_empty<'de, D, T>(d: D) -> std::result::Result<Vec<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let outer = Option::<Vec<Option<Vec<T>>>>::deserialize(d)?.unwrap_or_default();
    Ok(outer.into_iter().map(Option::unwrap_or_default).collect())
}
