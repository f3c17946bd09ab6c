//! Graphviz output.
//!
//! `write_edge_dot` draws the call graph behind one lock edge: every frame of
//! every stack pair becomes a node (coalesced according to a `Noder`), calls
//! become black edges from caller to callee, and each distinct pair of
//! acquiring frames gets a red edge whose width and label reflect how many
//! times it was observed.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::io::Write;

use crate::config::ReportConfig;
use crate::errors::Result;
use crate::graph::{node_name, Edge, Graph};
use crate::stack::{basename, SrcPos, Stack, StackTable};

/// Decides which frames share a call graph node.
pub trait Noder {
    type Key: Clone + Eq + Hash;

    fn key(&self, pos: &SrcPos) -> Self::Key;
    fn label(&self, pos: &SrcPos) -> String;
}

/// Every distinct source position is its own node.
pub struct LineNoder<'a> {
    pub table: &'a StackTable,
}

impl<'a> Noder for LineNoder<'a> {
    type Key = SrcPos;

    fn key(&self, pos: &SrcPos) -> SrcPos {
        pos.clone()
    }

    fn label(&self, pos: &SrcPos) -> String {
        match pos {
            SrcPos::Resolved { file, func, line } => format!(
                "{}\n{}:{}",
                self.table.funcs.get(*func),
                basename(&self.table.files.get(*file)),
                line
            ),
            SrcPos::Unresolved(message) => message.clone(),
        }
    }
}

/// Every function is one node, whatever line in it a frame is at.
/// Unresolved frames with the same text share a node.
pub struct FuncNoder<'a> {
    pub table: &'a StackTable,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FuncKey {
    Func(usize),
    Unresolved(String),
}

impl<'a> Noder for FuncNoder<'a> {
    type Key = FuncKey;

    fn key(&self, pos: &SrcPos) -> FuncKey {
        match pos {
            SrcPos::Resolved { func, .. } => FuncKey::Func(*func),
            SrcPos::Unresolved(message) => FuncKey::Unresolved(message.clone()),
        }
    }

    fn label(&self, pos: &SrcPos) -> String {
        match pos {
            SrcPos::Resolved { func, .. } => self.table.funcs.get(*func),
            SrcPos::Unresolved(message) => message.clone(),
        }
    }
}

/// Quote `s` as a DOT string.
fn dot_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Drops the exit function from the outer end of a stack and replaces an
/// empty stack with a single "missing stack" frame.
pub fn trim_stack(table: &StackTable, stack: &Stack, config: &ReportConfig) -> Stack {
    let mut frames = stack.frames().to_vec();
    if let Some(outer) = frames.last() {
        if table.func_name(outer).as_deref() == Some(config.exit_function.as_str()) {
            frames.pop();
        }
    }
    if frames.is_empty() {
        frames.push(SrcPos::unresolved(config.missing_stack.clone()));
    }
    Stack(frames)
}

/// Assigns `n<k>` ids to noder keys in first-seen order.
struct NodeIds<K> {
    ids: HashMap<K, usize>,
}

impl<K: Clone + Eq + Hash> NodeIds<K> {
    /// Returns the id for `key` and whether it was newly assigned.
    fn get_or_assign(&mut self, key: K) -> (usize, bool) {
        let next = self.ids.len();
        let mut fresh = false;
        let id = *self.ids.entry(key).or_insert_with(|| {
            fresh = true;
            next
        });
        (id, fresh)
    }

    fn get(&self, key: &K) -> usize {
        self.ids[key]
    }
}

pub fn edge_to_dot(g: &Graph, edge: &Edge) -> String {
    let mut buf = Vec::new();
    write_edge_dot(g, edge, &ReportConfig::default(), &mut buf).expect("writing to a Vec");
    String::from_utf8_lossy(&buf).into_owned()
}

/// Writes the call graph of `edge`'s stack pairs, one node per function.
pub fn write_edge_dot<W: Write + ?Sized>(
    g: &Graph,
    edge: &Edge,
    config: &ReportConfig,
    w: &mut W,
) -> Result<()> {
    let noder = FuncNoder {
        table: &g.stack_table,
    };
    write_edge_dot_with(g, edge, &noder, config, w)
}

pub fn write_edge_dot_with<N: Noder, W: Write + ?Sized>(
    g: &Graph,
    edge: &Edge,
    noder: &N,
    config: &ReportConfig,
    w: &mut W,
) -> Result<()> {
    let table = &g.stack_table;
    let pairs: Vec<(Stack, Stack, u64)> = edge
        .stacks
        .iter()
        .map(|sp| {
            (
                trim_stack(table, &sp.s1, config),
                trim_stack(table, &sp.s2, config),
                sp.count,
            )
        })
        .collect();

    writeln!(w, "digraph \"\" {{")?;
    writeln!(w, "  node [shape=box,fontsize=10];")?;

    let mut ids = NodeIds {
        ids: HashMap::new(),
    };
    for (s1, s2, _) in &pairs {
        for pos in s1.frames().iter().chain(s2.frames()) {
            let (id, fresh) = ids.get_or_assign(noder.key(pos));
            if fresh {
                writeln!(
                    w,
                    "  {} [label={}];",
                    node_name(id),
                    dot_string(&noder.label(pos))
                )?;
            }
        }
    }

    // Calls, caller to callee.  Stacks are stored innermost first.
    let mut calls = HashSet::new();
    for (s1, s2, _) in &pairs {
        for stack in [s1, s2] {
            let frames = stack.frames();
            for i in (1..frames.len()).rev() {
                let caller = ids.get(&noder.key(&frames[i]));
                let callee = ids.get(&noder.key(&frames[i - 1]));
                if calls.insert((caller, callee)) {
                    writeln!(w, "  {} -> {};", node_name(caller), node_name(callee))?;
                }
            }
        }
    }

    // Lock acquire -> acquire edges between the innermost frames.
    let mut acquires: Vec<((usize, usize), u64)> = Vec::new();
    let mut acquire_index = HashMap::new();
    for (s1, s2, count) in &pairs {
        // trim_stack never returns an empty stack.
        let from = ids.get(&noder.key(&s1.frames()[0]));
        let to = ids.get(&noder.key(&s2.frames()[0]));
        let slot = *acquire_index.entry((from, to)).or_insert_with(|| {
            acquires.push(((from, to), 0));
            acquires.len() - 1
        });
        acquires[slot].1 += count;
    }
    let max_weight = acquires.iter().map(|(_, w)| *w).max().unwrap_or(0);
    for ((from, to), weight) in &acquires {
        let frac = if max_weight == 0 {
            0.0
        } else {
            *weight as f64 / max_weight as f64
        };
        let width = config.min_pen_width + (config.max_pen_width - config.min_pen_width) * frac;
        writeln!(
            w,
            "  {} -> {} [color=red,penwidth={},label={}];",
            node_name(*from),
            node_name(*to),
            width,
            weight
        )?;
    }

    writeln!(w, "}}")?;
    Ok(())
}

/// Writes the lock graph itself.  Nodes and edges carry `id` attributes
/// (`n<k>`, `e<k>-<j>`) so they can be found again in rendered SVG.
pub fn write_lock_graph_dot<W: Write + ?Sized>(
    g: &Graph,
    config: &ReportConfig,
    w: &mut W,
) -> Result<()> {
    writeln!(w, "digraph \"\" {{")?;
    for node in 0..g.num_nodes() {
        let id = node_name(node);
        writeln!(
            w,
            "  {} [label={},id={}];",
            id,
            dot_string(&g.label_with(node, config)),
            dot_string(&id)
        )?;
    }
    for edge in g.edge_refs() {
        writeln!(
            w,
            "  {} -> {} [id={}];",
            node_name(edge.node),
            node_name(g.target(edge)),
            dot_string(&edge.to_string())
        )?;
    }
    writeln!(w, "}}")?;
    Ok(())
}
