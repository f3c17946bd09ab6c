use std::io::Write;

use crate::config::ReportConfig;
use crate::errors::Result;
use crate::graph::{EdgeRef, Graph};
use crate::scc::Components;

/// Prefixes every line of `s`, including the first and any after embedded
/// newlines, with `prefix`.
pub fn indent(s: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(s.len() + prefix.len());
    out.push_str(prefix);
    out.push_str(&s.replace('\n', &format!("\n{}", prefix)));
    out
}

pub fn text_report(g: &Graph) -> String {
    let mut buf = Vec::new();
    write_text_report(g, &ReportConfig::default(), &mut buf).expect("writing to a Vec");
    String::from_utf8_lossy(&buf).into_owned()
}

/// Writes every edge of `g` with its stack evidence.
///
/// Components are walked in topological order.  Each component is walked
/// depth-first from a single start node, staying inside the component, and
/// every out-edge of a node is printed when the walk first reaches that node,
/// so each edge is printed exactly once and a cycle's edges come out
/// back-to-back.
///
/// The start node of a component is the member with the latest
/// already-printed component among its predecessors (the lowest node id wins
/// ties, and members without printed predecessors lose to members with
/// them).  This tends to continue where the previous component left off.
pub fn write_text_report<W: Write + ?Sized>(
    g: &Graph,
    config: &ReportConfig,
    w: &mut W,
) -> Result<()> {
    let comps = Components::new(g);
    let n = g.num_nodes();
    let mut visited = vec![false; n];
    // Latest walked component with an edge into each node.
    let mut max_pred: Vec<Option<usize>> = vec![None; n];
    // (node, next out-edge to print)
    let mut work: Vec<(usize, usize)> = Vec::new();

    for (c, members) in comps.components.iter().enumerate() {
        let start = pick_start(members, &max_pred);
        trace!(component = c, size = members.len(), start, "walking component");

        visited[start] = true;
        work.push((start, 0));
        while let Some(frame) = work.last_mut() {
            let (node, i) = *frame;
            if i == g.out(node).len() {
                work.pop();
                continue;
            }
            frame.1 += 1;

            write_edge(g, config, EdgeRef::new(node, i), w)?;
            let target = g.out(node)[i];
            if !visited[target] && comps.component_of[target] == c {
                visited[target] = true;
                work.push((target, 0));
            }
        }

        for &m in members {
            for &t in g.out(m) {
                if comps.component_of[t] != c {
                    max_pred[t] = max_pred[t].max(Some(c));
                }
            }
        }
    }
    Ok(())
}

fn pick_start(members: &[usize], max_pred: &[Option<usize>]) -> usize {
    let mut best = members[0];
    for &m in &members[1..] {
        if max_pred[m] > max_pred[best] {
            best = m;
        }
    }
    best
}

fn write_edge<W: Write + ?Sized>(
    g: &Graph,
    config: &ReportConfig,
    edge_ref: EdgeRef,
    w: &mut W,
) -> Result<()> {
    let from = g.label_with(edge_ref.node, config);
    let to = g.label_with(g.target(edge_ref), config);
    let edge = g.edge(edge_ref);
    let table = &g.stack_table;

    writeln!(w, "{} -> {}", from, to)?;
    for pair in edge.stacks.iter().take(config.max_stack_pairs) {
        writeln!(w, "acquired {} {} times at:", from, pair.count)?;
        writeln!(w, "{}", indent(&table.string_stack(&pair.s1), &config.indent))?;
        writeln!(w, "then {} at:", to)?;
        writeln!(w, "{}", indent(&table.string_stack(&pair.s2), &config.indent))?;
    }
    if edge.stacks.len() > config.max_stack_pairs {
        writeln!(
            w,
            ".. {} more stack pairs ..",
            edge.stacks.len() - config.max_stack_pairs
        )?;
    }
    writeln!(w)?;
    Ok(())
}
