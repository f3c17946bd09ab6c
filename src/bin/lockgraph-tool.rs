use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};

use lockgraph::{
    config::{self, ReportConfig},
    dump,
    graph::{EdgeRef, Graph},
    logging::init_logging,
    report,
    scc::cycles,
    subgraph::EdgeRemoved,
};

#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the edges involved in cycles along with their stacks
    Report {
        /// Path to the lock graph dump, or "-" for stdin
        dump: PathBuf,

        /// Print every edge, not just those on cycles
        #[arg(long)]
        all: bool,

        /// TOML file overriding report settings
        #[arg(long, env = "LOCKGRAPH_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print the nodes and edges on cycles as JSON
    Cycles {
        /// Path to the lock graph dump, or "-" for stdin
        dump: PathBuf,

        /// Edges to ignore while looking for cycles, e.g. "e1-0,e4-2"
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<EdgeRef>,
    },

    /// Print the call graph behind one edge as DOT
    EdgeDot {
        /// Path to the lock graph dump, or "-" for stdin
        dump: PathBuf,

        /// Edge to render, as printed by `cycles`
        edge: EdgeRef,

        /// TOML file overriding report settings
        #[arg(long, env = "LOCKGRAPH_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print the lock graph as DOT
    GraphDot {
        /// Path to the lock graph dump, or "-" for stdin
        dump: PathBuf,

        /// Only include nodes and edges on cycles
        #[arg(long)]
        cycles_only: bool,

        /// TOML file overriding report settings
        #[arg(long, env = "LOCKGRAPH_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Print summary counts for a dump
    Stats {
        /// Path to the lock graph dump, or "-" for stdin
        dump: PathBuf,
    },
}

fn load_graph(path: &Path) -> lockgraph::Result<Graph> {
    if path.as_os_str() == "-" {
        return dump::load(io::stdin().lock());
    }
    let file = File::open(path)?;
    dump::load(BufReader::new(file))
}

fn load_config(path: Option<&Path>) -> lockgraph::Result<ReportConfig> {
    match path {
        Some(path) => config::load(&path.to_string_lossy()),
        None => Ok(ReportConfig::default()),
    }
}

fn check_edge(g: &Graph, edge: EdgeRef) -> Result<(), String> {
    if edge.node >= g.num_nodes() || edge.edge >= g.out(edge.node).len() {
        return Err(format!("no such edge {} in a graph of {} nodes", edge, g.num_nodes()));
    }
    Ok(())
}

fn cycle_graph(g: &Graph) -> Graph {
    let set = cycles(g);
    g.filter(&set.nodes, &set.edges)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match args.command {
        Command::Report { dump, all, config } => {
            let config = load_config(config.as_deref())?;
            let g = load_graph(&dump)?;
            let g = if all { g } else { cycle_graph(&g) };
            report::write_text_report(&g, &config, &mut out)?;
        }
        Command::Cycles { dump, exclude } => {
            let g = load_graph(&dump)?;
            for &edge in &exclude {
                check_edge(&g, edge)?;
            }
            let view = EdgeRemoved::new(&g, &exclude);
            let set = cycles(&view).map_edges(|e| view.original_edge(e));
            serde_json::to_writer_pretty(&mut out, &set.to_json())?;
            writeln!(out)?;
        }
        Command::EdgeDot { dump, edge, config } => {
            let config = load_config(config.as_deref())?;
            let g = load_graph(&dump)?;
            check_edge(&g, edge)?;
            report::write_edge_dot(&g, g.edge(edge), &config, &mut out)?;
        }
        Command::GraphDot {
            dump,
            cycles_only,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let g = load_graph(&dump)?;
            let g = if cycles_only { cycle_graph(&g) } else { g };
            report::write_lock_graph_dot(&g, &config, &mut out)?;
        }
        Command::Stats { dump } => {
            let g = load_graph(&dump)?;
            let set = cycles(&g);
            writeln!(out, "nodes: {}", g.num_nodes())?;
            writeln!(out, "edges: {}", g.num_edges())?;
            writeln!(out, "stack pairs: {}", g.num_stack_pairs())?;
            writeln!(out, "files: {}", g.stack_table.files.len())?;
            writeln!(out, "funcs: {}", g.stack_table.funcs.len())?;
            writeln!(out, "nodes on cycles: {}", set.nodes.len())?;
            writeln!(out, "edges on cycles: {}", set.edges.len())?;
        }
    }

    out.flush()?;
    Ok(())
}
