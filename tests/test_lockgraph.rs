use std::io::Write;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{write::DeflateEncoder, Compression};

use lockgraph::{
    dump::{dump_to_string, load_from_str},
    report::{edge_to_dot, text_report, write_lock_graph_dot, write_text_report},
    scc::cycles,
    subgraph::EdgeRemoved,
    Edge, EdgeRef, ErrorLayer, Graph, GraphBuilder, ReportConfig, SrcPos, Stack, StackPair,
    StackTable,
};

const SCHED: u64 = 0xc000_1000;
const MHEAP: u64 = 0xc000_2000;
const ALLP: u64 = 0xc000_3000;

fn frames(b: &GraphBuilder, frames: &[(&str, &str, u32)]) -> Stack {
    let table = b.stacks();
    Stack(
        frames
            .iter()
            .map(|&(func, file, line)| table.intern(func, file, line))
            .collect(),
    )
}

/// Two threads taking `sched` and `mheap_` in opposite orders, the second
/// one also taking `allp` with both held.
fn inverted_graph() -> Graph {
    let mut b = GraphBuilder::new();
    b.name_lock(SCHED, "runtime.sched.lock");
    b.name_lock(MHEAP, "runtime.mheap_.lock");
    b.name_lock(ALLP, "allp");

    for _ in 0..2 {
        b.acquire(1, SCHED, frames(&b, &[("runtime.schedule", "/go/src/runtime/proc.go", 10)]));
        b.acquire(
            1,
            MHEAP,
            frames(
                &b,
                &[
                    ("runtime.mheap.alloc", "/go/src/runtime/mheap.go", 20),
                    ("runtime.schedule", "/go/src/runtime/proc.go", 11),
                ],
            ),
        );
        b.release(1, MHEAP);
        b.release(1, SCHED);
    }

    b.acquire(2, MHEAP, frames(&b, &[("runtime.mheap.alloc", "/go/src/runtime/mheap.go", 30)]));
    b.acquire(2, SCHED, Stack(vec![SrcPos::unresolved("unknown PC 0x1234")]));
    b.acquire(2, ALLP, frames(&b, &[("runtime.procresize", "/go/src/runtime/proc.go", 40)]));

    b.finish()
}

#[test]
fn test_builder_graph_shape() {
    let g = inverted_graph();
    assert_eq!(g.labels, vec!["allp", "runtime.mheap_.lock", "runtime.sched.lock"]);
    assert_eq!(g.to, vec![vec![], vec![0, 2], vec![0, 1]]);
    assert_eq!(g.num_stack_pairs(), 4);
    assert!(g.validate().is_ok());
}

#[test]
fn test_dump_round_trip_preserves_reports() {
    let g = inverted_graph();
    let loaded = load_from_str(&dump_to_string(&g).unwrap()).unwrap();

    assert_eq!(loaded.labels, g.labels);
    assert_eq!(loaded.to, g.to);
    assert_eq!(loaded.edges, g.edges);
    assert_eq!(text_report(&loaded), text_report(&g));
    assert_eq!(cycles(&loaded), cycles(&g));
}

#[test]
fn test_cycles_json() {
    let g = load_from_str(&dump_to_string(&inverted_graph()).unwrap()).unwrap();
    let set = cycles(&g);
    insta::assert_json_snapshot!(set.to_json(), @r###"
    {
      "nodes": [
        "n1",
        "n2"
      ],
      "edges": [
        "e1-1",
        "e2-1"
      ]
    }
    "###);
}

#[test]
fn test_excluding_an_edge_breaks_the_cycle() {
    let g = inverted_graph();
    let excluded: EdgeRef = "e1-1".parse().unwrap();
    let view = EdgeRemoved::new(&g, &[excluded]);
    assert!(cycles(&view).is_empty());

    // Excluding the edge into allp changes nothing.
    let view = EdgeRemoved::new(&g, &["e1-0".parse::<EdgeRef>().unwrap()]);
    let set = cycles(&view).map_edges(|e| view.original_edge(e));
    assert_eq!(set, cycles(&g));
}

#[test]
fn test_cycle_report() {
    let g = inverted_graph();
    let set = cycles(&g);
    let cyclic = g.filter(&set.nodes, &set.edges);

    assert_eq!(
        text_report(&cyclic),
        "\
mheap_.lock -> sched.lock
acquired mheap_.lock 1 times at:
    runtime.mheap.alloc mheap.go:30
then sched.lock at:
    unknown PC 0x1234

sched.lock -> mheap_.lock
acquired sched.lock 2 times at:
    runtime.schedule proc.go:10
then mheap_.lock at:
    runtime.mheap.alloc mheap.go:20
    runtime.schedule proc.go:11

"
    );
}

#[test]
fn test_filter_shares_evidence() {
    let g = inverted_graph();
    let set = cycles(&g);
    let cyclic = g.filter(&set.nodes, &set.edges);

    assert_eq!(cyclic.labels, vec!["runtime.mheap_.lock", "runtime.sched.lock"]);
    assert_eq!(cyclic.to, vec![vec![1], vec![0]]);
    assert!(Arc::ptr_eq(&cyclic.stack_table, &g.stack_table));
    assert!(Arc::ptr_eq(
        cyclic.edge(EdgeRef::new(0, 0)),
        g.edge(EdgeRef::new(1, 1))
    ));
}

#[test]
fn test_lock_graph_dot() {
    let g = inverted_graph();
    let set = cycles(&g);
    let cyclic = g.filter(&set.nodes, &set.edges);

    let mut buf = Vec::new();
    write_lock_graph_dot(&cyclic, &ReportConfig::default(), &mut buf).unwrap();
    assert_eq!(
        String::from_utf8(buf).unwrap(),
        "\
digraph \"\" {
  n0 [label=\"mheap_.lock\",id=\"n0\"];
  n1 [label=\"sched.lock\",id=\"n1\"];
  n0 -> n1 [id=\"e0-0\"];
  n1 -> n0 [id=\"e1-0\"];
}
"
    );
}

#[test]
fn test_edge_dot() {
    let g = inverted_graph();
    let edge = g.edge("e2-1".parse().unwrap());
    assert_eq!(
        edge_to_dot(&g, edge),
        "\
digraph \"\" {
  node [shape=box,fontsize=10];
  n0 [label=\"runtime.schedule\"];
  n1 [label=\"runtime.mheap.alloc\"];
  n0 -> n1;
  n0 -> n1 [color=red,penwidth=8,label=2];
}
"
    );
}

#[test]
fn test_report_elides_extra_stack_pairs() {
    let table = Arc::new(StackTable::new());
    let mut g = Graph::new(Arc::clone(&table));
    let a = g.add_node("a");
    let b = g.add_node("b");
    let pairs = (0..7)
        .map(|i| StackPair {
            s1: Stack(vec![table.intern("f", "a.go", i)]),
            s2: Stack(vec![table.intern("g", "b.go", i)]),
            count: 10 - u64::from(i),
        })
        .collect();
    g.add_edge(a, b, Edge::new(pairs));
    g.add_edge(b, a, Edge::default());

    let report = text_report(&g);
    assert_eq!(report.matches("acquired a ").count(), 5);
    assert!(report.contains("acquired a 6 times at:\n    f a.go:4\n"));
    assert!(!report.contains("a.go:5"));
    assert!(report.contains(".. 2 more stack pairs ..\n"));
    assert!(report.ends_with("b -> a\n\n"));

    let config = ReportConfig {
        max_stack_pairs: 7,
        indent: "\t".to_string(),
        ..ReportConfig::default()
    };
    let mut buf = Vec::new();
    write_text_report(&g, &config, &mut buf).unwrap();
    let report = String::from_utf8(buf).unwrap();
    assert_eq!(report.matches("acquired a ").count(), 7);
    assert!(report.contains("\tf a.go:6\n"));
    assert!(!report.contains("more stack pairs"));
}

fn encode_json(json: &str) -> String {
    let mut deflate = DeflateEncoder::new(Vec::new(), Compression::best());
    deflate.write_all(json.as_bytes()).unwrap();
    STANDARD.encode(deflate.finish().unwrap())
}

#[test]
fn test_load_accepts_null_lists() {
    let g = load_from_str(&encode_json(
        r#"{"Labels": ["a", "b"], "Edges": [[{"Stacks": [{"S1": null, "S2": [[0, 0, 7], "no symbol"], "Count": 3}]}], null], "To": [[1], null], "StackTable": {"Files": ["x.go"], "Funcs": ["f"]}, "Extra": 1}"#,
    ))
    .unwrap();
    assert_eq!(g.to, vec![vec![1], vec![]]);
    let pair = &g.edge(EdgeRef::new(0, 0)).stacks[0];
    assert!(pair.s1.is_empty());
    assert_eq!(g.stack_table.string_stack(&pair.s2), "f x.go:7\nno symbol");
}

#[test]
fn test_load_rejects_dangling_string_index() {
    let err = load_from_str(&encode_json(
        r#"{"Labels": ["a"], "Edges": [[{"Stacks": [{"S1": [[0, 5, 1]], "S2": [], "Count": 1}]}]], "To": [[0]], "StackTable": {"Files": ["x.go"], "Funcs": ["f"]}}"#,
    ))
    .unwrap_err();
    assert_eq!(err.layer(), ErrorLayer::Structure);
}

#[test]
fn test_load_rejects_missing_pieces() {
    for json in [
        // No S1 or S2.
        r#"{"Labels": ["a"], "Edges": [[{"Stacks": [{"Count": 1}]}]], "To": [[0]], "StackTable": {"Files": [], "Funcs": []}}"#,
        // No S1.
        r#"{"Labels": ["a"], "Edges": [[{"Stacks": [{"S2": [], "Count": 1}]}]], "To": [[0]], "StackTable": {"Files": [], "Funcs": []}}"#,
        // No string tables.
        r#"{"Labels": ["a"], "Edges": [[{"Stacks": [{"S1": [], "S2": [], "Count": 1}]}]], "To": [[0]], "StackTable": {}}"#,
    ] {
        let err = load_from_str(&encode_json(json)).unwrap_err();
        assert_eq!(err.layer(), ErrorLayer::Encoding, "{}", json);
        assert!(err.to_string().contains("missing field"), "{}", err);
    }
}
