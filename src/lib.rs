extern crate base64;
extern crate flate2;
extern crate itertools;
#[macro_use]
extern crate lazy_static;
extern crate parking_lot;
extern crate petgraph;
extern crate regex;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate tracing;
extern crate tracing_subscriber;

pub mod builder;
pub mod config;
pub mod dump;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod report;
pub mod scc;
pub mod stack;
pub mod string_table;
pub mod subgraph;

pub use builder::{GraphBuilder, ThreadId};
pub use config::ReportConfig;
pub use errors::{ErrorDetails, ErrorLayer, LockGraphError, Result};
pub use graph::{Edge, EdgeRef, Graph, StackPair};
pub use scc::{cycles, Components, CycleSet, DirectedGraph};
pub use stack::{LineInfo, SrcPos, Stack, StackTable};
pub use string_table::StringTable;
pub use subgraph::EdgeRemoved;
