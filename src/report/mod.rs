//! Human-facing renderings of a lock graph.
//!
//! - `text`: the cycle report meant for terminals and logs.
//! - `dot`: Graphviz for the lock graph itself and for the call graph behind
//!   a single lock edge.

pub mod dot;
pub mod text;

pub use dot::{edge_to_dot, write_edge_dot, write_lock_graph_dot, FuncNoder, LineNoder, Noder};
pub use text::{indent, text_report, write_text_report};
