//! Compact transport format for lock graphs.
//!
//! A dump is the graph's JSON, deflated at the best compression level, then
//! base64 encoded (standard alphabet, padded).  Whitespace around or inside
//! the base64 text is ignored on load so dumps survive being pasted around.

use std::io::{Read, Write};

use base64::{
    engine::general_purpose::STANDARD,
    read::DecoderReader,
    write::EncoderWriter,
};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};

use crate::errors::{ErrorDetails, ErrorLayer, LockGraphError, Result};
use crate::graph::Graph;

/// Writes `graph` to `w` as a dump.  Each layer is finished innermost first
/// so the stream is complete when this returns.
pub fn dump<W: Write>(graph: &Graph, w: W) -> Result<()> {
    let b64 = EncoderWriter::new(w, &STANDARD);
    let mut deflate = DeflateEncoder::new(b64, Compression::best());
    serde_json::to_writer(&mut deflate, graph).map_err(|err| {
        if err.is_io() {
            LockGraphError::from(std::io::Error::from(err))
        } else {
            LockGraphError::from(err)
        }
    })?;
    let mut b64 = deflate.finish()?;
    let mut w = b64.finish()?;
    w.flush()?;

    debug!(
        nodes = graph.num_nodes(),
        edges = graph.num_edges(),
        stack_pairs = graph.num_stack_pairs(),
        "dumped lock graph"
    );
    Ok(())
}

pub fn dump_to_string(graph: &Graph) -> Result<String> {
    let mut buf = Vec::new();
    dump(graph, &mut buf)?;
    // base64 output is always ASCII.
    String::from_utf8(buf)
        .map_err(|e| LockGraphError::decode(ErrorLayer::Base64, e.to_string()))
}

/// Reads a dump produced by `dump`.  The decoded graph is validated before
/// it is returned.
pub fn load<R: Read>(mut r: R) -> Result<Graph> {
    let mut text = Vec::new();
    r.read_to_end(&mut text)?;
    text.retain(|b| !b.is_ascii_whitespace());

    let inflated = DeflateDecoder::new(DecoderReader::new(&text[..], &STANDARD));
    let graph: Graph = serde_json::from_reader(inflated).map_err(classify_load_error)?;
    graph.validate()?;

    debug!(
        bytes = text.len(),
        nodes = graph.num_nodes(),
        edges = graph.num_edges(),
        "loaded lock graph"
    );
    Ok(graph)
}

pub fn load_from_str(s: &str) -> Result<Graph> {
    load(s.as_bytes())
}

/// Work out which layer of the reader stack a JSON error came out of.
fn classify_load_error(err: serde_json::Error) -> LockGraphError {
    if !err.is_io() {
        return LockGraphError::decode(ErrorLayer::Encoding, err.to_string());
    }
    let io_err = std::io::Error::from(err);
    let is_base64 = io_err
        .get_ref()
        .map_or(false, |inner| inner.downcast_ref::<base64::DecodeError>().is_some());
    LockGraphError::Decode(ErrorDetails {
        layer: if is_base64 {
            ErrorLayer::Base64
        } else {
            ErrorLayer::Compression
        },
        message: io_err.to_string(),
    })
}
