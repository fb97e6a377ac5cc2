//! Text graph format read by the CLI
//!
//! ```text
//! # comment
//! n <id> <cell>
//! e <from> <to> <length_m> <speed_kmh> [oneway]
//! ```
//!
//! Node ids must cover `0..N` without gaps; nodes may appear in any order.
//! Edges are bidirectional unless the trailing `oneway` flag is given.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use fastiso_routing::{CellId, CellPartition, GraphBuilder, NodeId, RoadGraph};

#[derive(Debug)]
pub struct GraphFile {
    pub graph: RoadGraph,
    pub partition: CellPartition,
}

struct EdgeLine {
    from: NodeId,
    to: NodeId,
    length_m: f64,
    speed_kmh: f64,
    oneway: bool,
}

fn field<T: std::str::FromStr>(value: Option<&str>, what: &str, line_no: usize) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = value.with_context(|| format!("line {line_no}: missing {what}"))?;
    raw.parse::<T>()
        .with_context(|| format!("line {line_no}: invalid {what} '{raw}'"))
}

pub fn parse_graph<R: BufRead>(reader: R) -> Result<GraphFile> {
    let mut cells: BTreeMap<NodeId, CellId> = BTreeMap::new();
    let mut edges: Vec<EdgeLine> = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.with_context(|| format!("line {line_no}: read failed"))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("n") => {
                let id: NodeId = field(parts.next(), "node id", line_no)?;
                let cell: CellId = field(parts.next(), "cell id", line_no)?;
                if i32::try_from(id).is_err() {
                    bail!("line {line_no}: node id {id} out of range");
                }
                if cells.insert(id, cell).is_some() {
                    bail!("line {line_no}: node {id} declared twice");
                }
            }
            Some("e") => {
                let from = field(parts.next(), "tail node", line_no)?;
                let to = field(parts.next(), "head node", line_no)?;
                let length_m = field(parts.next(), "length", line_no)?;
                let speed_kmh = field(parts.next(), "speed", line_no)?;
                let oneway = match parts.next() {
                    None => false,
                    Some("oneway") => true,
                    Some(other) => bail!("line {line_no}: unexpected flag '{other}'"),
                };
                edges.push(EdgeLine {
                    from,
                    to,
                    length_m,
                    speed_kmh,
                    oneway,
                });
            }
            Some(other) => bail!("line {line_no}: unknown record type '{other}'"),
            None => {}
        }
    }

    // Keys are distinct and ascending, so they cover 0..N exactly when the
    // i-th key is i.
    if let Some((missing, _)) = cells
        .keys()
        .enumerate()
        .find(|&(i, &id)| i as NodeId != id)
    {
        bail!("node {missing} is missing");
    }
    let cell_of: Vec<CellId> = cells.into_values().collect();

    let mut builder = GraphBuilder::new(cell_of.len());
    for edge in &edges {
        if edge.oneway {
            builder.add_arc(edge.from, edge.to, edge.length_m, edge.speed_kmh)?;
        } else {
            builder.add_edge(edge.from, edge.to, edge.length_m, edge.speed_kmh)?;
        }
    }
    let graph = builder.build();
    let partition = CellPartition::from_cell_ids(&graph, cell_of)?;
    Ok(GraphFile { graph, partition })
}

pub fn load_graph(path: &Path) -> Result<GraphFile> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("cannot open graph file {}", path.display()))?;
    parse_graph(std::io::BufReader::new(file))
        .with_context(|| format!("cannot parse graph file {}", path.display()))
}
