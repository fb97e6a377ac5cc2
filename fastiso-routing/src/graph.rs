//! Base road graph (CSR over directed arcs)

use fastiso_common::{Error, NodeId, Result};

/// Directed arc as seen from its tail node
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub head: NodeId,
    pub length_m: f64,
    pub speed_kmh: f64,
}

#[derive(Debug)]
pub struct RoadGraph {
    /// n_nodes + 1 entries into `edges`
    offsets: Vec<usize>,
    edges: Vec<Edge>,
}

impl RoadGraph {
    pub fn n_nodes(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        (node as usize) < self.n_nodes()
    }

    pub fn out_edges(&self, node: NodeId) -> &[Edge] {
        let u = node as usize;
        &self.edges[self.offsets[u]..self.offsets[u + 1]]
    }

    /// All arcs as `(tail, edge)`.
    pub fn arcs(&self) -> impl Iterator<Item = (NodeId, &Edge)> + '_ {
        (0..self.n_nodes()).flat_map(move |u| {
            self.out_edges(u as NodeId)
                .iter()
                .map(move |edge| (u as NodeId, edge))
        })
    }
}

/// Collects arcs and sorts them into CSR form.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    n_nodes: usize,
    arcs: Vec<(NodeId, Edge)>,
}

impl GraphBuilder {
    pub fn new(n_nodes: usize) -> Self {
        Self {
            n_nodes,
            arcs: Vec::new(),
        }
    }

    pub fn add_arc(&mut self, from: NodeId, to: NodeId, length_m: f64, speed_kmh: f64) -> Result<&mut Self> {
        if from as usize >= self.n_nodes || to as usize >= self.n_nodes {
            return Err(Error::InvalidArgument(format!(
                "arc {from}->{to} references a node outside 0..{}",
                self.n_nodes
            )));
        }
        if !length_m.is_finite() || length_m < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "arc {from}->{to} has invalid length {length_m}"
            )));
        }
        if speed_kmh.is_nan() || speed_kmh < 0.0 {
            return Err(Error::InvalidArgument(format!(
                "arc {from}->{to} has invalid speed {speed_kmh}"
            )));
        }
        self.arcs.push((
            from,
            Edge {
                head: to,
                length_m,
                speed_kmh,
            },
        ));
        Ok(self)
    }

    /// Adds `from -> to` and `to -> from` with the same attributes.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, length_m: f64, speed_kmh: f64) -> Result<&mut Self> {
        self.add_arc(from, to, length_m, speed_kmh)?;
        self.add_arc(to, from, length_m, speed_kmh)
    }

    pub fn build(mut self) -> RoadGraph {
        self.arcs.sort_by_key(|&(tail, edge)| (tail, edge.head));

        let mut offsets = vec![0usize; self.n_nodes + 1];
        for &(tail, _) in &self.arcs {
            offsets[tail as usize + 1] += 1;
        }
        for i in 0..self.n_nodes {
            offsets[i + 1] += offsets[i];
        }

        RoadGraph {
            offsets,
            edges: self.arcs.into_iter().map(|(_, edge)| edge).collect(),
        }
    }
}
