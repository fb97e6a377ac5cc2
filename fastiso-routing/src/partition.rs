//! Cell partition of the graph nodes
//!
//! Cell ids come from an external partitioner. Border nodes are derived here:
//! a node is a border node when any arc into or out of it crosses a cell
//! boundary.

use std::collections::BTreeMap;

use fastiso_common::{CellId, Error, NodeId, Result};

use crate::graph::RoadGraph;

#[derive(Debug, Clone)]
pub struct CellPartition {
    cell_of: Vec<CellId>,
    border: Vec<bool>,
    /// Nodes of each cell in ascending order
    cells: BTreeMap<CellId, Vec<NodeId>>,
}

impl CellPartition {
    pub fn from_cell_ids(graph: &RoadGraph, cell_of: Vec<CellId>) -> Result<Self> {
        if cell_of.len() != graph.n_nodes() {
            return Err(Error::InvalidArgument(format!(
                "{} cell ids for {} nodes",
                cell_of.len(),
                graph.n_nodes()
            )));
        }

        let mut border = vec![false; cell_of.len()];
        for (tail, edge) in graph.arcs() {
            if cell_of[tail as usize] != cell_of[edge.head as usize] {
                border[tail as usize] = true;
                border[edge.head as usize] = true;
            }
        }

        let mut cells: BTreeMap<CellId, Vec<NodeId>> = BTreeMap::new();
        for (node, &cell) in cell_of.iter().enumerate() {
            cells.entry(cell).or_default().push(node as NodeId);
        }

        Ok(Self {
            cell_of,
            border,
            cells,
        })
    }

    pub fn n_nodes(&self) -> usize {
        self.cell_of.len()
    }

    pub fn is_border_node(&self, node: NodeId) -> bool {
        self.border.get(node as usize).copied().unwrap_or(false)
    }

    pub fn cell_id(&self, node: NodeId) -> CellId {
        self.cell_of[node as usize]
    }

    pub fn all_cell_ids(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells.keys().copied()
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn nodes_of_cell(&self, cell: CellId) -> &[NodeId] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn border_nodes_of_cell(&self, cell: CellId) -> Vec<NodeId> {
        self.nodes_of_cell(cell)
            .iter()
            .copied()
            .filter(|&node| self.border[node as usize])
            .collect()
    }

    /// All border nodes in ascending order.
    pub fn border_nodes(&self) -> Vec<NodeId> {
        (0..self.cell_of.len() as NodeId)
            .filter(|&node| self.border[node as usize])
            .collect()
    }

    pub fn border_node_count(&self) -> usize {
        self.border.iter().filter(|&&b| b).count()
    }

    /// Number of border nodes per cell, for capacity planning.
    pub fn border_counts_per_cell(&self) -> BTreeMap<CellId, usize> {
        self.cells
            .iter()
            .map(|(&cell, nodes)| {
                let count = nodes.iter().filter(|&&n| self.border[n as usize]).count();
                (cell, count)
            })
            .collect()
    }
}
