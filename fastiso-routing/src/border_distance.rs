//! Border-node distance store
//!
//! Payload layout (little-endian):
//!
//!   [pointer index: N × 12 bytes]
//!   [lists: per border node, K × (peer: i32, distance: f64), then peer = -1]
//!
//! Header slots: 0 = N (border node count), 1 = pointer entry width.
//!
//! The backing store is sized once in [`init`](BorderNodeDistanceStore::init)
//! for the all-pairs-per-cell worst case, so a preparation run normally
//! appends without reallocating. Appends go through `&mut self`; parallel
//! producers hand their records to a single writer (see `prepare`).

use std::path::Path;

use fastiso_common::{Error, NodeId, Result};
use fastiso_io::naming::{store_path, StoreKind};
use fastiso_io::{codec, DataAccess, PointerIndex, POINTER_ENTRY_BYTES};

use crate::partition::CellPartition;
use crate::weighting::{CostFunctionId, Weighting};

const SLOT_COUNT: usize = 0;
const SLOT_ENTRY_WIDTH: usize = 1;

const PAIR_BYTES: u64 = 12;
const SENTINEL_BYTES: u64 = 4;
const SENTINEL: i32 = -1;

/// Distances from one border node to its peers, as parallel lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorderNodeDistanceSet {
    pub ids: Vec<NodeId>,
    pub distances: Vec<f64>,
}

impl BorderNodeDistanceSet {
    pub fn new(ids: Vec<NodeId>, distances: Vec<f64>) -> Self {
        Self { ids, distances }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.ids.iter().copied().zip(self.distances.iter().copied())
    }

    /// Distance to `peer`, if listed.
    pub fn distance_to(&self, peer: NodeId) -> Option<f64> {
        self.iter().find(|&(id, _)| id == peer).map(|(_, d)| d)
    }
}

pub struct BorderNodeDistanceStore {
    data: DataAccess,
    cost_function: CostFunctionId,
    border_node_count: usize,
    index: PointerIndex,
    /// Next append position in write mode
    cursor: u64,
}

impl BorderNodeDistanceStore {
    pub fn new(dir: &Path, weighting: &dyn Weighting) -> Self {
        let path = store_path(dir, StoreKind::BorderNodeDistances, &weighting.descriptor());
        Self {
            data: DataAccess::new(path),
            cost_function: CostFunctionId::of(weighting),
            border_node_count: 0,
            index: PointerIndex::new(),
            cursor: 0,
        }
    }

    /// Extra list capacity, in entries, for the worst case of every border
    /// node listing every border node of its cell.
    pub fn required_capacity(partition: &CellPartition) -> u64 {
        partition
            .border_counts_per_cell()
            .values()
            .map(|&count| (count as u64) * (count as u64))
            .sum()
    }

    /// Bytes allocated up front by [`init`](Self::init).
    pub fn planned_bytes(partition: &CellPartition) -> u64 {
        let n = partition.border_node_count() as u64;
        n * POINTER_ENTRY_BYTES + Self::required_capacity(partition) * PAIR_BYTES + n * SENTINEL_BYTES
    }

    /// Allocate the store for writing. Must run once before any append.
    pub fn init(&mut self, partition: &CellPartition) -> Result<()> {
        let n = partition.border_node_count();
        let count = i32::try_from(n)
            .map_err(|_| Error::InvalidArgument(format!("{n} border nodes exceed the header range")))?;
        let bytes = Self::planned_bytes(partition);

        self.data.create(bytes as usize)?;
        self.data.set_header(SLOT_COUNT, count)?;
        self.data.set_header(SLOT_ENTRY_WIDTH, POINTER_ENTRY_BYTES as i32)?;
        self.border_node_count = n;
        self.index = PointerIndex::with_capacity(n);
        self.cursor = PointerIndex::block_bytes(n);

        tracing::debug!(
            path = %self.data.path().display(),
            border_nodes = n,
            bytes,
            "initialized border node distance store"
        );
        Ok(())
    }

    /// Open a prepared store read-only and load its pointer index.
    /// Returns `Ok(false)` when the store has not been prepared yet.
    pub fn load_existing(&mut self) -> Result<bool> {
        if !self.data.load_existing()? {
            return Ok(false);
        }
        let path = self.data.path().display().to_string();
        let count = self.data.get_header(SLOT_COUNT)?;
        let width = self.data.get_header(SLOT_ENTRY_WIDTH)?;
        if count < 0 || width as u64 != POINTER_ENTRY_BYTES {
            self.data.close();
            return Err(Error::corrupt(
                path,
                format!("invalid header (count {count}, entry width {width})"),
            ));
        }
        let count = count as usize;
        let index = match PointerIndex::load_block(&self.data, count) {
            Ok(index) => index,
            Err(err) => {
                self.data.close();
                return Err(err);
            }
        };

        self.border_node_count = count;
        self.index = index;
        self.cursor = self.data.used_bytes() as u64;
        tracing::debug!(path = %path, border_nodes = count, "loaded border node distance store");
        Ok(true)
    }

    /// Append the distance list of `node`. Each node is written once.
    pub fn store_distance_set(&mut self, node: NodeId, set: &BorderNodeDistanceSet) -> Result<()> {
        if set.ids.len() != set.distances.len() {
            return Err(Error::InvalidArgument(format!(
                "node {node}: {} peer ids but {} distances",
                set.ids.len(),
                set.distances.len()
            )));
        }
        if self.data.is_read_only() {
            return Err(Error::ReadOnly(self.data.path().display().to_string()));
        }
        if self.index.contains(node) {
            return Err(Error::InvalidArgument(format!(
                "distance set of node {node} already stored"
            )));
        }
        if set.len() >= self.border_node_count.max(1) {
            return Err(Error::InvalidArgument(format!(
                "node {node}: {} peers but only {} border nodes exist",
                set.len(),
                self.border_node_count
            )));
        }
        if self.index.len() >= self.border_node_count {
            return Err(Error::InvalidArgument(format!(
                "more distance sets than the {} declared border nodes",
                self.border_node_count
            )));
        }

        let mut record = Vec::with_capacity(set.len() * PAIR_BYTES as usize + SENTINEL_BYTES as usize);
        for (peer, distance) in set.iter() {
            let peer = i32::try_from(peer).map_err(|_| {
                Error::InvalidArgument(format!("peer id {peer} does not fit the on-disk id"))
            })?;
            record.extend_from_slice(&codec::i32_to_bytes(peer));
            record.extend_from_slice(&codec::f64_to_bytes(distance));
        }
        record.extend_from_slice(&codec::i32_to_bytes(SENTINEL));

        let end = self.cursor + record.len() as u64;
        if end > self.data.capacity() as u64 {
            tracing::warn!(
                node,
                needed = end,
                capacity = self.data.capacity(),
                "distance store outgrew its planned capacity"
            );
            self.data.ensure_capacity(end as usize)?;
        }

        self.index.insert(node, self.cursor)?;
        self.data.set_bytes(self.cursor, &record)?;
        self.cursor = end;
        Ok(())
    }

    /// Write the pointer index block. Runs after the last append, before flush.
    pub fn finalize_index(&mut self) -> Result<()> {
        self.index.write_block(&mut self.data, self.border_node_count)
    }

    /// Peer ids and distances of `node`, in stored order.
    pub fn get_distance_set(&self, node: NodeId) -> Result<BorderNodeDistanceSet> {
        let mut pos = self.index.offset(node).ok_or_else(|| Error::NotFound {
            store: StoreKind::BorderNodeDistances.to_string(),
            node,
        })?;

        let mut set = BorderNodeDistanceSet::default();
        loop {
            let peer = self.data.get_int(pos)?;
            if peer == SENTINEL {
                break;
            }
            if peer < 0 || set.len() >= self.border_node_count {
                return Err(Error::corrupt(
                    self.data.path().display().to_string(),
                    format!("distance list of node {node} is not terminated"),
                ));
            }
            set.ids.push(peer as NodeId);
            set.distances.push(self.data.get_double(pos + 4)?);
            pos += PAIR_BYTES;
        }
        Ok(set)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.index.contains(node)
    }

    pub fn matches_cost_function(&self, weighting: &dyn Weighting) -> bool {
        self.cost_function.matches(weighting)
    }

    pub fn cost_function(&self) -> &CostFunctionId {
        &self.cost_function
    }

    pub fn border_node_count(&self) -> usize {
        self.border_node_count
    }

    pub fn capacity_bytes(&self) -> usize {
        self.data.capacity()
    }

    pub fn used_bytes(&self) -> u64 {
        self.cursor
    }

    pub fn path(&self) -> &Path {
        self.data.path()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.data.flush()
    }

    pub fn close(&mut self) {
        self.data.close();
        self.index = PointerIndex::new();
    }

    pub fn is_closed(&self) -> bool {
        self.data.is_closed()
    }
}
