//! Eccentricity store
//!
//! Payload layout (little-endian):
//!
//!   [pointer index: N × 12 bytes]
//!   [records: N × (fully_reachable: i32, eccentricity: i32)]
//!
//! Header slots: 0 = N, 1 = pointer entry width, 2 = record width.
//!
//! The eccentricity is stored rounded up. A query may only skip a cell when
//! `dist + eccentricity <= budget`, which stays sound as long as the stored
//! value is never below the real one.

use std::path::Path;

use fastiso_common::{Error, NodeId, Result};
use fastiso_io::naming::{store_path, StoreKind};
use fastiso_io::{DataAccess, PointerIndex, POINTER_ENTRY_BYTES};

use crate::partition::CellPartition;
use crate::weighting::{CostFunctionId, Weighting};

const SLOT_COUNT: usize = 0;
const SLOT_ENTRY_WIDTH: usize = 1;
const SLOT_RECORD_WIDTH: usize = 2;

const RECORD_BYTES: u64 = 8;
const FLAG_OFFSET: u64 = 0;
const ECCENTRICITY_OFFSET: u64 = 4;

/// Round `value` up into the stored integer, saturating at `i32::MAX`.
pub fn stored_eccentricity(value: f64) -> Result<i32> {
    if value.is_nan() || value < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "eccentricity must be a non-negative number, got {value}"
        )));
    }
    let ceiled = value.ceil();
    if ceiled >= i32::MAX as f64 {
        Ok(i32::MAX)
    } else {
        Ok(ceiled as i32)
    }
}

pub struct EccentricityStore {
    data: DataAccess,
    cost_function: CostFunctionId,
    border_node_count: usize,
    index: PointerIndex,
}

impl EccentricityStore {
    pub fn new(dir: &Path, weighting: &dyn Weighting) -> Self {
        let path = store_path(dir, StoreKind::Eccentricities, &weighting.descriptor());
        Self {
            data: DataAccess::new(path),
            cost_function: CostFunctionId::of(weighting),
            border_node_count: 0,
            index: PointerIndex::new(),
        }
    }

    /// Allocate the store and give every border node its record slot, in
    /// ascending node order.
    pub fn init(&mut self, partition: &CellPartition) -> Result<()> {
        let border_nodes = partition.border_nodes();
        let n = border_nodes.len();
        let count = i32::try_from(n)
            .map_err(|_| Error::InvalidArgument(format!("{n} border nodes exceed the header range")))?;

        let records_at = PointerIndex::block_bytes(n);
        self.data.create((records_at + n as u64 * RECORD_BYTES) as usize)?;
        self.data.set_header(SLOT_COUNT, count)?;
        self.data.set_header(SLOT_ENTRY_WIDTH, POINTER_ENTRY_BYTES as i32)?;
        self.data.set_header(SLOT_RECORD_WIDTH, RECORD_BYTES as i32)?;

        let mut index = PointerIndex::with_capacity(n);
        for (slot, &node) in border_nodes.iter().enumerate() {
            let offset = records_at + slot as u64 * RECORD_BYTES;
            index.insert(node, offset)?;
            // Touch the record so zeroed defaults are persisted
            self.data.set_int(offset + ECCENTRICITY_OFFSET, 0)?;
        }
        self.index = index;
        self.border_node_count = n;

        tracing::debug!(
            path = %self.data.path().display(),
            border_nodes = n,
            "initialized eccentricity store"
        );
        Ok(())
    }

    /// Open a prepared store read-only and load its pointer index.
    pub fn load_existing(&mut self) -> Result<bool> {
        if !self.data.load_existing()? {
            return Ok(false);
        }
        let path = self.data.path().display().to_string();
        let count = self.data.get_header(SLOT_COUNT)?;
        let entry_width = self.data.get_header(SLOT_ENTRY_WIDTH)?;
        let record_width = self.data.get_header(SLOT_RECORD_WIDTH)?;
        if count < 0
            || entry_width as u64 != POINTER_ENTRY_BYTES
            || record_width as u64 != RECORD_BYTES
        {
            self.data.close();
            return Err(Error::corrupt(
                path,
                format!("invalid header (count {count}, widths {entry_width}/{record_width})"),
            ));
        }
        let count = count as usize;
        let expected = PointerIndex::block_bytes(count) + count as u64 * RECORD_BYTES;
        if self.data.used_bytes() as u64 != expected {
            self.data.close();
            return Err(Error::corrupt(
                path,
                format!("expected {expected} payload bytes for {count} border nodes"),
            ));
        }
        let index = match PointerIndex::load_block(&self.data, count) {
            Ok(index) => index,
            Err(err) => {
                self.data.close();
                return Err(err);
            }
        };

        self.border_node_count = count;
        self.index = index;
        tracing::debug!(path = %path, border_nodes = count, "loaded eccentricity store");
        Ok(true)
    }

    fn record(&self, node: NodeId) -> Result<u64> {
        self.index.offset(node).ok_or_else(|| Error::NotFound {
            store: StoreKind::Eccentricities.to_string(),
            node,
        })
    }

    /// Store `ceil(eccentricity)` for `node`.
    pub fn set_eccentricity(&mut self, node: NodeId, eccentricity: f64) -> Result<()> {
        let value = stored_eccentricity(eccentricity)?;
        let offset = self.record(node)?;
        self.data.set_int(offset + ECCENTRICITY_OFFSET, value)
    }

    pub fn get_eccentricity(&self, node: NodeId) -> Result<i32> {
        let offset = self.record(node)?;
        self.data.get_int(offset + ECCENTRICITY_OFFSET)
    }

    pub fn set_fully_reachable(&mut self, node: NodeId, fully_reachable: bool) -> Result<()> {
        let offset = self.record(node)?;
        self.data
            .set_int(offset + FLAG_OFFSET, i32::from(fully_reachable))
    }

    pub fn get_fully_reachable(&self, node: NodeId) -> Result<bool> {
        let offset = self.record(node)?;
        match self.data.get_int(offset + FLAG_OFFSET)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::corrupt(
                self.data.path().display().to_string(),
                format!("fully reachable flag of node {node} is {other}"),
            )),
        }
    }

    /// Write the pointer index block. Runs after the last update, before flush.
    pub fn finalize_index(&mut self) -> Result<()> {
        self.index.write_block(&mut self.data, self.border_node_count)
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
