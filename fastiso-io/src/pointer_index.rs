//! Pointer index: border-node id to record offset
//!
//! Stored at offset 0 of a store payload as `count` consecutive 12-byte
//! entries `[node id: i32][offset: i64]`. There is no terminator; the count
//! kept in the store header is authoritative.

use rustc_hash::FxHashMap;

use fastiso_common::{Error, NodeId, Result};

use crate::codec;
use crate::data_access::DataAccess;

/// Bytes per serialized entry.
pub const POINTER_ENTRY_BYTES: u64 = 12;

#[derive(Debug, Default)]
pub struct PointerIndex {
    offsets: FxHashMap<NodeId, u64>,
}

impl PointerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(count: usize) -> Self {
        let mut offsets = FxHashMap::default();
        offsets.reserve(count);
        Self { offsets }
    }

    /// Size of an index block holding `count` entries.
    pub fn block_bytes(count: usize) -> u64 {
        count as u64 * POINTER_ENTRY_BYTES
    }

    /// Record where `node`'s record starts. Each node gets one entry.
    pub fn insert(&mut self, node: NodeId, offset: u64) -> Result<()> {
        if i32::try_from(node).is_err() {
            return Err(Error::InvalidArgument(format!(
                "node id {node} does not fit the 32-bit on-disk id"
            )));
        }
        if self.offsets.insert(node, offset).is_some() {
            return Err(Error::InvalidArgument(format!(
                "node {node} already has a pointer index entry"
            )));
        }
        Ok(())
    }

    pub fn offset(&self, node: NodeId) -> Option<u64> {
        self.offsets.get(&node).copied()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.offsets.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Serialize the entries into the block at the start of `store`.
    ///
    /// Entries are written in ascending node order so identical inputs give
    /// identical files.
    pub fn write_block(&self, store: &mut DataAccess, declared_count: usize) -> Result<()> {
        if self.offsets.len() != declared_count {
            return Err(Error::InvalidArgument(format!(
                "pointer index holds {} entries but {declared_count} were declared",
                self.offsets.len()
            )));
        }
        let mut entries: Vec<(NodeId, u64)> = self.offsets.iter().map(|(&n, &o)| (n, o)).collect();
        entries.sort_unstable_by_key(|&(node, _)| node);

        let mut block = Vec::with_capacity(Self::block_bytes(declared_count) as usize);
        for (node, offset) in entries {
            block.extend_from_slice(&codec::i32_to_bytes(node as i32));
            block.extend_from_slice(&codec::i64_to_bytes(offset as i64));
        }
        store.set_bytes(0, &block)
    }

    /// Read exactly `count` entries from the start of `store`.
    pub fn load_block(store: &DataAccess, count: usize) -> Result<Self> {
        let path = store.path().display().to_string();
        let block = store.bytes(0, Self::block_bytes(count) as usize)?;
        let limit = store.capacity() as u64;

        let mut index = Self::with_capacity(count);
        for entry in block.chunks_exact(POINTER_ENTRY_BYTES as usize) {
            let node = codec::bytes_to_i32(&entry[0..4])?;
            let offset = codec::bytes_to_i64(&entry[4..12])?;
            if node < 0 || offset < 0 || offset as u64 >= limit {
                return Err(Error::corrupt(
                    &path,
                    format!("invalid pointer index entry ({node}, {offset})"),
                ));
            }
            if index.offsets.insert(node as NodeId, offset as u64).is_some() {
                return Err(Error::corrupt(&path, format!("duplicate index entry for node {node}")));
            }
        }
        Ok(index)
    }
}
