//! CRC-64 checksums for store files
//!
//! Store files end with two checksums: one over the payload alone and one
//! over header plus payload, so a torn header is told apart from a torn body.

use crc::{Crc, CRC_64_GO_ISO};

/// CRC-64-ISO algorithm
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Checksum of a single contiguous slice.
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Footer checksums for a store file: `(payload_crc, file_crc)`.
pub fn footer(header: &[u8], payload: &[u8]) -> (u64, u64) {
    let payload_crc = checksum(payload);
    let mut file = Digest::new();
    file.update(header);
    file.update(payload);
    (payload_crc, file.finalize())
}

/// Incremental CRC-64 digest
pub struct Digest {
    digest: crc::Digest<'static, u64>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}
