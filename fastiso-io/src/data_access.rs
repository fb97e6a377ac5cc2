//! Growable byte store persisted as a single checksummed file
//!
//! Format (little-endian):
//!
//! Header (64 bytes):
//!   magic:        u32 = 0x46494441  // "FIDA"
//!   version:      u16 = 1
//!   reserved:     u16 = 0
//!   payload_len:  u64
//!   slots:        [i32; 8]          // store-defined header values
//!   padding:      [u8; 16]
//!
//! Body (payload_len bytes)
//!
//! Footer (16 bytes):
//!   payload_crc64: u64
//!   file_crc64:    u64
//!
//! A store is either writable (heap buffer, filled during preparation) or
//! read-only (memory-mapped file, used while serving). Every access is bounds
//! checked against the payload.

use memmap2::Mmap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use fastiso_common::{Error, Result};

use crate::codec;
use crate::crc;

const MAGIC: u32 = 0x46494441; // "FIDA"
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 64;
const FOOTER_SIZE: usize = 16;

/// Number of i32 header slots available to the owning store.
pub const HEADER_SLOTS: usize = 8;

enum Backing {
    Closed,
    Heap(Vec<u8>),
    Mapped(Mmap),
}

pub struct DataAccess {
    path: PathBuf,
    backing: Backing,
    header: [i32; HEADER_SLOTS],
    /// One past the highest byte written; only this prefix is persisted.
    high_water: usize,
}

impl DataAccess {
    /// Handle for the store file at `path`. Nothing is read or allocated
    /// until [`create`](Self::create) or [`load_existing`](Self::load_existing).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            backing: Backing::Closed,
            header: [0; HEADER_SLOTS],
            high_water: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }

    /// Allocate a writable, zero-filled buffer of `initial_bytes`.
    pub fn create(&mut self, initial_bytes: usize) -> Result<()> {
        if !matches!(self.backing, Backing::Closed) {
            return Err(Error::InvalidArgument(format!(
                "store {} already open",
                self.name()
            )));
        }
        self.backing = Backing::Heap(vec![0u8; initial_bytes]);
        self.header = [0; HEADER_SLOTS];
        self.high_water = 0;
        Ok(())
    }

    /// Map an existing store file read-only. Returns `Ok(false)` when there is
    /// no file yet; a truncated or checksum-failing file is an error.
    pub fn load_existing(&mut self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let file = File::open(&self.path)?;
        // SAFETY: store files are written once by preparation and never
        // modified while a serving process has them mapped.
        let map = unsafe { Mmap::map(&file)? };

        if map.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::corrupt(self.name(), "file shorter than header"));
        }
        let magic = read_u32(&map[0..4]);
        if magic != MAGIC {
            return Err(Error::corrupt(
                self.name(),
                format!("invalid magic: expected 0x{MAGIC:08x}, got 0x{magic:08x}"),
            ));
        }
        let version = u16::from_le_bytes([map[4], map[5]]);
        if version != VERSION {
            return Err(Error::corrupt(
                self.name(),
                format!("unsupported version {version}"),
            ));
        }
        let payload_len = codec::bytes_to_i64(&map[8..16])? as u64;
        let expected = payload_len
            .checked_add((HEADER_SIZE + FOOTER_SIZE) as u64)
            .ok_or_else(|| {
                Error::corrupt(self.name(), format!("payload length {payload_len} out of range"))
            })?;
        if map.len() as u64 != expected {
            return Err(Error::corrupt(
                self.name(),
                format!("size mismatch: expected {expected} bytes, got {}", map.len()),
            ));
        }
        let payload_len = payload_len as usize;

        let header_bytes = &map[..HEADER_SIZE];
        let payload = &map[HEADER_SIZE..HEADER_SIZE + payload_len];
        let footer = &map[HEADER_SIZE + payload_len..];
        let (payload_crc, file_crc) = crc::footer(header_bytes, payload);
        if codec::bytes_to_i64(&footer[0..8])? as u64 != payload_crc
            || codec::bytes_to_i64(&footer[8..16])? as u64 != file_crc
        {
            return Err(Error::corrupt(self.name(), "checksum mismatch"));
        }

        let mut header = [0i32; HEADER_SLOTS];
        for (slot, value) in header.iter_mut().enumerate() {
            let at = 16 + slot * 4;
            *value = codec::bytes_to_i32(&map[at..at + 4])?;
        }

        self.header = header;
        self.high_water = payload_len;
        self.backing = Backing::Mapped(map);
        tracing::debug!(path = %self.path.display(), bytes = payload_len, "mapped store");
        Ok(true)
    }

    /// Grow a writable store to at least `bytes`. Never shrinks.
    pub fn ensure_capacity(&mut self, bytes: usize) -> Result<()> {
        let name = self.name();
        match &mut self.backing {
            Backing::Heap(buf) => {
                if buf.len() < bytes {
                    buf.resize(bytes, 0);
                }
                Ok(())
            }
            Backing::Mapped(_) => Err(Error::ReadOnly(name)),
            Backing::Closed => Err(Error::NotInitialized(name)),
        }
    }

    pub fn capacity(&self) -> usize {
        match &self.backing {
            Backing::Heap(buf) => buf.len(),
            Backing::Mapped(_) => self.high_water,
            Backing::Closed => 0,
        }
    }

    /// Bytes holding data: everything below the highest write.
    pub fn used_bytes(&self) -> usize {
        self.high_water
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self.backing, Backing::Mapped(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.backing, Backing::Closed)
    }

    pub fn set_header(&mut self, slot: usize, value: i32) -> Result<()> {
        if slot >= HEADER_SLOTS {
            return Err(Error::InvalidArgument(format!("header slot {slot} out of range")));
        }
        match self.backing {
            Backing::Heap(_) => {
                self.header[slot] = value;
                Ok(())
            }
            Backing::Mapped(_) => Err(Error::ReadOnly(self.name())),
            Backing::Closed => Err(Error::NotInitialized(self.name())),
        }
    }

    pub fn get_header(&self, slot: usize) -> Result<i32> {
        if self.is_closed() {
            return Err(Error::NotInitialized(self.name()));
        }
        self.header
            .get(slot)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("header slot {slot} out of range")))
    }

    fn readable(&self) -> Result<&[u8]> {
        match &self.backing {
            Backing::Heap(buf) => Ok(buf),
            Backing::Mapped(map) => Ok(&map[HEADER_SIZE..HEADER_SIZE + self.high_water]),
            Backing::Closed => Err(Error::NotInitialized(self.name())),
        }
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn bytes(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let data = self.readable()?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if end <= data.len() => Ok(&data[start..end]),
            _ => Err(Error::corrupt(
                self.name(),
                format!("read of {len} bytes at offset {offset} past end {}", data.len()),
            )),
        }
    }

    pub fn get_bytes(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let src = self.bytes(offset, out.len())?;
        out.copy_from_slice(src);
        Ok(())
    }

    pub fn set_bytes(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let name = self.name();
        let buf = match &mut self.backing {
            Backing::Heap(buf) => buf,
            Backing::Mapped(_) => return Err(Error::ReadOnly(name)),
            Backing::Closed => return Err(Error::NotInitialized(name)),
        };
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let end = match start.checked_add(data.len()) {
            Some(end) if end <= buf.len() => end,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "write of {} bytes at offset {offset} exceeds capacity {} of {name}",
                    data.len(),
                    buf.len()
                )))
            }
        };
        buf[start..end].copy_from_slice(data);
        self.high_water = self.high_water.max(end);
        Ok(())
    }

    pub fn get_int(&self, offset: u64) -> Result<i32> {
        codec::bytes_to_i32(self.bytes(offset, 4)?)
    }

    pub fn set_int(&mut self, offset: u64, value: i32) -> Result<()> {
        self.set_bytes(offset, &codec::i32_to_bytes(value))
    }

    pub fn get_long(&self, offset: u64) -> Result<i64> {
        codec::bytes_to_i64(self.bytes(offset, 8)?)
    }

    pub fn set_long(&mut self, offset: u64, value: i64) -> Result<()> {
        self.set_bytes(offset, &codec::i64_to_bytes(value))
    }

    pub fn get_double(&self, offset: u64) -> Result<f64> {
        codec::bytes_to_f64(self.bytes(offset, 8)?)
    }

    pub fn set_double(&mut self, offset: u64, value: f64) -> Result<()> {
        self.set_bytes(offset, &codec::f64_to_bytes(value))
    }

    /// Write header, used payload and checksums to the store file.
    pub fn flush(&mut self) -> Result<()> {
        let payload = match &self.backing {
            Backing::Heap(buf) => &buf[..self.high_water],
            Backing::Mapped(_) => return Err(Error::ReadOnly(self.name())),
            Backing::Closed => return Err(Error::NotInitialized(self.name())),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        for value in self.header {
            header.extend_from_slice(&value.to_le_bytes());
        }
        header.resize(HEADER_SIZE, 0);

        let (payload_crc, file_crc) = crc::footer(&header, payload);

        let mut writer = BufWriter::new(File::create(&self.path)?);
        writer.write_all(&header)?;
        writer.write_all(payload)?;
        writer.write_all(&payload_crc.to_le_bytes())?;
        writer.write_all(&file_crc.to_le_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        tracing::debug!(path = %self.path.display(), bytes = payload.len(), "flushed store");
        Ok(())
    }

    /// Release the buffer or mapping. Further access fails with `NotInitialized`.
    pub fn close(&mut self) {
        self.backing = Backing::Closed;
        self.high_water = 0;
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
