//! Binary formats and I/O infrastructure for fastiso
//!
//! - [`codec`]: fixed-width numeric encode/decode
//! - [`data_access`]: growable byte store persisted as one checksummed file
//! - [`pointer_index`]: border-node id to record offset block
//! - [`naming`]: deterministic store file names per weighting

pub mod codec;
pub mod crc;
pub mod data_access;
pub mod naming;
pub mod pointer_index;

pub use data_access::DataAccess;
pub use naming::{store_file_name, StoreKind};
pub use pointer_index::{PointerIndex, POINTER_ENTRY_BYTES};
