//! Common types for the fastiso toolkit

pub mod config;
pub mod error;

pub use config::FastIsochroneConfig;
pub use error::{Error, Result};

/// Graph node identifier. Stored on disk as a 32-bit signed integer.
pub type NodeId = u32;

/// Partition cell identifier.
pub type CellId = u32;
