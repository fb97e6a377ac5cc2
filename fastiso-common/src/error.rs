//! Error types for fastiso operations
//!
//! One enum is shared by the storage and routing crates so that a query can
//! decide, per variant, whether to degrade to the exact search path.

use thiserror::Error;

use crate::NodeId;

/// Main error type for fastiso operations
#[derive(Debug, Error)]
pub enum Error {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A fixed-width decode was handed the wrong number of bytes
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Invalid parameters, rejected before any write happens
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Lookup of a node that has no pointer index entry
    #[error("node {node} has no entry in {store}")]
    NotFound { store: String, node: NodeId },

    /// Store built for a different weighting than the one requested
    #[error("store '{store}' was not built for weighting '{requested}'")]
    CostFunctionMismatch { store: String, requested: String },

    /// Truncated file, checksum failure, or inconsistent record layout
    #[error("corrupt store {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// Operation issued before `init`/`load_existing` or after `close`
    #[error("store {0} is not initialized")]
    NotInitialized(String),

    /// Mutation attempted on a store opened for serving
    #[error("store {0} is read-only")]
    ReadOnly(String),

    /// The reachability query settled more entries than allowed
    #[error("query aborted after {0} settled entries")]
    ExpansionLimit(usize),

    /// Invalid configuration file or value
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Errors a serving path recovers from by switching to the exact search.
    pub fn is_recoverable_at_query(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::Corrupt { .. }
                | Error::ExpansionLimit(_)
                | Error::CostFunctionMismatch { .. }
                | Error::NotInitialized(_)
                | Error::Io(_)
        )
    }
}

/// Convenience result type for fastiso operations
pub type Result<T> = std::result::Result<T, Error>;
