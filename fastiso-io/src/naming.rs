//! Deterministic store file names
//!
//! One file per store kind per weighting. The weighting descriptor is
//! lowercased and every separator is replaced with `_`, so rebuilding the
//! same profile always lands on the same file.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    BorderNodeDistances,
    Eccentricities,
}

impl StoreKind {
    pub fn prefix(self) -> &'static str {
        match self {
            StoreKind::BorderNodeDistances => "bordernodedistances",
            StoreKind::Eccentricities => "eccentricities",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// File name for `kind` built for the weighting described by `descriptor`.
pub fn store_file_name(kind: StoreKind, descriptor: &str) -> String {
    let mut name = String::with_capacity(kind.prefix().len() + 1 + descriptor.len());
    name.push_str(kind.prefix());
    name.push('_');
    for c in descriptor.trim().chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else {
            name.push('_');
        }
    }
    name
}

pub fn store_path(dir: &Path, kind: StoreKind, descriptor: &str) -> PathBuf {
    dir.join(store_file_name(kind, descriptor))
}
