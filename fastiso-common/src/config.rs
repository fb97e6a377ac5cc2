//! Preparation and query limits, loaded from TOML
//!
//! ```toml
//! storage_dir = "data/fastiso"
//! max_cell_nodes = 5000
//! max_query_settled = 2000000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FastIsochroneConfig {
    /// Directory holding the prepared store files
    pub storage_dir: PathBuf,
    /// Upper bound on nodes per cell produced by the partitioner
    pub max_cell_nodes: usize,
    /// Settled-node cap multiplier for the out-of-cell eccentricity rerun
    pub eccentricity_search_factor: usize,
    /// Hard cap on entries settled by one reachability query
    pub max_query_settled: usize,
    /// Preparation worker threads (0 = rayon default)
    pub threads: usize,
}

impl Default for FastIsochroneConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("fastiso-data"),
            max_cell_nodes: 5000,
            eccentricity_search_factor: 10,
            max_query_settled: 5_000_000,
            threads: 0,
        }
    }
}

impl FastIsochroneConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_cell_nodes == 0 {
            return Err(Error::Config("max_cell_nodes must be positive".into()));
        }
        if self.eccentricity_search_factor == 0 {
            return Err(Error::Config("eccentricity_search_factor must be positive".into()));
        }
        if self.max_query_settled == 0 {
            return Err(Error::Config("max_query_settled must be positive".into()));
        }
        Ok(())
    }

    /// Settled-node cap for the eccentricity rerun outside the cell.
    pub fn eccentricity_search_limit(&self) -> usize {
        self.max_cell_nodes.saturating_mul(self.eccentricity_search_factor)
    }
}
