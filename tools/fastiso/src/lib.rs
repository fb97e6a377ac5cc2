//! Command-line front end for the fast-isochrone index

pub mod graph_file;

use anyhow::{bail, Result};

use fastiso_routing::{FastestWeighting, ShortestWeighting, Weighting};

pub use graph_file::{load_graph, parse_graph, GraphFile};

/// Weighting by name: `fastest` (travel time) or `shortest` (length).
pub fn weighting_from_name(name: &str, profile: &str) -> Result<Box<dyn Weighting>> {
    match name {
        "fastest" => Ok(Box::new(FastestWeighting::new(profile))),
        "shortest" => Ok(Box::new(ShortestWeighting::new(profile))),
        other => bail!("unknown weighting '{other}' (expected fastest or shortest)"),
    }
}
