//! Configuration

// Imports
use {
	anyhow::Context,
	pmgoal::provider::Topology,
	std::{fs, path::Path},
};

/// Reads the topology at `path`
pub fn read(path: &Path) -> Result<Topology, anyhow::Error> {
	let file = fs::File::open(path).context("Unable to open config file")?;
	let topology = serde_json::from_reader::<_, Topology>(file).context("Unable to parse config file")?;
	tracing::debug!(dimms = topology.dimms.len(), sockets = topology.platform.sockets.len(), "Read topology");

	Ok(topology)
}
