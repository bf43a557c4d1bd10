//! DIMM management providers
//!
//! Everything the engine needs from the platform goes through [`DimmProvider`].

// Modules
mod dir;
mod memory;

// Exports
pub use self::{dir::DirProvider, memory::MemoryProvider};

// Imports
use crate::{
	dimm::{Dimm, DimmId, SecurityState},
	error::DeviceError,
	platform::Platform,
	request::LabelVersion,
};

/// DIMM management provider
pub trait DimmProvider {
	/// Returns the DIMM inventory, in platform order
	fn dimms(&self) -> &[Dimm];

	/// Returns the platform capability
	fn platform(&self) -> &Platform;

	/// Returns the current security state of `dimm`
	fn security_state(&self, dimm: DimmId) -> Result<SecurityState, DeviceError>;

	/// Returns if any namespace exists on `dimm`
	fn namespaces_exist(&self, dimm: DimmId) -> Result<bool, DeviceError>;

	/// Reads the platform config data of `dimm`.
	///
	/// Returns `None` if the DIMM has none.
	fn read_pcd(&self, dimm: DimmId) -> Result<Option<Vec<u8>>, DeviceError>;

	/// Writes the platform config data of `dimm`
	fn write_pcd(&mut self, dimm: DimmId, bytes: &[u8]) -> Result<(), DeviceError>;

	/// Initializes the namespace labels of `dimm`
	fn init_labels(&mut self, dimm: DimmId, version: LabelVersion) -> Result<(), DeviceError>;
}

/// Platform topology
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Topology {
	/// Platform capability
	#[serde(default)]
	pub platform: Platform,

	/// DIMMs
	pub dimms: Vec<Dimm>,

	/// DIMMs with namespaces
	#[serde(default)]
	pub namespaces: Vec<DimmId>,
}

impl Topology {
	/// Returns the DIMM `id`
	fn dimm(&self, id: DimmId) -> Option<&Dimm> {
		self.dimms.iter().find(|dimm| dimm.id == id)
	}

	/// Returns the security state of `dimm`
	fn security_state(&self, dimm: DimmId) -> Result<SecurityState, DeviceError> {
		self.dimm(dimm)
			.map(|dimm| dimm.security)
			.ok_or_else(|| DeviceError::Query {
				dimm,
				source: anyhow::anyhow!("DIMM is not part of the topology"),
			})
	}
}
