//! In-memory provider

// Imports
use {
	super::{DimmProvider, Topology},
	crate::{
		dimm::{Dimm, DimmId, SecurityState},
		error::DeviceError,
		platform::Platform,
		request::LabelVersion,
	},
	std::collections::BTreeMap,
};

/// In-memory provider.
///
/// Keeps all platform config data in memory and records every write, to
/// replay a platform in tests.
#[derive(Clone, Debug)]
pub struct MemoryProvider {
	/// Topology
	topology: Topology,

	/// Platform config data of each DIMM
	pcds: BTreeMap<DimmId, Vec<u8>>,

	/// DIMMs written to, in order
	writes: Vec<DimmId>,

	/// Label initializations, in order
	label_inits: Vec<(DimmId, LabelVersion)>,

	/// DIMM whose writes fail
	fail_writes_on: Option<DimmId>,
}

impl MemoryProvider {
	/// Creates a new provider with no platform config data
	#[must_use]
	pub fn new(platform: Platform, dimms: Vec<Dimm>) -> Self {
		Self::from_topology(Topology {
			platform,
			dimms,
			namespaces: vec![],
		})
	}

	/// Creates a new provider from a topology
	#[must_use]
	pub fn from_topology(topology: Topology) -> Self {
		Self {
			topology,
			pcds: BTreeMap::new(),
			writes: vec![],
			label_inits: vec![],
			fail_writes_on: None,
		}
	}

	/// Returns the platform config data of `dimm`
	#[must_use]
	pub fn pcd(&self, dimm: DimmId) -> Option<&[u8]> {
		self.pcds.get(&dimm).map(Vec::as_slice)
	}

	/// Replaces the platform config data of `dimm`, without recording a write
	pub fn set_pcd(&mut self, dimm: DimmId, bytes: Vec<u8>) {
		self.pcds.insert(dimm, bytes);
	}

	/// Returns all DIMMs written to, in order
	#[must_use]
	pub fn writes(&self) -> &[DimmId] {
		&self.writes
	}

	/// Returns all label initializations, in order
	#[must_use]
	pub fn label_inits(&self) -> &[(DimmId, LabelVersion)] {
		&self.label_inits
	}

	/// Forgets all recorded writes and label initializations
	pub fn clear_log(&mut self) {
		self.writes.clear();
		self.label_inits.clear();
	}

	/// Makes all writes to `dimm` fail
	pub fn fail_writes_on(&mut self, dimm: Option<DimmId>) {
		self.fail_writes_on = dimm;
	}

	/// Sets whether `dimm` has namespaces
	pub fn set_namespaces(&mut self, dimm: DimmId, exist: bool) {
		let namespaces = &mut self.topology.namespaces;
		namespaces.retain(|&id| id != dimm);
		if exist {
			namespaces.push(dimm);
		}
	}

	/// Returns the DIMM `id`
	pub fn dimm_mut(&mut self, id: DimmId) -> Option<&mut Dimm> {
		self.topology.dimms.iter_mut().find(|dimm| dimm.id == id)
	}

	/// Returns the platform capability
	pub fn platform_mut(&mut self) -> &mut Platform {
		&mut self.topology.platform
	}
}

impl DimmProvider for MemoryProvider {
	fn dimms(&self) -> &[Dimm] {
		&self.topology.dimms
	}

	fn platform(&self) -> &Platform {
		&self.topology.platform
	}

	fn security_state(&self, dimm: DimmId) -> Result<SecurityState, DeviceError> {
		self.topology.security_state(dimm)
	}

	fn namespaces_exist(&self, dimm: DimmId) -> Result<bool, DeviceError> {
		Ok(self.topology.namespaces.contains(&dimm))
	}

	fn read_pcd(&self, dimm: DimmId) -> Result<Option<Vec<u8>>, DeviceError> {
		Ok(self.pcds.get(&dimm).cloned())
	}

	fn write_pcd(&mut self, dimm: DimmId, bytes: &[u8]) -> Result<(), DeviceError> {
		if self.fail_writes_on == Some(dimm) {
			return Err(DeviceError::Busy(dimm));
		}

		self.pcds.insert(dimm, bytes.to_vec());
		self.writes.push(dimm);
		Ok(())
	}

	fn init_labels(&mut self, dimm: DimmId, version: LabelVersion) -> Result<(), DeviceError> {
		self.label_inits.push((dimm, version));
		Ok(())
	}
}
