//! Directory provider

// Imports
use {
	super::{DimmProvider, Topology},
	crate::{
		dimm::{Dimm, DimmId, SecurityState},
		error::DeviceError,
		platform::Platform,
		request::LabelVersion,
	},
	anyhow::Context,
	std::{fs, io, path::PathBuf},
};

/// Directory provider.
///
/// Stores the platform config data of each DIMM in `<dir>/<uid>.pcd`, and its
/// namespace label version in `<dir>/<uid>.labels`.
#[derive(Clone, Debug)]
pub struct DirProvider {
	/// Topology
	topology: Topology,

	/// Directory
	dir: PathBuf,
}

impl DirProvider {
	/// Creates a new provider, creating `dir` if it doesn't exist
	pub fn new(topology: Topology, dir: impl Into<PathBuf>) -> Result<Self, anyhow::Error> {
		let dir = dir.into();
		fs::create_dir_all(&dir).with_context(|| format!("Unable to create directory {dir:?}"))?;

		Ok(Self { topology, dir })
	}

	/// Returns the path of the file of `dimm` with `extension`
	fn path(&self, dimm: DimmId, extension: &str) -> Result<PathBuf, anyhow::Error> {
		let dimm = self.topology.dimm(dimm).context("DIMM is not part of the topology")?;
		Ok(self.dir.join(format!("{}.{extension}", dimm.uid)))
	}
}

impl DimmProvider for DirProvider {
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
		let path = self.path(dimm, "pcd").map_err(|source| DeviceError::Pcd { dimm, source })?;
		match fs::read(&path) {
			Ok(bytes) => Ok(Some(bytes)),
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(err) => Err(DeviceError::Pcd {
				dimm,
				source: anyhow::Error::new(err).context(format!("Unable to read {path:?}")),
			}),
		}
	}

	fn write_pcd(&mut self, dimm: DimmId, bytes: &[u8]) -> Result<(), DeviceError> {
		let path = self.path(dimm, "pcd").map_err(|source| DeviceError::Pcd { dimm, source })?;
		tracing::debug!(%dimm, ?path, len = bytes.len(), "Writing platform config data");
		fs::write(&path, bytes)
			.with_context(|| format!("Unable to write {path:?}"))
			.map_err(|source| DeviceError::Pcd { dimm, source })
	}

	fn init_labels(&mut self, dimm: DimmId, version: LabelVersion) -> Result<(), DeviceError> {
		let path = self
			.path(dimm, "labels")
			.map_err(|source| DeviceError::Labels { dimm, source })?;
		fs::write(&path, version.to_string())
			.with_context(|| format!("Unable to write {path:?}"))
			.map_err(|source| DeviceError::Labels { dimm, source })
	}
}
