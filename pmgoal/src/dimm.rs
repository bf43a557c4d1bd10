//! DIMMs

// Imports
use {
	bitflags::bitflags,
	extend::ext,
	std::fmt,
};

/// DIMM handle
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DimmId(u16);

impl DimmId {
	/// Creates a new DIMM id from a handle
	#[must_use]
	pub const fn new(handle: u16) -> Self {
		Self(handle)
	}

	/// Returns the handle of this DIMM
	#[must_use]
	pub const fn to_u16(self) -> u16 {
		self.0
	}
}

impl fmt::Display for DimmId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{:04x}", self.0)
	}
}

/// Socket id
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SocketId(u16);

impl SocketId {
	/// Creates a new socket id
	#[must_use]
	pub const fn new(id: u16) -> Self {
		Self(id)
	}

	/// Returns the index of this socket
	#[must_use]
	pub const fn to_u16(self) -> u16 {
		self.0
	}
}

impl fmt::Display for SocketId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{:04x}", self.0)
	}
}

/// DIMM unique identifier.
///
/// Platform config data refers to DIMMs only by this id, never by handle.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Default, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct DimmUid {
	/// Manufacturer id
	pub manufacturer_id: u16,

	/// Manufacturing location
	#[serde(default)]
	pub location: u8,

	/// Manufacturing date (year and week)
	#[serde(default)]
	pub date: u16,

	/// Serial number
	pub serial: u32,
}

impl fmt::Display for DimmUid {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{:04x}-{:02x}-{:04x}-{:08x}",
			self.manufacturer_id, self.location, self.date, self.serial
		)
	}
}

/// DIMM SKU capabilities
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Sku {
	/// Memory mode enabled
	pub memory_mode: bool,

	/// AppDirect mode enabled
	pub app_direct: bool,

	/// Package sparing capable
	#[serde(default)]
	pub package_sparing: bool,
}

impl Default for Sku {
	fn default() -> Self {
		Self {
			memory_mode:     true,
			app_direct:      true,
			package_sparing: false,
		}
	}
}

bitflags! {
	/// Security state
	#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
	#[derive(serde::Serialize, serde::Deserialize)]
	#[serde(transparent)]
	pub struct SecurityState: u16 {
		/// Passphrase security enabled
		const ENABLED = 1 << 0;
		/// Locked
		const LOCKED = 1 << 1;
		/// Frozen until the next power cycle
		const FROZEN = 1 << 2;
		/// User passphrase attempt count expired
		const COUNT_EXPIRED = 1 << 3;
		/// Master passphrase enabled
		const MASTER_ENABLED = 1 << 4;
		/// Master passphrase attempt count expired
		const MASTER_COUNT_EXPIRED = 1 << 5;
	}
}

impl SecurityState {
	/// Returns if this state forbids configuring the DIMM
	#[must_use]
	pub fn forbids_configuration(self) -> bool {
		self.intersects(Self::LOCKED | Self::FROZEN | Self::COUNT_EXPIRED | Self::MASTER_COUNT_EXPIRED)
	}

	/// Returns if goals on this DIMM only apply once security is disabled
	#[must_use]
	pub fn requires_disable(self) -> bool {
		self.contains(Self::ENABLED) && !self.forbids_configuration()
	}
}

/// Population state
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Population {
	/// Installed in a supported slot combination
	#[default]
	Valid,

	/// Population violation, capacity still mapped
	Violation,

	/// Population violation, capacity not mapped
	UnmappedViolation,
}

/// DIMM
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Dimm {
	/// Handle
	pub id: DimmId,

	/// Unique id
	pub uid: DimmUid,

	/// Socket
	pub socket: SocketId,

	/// Die within the socket
	#[serde(default)]
	pub die: u8,

	/// Memory controller
	#[serde(default)]
	pub imc: u8,

	/// Channel
	#[serde(default)]
	pub channel: u8,

	/// Slot
	#[serde(default)]
	pub slot: u8,

	/// Raw capacity (in bytes)
	pub raw_capacity: u64,

	/// SKU
	#[serde(default)]
	pub sku: Sku,

	/// Manageable by this tool
	#[serde(default = "default_true")]
	pub manageable: bool,

	/// Functional (healthy enough to be configured)
	#[serde(default = "default_true")]
	pub functional: bool,

	/// Population state
	#[serde(default)]
	pub population: Population,

	/// Security state
	#[serde(default)]
	pub security: SecurityState,

	/// Volatile capacity currently mapped into the system address space
	#[serde(default)]
	pub mapped_volatile: u64,

	/// Persistent capacity currently mapped into the system address space
	#[serde(default)]
	pub mapped_persistent: u64,
}

impl Dimm {
	/// Creates a new, healthy and unconfigured, DIMM
	#[must_use]
	pub fn new(id: DimmId, uid: DimmUid, socket: SocketId, raw_capacity: u64) -> Self {
		Self {
			id,
			uid,
			socket,
			die: 0,
			imc: 0,
			channel: 0,
			slot: 0,
			raw_capacity,
			sku: Sku::default(),
			manageable: true,
			functional: true,
			population: Population::Valid,
			security: SecurityState::empty(),
			mapped_volatile: 0,
			mapped_persistent: 0,
		}
	}

	/// Returns if this DIMM currently has a configuration applied
	#[must_use]
	pub const fn is_configured(&self) -> bool {
		self.mapped_volatile > 0 || self.mapped_persistent > 0
	}

	/// Returns if this DIMM violates population rules
	#[must_use]
	pub fn has_population_violation(&self) -> bool {
		self.population != Population::Valid
	}
}

fn default_true() -> bool {
	true
}

/// Extension methods for lists of DIMMs
#[ext(name = DimmsExt)]
pub impl<T: AsRef<Dimm>> [T] {
	/// Returns the total raw capacity of all DIMMs
	fn total_raw_capacity(&self) -> u64 {
		self.iter().map(|dimm| dimm.as_ref().raw_capacity).sum()
	}

	/// Returns the sockets of all DIMMs, in first-seen order
	fn sockets(&self) -> Vec<SocketId> {
		let mut sockets = vec![];
		for dimm in self {
			let socket = dimm.as_ref().socket;
			if !sockets.contains(&socket) {
				sockets.push(socket);
			}
		}

		sockets
	}
}

impl AsRef<Dimm> for Dimm {
	fn as_ref(&self) -> &Dimm {
		self
	}
}
