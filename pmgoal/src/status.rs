//! Command status
//!
//! Every operation reports an aggregate code plus any number of per-object codes.
//! Partial success across DIMMs is common, so callers must inspect both.

// Imports
use {
	crate::dimm::{DimmId, SocketId},
	std::fmt,
};

/// Status code
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(u16)]
pub enum StatusCode {
	Success                          = 0,
	OperationNotStarted              = 2,
	OperationFailed                  = 3,
	InvalidParameter                 = 5,
	DimmNotFound                     = 11,
	DimmIdDuplicated                 = 12,
	SocketIdNotValid                 = 13,
	DimmSocketMismatch               = 14,
	SocketIdDuplicated               = 15,
	ConfigNotSupportedByCurrentSku   = 16,
	ManageableDimmNotFound           = 17,
	DimmExcluded                     = 18,
	CreateGoalNotAllowed             = 36,
	InvalidSecurityState             = 37,
	DeviceBusy                       = 52,
	GoalCreationSecurityUnlocked     = 97,
	MaxPmInterleaveSetsExceeded      = 98,
	AdNiInterleaveSetsReduced        = 101,
	ImcDdrPmmNotPaired               = 104,
	PcdBadDeviceConfig               = 105,
	GoalConfAffectsUnspecDimm        = 106,
	ConfApplyingFailed               = 109,
	ConfUnsupportedConfig            = 110,
	PlatformNotSupportMemoryMode     = 113,
	PlatformNotSupportPmMode         = 114,
	SizeTooSmallForIntSetAlignment   = 116,
	PlatformNotSupportDefaultIntSize = 118,
	NoGoalExistsOnDimm               = 122,
	ReserveDimmRequiresTwoDimms      = 123,
	GoalNamespaceExists              = 124,
	PersMemMustBeAppliedToAllDimms   = 126,
	MappedMemReducedDueToCpuSku      = 127,
	DumpNoConfiguredDimms            = 131,
	DumpFileOperationFailed          = 132,
	LoadVersion                      = 140,
	LoadInvalidDataInFile            = 141,
	LoadDimmCountMismatch            = 148,
	DimmSkuModeMismatch              = 151,
	NoneDimmFulfillsCriteria         = 168,
	FailedToInitNsLabels             = 188,
	NmFmRatioLowerViolation          = 227,
	NmFmRatioUpperViolation          = 228,
}

impl StatusCode {
	/// Returns the numeric value of this code
	#[must_use]
	pub const fn to_u16(self) -> u16 {
		self as u16
	}

	/// Returns if this code is a warning
	#[must_use]
	pub const fn is_warning(self) -> bool {
		matches!(
			self,
			Self::GoalCreationSecurityUnlocked |
				Self::MaxPmInterleaveSetsExceeded |
				Self::AdNiInterleaveSetsReduced |
				Self::ImcDdrPmmNotPaired |
				Self::MappedMemReducedDueToCpuSku |
				Self::NmFmRatioLowerViolation |
				Self::NmFmRatioUpperViolation
		)
	}

	/// Returns if this code is an error
	#[must_use]
	pub const fn is_error(self) -> bool {
		!matches!(self, Self::Success) && !self.is_warning()
	}

	/// Returns a description of this code
	#[must_use]
	pub const fn description(self) -> &'static str {
		match self {
			Self::Success => "Success",
			Self::OperationNotStarted => "Operation not started",
			Self::OperationFailed => "Operation failed",
			Self::InvalidParameter => "Invalid parameter",
			Self::DimmNotFound => "DIMM not found",
			Self::DimmIdDuplicated => "DIMM id duplicated",
			Self::SocketIdNotValid => "Socket id not valid",
			Self::DimmSocketMismatch => "DIMM does not lie on any of the requested sockets",
			Self::SocketIdDuplicated => "Socket id duplicated",
			Self::ConfigNotSupportedByCurrentSku => "Configuration not supported by the DIMM SKU",
			Self::ManageableDimmNotFound => "Manageable DIMM not found",
			Self::DimmExcluded => "DIMM excluded by its state",
			Self::CreateGoalNotAllowed => "Create goal not allowed, a goal is already pending",
			Self::InvalidSecurityState => "Invalid security state",
			Self::DeviceBusy => "Device busy",
			Self::GoalCreationSecurityUnlocked => "Goal will not be applied unless security is disabled",
			Self::MaxPmInterleaveSetsExceeded => "Interleave sets exceed the platform limit per die",
			Self::AdNiInterleaveSetsReduced => "Non-interleaved AppDirect regions dropped due to the interleave set limit",
			Self::ImcDdrPmmNotPaired => "Memory mode not allowed by the platform DDR population",
			Self::PcdBadDeviceConfig => "Platform config data is corrupt",
			Self::GoalConfAffectsUnspecDimm => "Goal affects an unspecified DIMM",
			Self::ConfApplyingFailed => "Failed to apply goal",
			Self::ConfUnsupportedConfig => "Unsupported configuration",
			Self::PlatformNotSupportMemoryMode => "Platform does not support memory mode",
			Self::PlatformNotSupportPmMode => "Platform does not support persistent memory mode",
			Self::SizeTooSmallForIntSetAlignment => "Region size too small for the interleave set alignment",
			Self::PlatformNotSupportDefaultIntSize => "Platform does not support the interleave format",
			Self::NoGoalExistsOnDimm => "No goal exists on DIMM",
			Self::ReserveDimmRequiresTwoDimms => "Reserving a DIMM requires at least two DIMMs",
			Self::GoalNamespaceExists => "Namespaces exist on DIMM",
			Self::PersMemMustBeAppliedToAllDimms => "Persistent memory must be applied to all DIMMs",
			Self::MappedMemReducedDueToCpuSku => "Mapped memory reduced due to the CPU SKU limit",
			Self::DumpNoConfiguredDimms => "No DIMM has a goal to dump",
			Self::DumpFileOperationFailed => "Dump file operation failed",
			Self::LoadVersion => "Unsupported dump file version",
			Self::LoadInvalidDataInFile => "Invalid data in dump file",
			Self::LoadDimmCountMismatch => "DIMMs in dump file don't match the platform",
			Self::DimmSkuModeMismatch => "DIMM SKU modes mismatch",
			Self::NoneDimmFulfillsCriteria => "No DIMM fulfills the criteria",
			Self::FailedToInitNsLabels => "Failed to initialize namespace labels",
			Self::NmFmRatioLowerViolation => "Near memory to far memory ratio below the platform bound",
			Self::NmFmRatioUpperViolation => "Near memory to far memory ratio above the platform bound",
		}
	}
}

impl fmt::Display for StatusCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.description(), self.to_u16())
	}
}

/// Object a status entry refers to
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectId {
	Dimm(DimmId),
	Socket(SocketId),
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Dimm(dimm) => write!(f, "DIMM {dimm}"),
			Self::Socket(socket) => write!(f, "Socket {socket}"),
		}
	}
}

impl From<DimmId> for ObjectId {
	fn from(dimm: DimmId) -> Self {
		Self::Dimm(dimm)
	}
}

impl From<SocketId> for ObjectId {
	fn from(socket: SocketId) -> Self {
		Self::Socket(socket)
	}
}

/// Status of a single object
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct ObjectStatus {
	/// Object
	pub object: ObjectId,

	/// Code
	pub code: StatusCode,
}

/// Command status
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CommandStatus {
	/// Aggregate code
	code: StatusCode,

	/// Per-object codes, in the order they were recorded
	objects: Vec<ObjectStatus>,
}

impl CommandStatus {
	/// Creates a new, not yet started, status
	#[must_use]
	pub const fn new() -> Self {
		Self {
			code:    StatusCode::OperationNotStarted,
			objects: vec![],
		}
	}

	/// Returns the aggregate code
	#[must_use]
	pub const fn code(&self) -> StatusCode {
		self.code
	}

	/// Sets the aggregate code
	pub fn set_code(&mut self, code: StatusCode) {
		self.code = code;
	}

	/// Returns all per-object entries
	#[must_use]
	pub fn objects(&self) -> &[ObjectStatus] {
		&self.objects
	}

	/// Records `code` for `object`.
	///
	/// Identical entries are only recorded once.
	pub fn push(&mut self, object: impl Into<ObjectId>, code: StatusCode) {
		let entry = ObjectStatus {
			object: object.into(),
			code,
		};
		if !self.objects.contains(&entry) {
			self.objects.push(entry);
		}
	}

	/// Returns all codes recorded for `object`
	pub fn codes_for(&self, object: impl Into<ObjectId>) -> impl Iterator<Item = StatusCode> + '_ {
		let object = object.into();
		self.objects
			.iter()
			.filter(move |entry| entry.object == object)
			.map(|entry| entry.code)
	}

	/// Returns if `code` was recorded for any object
	#[must_use]
	pub fn contains(&self, code: StatusCode) -> bool {
		self.objects.iter().any(|entry| entry.code == code)
	}

	/// Returns all warnings
	pub fn warnings(&self) -> impl Iterator<Item = &ObjectStatus> + '_ {
		self.objects.iter().filter(|entry| entry.code.is_warning())
	}

	/// Returns all per-object errors
	pub fn errors(&self) -> impl Iterator<Item = &ObjectStatus> + '_ {
		self.objects.iter().filter(|entry| entry.code.is_error())
	}

	/// Returns if the aggregate code is a success
	#[must_use]
	pub fn is_success(&self) -> bool {
		self.code == StatusCode::Success
	}

	/// Merges all per-object entries of `other` into this status.
	///
	/// An error aggregate code in `other` replaces this one.
	pub fn merge(&mut self, other: Self) {
		if other.code.is_error() || self.code == StatusCode::OperationNotStarted {
			self.code = other.code;
		}
		for entry in other.objects {
			self.push(entry.object, entry.code);
		}
	}
}

impl Default for CommandStatus {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for CommandStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "Status: {}", self.code)?;
		for entry in &self.objects {
			writeln!(f, "  {}: {}", entry.object, entry.code)?;
		}

		Ok(())
	}
}
