//! Errors

// Imports
use {
	crate::{
		dimm::{DimmId, SocketId},
		select::SelectFilter,
		status::StatusCode,
	},
	std::path::PathBuf,
};

/// Goal error
#[derive(Debug, thiserror::Error)]
pub enum GoalError {
	/// Bad request parameters
	#[error("Invalid parameter: {0}")]
	Parameter(#[from] ParameterError),

	/// DIMM selection failed
	#[error("Invalid selection: {0}")]
	Selection(#[from] SelectionError),

	/// DIMM or goal state forbids the request
	#[error("Invalid state: {0}")]
	State(#[from] StateError),

	/// Platform or SKU constraint violated
	#[error("Platform constraint violated: {0}")]
	PlatformConstraint(#[from] PlatformConstraintError),

	/// Not enough resources to satisfy the request
	#[error("Insufficient resources: {0}")]
	Resource(#[from] ResourceError),

	/// Device access failed
	#[error("Device error: {0}")]
	Device(#[from] DeviceError),
}

impl GoalError {
	/// Returns the status code for this error
	#[must_use]
	pub fn code(&self) -> StatusCode {
		match self {
			Self::Parameter(err) => err.code(),
			Self::Selection(err) => err.code(),
			Self::State(err) => err.code(),
			Self::PlatformConstraint(err) => err.code(),
			Self::Resource(err) => err.code(),
			Self::Device(err) => err.code(),
		}
	}
}

/// Parameter error
#[derive(Debug, thiserror::Error)]
pub enum ParameterError {
	#[error("{what} percentage {percent} exceeds 100")]
	PercentOutOfRange { what: &'static str, percent: u32 },

	#[error("Volatile ({volatile}%) and reserved ({reserved}%) percentages add up to more than 100")]
	PercentSumOutOfRange { volatile: u32, reserved: u32 },

	#[error("Selection filter {0:?} contains mutually exclusive predicates")]
	ExclusiveFilter(SelectFilter),

	#[error("Reserving a DIMM requires at least two DIMMs on socket {socket}")]
	ReserveDimmRequiresTwoDimms { socket: SocketId },

	#[error("Unsupported label version {major}.{minor}")]
	LabelVersion { major: u16, minor: u16 },

	#[error("Unsupported dump file version {0}")]
	DumpVersion(u32),

	#[error("Invalid dump file {path:?}: {reason}")]
	DumpData { path: PathBuf, reason: String },
}

impl ParameterError {
	fn code(&self) -> StatusCode {
		match self {
			Self::ReserveDimmRequiresTwoDimms { .. } => StatusCode::ReserveDimmRequiresTwoDimms,
			Self::DumpVersion(_) => StatusCode::LoadVersion,
			Self::DumpData { .. } => StatusCode::LoadInvalidDataInFile,
			_ => StatusCode::InvalidParameter,
		}
	}
}

/// Selection error
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
	#[error("Duplicated ids: DIMMs {dimms:?}, sockets {sockets:?}")]
	Duplicated { dimms: Vec<DimmId>, sockets: Vec<SocketId> },

	#[error("Unknown ids: DIMMs {dimms:?}, sockets {sockets:?}")]
	Unknown { dimms: Vec<DimmId>, sockets: Vec<SocketId> },

	#[error("DIMMs {0:?} do not lie on any of the requested sockets")]
	SocketMismatch(Vec<DimmId>),

	#[error("DIMMs {0:?} are excluded by their state")]
	Excluded(Vec<DimmId>),

	#[error("No DIMM fulfills the criteria")]
	NotFound,

	#[error("No DIMM has a goal to dump")]
	NothingToDump,

	#[error("Socket {socket} has {found} DIMMs, expected {expected}")]
	DimmCountMismatch { socket: SocketId, expected: usize, found: usize },
}

impl SelectionError {
	fn code(&self) -> StatusCode {
		match self {
			Self::Duplicated { dimms, .. } if !dimms.is_empty() => StatusCode::DimmIdDuplicated,
			Self::Duplicated { .. } => StatusCode::SocketIdDuplicated,
			Self::Unknown { dimms, .. } if !dimms.is_empty() => StatusCode::DimmNotFound,
			Self::Unknown { .. } => StatusCode::SocketIdNotValid,
			Self::SocketMismatch(_) => StatusCode::DimmSocketMismatch,
			Self::Excluded(_) => StatusCode::DimmExcluded,
			Self::NotFound => StatusCode::NoneDimmFulfillsCriteria,
			Self::NothingToDump => StatusCode::DumpNoConfiguredDimms,
			Self::DimmCountMismatch { .. } => StatusCode::LoadDimmCountMismatch,
		}
	}
}

/// State error
#[derive(Debug, thiserror::Error)]
pub enum StateError {
	#[error("DIMM {0} security state forbids configuration")]
	SecurityLocked(DimmId),

	#[error("A goal is already pending on socket {0}")]
	GoalPending(SocketId),

	#[error("Namespaces exist on DIMM {0}")]
	NamespaceExists(DimmId),

	#[error("Socket {0} must be configured as a whole, or only its unconfigured DIMMs")]
	UnsupportedConfig(SocketId),

	#[error("Goals affect unspecified DIMMs {0:?}")]
	AffectsUnspecifiedDimms(Vec<DimmId>),

	#[error("No goal exists on the specified DIMMs")]
	NoGoal,
}

impl StateError {
	fn code(&self) -> StatusCode {
		match self {
			Self::SecurityLocked(_) => StatusCode::InvalidSecurityState,
			Self::GoalPending(_) => StatusCode::CreateGoalNotAllowed,
			Self::NamespaceExists(_) => StatusCode::GoalNamespaceExists,
			Self::UnsupportedConfig(_) => StatusCode::ConfUnsupportedConfig,
			Self::AffectsUnspecifiedDimms(_) => StatusCode::GoalConfAffectsUnspecDimm,
			Self::NoGoal => StatusCode::NoGoalExistsOnDimm,
		}
	}
}

/// Platform constraint error
#[derive(Debug, thiserror::Error)]
pub enum PlatformConstraintError {
	#[error("DIMM {0} SKU modes differ from the other DIMMs")]
	MixedSku(DimmId),

	#[error("DIMM {dimm} SKU doesn't support {mode}")]
	SkuNotSupported { dimm: DimmId, mode: &'static str },

	#[error("Platform doesn't support memory mode")]
	MemoryModeNotSupported,

	#[error("Platform doesn't support AppDirect")]
	AppDirectNotSupported,

	#[error("Platform doesn't support an interleave format for {dimms} DIMMs")]
	UnsupportedInterleave { dimms: usize },

	#[error("Interleave set of {size} bytes over {dimms} DIMMs is not aligned to the interleave alignment")]
	InterleaveAlignment { size: u64, dimms: usize },
}

impl PlatformConstraintError {
	fn code(&self) -> StatusCode {
		match self {
			Self::MixedSku(_) => StatusCode::DimmSkuModeMismatch,
			Self::SkuNotSupported { .. } => StatusCode::ConfigNotSupportedByCurrentSku,
			Self::MemoryModeNotSupported => StatusCode::PlatformNotSupportMemoryMode,
			Self::AppDirectNotSupported => StatusCode::PlatformNotSupportPmMode,
			Self::UnsupportedInterleave { .. } => StatusCode::PlatformNotSupportDefaultIntSize,
			Self::InterleaveAlignment { .. } => StatusCode::SizeTooSmallForIntSetAlignment,
		}
	}
}

/// Resource error
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
	#[error("Persistent memory must be applied to all DIMMs, DIMM {0} has none left")]
	PersistentNotOnAllDimms(DimmId),

	#[error("DIMMs on socket {0} are too small to hold both volatile and persistent capacity")]
	InsufficientCapacity(SocketId),

	#[error("Unable to take {remaining} more bytes out of the requested capacity")]
	UnableToReduce { remaining: u64 },
}

impl ResourceError {
	fn code(&self) -> StatusCode {
		match self {
			Self::PersistentNotOnAllDimms(_) => StatusCode::PersMemMustBeAppliedToAllDimms,
			_ => StatusCode::OperationFailed,
		}
	}
}

/// Device error
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
	#[error("Unable to access platform config data of DIMM {dimm}")]
	Pcd {
		dimm:   DimmId,
		#[source]
		source: anyhow::Error,
	},

	#[error("Platform config data of DIMM {dimm} is corrupt")]
	CorruptPcd {
		dimm:   DimmId,
		#[source]
		source: anyhow::Error,
	},

	#[error("Unable to initialize namespace labels of DIMM {dimm}")]
	Labels {
		dimm:   DimmId,
		#[source]
		source: anyhow::Error,
	},

	#[error("Unable to query DIMM {dimm}")]
	Query {
		dimm:   DimmId,
		#[source]
		source: anyhow::Error,
	},

	#[error("DIMM {0} is busy")]
	Busy(DimmId),

	#[error("Unable to access file {path:?}")]
	File {
		path:   PathBuf,
		#[source]
		source: anyhow::Error,
	},
}

impl DeviceError {
	fn code(&self) -> StatusCode {
		match self {
			Self::CorruptPcd { .. } => StatusCode::PcdBadDeviceConfig,
			Self::Labels { .. } => StatusCode::FailedToInitNsLabels,
			Self::Busy(_) => StatusCode::DeviceBusy,
			Self::File { .. } => StatusCode::DumpFileOperationFailed,
			Self::Pcd { .. } | Self::Query { .. } => StatusCode::OperationFailed,
		}
	}
}
