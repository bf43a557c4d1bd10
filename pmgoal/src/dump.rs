//! Goal dump and load
//!
//! A dump records the request that would recreate the pending goals of each socket,
//! not the goals themselves.

// Imports
use {
	crate::{
		capacity::{percent_ceil, percent_floor},
		context::GoalContext,
		dimm::{Dimm, DimmsExt, SocketId},
		error::{DeviceError, GoalError, ParameterError, SelectionError},
		persist::create_goal,
		provider::DimmProvider,
		request::{GoalRequest, LabelVersion, PmType, ReserveDimm},
		select::SelectFilter,
		status::{CommandStatus, StatusCode},
	},
	anyhow::Context,
	std::{fs, path::Path},
};

/// Goal dump
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct GoalDump {
	/// Format version
	pub version: u32,

	/// Goal of each socket
	pub sockets: Vec<SocketGoal>,
}

/// Goal of a socket
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct SocketGoal {
	/// Socket
	pub socket: SocketId,

	/// DIMMs with a goal
	pub dimm_count: usize,

	/// Request
	#[serde(flatten)]
	pub request: GoalRequest,
}

/// Dump version, read ahead of the rest of the dump
#[derive(serde::Deserialize)]
struct DumpVersion {
	version: u32,
}

impl GoalDump {
	/// Current format version
	pub const VERSION: u32 = 1;

	/// Builds a dump of all pending goals of `ctx`
	///
	/// # Errors
	/// Returns an error if no DIMM has a pending goal.
	pub fn from_context(ctx: &GoalContext) -> Result<Self, GoalError> {
		let mut sockets = vec![];
		for socket in ctx.inventory.sockets() {
			let dimms = ctx
				.inventory
				.iter()
				.filter(|dimm| dimm.socket == socket && dimm.manageable && ctx.goals.is_pending(dimm.id))
				.collect::<Vec<_>>();
			if dimms.is_empty() {
				continue;
			}

			let goal = self::socket_goal(ctx, socket, &dimms);
			tracing::debug!(?goal, "Dumping socket goal");
			sockets.push(goal);
		}

		if sockets.is_empty() {
			return Err(SelectionError::NothingToDump.into());
		}

		Ok(Self {
			version: Self::VERSION,
			sockets,
		})
	}

	/// Parses a dump read from `path`
	///
	/// # Errors
	/// Returns an error if the dump has an unsupported version or is malformed.
	pub fn from_json(contents: &str, path: &Path) -> Result<Self, GoalError> {
		let invalid = |err: serde_json::Error| ParameterError::DumpData {
			path:   path.to_path_buf(),
			reason: err.to_string(),
		};

		let DumpVersion { version } = serde_json::from_str(contents).map_err(invalid)?;
		if version != Self::VERSION {
			return Err(ParameterError::DumpVersion(version).into());
		}

		Ok(serde_json::from_str(contents).map_err(invalid)?)
	}

	/// Reads a dump from `path`
	pub fn read(path: &Path) -> Result<Self, GoalError> {
		let contents = fs::read_to_string(path)
			.context("Unable to read dump file")
			.map_err(|source| DeviceError::File {
				path: path.to_path_buf(),
				source,
			})?;

		Self::from_json(&contents, path)
	}

	/// Writes this dump to `path`
	pub fn write(&self, path: &Path) -> Result<(), GoalError> {
		let res = fs::File::create(path)
			.context("Unable to create dump file")
			.and_then(|file| serde_json::to_writer_pretty(file, self).context("Unable to write dump file"));

		res.map_err(|source| {
			DeviceError::File {
				path: path.to_path_buf(),
				source,
			}
			.into()
		})
	}
}

/// Derives the request that recreates the goals of `dimms`, all on `socket`
fn socket_goal(ctx: &GoalContext, socket: SocketId, dimms: &[&Dimm]) -> SocketGoal {
	let goals = &ctx.goals;
	let volatile_of = |dimm: &Dimm| goals.dimm(dimm.id).map_or(0, |state| state.volatile);
	let regions_of = |dimm: &Dimm| {
		goals.dimm(dimm.id).map_or(vec![], |state| {
			state.regions.iter().map(|&idx| goals.goal(idx)).collect::<Vec<_>>()
		})
	};
	let region_size_of = |dimm: &Dimm| regions_of(dimm).iter().map(|goal| goal.size_per_dimm()).sum::<u64>();
	let interleaved = |dimm: &Dimm| regions_of(dimm).iter().any(|goal| goal.dimms.len() > 1);

	// The reserve DIMM is the last DIMM, with a layout none of the others share
	let (dimms, reserve_dimm) = match dimms.split_last() {
		Some((&last, rest)) if !rest.is_empty() && volatile_of(last) == 0 => {
			let last_regions = regions_of(last);
			let rest_configured = rest.iter().any(|dimm| volatile_of(dimm) > 0 || region_size_of(dimm) > 0);
			let rest_interleaved = rest.iter().any(|dimm| interleaved(dimm));

			if last_regions.is_empty() && rest_configured {
				(rest, ReserveDimm::Storage)
			} else if last_regions.len() == 1 && !interleaved(last) && rest_interleaved {
				(rest, ReserveDimm::AppDirectNotInterleaved)
			} else {
				(dimms, ReserveDimm::None)
			}
		},
		_ => (dimms, ReserveDimm::None),
	};

	let raw = dimms.total_raw_capacity();
	let volatile = dimms.iter().map(|dimm| volatile_of(dimm)).sum::<u64>();
	let regions = dimms.iter().map(|dimm| region_size_of(dimm)).sum::<u64>();
	let reserved = raw.saturating_sub(volatile + regions);

	let pm_type = if regions == 0 {
		PmType::Storage
	} else if dimms.iter().any(|dimm| interleaved(dimm)) {
		PmType::AppDirect
	} else {
		PmType::AppDirectNotInterleaved
	};

	let dimm_count = dimms.len() + usize::from(reserve_dimm != ReserveDimm::None);
	SocketGoal {
		socket,
		dimm_count,
		request: GoalRequest {
			pm_type,
			volatile_percent: percent_ceil(volatile, raw),
			reserved_percent: percent_floor(reserved, raw),
			reserve_dimm,
			label_version: LabelVersion::default(),
		},
	}
}

/// Dumps the pending goals to `path`
pub fn dump_goal_config<P: DimmProvider + ?Sized>(
	provider: &P,
	path: &Path,
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	let ctx = GoalContext::load(provider)?;
	let dump = GoalDump::from_context(&ctx)?;
	dump.write(path)?;

	for goal in &dump.sockets {
		status.push(goal.socket, StatusCode::Success);
	}
	tracing::info!(?path, sockets = dump.sockets.len(), "Dumped goals");

	Ok(())
}

/// Loads the goals dumped to `path`, creating each socket's goal in turn
///
/// # Errors
/// Returns an error if the dump doesn't match the current DIMMs, or if any socket's
/// goal couldn't be created. Sockets created before the failing one stay created.
pub fn load_goal_config<P: DimmProvider + ?Sized>(
	provider: &mut P,
	path: &Path,
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	let dump = GoalDump::read(path)?;

	for goal in &dump.sockets {
		// Count the DIMMs the request would target on creation
		let mut filter = SelectFilter::MANAGEABLE | SelectFilter::FUNCTIONAL;
		if !goal.request.allows_population_violation() {
			filter |= SelectFilter::NO_POPULATION_VIOLATION;
		}
		let found = provider
			.dimms()
			.iter()
			.filter(|dimm| dimm.socket == goal.socket && filter.matches(dimm))
			.count();
		if found != goal.dimm_count {
			status.push(goal.socket, StatusCode::LoadDimmCountMismatch);
			return Err(SelectionError::DimmCountMismatch {
				socket: goal.socket,
				expected: goal.dimm_count,
				found,
			}
			.into());
		}
	}

	for goal in &dump.sockets {
		tracing::debug!(socket = %goal.socket, request = ?goal.request, "Loading socket goal");
		let mut socket_status = CommandStatus::new();
		let res = create_goal(provider, false, &[], &[goal.socket], &goal.request, &mut socket_status);
		match &res {
			Ok(_) => socket_status.set_code(StatusCode::Success),
			Err(err) => socket_status.set_code(err.code()),
		}
		status.merge(socket_status);
		res?;
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use {
		super::GoalDump,
		crate::{error::GoalError, status::StatusCode},
		std::path::Path,
	};

	#[test]
	fn request_fields_are_flattened() {
		let contents = r#"{
			"version": 1,
			"sockets": [{
				"socket": 1,
				"dimm_count": 2,
				"pm_type": "app_direct",
				"volatile_percent": 25,
				"reserved_percent": 0
			}]
		}"#;

		let dump = GoalDump::from_json(contents, Path::new("dump.json")).expect("Unable to parse dump");
		assert_eq!(dump.sockets.len(), 1);
		assert_eq!(dump.sockets[0].dimm_count, 2);
		assert_eq!(dump.sockets[0].request.volatile_percent, 25);
	}

	#[test]
	fn unknown_version_is_rejected() {
		let err = GoalDump::from_json(r#"{ "version": 7 }"#, Path::new("dump.json")).expect_err("Parsed dump");
		assert_eq!(err.code(), StatusCode::LoadVersion);

		let err = GoalDump::from_json("[]", Path::new("dump.json")).expect_err("Parsed dump");
		assert!(matches!(err, GoalError::Parameter(_)));
		assert_eq!(err.code(), StatusCode::LoadInvalidDataInFile);
	}
}
