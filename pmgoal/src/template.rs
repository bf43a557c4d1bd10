//! Region template mapping
//!
//! Splits the capacity of the DIMMs on a socket into a symmetric part, which every DIMM
//! contributes equally to a single interleave set, and an asymmetric part, holding
//! whatever can't be interleaved.

// Imports
use {
	crate::{
		capacity::actual_volatile_size,
		dimm::{Dimm, DimmsExt, SocketId},
		error::{GoalError, ParameterError, ResourceError},
		platform::Platform,
		reduce::reduce_app_direct_per_reserved,
		request::{PmType, ReserveDimm},
		status::{CommandStatus, StatusCode},
	},
	pmgoal_util::AlignExt,
};

/// Region interleave type
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterleaveType {
	/// Interleaved across all DIMMs of the template
	Interleaved,

	/// One region per DIMM
	NotInterleaved,
}

/// Region goal template
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct RegionGoalTemplate {
	/// Interleave type
	pub interleave: InterleaveType,

	/// Whether this template covers the asymmetric part
	pub asymmetrical: bool,

	/// Index of the region within each DIMM's region list
	pub sequence: u16,
}

/// Capacity assigned to a DIMM by a template list
#[derive(Clone, Copy, Debug)]
pub struct RegionGoalDimm<'a> {
	/// DIMM
	pub dimm: &'a Dimm,

	/// Volatile size
	pub volatile: u64,

	/// Region size
	pub region: u64,
}

/// Template mapping of a socket
#[derive(Clone, Debug)]
pub struct TemplateMap<'a> {
	/// Socket
	pub socket: SocketId,

	/// Symmetric part, one entry per DIMM
	pub symmetric: Vec<RegionGoalDimm<'a>>,

	/// Asymmetric part, only DIMMs with a remainder
	pub asymmetric: Vec<RegionGoalDimm<'a>>,

	/// Reserve DIMM
	pub reserve: Option<RegionGoalDimm<'a>>,

	/// Templates
	pub templates: Vec<RegionGoalTemplate>,
}

impl<'a> TemplateMap<'a> {
	/// Returns the total volatile size
	#[must_use]
	pub fn total_volatile(&self) -> u64 {
		self.symmetric.iter().map(|entry| entry.volatile).sum()
	}

	/// Returns the total size of all regions, including the reserve DIMM's
	#[must_use]
	pub fn total_regions(&self) -> u64 {
		self.symmetric
			.iter()
			.chain(&self.asymmetric)
			.chain(&self.reserve)
			.map(|entry| entry.region)
			.sum()
	}

	/// Rebuilds the templates from the current region sizes
	pub fn rebuild_templates(&mut self, pm_type: PmType) {
		self.asymmetric.retain(|entry| entry.region > 0);

		let mut templates = vec![];
		if self.symmetric.iter().any(|entry| entry.region > 0) {
			let interleave = match pm_type {
				PmType::AppDirectNotInterleaved => InterleaveType::NotInterleaved,
				_ => InterleaveType::Interleaved,
			};
			templates.push(RegionGoalTemplate {
				interleave,
				asymmetrical: false,
				sequence: 0,
			});
		}
		if !self.asymmetric.is_empty() {
			templates.push(RegionGoalTemplate {
				interleave:   InterleaveType::NotInterleaved,
				asymmetrical: true,
				sequence:     templates.len() as u16,
			});
		}

		self.templates = templates;
	}
}

/// Removes the reserve DIMM from `dimms`, if one was requested.
///
/// The reserve DIMM is always the last DIMM of the socket.
///
/// # Errors
/// Returns an error if `dimms` has less than two DIMMs
pub fn select_reserve_dimm<'a>(
	dimms: &mut Vec<&'a Dimm>,
	kind: ReserveDimm,
	socket: SocketId,
) -> Result<Option<&'a Dimm>, GoalError> {
	if kind == ReserveDimm::None {
		return Ok(None);
	}
	if dimms.len() < 2 {
		return Err(ParameterError::ReserveDimmRequiresTwoDimms { socket }.into());
	}

	let reserve = dimms.pop();
	if let Some(dimm) = reserve {
		tracing::debug!(dimm = %dimm.id, ?kind, "Selected reserve DIMM");
	}

	Ok(reserve)
}

/// Returns the goal of a reserve DIMM.
///
/// A reserve DIMM has no volatile capacity and, unless it's kept as storage,
/// a single region spanning all of its capacity.
#[must_use]
pub fn reserve_goal<'a>(dimm: &'a Dimm, kind: ReserveDimm, platform: &Platform) -> RegionGoalDimm<'a> {
	let region = match kind {
		ReserveDimm::AppDirectNotInterleaved => dimm
			.raw_capacity
			.align_down(platform.alignments.region_persistent),
		ReserveDimm::None | ReserveDimm::Storage => 0,
	};

	RegionGoalDimm {
		dimm,
		volatile: 0,
		region,
	}
}

/// Maps the request for a socket onto region templates.
///
/// `volatile` holds the requested volatile size of each DIMM of `dimms`, and `reserved`
/// the total capacity to leave unconfigured.
///
/// # Errors
/// Returns an error if any DIMM would be left without persistent capacity.
pub fn map_templates<'a>(
	socket: SocketId,
	dimms: &[&'a Dimm],
	volatile: &[u64],
	pm_type: PmType,
	reserved: u64,
	platform: &Platform,
	status: &mut CommandStatus,
) -> Result<TemplateMap<'a>, GoalError> {
	let alignments = &platform.alignments;
	let mut map = TemplateMap {
		socket,
		symmetric: vec![],
		asymmetric: vec![],
		reserve: None,
		templates: vec![],
	};

	// If everything is volatile, there's nothing else to map
	let total_volatile = volatile.iter().sum::<u64>();
	if total_volatile >= dimms.total_raw_capacity() {
		map.symmetric = dimms
			.iter()
			.map(|&dimm| RegionGoalDimm {
				dimm,
				volatile: dimm.raw_capacity,
				region: 0,
			})
			.collect();
		return Ok(map);
	}

	let mut entries = dimms
		.iter()
		.zip(volatile)
		.map(|(&dimm, &requested)| RegionGoalDimm {
			dimm,
			volatile: actual_volatile_size(dimm.raw_capacity, requested, alignments),
			region: 0,
		})
		.collect::<Vec<_>>();

	if pm_type == PmType::Storage {
		map.symmetric = entries;
		return Ok(map);
	}

	// Every DIMM must keep some persistent capacity
	let mut available = Vec::with_capacity(entries.len());
	for entry in &mut entries {
		let raw = entry.dimm.raw_capacity;
		if entry.volatile >= raw {
			if raw <= alignments.region_partition {
				return Err(ResourceError::InsufficientCapacity(socket).into());
			}
			entry.volatile = (raw - alignments.region_partition).align_down(alignments.region_volatile);
			tracing::trace!(dimm = %entry.dimm.id, volatile = entry.volatile, "Left room for persistent capacity");
		}

		let avail = (raw - entry.volatile).align_down(alignments.region_persistent);
		if avail == 0 {
			status.push(entry.dimm.id, StatusCode::PersMemMustBeAppliedToAllDimms);
			return Err(ResourceError::PersistentNotOnAllDimms(entry.dimm.id).into());
		}
		available.push(avail);
	}

	match pm_type {
		PmType::AppDirectNotInterleaved =>
			for (entry, &avail) in entries.iter_mut().zip(&available) {
				entry.region = avail;
			},
		_ => {
			let least = available.iter().copied().min().unwrap_or(0);
			for (entry, &avail) in entries.iter_mut().zip(&available) {
				entry.region = least;
				if avail > least {
					map.asymmetric.push(RegionGoalDimm {
						dimm:     entry.dimm,
						volatile: 0,
						region:   avail - least,
					});
				}
			}
		},
	}

	// Without volatile capacity, the unaligned remainders are already unconfigured
	let mut reserved = reserved;
	if total_volatile == 0 {
		let remainders = entries
			.iter()
			.zip(&available)
			.map(|(entry, &avail)| entry.dimm.raw_capacity - entry.volatile - avail)
			.sum::<u64>();
		reserved = reserved.saturating_sub(remainders);
	}

	let pers_align = alignments.region_persistent;
	reduce_app_direct_per_reserved(&mut map.asymmetric, &mut reserved, pers_align);
	reduce_app_direct_per_reserved(&mut entries, &mut reserved, pers_align);

	// AppDirect always keeps a minimal region
	if total_volatile == 0 && entries.iter().all(|entry| entry.region == 0) && map.asymmetric.is_empty() {
		for (entry, &avail) in entries.iter_mut().zip(&available) {
			entry.region = pers_align.min(avail);
		}
	}

	map.symmetric = entries;
	map.rebuild_templates(pm_type);

	// Interleave set limit is advisory, drop the asymmetric part if over it
	let max_sets = usize::try_from(platform.max_interleave_sets_per_die).unwrap_or(usize::MAX);
	if map.templates.len() > max_sets && !map.asymmetric.is_empty() {
		tracing::warn!(%socket, max_sets, "Dropping not interleaved regions over the interleave set limit");
		status.push(socket, StatusCode::AdNiInterleaveSetsReduced);
		map.asymmetric.clear();
		map.rebuild_templates(pm_type);
	}
	if map.templates.len() > max_sets {
		tracing::warn!(%socket, max_sets, templates = map.templates.len(), "Interleave sets exceed the platform limit");
		status.push(socket, StatusCode::MaxPmInterleaveSetsExceeded);
	}

	if map.total_volatile() > 0 && !platform.memory_mode_allowed {
		tracing::warn!(%socket, "Memory mode is not allowed by the platform DDR population");
		status.push(socket, StatusCode::ImcDdrPmmNotPaired);
	}

	tracing::trace!(?map, "Mapped templates");
	Ok(map)
}
