//! Goals
//!
//! Region goals live in an arena, [`GoalState`], and every DIMM refers to the goals it
//! takes part in by index. An interleaved goal is shared by all of its DIMMs.

// Imports
use {
	crate::{
		dimm::{Dimm, DimmId, DimmUid, SocketId},
		error::{GoalError, PlatformConstraintError},
		platform::{ChannelWays, Platform},
		template::{InterleaveType, RegionGoalDimm, TemplateMap},
	},
	pmgoal_util::AlignExt,
	std::collections::BTreeMap,
};

/// Goal configuration status of a DIMM
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalConfigStatus {
	/// No goal, or the goal was already applied
	#[default]
	NoGoalOrSuccess,

	/// Goal rejected, but no table reported why
	Unknown,

	/// Goal pending, to be applied on the next boot
	New,

	/// Goal rejected, bad request
	BadRequest,

	/// Goal rejected, not enough resources
	NotEnoughResources,

	/// Goal rejected by the firmware
	FirmwareError,

	/// Goal rejected for an unknown reason
	FailedUnknown,
}

impl GoalConfigStatus {
	/// Returns if this status is a pending goal
	#[must_use]
	pub const fn is_pending(self) -> bool {
		matches!(self, Self::New)
	}
}

/// Index of a region goal in the goal state
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct GoalIdx(usize);

/// Region goal
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct RegionGoal {
	/// Socket
	pub socket: SocketId,

	/// Index of this region within each DIMM's region list
	pub sequence: u16,

	/// Total size, across all DIMMs
	pub size: u64,

	/// Interleave type
	pub interleave: InterleaveType,

	/// Channel interleave size
	pub channel: u8,

	/// iMC interleave size
	pub imc: u8,

	/// Channel ways
	pub ways: ChannelWays,

	/// Interleave set index
	pub interleave_set_index: u16,

	/// DIMMs, in interleave order
	pub dimms: Vec<DimmId>,
}

impl RegionGoal {
	/// Returns the size each DIMM contributes
	#[must_use]
	pub fn size_per_dimm(&self) -> u64 {
		match self.dimms.len() {
			0 => 0,
			len => self.size / len as u64,
		}
	}
}

/// Goal state of a single DIMM
#[derive(PartialEq, Eq, Clone, Default, Debug)]
pub struct DimmGoalState {
	/// Region goals
	pub regions: Vec<GoalIdx>,

	/// Volatile size
	pub volatile: u64,

	/// Status
	pub status: GoalConfigStatus,

	/// Whether a goal exists
	pub has_goal: bool,

	/// Whether the platform config data reflects this state
	pub pcd_synced: bool,
}

/// Goal state of all DIMMs
#[derive(Clone, Default, Debug)]
pub struct GoalState {
	/// Region goals
	goals: Vec<RegionGoal>,

	/// Per-DIMM state
	dimms: BTreeMap<DimmId, DimmGoalState>,
}

impl GoalState {
	/// Returns the region goal at `idx`
	#[must_use]
	pub fn goal(&self, idx: GoalIdx) -> &RegionGoal {
		&self.goals[idx.0]
	}

	/// Adds a region goal
	pub fn push_goal(&mut self, goal: RegionGoal) -> GoalIdx {
		let idx = GoalIdx(self.goals.len());
		self.goals.push(goal);
		idx
	}

	/// Returns the state of `dimm`, if any
	#[must_use]
	pub fn dimm(&self, dimm: DimmId) -> Option<&DimmGoalState> {
		self.dimms.get(&dimm)
	}

	/// Returns the state of `dimm`, creating an empty one if it doesn't exist
	pub fn dimm_mut(&mut self, dimm: DimmId) -> &mut DimmGoalState {
		self.dimms.entry(dimm).or_default()
	}

	/// Returns the state of all DIMMs
	pub fn dimms(&self) -> impl Iterator<Item = (DimmId, &DimmGoalState)> + '_ {
		self.dimms.iter().map(|(&id, state)| (id, state))
	}

	/// Returns if `dimm` has a goal
	#[must_use]
	pub fn has_goal(&self, dimm: DimmId) -> bool {
		self.dimm(dimm).map_or(false, |state| state.has_goal)
	}

	/// Returns if `dimm` has a pending goal
	#[must_use]
	pub fn is_pending(&self, dimm: DimmId) -> bool {
		self.dimm(dimm)
			.map_or(false, |state| state.has_goal && state.status.is_pending())
	}

	/// Clears the goal of `dimm`.
	///
	/// The DIMM is left unsynced, so the next apply clears its platform config data.
	pub fn clear_dimm(&mut self, dimm: DimmId) {
		*self.dimm_mut(dimm) = DimmGoalState {
			pcd_synced: false,
			..DimmGoalState::default()
		};
	}

	/// Returns the DIMMs sharing a region goal with `dimm`, excluding itself
	#[must_use]
	pub fn related_dimms(&self, dimm: DimmId) -> Vec<DimmId> {
		let Some(state) = self.dimm(dimm) else {
			return vec![];
		};

		let mut related = vec![];
		for &idx in &state.regions {
			for &other in &self.goal(idx).dimms {
				if other != dimm && !related.contains(&other) {
					related.push(other);
				}
			}
		}

		related
	}

	/// Returns the offset of `goal` within the persistent partition of `dimm`
	#[must_use]
	pub fn region_offset(&self, dimm: DimmId, goal: GoalIdx) -> u64 {
		let Some(state) = self.dimm(dimm) else {
			return 0;
		};

		state
			.regions
			.iter()
			.take_while(|&&idx| idx != goal)
			.map(|&idx| self.goal(idx).size_per_dimm())
			.sum()
	}

	/// Returns the next free interleave set index
	#[must_use]
	pub fn next_interleave_set_index(&self) -> u16 {
		self.dimms
			.values()
			.flat_map(|state| &state.regions)
			.map(|&idx| self.goal(idx).interleave_set_index)
			.max()
			.map_or(1, |index| index.saturating_add(1))
	}

	/// Returns the goal summary of `dimm`, if it has a goal
	#[must_use]
	pub fn goal_info(&self, dimm: &Dimm, indices: &AppDirectIndexTable) -> Option<DimmGoalInfo> {
		let state = self.dimm(dimm.id).filter(|state| state.has_goal)?;

		let regions = state
			.regions
			.iter()
			.map(|&idx| {
				let goal = self.goal(idx);
				RegionInfo {
					size:             goal.size_per_dimm(),
					interleave:       goal.interleave,
					dimm_count:       goal.dimms.len(),
					channel:          goal.channel,
					imc:              goal.imc,
					ways:             goal.ways,
					app_direct_index: indices.index_of(idx).unwrap_or(0),
				}
			})
			.collect::<Vec<_>>();
		let persistent = regions.iter().map(|region| region.size).sum::<u64>();

		Some(DimmGoalInfo {
			dimm: dimm.id,
			uid: dimm.uid,
			socket: dimm.socket,
			volatile_size: state.volatile,
			storage_capacity: dimm.raw_capacity.saturating_sub(state.volatile + persistent),
			regions,
			status: state.status,
		})
	}
}

/// AppDirect index of each region goal.
///
/// Indices are assigned in first-seen order over all manageable DIMMs, so they
/// don't depend on which DIMMs a request targets.
#[derive(Clone, Default, Debug)]
pub struct AppDirectIndexTable {
	/// Goals, in index order
	goals: Vec<GoalIdx>,
}

impl AppDirectIndexTable {
	/// Builds the table over `inventory`
	#[must_use]
	pub fn new(inventory: &[Dimm], state: &GoalState) -> Self {
		let mut goals = vec![];
		for dimm in inventory.iter().filter(|dimm| dimm.manageable) {
			let Some(dimm_state) = state.dimm(dimm.id) else {
				continue;
			};
			for &idx in &dimm_state.regions {
				if !goals.contains(&idx) {
					goals.push(idx);
				}
			}
		}

		Self { goals }
	}

	/// Returns the 1-based index of `goal`
	#[must_use]
	pub fn index_of(&self, goal: GoalIdx) -> Option<u16> {
		let pos = self.goals.iter().position(|&idx| idx == goal)?;
		u16::try_from(pos + 1).ok()
	}
}

/// Goal summary of a DIMM
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct DimmGoalInfo {
	/// DIMM
	pub dimm: DimmId,

	/// Unique id
	pub uid: DimmUid,

	/// Socket
	pub socket: SocketId,

	/// Volatile size
	pub volatile_size: u64,

	/// Capacity left unconfigured
	pub storage_capacity: u64,

	/// Regions
	pub regions: Vec<RegionInfo>,

	/// Status
	pub status: GoalConfigStatus,
}

/// Region summary of a DIMM
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RegionInfo {
	/// Size on this DIMM
	pub size: u64,

	/// Interleave type
	pub interleave: InterleaveType,

	/// DIMMs in the region
	pub dimm_count: usize,

	/// Channel interleave size
	pub channel: u8,

	/// iMC interleave size
	pub imc: u8,

	/// Channel ways
	pub ways: ChannelWays,

	/// AppDirect index
	pub app_direct_index: u16,
}

/// Turns the templates of `map` into region goals of its DIMMs.
///
/// Every DIMM of `map`, including the reserve DIMM, gets a new, unsynced, goal.
///
/// # Errors
/// Returns an error if the platform doesn't support the interleave set of a goal,
/// or its size isn't aligned to the interleave alignment.
pub fn map_regions_goal(state: &mut GoalState, map: &TemplateMap<'_>, platform: &Platform) -> Result<(), GoalError> {
	let mut next_index = state.next_interleave_set_index();

	for entry in map.symmetric.iter().chain(&map.reserve) {
		let dimm_state = state.dimm_mut(entry.dimm.id);
		*dimm_state = DimmGoalState {
			regions:    vec![],
			volatile:   entry.volatile,
			status:     GoalConfigStatus::New,
			has_goal:   true,
			pcd_synced: false,
		};
	}

	for template in &map.templates {
		let entries = match template.asymmetrical {
			true => &map.asymmetric,
			false => &map.symmetric,
		};
		let entries = entries.iter().filter(|entry| entry.region > 0).collect::<Vec<_>>();

		match template.interleave {
			InterleaveType::Interleaved => {
				let mut remaining = &entries[..];
				for count in ChannelWays::split(entries.len()) {
					let (set, rest) = remaining.split_at(count);
					remaining = rest;
					push_region_goal(state, map.socket, template.sequence, set, platform, &mut next_index)?;
				}
			},
			InterleaveType::NotInterleaved =>
				for entry in entries {
					push_region_goal(
						state,
						map.socket,
						template.sequence,
						&[entry],
						platform,
						&mut next_index,
					)?;
				},
		}
	}

	if let Some(reserve) = map.reserve.filter(|reserve| reserve.region > 0) {
		let sequence = 0;
		push_region_goal(state, map.socket, sequence, &[&reserve], platform, &mut next_index)?;
	}

	Ok(())
}

/// Adds a region goal interleaved across `set`
fn push_region_goal(
	state: &mut GoalState,
	socket: SocketId,
	sequence: u16,
	set: &[&RegionGoalDimm<'_>],
	platform: &Platform,
	next_index: &mut u16,
) -> Result<(), GoalError> {
	let count = set.len();
	let size_per_dimm = set.first().map_or(0, |entry| entry.region);
	let size = size_per_dimm * count as u64;

	let ways = ChannelWays::from_count(count).ok_or(PlatformConstraintError::UnsupportedInterleave { dimms: count })?;
	let format = platform
		.interleave
		.find_format(ways)
		.ok_or(PlatformConstraintError::UnsupportedInterleave { dimms: count })?;

	let alignment = platform.interleave.alignment().saturating_mul(count as u64);
	if size == 0 || !size.is_aligned(alignment) {
		return Err(PlatformConstraintError::InterleaveAlignment { size, dimms: count }.into());
	}

	let interleave = match count {
		1 => InterleaveType::NotInterleaved,
		_ => InterleaveType::Interleaved,
	};
	let idx = state.push_goal(RegionGoal {
		socket,
		sequence,
		size,
		interleave,
		channel: format.channel,
		imc: format.imc,
		ways,
		interleave_set_index: *next_index,
		dimms: set.iter().map(|entry| entry.dimm.id).collect(),
	});
	tracing::trace!(goal = ?state.goal(idx), "Added region goal");
	*next_index = next_index.saturating_add(1);

	for entry in set {
		state.dimm_mut(entry.dimm.id).regions.push(idx);
	}

	Ok(())
}
