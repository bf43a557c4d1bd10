//! Goal read-back
//!
//! Rebuilds the goal state of every manageable DIMM from its platform config data.

// Imports
use {
	crate::{
		context::GoalContext,
		dimm::{Dimm, DimmId, DimmUid, SocketId},
		error::{DeviceError, GoalError},
		goal::{DimmGoalInfo, DimmGoalState, GoalConfigStatus, GoalIdx, GoalState, RegionGoal},
		pcd::{ConfigInput, ConfigOutput, PcatTable, PlatformConfigData},
		platform::ChannelWays,
		provider::DimmProvider,
		select::{select_dimms, SelectFilter},
		status::CommandStatus,
		template::InterleaveType,
	},
	std::collections::BTreeMap,
};

impl GoalContext {
	/// Loads the goal context from `provider`
	pub fn load<P: DimmProvider + ?Sized>(provider: &P) -> Result<Self, GoalError> {
		let inventory = provider.dimms().to_vec();
		let platform = provider.platform().clone();

		let mut goals = GoalState::default();
		let mut known_goals = BTreeMap::<(u16, Vec<DimmUid>), GoalIdx>::new();
		for dimm in inventory.iter().filter(|dimm| dimm.manageable) {
			let pcd = self::read_pcd(provider, dimm)?;
			let Some(input) = &pcd.input else {
				continue;
			};
			let Some(status) = self::goal_status(input, pcd.output.as_ref()) else {
				tracing::trace!(dimm = %dimm.id, "Goal was already applied");
				continue;
			};

			let mut state = DimmGoalState {
				regions: vec![],
				volatile: 0,
				status,
				has_goal: true,
				pcd_synced: true,
			};
			for table in &input.tables {
				match table {
					PcatTable::PartitionSizeChange { pm_partition_size, .. } =>
						state.volatile = dimm.raw_capacity.saturating_sub(*pm_partition_size),
					PcatTable::InterleaveInformation {
						index,
						channel,
						imc,
						ways,
						identifications,
						..
					} => {
						let mut uids = identifications.iter().map(|id| id.uid).collect::<Vec<_>>();
						uids.sort();
						let key = (*index, uids);
						if let Some(&idx) = known_goals.get(&key) {
							state.regions.push(idx);
							continue;
						}

						let Some(dimms) = identifications
							.iter()
							.map(|id| inventory.iter().find(|dimm| dimm.uid == id.uid).map(|dimm| dimm.id))
							.collect::<Option<Vec<_>>>()
						else {
							tracing::warn!(dimm = %dimm.id, index, "Ignoring region goal with unknown DIMMs");
							continue;
						};

						let interleave = match dimms.len() {
							1 => InterleaveType::NotInterleaved,
							_ => InterleaveType::Interleaved,
						};
						let idx = goals.push_goal(RegionGoal {
							socket: dimm.socket,
							sequence: state.regions.len() as u16,
							size: identifications.iter().map(|id| id.partition_size).sum(),
							interleave,
							channel: *channel,
							imc: *imc,
							ways: ChannelWays::from_bits_truncate(*ways),
							interleave_set_index: *index,
							dimms,
						});
						known_goals.insert(key, idx);
						state.regions.push(idx);
					},
				}
			}

			tracing::trace!(dimm = %dimm.id, ?state, "Read goal");
			*goals.dimm_mut(dimm.id) = state;
		}

		Ok(Self {
			inventory,
			platform,
			goals,
		})
	}
}

/// Returns the goals of the selected DIMMs.
///
/// DIMMs without a goal, or whose goal was already applied, are skipped.
pub fn get_goal_configs<P: DimmProvider + ?Sized>(
	provider: &P,
	dimm_ids: &[DimmId],
	socket_ids: &[SocketId],
	status: &mut CommandStatus,
) -> Result<Vec<DimmGoalInfo>, GoalError> {
	let ctx = GoalContext::load(provider)?;
	let targets = select_dimms(&ctx.inventory, dimm_ids, socket_ids, SelectFilter::MANAGEABLE, status)?;

	Ok(ctx.goal_infos(targets))
}

/// Reads the platform config data of `dimm`.
///
/// Data with a corrupt configuration header is treated as empty.
pub fn read_pcd<P: DimmProvider + ?Sized>(provider: &P, dimm: &Dimm) -> Result<PlatformConfigData, GoalError> {
	let Some(bytes) = provider.read_pcd(dimm.id)? else {
		return Ok(PlatformConfigData::default());
	};

	match PlatformConfigData::from_bytes(&bytes) {
		Ok(pcd) => Ok(pcd),
		Err(source) => {
			let err = DeviceError::CorruptPcd { dimm: dimm.id, source };
			tracing::warn!(?err, "Treating platform config data as empty");
			Ok(PlatformConfigData::default())
		},
	}
}

/// Returns the status of the goal in `input`, or `None` if it was already applied
fn goal_status(input: &ConfigInput, output: Option<&ConfigOutput>) -> Option<GoalConfigStatus> {
	let output = match output {
		Some(output) if output.sequence == input.sequence => output,
		_ => return Some(GoalConfigStatus::New),
	};
	if output.succeeded() {
		return None;
	}

	let table_status = output.tables.iter().find_map(|table| {
		let status = match *table {
			PcatTable::PartitionSizeChange { status, .. } => status,
			PcatTable::InterleaveInformation { status, .. } => u32::from(status),
		};
		(status != 0).then_some(status)
	});
	let status = match table_status {
		Some(1) => GoalConfigStatus::BadRequest,
		Some(2) => GoalConfigStatus::NotEnoughResources,
		Some(3) => GoalConfigStatus::FirmwareError,
		Some(_) => GoalConfigStatus::FailedUnknown,
		None => GoalConfigStatus::Unknown,
	};

	Some(status)
}

#[cfg(test)]
mod tests {
	use {
		super::goal_status,
		crate::{
			goal::GoalConfigStatus,
			pcd::{ConfigInput, ConfigOutput, PcatTable},
		},
	};

	fn input(sequence: u32) -> ConfigInput {
		ConfigInput {
			sequence,
			tables: vec![],
		}
	}

	fn output(sequence: u32, validation_status: u8, partition_status: u32) -> ConfigOutput {
		ConfigOutput {
			sequence,
			validation_status,
			tables: vec![PcatTable::PartitionSizeChange {
				status:            partition_status,
				pm_partition_size: 0,
			}],
		}
	}

	#[test]
	fn goal_without_output_is_new() {
		assert_eq!(goal_status(&input(3), None), Some(GoalConfigStatus::New));
		assert_eq!(goal_status(&input(3), Some(&output(2, 0, 0))), Some(GoalConfigStatus::New));
	}

	#[test]
	fn processed_goal_is_classified() {
		assert_eq!(goal_status(&input(3), Some(&output(3, 0, 0))), None);
		assert_eq!(
			goal_status(&input(3), Some(&output(3, 1, 2))),
			Some(GoalConfigStatus::NotEnoughResources)
		);
		assert_eq!(
			goal_status(&input(3), Some(&output(3, 1, 0))),
			Some(GoalConfigStatus::Unknown)
		);
	}
}
