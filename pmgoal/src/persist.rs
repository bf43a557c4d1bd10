//! Goal creation and persistence

// Imports
use crate::{
	capacity::{actual_percent, capacity_from_percent},
	context::GoalContext,
	dimm::{Dimm, DimmId, DimmsExt, SocketId},
	error::{DeviceError, GoalError, StateError},
	goal::{map_regions_goal, DimmGoalInfo, DimmGoalState, GoalState},
	pcd::{ConfigInput, Identification, PcatTable},
	provider::DimmProvider,
	read::read_pcd,
	reduce::{check_nm_fm_ratio, reduce_for_socket_sku, verify_sku_support, verify_uniform_sku},
	request::{GoalRequest, LabelVersion},
	select::{select_dimms, SelectFilter},
	status::{CommandStatus, StatusCode},
	template::{map_templates, reserve_goal, select_reserve_dimm, TemplateMap},
};

/// Create goal output
#[derive(PartialEq, Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct CreateGoalOutput {
	/// Resolved goals of all targeted DIMMs
	pub goals: Vec<DimmGoalInfo>,

	/// Volatile percentage actually achieved
	pub volatile_percent: f64,

	/// Reserved percentage actually achieved
	pub reserved_percent: f64,

	/// Interleave sets supported per die
	pub max_pm_interleave_sets_per_die: u32,
}

/// Creates a goal on the selected DIMMs.
///
/// With `examine`, the goal is resolved exactly as it would be applied, but nothing
/// is written.
///
/// # Errors
/// Returns an error if the request is invalid, the selection or state of the DIMMs
/// forbid the goal, or the goal couldn't be written. Writes are not rolled back.
pub fn create_goal<P: DimmProvider + ?Sized>(
	provider: &mut P,
	examine: bool,
	dimm_ids: &[DimmId],
	socket_ids: &[SocketId],
	request: &GoalRequest,
	status: &mut CommandStatus,
) -> Result<CreateGoalOutput, GoalError> {
	let request = request.validate()?;
	tracing::debug!(?request, examine, "Creating goal");

	let mut ctx = GoalContext::load(&*provider)?;
	let inventory = &ctx.inventory;
	let platform = &ctx.platform;
	let goals = &mut ctx.goals;

	let mut filter = SelectFilter::MANAGEABLE | SelectFilter::FUNCTIONAL;
	if !request.allows_population_violation() {
		filter |= SelectFilter::NO_POPULATION_VIOLATION;
	}
	let targets = select_dimms(inventory, dimm_ids, socket_ids, filter, status)?;

	for dimm in self::verify_security(&*provider, &targets, status)? {
		tracing::warn!(%dimm, "Goal will only be applied once security is disabled");
		status.push(dimm, StatusCode::GoalCreationSecurityUnlocked);
	}
	self::verify_no_namespaces(&*provider, &targets, status)?;
	self::verify_no_pending_goal(inventory, goals, &targets, status)?;
	verify_uniform_sku(&targets, status)?;
	verify_sku_support(&targets, &request, platform, status)?;
	self::verify_socket_coverage(inventory, &targets, filter, status)?;

	// Map every socket before touching the goal state
	let alignments = &platform.alignments;
	let mut maps = vec![];
	let mut requested_volatile = 0;
	let mut requested_reserved = 0;
	for socket in targets.sockets() {
		let mut socket_targets = targets
			.iter()
			.copied()
			.filter(|dimm| dimm.socket == socket)
			.collect::<Vec<_>>();
		let reserve = select_reserve_dimm(&mut socket_targets, request.reserve_dimm, socket)?;

		let volatile = capacity_from_percent(&socket_targets, request.volatile_percent, alignments.region_volatile);
		let reserved = capacity_from_percent(&socket_targets, request.reserved_percent, alignments.region_persistent)
			.iter()
			.sum::<u64>();
		requested_volatile += volatile.iter().sum::<u64>();
		requested_reserved += reserved;

		let mut map = map_templates(
			socket,
			&socket_targets,
			&volatile,
			request.pm_type,
			reserved,
			platform,
			status,
		)?;
		map.reserve = reserve.map(|dimm| reserve_goal(dimm, request.reserve_dimm, platform));

		let socket_dimms = inventory
			.iter()
			.filter(|dimm| dimm.socket == socket)
			.collect::<Vec<_>>();
		reduce_for_socket_sku(&mut map, &socket_dimms, request.pm_type, platform, status)?;
		check_nm_fm_ratio(&map, platform, status);

		maps.push(map);
	}

	for dimm in &targets {
		goals.clear_dimm(dimm.id);
	}
	for map in &maps {
		map_regions_goal(goals, map, platform)?;
	}

	let actual_volatile = maps.iter().map(TemplateMap::total_volatile).sum::<u64>();
	let actual_reserved = maps.iter().map(self::unconfigured_capacity).sum::<u64>();
	let target_ids = targets.iter().map(|dimm| dimm.id).collect::<Vec<_>>();

	match examine {
		true => tracing::info!(dimms = ?target_ids, "Examined goal, nothing was written"),
		false => {
			self::apply_goals(provider, inventory, goals, status)?;
			self::init_labels(provider, &target_ids, request.label_version, status)?;
			tracing::info!(dimms = ?target_ids, "Applied goal");
		},
	}

	Ok(CreateGoalOutput {
		goals: ctx.goal_infos(targets.iter().copied()),
		volatile_percent: actual_percent(actual_volatile, requested_volatile, request.volatile_percent),
		reserved_percent: actual_percent(actual_reserved, requested_reserved, request.reserved_percent),
		max_pm_interleave_sets_per_die: ctx.platform.max_interleave_sets_per_die,
	})
}

/// Writes the goal of every unsynced DIMM, in inventory order.
///
/// DIMMs without a goal have their configuration input cleared.
///
/// # Errors
/// Stops at the first DIMM that couldn't be written. Every DIMM written before it
/// stays written.
pub fn apply_goals<P: DimmProvider + ?Sized>(
	provider: &mut P,
	inventory: &[Dimm],
	goals: &mut GoalState,
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	for dimm in inventory {
		let Some(state) = goals.dimm(dimm.id).filter(|state| !state.pcd_synced) else {
			continue;
		};

		if let Err(err) = self::write_goal(provider, inventory, goals, dimm, state) {
			tracing::warn!(dimm = %dimm.id, %err, "Unable to apply goal");
			status.push(dimm.id, StatusCode::ConfApplyingFailed);
			return Err(err);
		}

		goals.dimm_mut(dimm.id).pcd_synced = true;
		status.push(dimm.id, StatusCode::Success);
	}

	Ok(())
}

/// Writes the goal `state` of `dimm`
fn write_goal<P: DimmProvider + ?Sized>(
	provider: &mut P,
	inventory: &[Dimm],
	goals: &GoalState,
	dimm: &Dimm,
	state: &DimmGoalState,
) -> Result<(), GoalError> {
	let mut pcd = read_pcd(&*provider, dimm)?;
	match state.has_goal {
		true => {
			let sequence = pcd
				.output
				.as_ref()
				.map(|output| output.sequence)
				.or_else(|| pcd.input.as_ref().map(|input| input.sequence))
				.map_or(1, |sequence| sequence.wrapping_add(1));
			pcd.input = Some(self::config_input(inventory, goals, dimm, state, sequence));
			pcd.output = None;
		},
		false => pcd.input = None,
	}

	let bytes = pcd
		.to_bytes()
		.map_err(|source| DeviceError::Pcd { dimm: dimm.id, source })?;
	tracing::debug!(dimm = %dimm.id, len = bytes.len(), "Writing goal");
	provider.write_pcd(dimm.id, &bytes)?;

	Ok(())
}

/// Builds the configuration input holding the goal `state` of `dimm`
fn config_input(inventory: &[Dimm], goals: &GoalState, dimm: &Dimm, state: &DimmGoalState, sequence: u32) -> ConfigInput {
	let mut tables = vec![PcatTable::PartitionSizeChange {
		status:            0,
		pm_partition_size: dimm.raw_capacity.saturating_sub(state.volatile),
	}];

	for &idx in &state.regions {
		let goal = goals.goal(idx);
		let identifications = goal
			.dimms
			.iter()
			.filter_map(|&id| inventory.iter().find(|member| member.id == id))
			.map(|member| Identification {
				uid:              member.uid,
				socket:           member.socket,
				die:              member.die,
				imc:              member.imc,
				channel:          member.channel,
				slot:             member.slot,
				partition_offset: goals.region_offset(member.id, idx),
				partition_size:   goal.size_per_dimm(),
			})
			.collect();

		tables.push(PcatTable::InterleaveInformation {
			index: goal.interleave_set_index,
			channel: goal.channel,
			imc: goal.imc,
			ways: goal.ways.bits(),
			mirror: false,
			status: 0,
			identifications,
		});
	}

	ConfigInput { sequence, tables }
}

/// Initializes the namespace labels of `dimms`
fn init_labels<P: DimmProvider + ?Sized>(
	provider: &mut P,
	dimms: &[DimmId],
	version: LabelVersion,
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	for &dimm in dimms {
		if let Err(err) = provider.init_labels(dimm, version) {
			status.push(dimm, StatusCode::FailedToInitNsLabels);
			return Err(err.into());
		}
	}

	Ok(())
}

/// Returns the capacity `map` leaves unconfigured, excluding the reserve DIMM
fn unconfigured_capacity(map: &TemplateMap<'_>) -> u64 {
	let raw = map.symmetric.iter().map(|entry| entry.dimm.raw_capacity).sum::<u64>();
	let used = map
		.symmetric
		.iter()
		.chain(&map.asymmetric)
		.map(|entry| entry.volatile + entry.region)
		.sum::<u64>();

	raw.saturating_sub(used)
}

/// Checks that the security state of all `dimms` allows configuration.
///
/// Returns the DIMMs that only take a goal once security is disabled.
///
/// # Errors
/// Returns an error naming the first DIMM whose security state forbids configuration.
pub fn verify_security<P: DimmProvider + ?Sized>(
	provider: &P,
	dimms: &[&Dimm],
	status: &mut CommandStatus,
) -> Result<Vec<DimmId>, GoalError> {
	let mut locked = None;
	let mut unlocked = vec![];
	for dimm in dimms {
		let state = provider.security_state(dimm.id)?;
		if state.forbids_configuration() {
			tracing::warn!(dimm = %dimm.id, ?state, "Security state forbids configuration");
			status.push(dimm.id, StatusCode::InvalidSecurityState);
			locked.get_or_insert(dimm.id);
		} else if state.requires_disable() {
			unlocked.push(dimm.id);
		}
	}

	match locked {
		Some(dimm) => Err(StateError::SecurityLocked(dimm).into()),
		None => Ok(unlocked),
	}
}

/// Checks that no namespace exists on any of `dimms`
fn verify_no_namespaces<P: DimmProvider + ?Sized>(
	provider: &P,
	dimms: &[&Dimm],
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	let mut found = None;
	for dimm in dimms {
		if provider.namespaces_exist(dimm.id)? {
			status.push(dimm.id, StatusCode::GoalNamespaceExists);
			found.get_or_insert(dimm.id);
		}
	}

	match found {
		Some(dimm) => Err(StateError::NamespaceExists(dimm).into()),
		None => Ok(()),
	}
}

/// Checks that no socket of `targets` already has a pending goal
fn verify_no_pending_goal(
	inventory: &[Dimm],
	goals: &GoalState,
	targets: &[&Dimm],
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	for socket in targets.sockets() {
		let pending = inventory
			.iter()
			.find(|dimm| dimm.socket == socket && goals.is_pending(dimm.id));
		if let Some(dimm) = pending {
			tracing::warn!(%socket, dimm = %dimm.id, "A goal is already pending on the socket");
			status.push(socket, StatusCode::CreateGoalNotAllowed);
			return Err(StateError::GoalPending(socket).into());
		}
	}

	Ok(())
}

/// Checks that each socket of `targets` is targeted either as a whole, or through
/// all of its unconfigured DIMMs
fn verify_socket_coverage(
	inventory: &[Dimm],
	targets: &[&Dimm],
	filter: SelectFilter,
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	for socket in targets.sockets() {
		let candidates = inventory
			.iter()
			.filter(|dimm| dimm.socket == socket && filter.matches(dimm))
			.collect::<Vec<_>>();
		let selected = targets.iter().filter(|dimm| dimm.socket == socket).collect::<Vec<_>>();

		let whole = selected.len() == candidates.len();
		let unconfigured = selected.iter().all(|dimm| !dimm.is_configured()) &&
			selected.len() == candidates.iter().filter(|dimm| !dimm.is_configured()).count();
		if !whole && !unconfigured {
			status.push(socket, StatusCode::ConfUnsupportedConfig);
			return Err(StateError::UnsupportedConfig(socket).into());
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use {
		super::config_input,
		crate::{
			dimm::{Dimm, DimmId, DimmUid, SocketId},
			goal::{map_regions_goal, GoalState},
			pcd::PcatTable,
			platform::Platform,
			request::PmType,
			status::CommandStatus,
			template::map_templates,
		},
		pmgoal_util::ByteSize,
	};

	const GIB: u64 = ByteSize::GIB;

	#[test]
	fn regions_are_laid_out_in_order() {
		let inventory = [128 * GIB, 256 * GIB]
			.into_iter()
			.zip(1..)
			.map(|(raw, id)| {
				let uid = DimmUid {
					serial: u32::from(id),
					..DimmUid::default()
				};
				Dimm::new(DimmId::new(id), uid, SocketId::new(0), raw)
			})
			.collect::<Vec<_>>();
		let targets = inventory.iter().collect::<Vec<_>>();
		let platform = Platform::default();

		let mut status = CommandStatus::new();
		let map = map_templates(
			SocketId::new(0),
			&targets,
			&[0, 0],
			PmType::AppDirect,
			0,
			&platform,
			&mut status,
		)
		.expect("Unable to map templates");
		let mut goals = GoalState::default();
		map_regions_goal(&mut goals, &map, &platform).expect("Unable to map region goals");

		let dimm = &inventory[1];
		let state = goals.dimm(dimm.id).expect("DIMM has no goal");
		let input = config_input(&inventory, &goals, dimm, state, 5);
		assert_eq!(input.sequence, 5);

		let offsets = input
			.tables
			.iter()
			.filter_map(|table| match table {
				PcatTable::InterleaveInformation { identifications, .. } => identifications
					.iter()
					.find(|id| id.uid == dimm.uid)
					.map(|id| (id.partition_offset, id.partition_size, identifications.len())),
				PcatTable::PartitionSizeChange { pm_partition_size, .. } => {
					assert_eq!(*pm_partition_size, 256 * GIB);
					None
				},
			})
			.collect::<Vec<_>>();
		assert_eq!(offsets, [(0, 128 * GIB, 2), (128 * GIB, 128 * GIB, 1)]);
	}
}
