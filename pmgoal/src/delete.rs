//! Goal deletion

// Imports
use crate::{
	context::GoalContext,
	dimm::{DimmId, DimmsExt, SocketId},
	error::{GoalError, StateError},
	persist::{apply_goals, verify_security},
	provider::DimmProvider,
	select::{select_dimms, SelectFilter},
	status::{CommandStatus, StatusCode},
};

/// Deletes the goals of the selected DIMMs.
///
/// All DIMMs sharing a region goal with a selected DIMM must be selected as well.
///
/// # Errors
/// Returns an error if the selection or state of the DIMMs forbid deleting their goals,
/// or if the cleared goals couldn't be written.
pub fn delete_goal_config<P: DimmProvider + ?Sized>(
	provider: &mut P,
	dimm_ids: &[DimmId],
	socket_ids: &[SocketId],
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	let mut ctx = GoalContext::load(&*provider)?;
	let inventory = &ctx.inventory;
	let goals = &mut ctx.goals;

	let filter = SelectFilter::MANAGEABLE | SelectFilter::FUNCTIONAL | SelectFilter::NO_UNMAPPED_POPULATION_VIOLATION;
	let targets = select_dimms(inventory, dimm_ids, socket_ids, filter, status)?;
	verify_security(&*provider, &targets, status)?;

	let (with_goal, without_goal) = targets
		.iter()
		.copied()
		.partition::<Vec<_>, _>(|dimm| goals.has_goal(dimm.id));
	for dimm in &without_goal {
		tracing::debug!(dimm = %dimm.id, "DIMM has no goal to delete");
		status.push(dimm.id, StatusCode::NoGoalExistsOnDimm);
	}
	if with_goal.is_empty() {
		return Err(StateError::NoGoal.into());
	}

	// Either none or all of a socket's goals must be deleted
	for socket in targets.sockets() {
		let socket_goals = inventory
			.iter()
			.filter(|dimm| dimm.socket == socket && dimm.manageable && goals.has_goal(dimm.id))
			.count();
		let count = with_goal.iter().filter(|dimm| dimm.socket == socket).count();
		if count != 0 && count != socket_goals {
			status.push(socket, StatusCode::ConfUnsupportedConfig);
			return Err(StateError::UnsupportedConfig(socket).into());
		}
	}

	let mut unspecified = vec![];
	for dimm in &with_goal {
		for related in goals.related_dimms(dimm.id) {
			if !targets.iter().any(|target| target.id == related) && !unspecified.contains(&related) {
				status.push(related, StatusCode::GoalConfAffectsUnspecDimm);
				unspecified.push(related);
			}
		}
	}
	if !unspecified.is_empty() {
		return Err(StateError::AffectsUnspecifiedDimms(unspecified).into());
	}

	for dimm in &with_goal {
		goals.clear_dimm(dimm.id);
	}
	apply_goals(provider, inventory, goals, status)?;
	tracing::info!(dimms = ?with_goal.iter().map(|dimm| dimm.id).collect::<Vec<_>>(), "Deleted goals");

	Ok(())
}
