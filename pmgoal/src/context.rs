//! Goal context

// Imports
use crate::{
	dimm::{Dimm, DimmId, SocketId},
	goal::{AppDirectIndexTable, DimmGoalInfo, GoalState},
	platform::Platform,
};

/// Goal context.
///
/// A snapshot of the inventory, platform and goal state, loaded at the start of every
/// operation and dropped at its end. Nothing survives between operations.
#[derive(Clone, Debug)]
pub struct GoalContext {
	/// DIMM inventory
	pub inventory: Vec<Dimm>,

	/// Platform capability
	pub platform: Platform,

	/// Goal state
	pub goals: GoalState,
}

impl GoalContext {
	/// Returns the DIMM `id`
	#[must_use]
	pub fn dimm(&self, id: DimmId) -> Option<&Dimm> {
		self.inventory.iter().find(|dimm| dimm.id == id)
	}

	/// Returns all DIMMs on `socket`
	#[must_use]
	pub fn socket_dimms(&self, socket: SocketId) -> Vec<&Dimm> {
		self.inventory.iter().filter(|dimm| dimm.socket == socket).collect()
	}

	/// Returns the AppDirect index table of the current goals
	#[must_use]
	pub fn index_table(&self) -> AppDirectIndexTable {
		AppDirectIndexTable::new(&self.inventory, &self.goals)
	}

	/// Returns the goal summaries of all DIMMs in `dimms` with a goal
	#[must_use]
	pub fn goal_infos<'a>(&self, dimms: impl IntoIterator<Item = &'a Dimm>) -> Vec<DimmGoalInfo> {
		let indices = self.index_table();
		dimms
			.into_iter()
			.filter_map(|dimm| self.goals.goal_info(dimm, &indices))
			.collect()
	}
}
