//! Goal engine

// Imports
use {
	crate::{
		delete,
		dimm::{DimmId, SocketId},
		dump,
		error::GoalError,
		goal::DimmGoalInfo,
		persist::{self, CreateGoalOutput},
		provider::DimmProvider,
		read,
		request::GoalRequest,
		status::{CommandStatus, StatusCode},
	},
	std::path::Path,
};

/// Goal engine.
///
/// Every operation reloads the goal state from the provider and discards it once
/// done. Per-object results are recorded into the passed status, whose aggregate
/// code is set from the operation's result.
#[derive(Debug)]
pub struct GoalEngine<P> {
	/// Provider
	provider: P,
}

impl<P: DimmProvider> GoalEngine<P> {
	/// Creates a new engine
	pub fn new(provider: P) -> Self {
		Self { provider }
	}

	/// Returns the provider
	pub fn provider(&self) -> &P {
		&self.provider
	}

	/// Returns the provider mutably
	pub fn provider_mut(&mut self) -> &mut P {
		&mut self.provider
	}

	/// Returns the provider, consuming the engine
	pub fn into_inner(self) -> P {
		self.provider
	}

	/// Creates a goal on the selected DIMMs, or only resolves it, with `examine`
	pub fn create_goal(
		&mut self,
		examine: bool,
		dimm_ids: &[DimmId],
		socket_ids: &[SocketId],
		request: &GoalRequest,
		status: &mut CommandStatus,
	) -> Result<CreateGoalOutput, GoalError> {
		let res = persist::create_goal(&mut self.provider, examine, dimm_ids, socket_ids, request, status);
		self::finish(res, status)
	}

	/// Resolves a goal without creating it, returning the capacities it would actually get
	pub fn preview_actual_capacities(
		&mut self,
		dimm_ids: &[DimmId],
		socket_ids: &[SocketId],
		request: &GoalRequest,
		status: &mut CommandStatus,
	) -> Result<CreateGoalOutput, GoalError> {
		self.create_goal(true, dimm_ids, socket_ids, request, status)
	}

	/// Returns the goals of the selected DIMMs
	pub fn get_goal_configs(
		&self,
		dimm_ids: &[DimmId],
		socket_ids: &[SocketId],
		status: &mut CommandStatus,
	) -> Result<Vec<DimmGoalInfo>, GoalError> {
		let res = read::get_goal_configs(&self.provider, dimm_ids, socket_ids, status);
		self::finish(res, status)
	}

	/// Deletes the goals of the selected DIMMs
	pub fn delete_goal_config(
		&mut self,
		dimm_ids: &[DimmId],
		socket_ids: &[SocketId],
		status: &mut CommandStatus,
	) -> Result<(), GoalError> {
		let res = delete::delete_goal_config(&mut self.provider, dimm_ids, socket_ids, status);
		self::finish(res, status)
	}

	/// Dumps the pending goals to `path`
	pub fn dump_goal_config(&self, path: &Path, status: &mut CommandStatus) -> Result<(), GoalError> {
		let res = dump::dump_goal_config(&self.provider, path, status);
		self::finish(res, status)
	}

	/// Loads the goals dumped to `path`
	pub fn load_goal_config(&mut self, path: &Path, status: &mut CommandStatus) -> Result<(), GoalError> {
		let res = dump::load_goal_config(&mut self.provider, path, status);
		self::finish(res, status)
	}
}

/// Sets the aggregate code of `status` from `res`
fn finish<T>(res: Result<T, GoalError>, status: &mut CommandStatus) -> Result<T, GoalError> {
	match &res {
		Ok(_) => status.set_code(StatusCode::Success),
		Err(err) => {
			tracing::warn!(?err, code = %err.code(), "Operation failed");
			status.set_code(err.code());
		},
	}

	res
}
