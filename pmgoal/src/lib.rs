//! Persistent memory capacity goal provisioning (`pmgoal`)
//!
//! Translates a percentage based request (volatile, reserved and AppDirect capacity)
//! into per-DIMM region goals, validates them against the platform and persists them
//! into each DIMM's platform config data.

// Modules
pub mod capacity;
pub mod context;
pub mod delete;
pub mod dimm;
pub mod dump;
pub mod engine;
pub mod error;
pub mod goal;
pub mod pcd;
pub mod persist;
pub mod platform;
pub mod provider;
pub mod read;
pub mod reduce;
pub mod request;
pub mod select;
pub mod status;
pub mod template;

// Exports
pub use self::{
	context::GoalContext,
	dimm::{Dimm, DimmId, DimmUid, SocketId},
	engine::GoalEngine,
	error::GoalError,
	goal::{DimmGoalInfo, GoalConfigStatus},
	persist::CreateGoalOutput,
	platform::Platform,
	provider::{DimmProvider, DirProvider, MemoryProvider},
	request::{GoalRequest, LabelVersion, PmType, ReserveDimm},
	select::SelectFilter,
	status::{CommandStatus, ObjectId, StatusCode},
};
