//! Arguments

// Imports
use {
	pmgoal::{DimmId, LabelVersion, PmType, ReserveDimm, SocketId},
	std::{num::ParseIntError, path::PathBuf},
};

/// Arguments
#[derive(Debug)]
#[derive(clap::Parser)]
pub struct Args {
	/// Log file
	///
	/// Specifies a file to perform verbose logging to.
	/// You can use `RUST_LOG_FILE` to set filtering options
	#[clap(long = "log-file")]
	pub log_file: Option<PathBuf>,

	/// Whether to append to the log file
	#[clap(long = "log-file-append")]
	pub log_file_append: bool,

	/// Topology file
	#[clap(long = "config")]
	pub config_file: PathBuf,

	/// Platform config data directory
	#[clap(long = "pcd-dir")]
	pub pcd_dir: PathBuf,

	/// Command
	#[clap(subcommand)]
	pub command: Command,
}

/// Command
#[derive(Debug)]
#[derive(clap::Subcommand)]
pub enum Command {
	/// Creates a goal
	CreateGoal(CreateGoalArgs),

	/// Shows the pending goals
	ShowGoal(SelectArgs),

	/// Deletes the pending goals
	DeleteGoal(SelectArgs),

	/// Dumps the pending goals to a file
	DumpGoal {
		/// Dump file
		file: PathBuf,
	},

	/// Creates the goals dumped to a file
	LoadGoal {
		/// Dump file
		file: PathBuf,
	},
}

/// DIMM selection
#[derive(Debug)]
#[derive(clap::Args)]
pub struct SelectArgs {
	/// DIMM handles
	#[clap(long = "dimm", value_parser = parse_id)]
	pub dimms: Vec<u16>,

	/// Socket ids
	#[clap(long = "socket", value_parser = parse_id)]
	pub sockets: Vec<u16>,
}

impl SelectArgs {
	/// Returns the selected DIMMs
	pub fn dimm_ids(&self) -> Vec<DimmId> {
		self.dimms.iter().copied().map(DimmId::new).collect()
	}

	/// Returns the selected sockets
	pub fn socket_ids(&self) -> Vec<SocketId> {
		self.sockets.iter().copied().map(SocketId::new).collect()
	}
}

/// Create goal arguments
#[derive(Debug)]
#[derive(clap::Args)]
pub struct CreateGoalArgs {
	/// DIMM selection
	#[clap(flatten)]
	pub select: SelectArgs,

	/// Percentage of capacity to use as volatile memory
	#[clap(long = "volatile", default_value_t = 0)]
	pub volatile_percent: u32,

	/// Percentage of capacity to leave unconfigured
	#[clap(long = "reserved", default_value_t = 0)]
	pub reserved_percent: u32,

	/// Persistent memory type
	#[clap(long = "pm-type", value_enum, default_value_t = PmType::AppDirect)]
	pub pm_type: PmType,

	/// Reserve DIMM
	#[clap(long = "reserve-dimm", value_enum, default_value_t = ReserveDimm::None)]
	pub reserve_dimm: ReserveDimm,

	/// Namespace label version
	#[clap(long = "label-version", default_value_t = LabelVersion::V1_2)]
	pub label_version: LabelVersion,

	/// Only show the goal that would be created
	#[clap(long = "examine")]
	pub examine: bool,
}

/// Parses an id, either decimal or hexadecimal with a `0x` prefix
fn parse_id(s: &str) -> Result<u16, ParseIntError> {
	match s.strip_prefix("0x") {
		Some(hex) => u16::from_str_radix(hex, 16),
		None => s.parse(),
	}
}
