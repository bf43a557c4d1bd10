//! Persistent memory goal tool (`pmgoal`)

// Modules
mod args;
mod config;

// Imports
use {
	self::args::{Args, Command},
	anyhow::Context,
	clap::Parser,
	itertools::Itertools,
	pmgoal::{CommandStatus, DimmGoalInfo, DirProvider, GoalEngine, GoalRequest},
	pmgoal_util::{logger, ByteSize, DisplayWrapper},
	std::fmt,
};

fn main() -> Result<(), anyhow::Error> {
	// Get arguments
	let args = Args::parse();
	logger::pre_init::debug(format!("Args: {args:?}"));
	if args.log_file_append && args.log_file.is_none() {
		logger::pre_init::warn("`--log-file-append` has no effect without `--log-file`");
	}

	// Initialize logging
	logger::init(args.log_file.as_deref(), args.log_file_append);

	// Read the topology and open the platform config data
	let topology = config::read(&args.config_file).context("Unable to read topology")?;
	let provider = DirProvider::new(topology, &args.pcd_dir).context("Unable to open platform config data directory")?;
	let mut engine = GoalEngine::new(provider);

	let mut status = CommandStatus::new();
	let res = match &args.command {
		Command::CreateGoal(create) => {
			let request = GoalRequest {
				pm_type:          create.pm_type,
				volatile_percent: create.volatile_percent,
				reserved_percent: create.reserved_percent,
				reserve_dimm:     create.reserve_dimm,
				label_version:    create.label_version,
			};
			engine
				.create_goal(
					create.examine,
					&create.select.dimm_ids(),
					&create.select.socket_ids(),
					&request,
					&mut status,
				)
				.map(|output| {
					println!(
						"Volatile: {:.2}%, reserved: {:.2}%, interleave sets per die: {}",
						output.volatile_percent, output.reserved_percent, output.max_pm_interleave_sets_per_die
					);
					output.goals
				})
		},
		Command::ShowGoal(select) => engine.get_goal_configs(&select.dimm_ids(), &select.socket_ids(), &mut status),
		Command::DeleteGoal(select) => engine
			.delete_goal_config(&select.dimm_ids(), &select.socket_ids(), &mut status)
			.map(|()| vec![]),
		Command::DumpGoal { file } => engine.dump_goal_config(file, &mut status).map(|()| vec![]),
		Command::LoadGoal { file } => engine
			.load_goal_config(file, &mut status)
			.and_then(|()| engine.get_goal_configs(&[], &[], &mut CommandStatus::new())),
	};

	if let Ok(goals) = &res {
		self::print_goals(goals);
	}
	print!("{status}");

	res.map(|_| ()).context("Command failed")
}

/// Prints `goals` as a table
fn print_goals(goals: &[DimmGoalInfo]) {
	if goals.is_empty() {
		return;
	}

	println!(
		"{:<8} {:<8} {:>12} {:>12} {:<40} {}",
		"DIMM", "Socket", "Volatile", "Storage", "Regions", "Status"
	);
	for goal in goals {
		let regions = DisplayWrapper::new(|f: &mut fmt::Formatter| {
			if goal.regions.is_empty() {
				return write!(f, "-");
			}
			let regions = goal.regions.iter().format_with(", ", |region, f| {
				f(&format_args!(
					"#{} {} ({}x{:?})",
					region.app_direct_index,
					ByteSize(region.size),
					region.dimm_count,
					region.interleave
				))
			});
			write!(f, "{regions}")
		});

		println!(
			"{:<8} {:<8} {:>12} {:>12} {:<40} {:?}",
			goal.dimm.to_string(),
			goal.socket.to_string(),
			ByteSize(goal.volatile_size).to_string(),
			ByteSize(goal.storage_capacity).to_string(),
			regions.to_string(),
			goal.status
		);
	}
}
