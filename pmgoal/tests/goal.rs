//! Goal engine tests

// Imports
use {
	pmgoal::{
		capacity::percent_of,
		dimm::{Population, SecurityState},
		error::GoalError,
		pcd::{ConfigOutput, PlatformConfigData},
		platform::SocketSku,
		template::InterleaveType,
		CommandStatus,
		Dimm,
		DimmGoalInfo,
		DimmId,
		DimmUid,
		GoalConfigStatus,
		GoalEngine,
		GoalRequest,
		LabelVersion,
		MemoryProvider,
		Platform,
		PmType,
		ReserveDimm,
		SocketId,
		StatusCode,
	},
	pmgoal_util::ByteSize,
	rand::{rngs::StdRng, Rng, SeedableRng},
	std::collections::BTreeMap,
};

const GIB: u64 = ByteSize::GIB;

fn dimm(id: u16, socket: u16, raw_gib: u64) -> Dimm {
	let uid = DimmUid {
		manufacturer_id: 0x8089,
		serial: 0x1000 + u32::from(id),
		..DimmUid::default()
	};
	Dimm::new(DimmId::new(id), uid, SocketId::new(socket), raw_gib * GIB)
}

fn engine(dimms: Vec<Dimm>) -> GoalEngine<MemoryProvider> {
	GoalEngine::new(MemoryProvider::new(Platform::default(), dimms))
}

fn request(pm_type: PmType, volatile_percent: u32, reserved_percent: u32) -> GoalRequest {
	GoalRequest {
		pm_type,
		volatile_percent,
		reserved_percent,
		reserve_dimm: ReserveDimm::None,
		label_version: LabelVersion::default(),
	}
}

fn create(engine: &mut GoalEngine<MemoryProvider>, examine: bool, request: &GoalRequest) -> Vec<DimmGoalInfo> {
	let mut status = CommandStatus::new();
	engine
		.create_goal(examine, &[], &[], request, &mut status)
		.expect("Unable to create goal")
		.goals
}

fn get_all(engine: &GoalEngine<MemoryProvider>) -> Vec<DimmGoalInfo> {
	engine
		.get_goal_configs(&[], &[], &mut CommandStatus::new())
		.expect("Unable to get goals")
}

#[test]
fn volatile_capacity_never_overshoots() {
	let mut rng = StdRng::seed_from_u64(0x5eed);
	for _ in 0..64 {
		let dimm_count = rng.gen_range(1..=8);
		let dimms = (1..=dimm_count)
			.map(|id| dimm(id, 0, rng.gen_range(16..=512)))
			.collect::<Vec<_>>();
		let total_raw = dimms.iter().map(|dimm| dimm.raw_capacity).sum::<u64>();

		let volatile_percent = rng.gen_range(0..100);
		let reserved_percent = rng.gen_range(0..=100 - volatile_percent);
		let pm_type = match rng.gen_bool(0.5) {
			true => PmType::AppDirect,
			false => PmType::AppDirectNotInterleaved,
		};

		let mut engine = self::engine(dimms);
		let goals = create(
			&mut engine,
			true,
			&request(pm_type, volatile_percent, reserved_percent),
		);
		let volatile = goals.iter().map(|goal| goal.volatile_size).sum::<u64>();
		assert!(
			volatile <= percent_of(total_raw, volatile_percent),
			"{volatile} bytes of volatile capacity exceed {volatile_percent}% of {total_raw} bytes"
		);
		assert!(engine.provider().writes().is_empty());
	}
}

#[test]
fn volatile_capacity_is_proportional() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 256)]);
	let goals = create(&mut engine, false, &request(PmType::AppDirect, 25, 0));

	let volatile = goals.iter().map(|goal| goal.volatile_size).collect::<Vec<_>>();
	assert_eq!(volatile, [32 * GIB, 64 * GIB]);
}

#[test]
fn examine_resolves_the_applied_goal() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 256), dimm(3, 1, 128), dimm(4, 1, 128)]);
	let request = request(PmType::AppDirect, 20, 10);

	let mut status = CommandStatus::new();
	let examined = engine
		.preview_actual_capacities(&[], &[], &request, &mut status)
		.expect("Unable to preview goal");
	assert!(status.is_success());
	assert!(examined.volatile_percent <= 20.0);
	assert!(engine.provider().writes().is_empty());

	let applied = create(&mut engine, false, &request);
	assert_eq!(examined.goals, applied);
	assert_eq!(get_all(&engine), applied);
	assert!(applied.iter().all(|goal| goal.status == GoalConfigStatus::New));
	assert_eq!(engine.provider().writes().len(), 4);
	assert_eq!(engine.provider().label_inits().len(), 4);
}

#[test]
fn app_direct_index_is_stable_across_queries() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128), dimm(3, 1, 256), dimm(4, 1, 256)]);
	create(&mut engine, false, &request(PmType::AppDirectNotInterleaved, 0, 0));

	let indices = |goals: Vec<DimmGoalInfo>| {
		goals
			.into_iter()
			.map(|goal| (goal.dimm, goal.regions[0].app_direct_index))
			.collect::<BTreeMap<_, _>>()
	};
	let all = indices(get_all(&engine));
	assert_eq!(all.values().copied().collect::<Vec<_>>(), [1, 2, 3, 4]);

	let socket = indices(
		engine
			.get_goal_configs(&[], &[SocketId::new(1)], &mut CommandStatus::new())
			.expect("Unable to get goals"),
	);
	let single = indices(
		engine
			.get_goal_configs(&[DimmId::new(4)], &[], &mut CommandStatus::new())
			.expect("Unable to get goals"),
	);
	for (dimm, index) in socket.into_iter().chain(single) {
		assert_eq!(all[&dimm], index);
	}
}

#[test]
fn deleted_goals_are_gone() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	create(&mut engine, false, &request(PmType::AppDirect, 0, 0));
	assert_eq!(get_all(&engine).len(), 2);

	let mut status = CommandStatus::new();
	engine
		.delete_goal_config(&[], &[], &mut status)
		.expect("Unable to delete goals");
	assert!(status.is_success());
	assert!(get_all(&engine).is_empty());

	let err = engine
		.delete_goal_config(&[], &[], &mut status)
		.expect_err("Deleted goals twice");
	assert_eq!(err.code(), StatusCode::NoGoalExistsOnDimm);
}

#[test]
fn deleting_part_of_an_interleave_set_is_rejected() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	create(&mut engine, false, &request(PmType::AppDirect, 0, 0));
	engine.provider_mut().clear_log();

	let mut status = CommandStatus::new();
	let err = engine
		.delete_goal_config(&[DimmId::new(1)], &[], &mut status)
		.expect_err("Deleted part of an interleave set");
	assert_eq!(err.code(), StatusCode::GoalConfAffectsUnspecDimm);
	assert!(status
		.codes_for(DimmId::new(2))
		.any(|code| code == StatusCode::GoalConfAffectsUnspecDimm));
	assert!(engine.provider().writes().is_empty());
}

#[test]
fn oversized_percentages_are_rejected() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);

	let mut status = CommandStatus::new();
	let err = engine
		.create_goal(false, &[], &[], &request(PmType::AppDirect, 60, 50), &mut status)
		.expect_err("Accepted oversized percentages");
	assert!(matches!(err, GoalError::Parameter(_)));
	assert_eq!(status.code(), StatusCode::InvalidParameter);
	assert!(engine.provider().writes().is_empty());
}

#[test]
fn population_violation_is_only_allowed_for_not_interleaved_app_direct() {
	let mut violating = dimm(3, 0, 128);
	violating.population = Population::Violation;
	let dimms = vec![dimm(1, 0, 128), dimm(2, 0, 128), violating];

	let mut engine = engine(dimms);
	let goals = create(&mut engine, true, &request(PmType::AppDirectNotInterleaved, 20, 0));
	assert_eq!(goals.len(), 2);
	assert!(goals.iter().all(|goal| goal.dimm != DimmId::new(3)));

	let goals = create(&mut engine, true, &request(PmType::AppDirectNotInterleaved, 0, 0));
	assert_eq!(goals.len(), 3);
	assert!(goals.iter().any(|goal| goal.dimm == DimmId::new(3)));
}

#[test]
fn pending_goal_blocks_new_goals() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	create(&mut engine, false, &request(PmType::AppDirect, 0, 0));
	engine.provider_mut().clear_log();

	let mut status = CommandStatus::new();
	let err = engine
		.create_goal(false, &[], &[], &request(PmType::AppDirect, 50, 0), &mut status)
		.expect_err("Created goal over a pending one");
	assert!(matches!(err, GoalError::State(_)));
	assert_eq!(status.code(), StatusCode::CreateGoalNotAllowed);
	assert!(engine.provider().writes().is_empty());
}

#[test]
fn dumped_goals_load_back() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128), dimm(3, 1, 256), dimm(4, 1, 256)]);

	let mut status = CommandStatus::new();
	engine
		.create_goal(
			false,
			&[],
			&[SocketId::new(0)],
			&request(PmType::AppDirect, 25, 25),
			&mut status,
		)
		.expect("Unable to create goal");
	engine
		.create_goal(
			false,
			&[],
			&[SocketId::new(1)],
			&request(PmType::AppDirectNotInterleaved, 0, 0),
			&mut status,
		)
		.expect("Unable to create goal");
	let created = get_all(&engine);

	let path = std::env::temp_dir().join(format!("pmgoal-dump-{}.json", std::process::id()));
	engine
		.dump_goal_config(&path, &mut status)
		.expect("Unable to dump goals");
	engine
		.delete_goal_config(&[], &[], &mut status)
		.expect("Unable to delete goals");
	assert!(get_all(&engine).is_empty());

	let mut status = CommandStatus::new();
	let res = engine.load_goal_config(&path, &mut status);
	std::fs::remove_file(&path).expect("Unable to remove dump file");
	res.expect("Unable to load goals");

	assert!(status.is_success());
	assert_eq!(get_all(&engine), created);
}

#[test]
fn dumped_goals_skip_population_violations() {
	let mut violating = dimm(3, 0, 128);
	violating.population = Population::Violation;
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128), violating]);

	create(&mut engine, false, &request(PmType::AppDirectNotInterleaved, 25, 0));
	let created = get_all(&engine);
	assert_eq!(created.len(), 2);

	let path = std::env::temp_dir().join(format!("pmgoal-dump-violation-{}.json", std::process::id()));
	let mut status = CommandStatus::new();
	engine
		.dump_goal_config(&path, &mut status)
		.expect("Unable to dump goals");
	engine
		.delete_goal_config(&[DimmId::new(1), DimmId::new(2)], &[], &mut status)
		.expect("Unable to delete goals");
	assert!(get_all(&engine).is_empty());

	let mut status = CommandStatus::new();
	let res = engine.load_goal_config(&path, &mut status);
	std::fs::remove_file(&path).expect("Unable to remove dump file");
	res.expect("Unable to load goals");

	assert!(status.is_success());
	assert_eq!(get_all(&engine), created);
}

#[test]
fn failed_write_keeps_earlier_dimms() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	engine.provider_mut().fail_writes_on(Some(DimmId::new(2)));

	let mut status = CommandStatus::new();
	let err = engine
		.create_goal(false, &[], &[], &request(PmType::AppDirectNotInterleaved, 0, 0), &mut status)
		.expect_err("Write failure was ignored");
	assert_eq!(err.code(), StatusCode::DeviceBusy);
	assert_eq!(engine.provider().writes(), [DimmId::new(1)]);
	assert!(status.codes_for(DimmId::new(1)).any(|code| code == StatusCode::Success));
	assert!(status
		.codes_for(DimmId::new(2))
		.any(|code| code == StatusCode::ConfApplyingFailed));

	let goals = get_all(&engine);
	assert_eq!(goals.len(), 1);
	assert_eq!(goals[0].dimm, DimmId::new(1));
}

#[test]
fn partially_applied_goal_can_be_deleted() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	engine.provider_mut().fail_writes_on(Some(DimmId::new(2)));
	engine
		.create_goal(
			false,
			&[],
			&[],
			&request(PmType::AppDirectNotInterleaved, 0, 0),
			&mut CommandStatus::new(),
		)
		.expect_err("Write failure was ignored");
	engine.provider_mut().fail_writes_on(None);

	let mut status = CommandStatus::new();
	engine
		.delete_goal_config(&[], &[], &mut status)
		.expect("Unable to delete partially applied goal");
	assert!(status
		.codes_for(DimmId::new(2))
		.any(|code| code == StatusCode::NoGoalExistsOnDimm));
	assert!(get_all(&engine).is_empty());

	let goals = create(&mut engine, false, &request(PmType::AppDirectNotInterleaved, 0, 0));
	assert_eq!(goals.len(), 2);
}

#[test]
fn reserve_dimm_gets_its_own_region() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128), dimm(3, 0, 128)]);
	let request = GoalRequest {
		reserve_dimm: ReserveDimm::AppDirectNotInterleaved,
		..request(PmType::AppDirect, 0, 0)
	};
	let goals = create(&mut engine, false, &request);

	assert_eq!(goals.len(), 3);
	for goal in &goals[..2] {
		assert_eq!(goal.regions[0].interleave, InterleaveType::Interleaved);
		assert_eq!(goal.regions[0].dimm_count, 2);
	}
	assert_eq!(goals[2].volatile_size, 0);
	assert_eq!(goals[2].regions.len(), 1);
	assert_eq!(goals[2].regions[0].interleave, InterleaveType::NotInterleaved);
	assert_eq!(goals[2].regions[0].size, 128 * GIB);

	let mut engine = self::engine(vec![dimm(1, 0, 128)]);
	let err = engine
		.create_goal(true, &[], &[], &request, &mut CommandStatus::new())
		.expect_err("Reserved the only DIMM");
	assert_eq!(err.code(), StatusCode::ReserveDimmRequiresTwoDimms);
}

#[test]
fn cpu_sku_limit_reduces_the_goal() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	engine.provider_mut().platform_mut().sockets.push(SocketSku {
		socket:              SocketId::new(0),
		mapped_memory_limit: 192 * GIB,
		total_mapped_memory: 0,
		caching_memory:      0,
		near_memory:         0,
	});

	let mut status = CommandStatus::new();
	let output = engine
		.create_goal(false, &[], &[], &request(PmType::AppDirect, 0, 0), &mut status)
		.expect("Unable to create goal");
	assert!(status.contains(StatusCode::MappedMemReducedDueToCpuSku));
	assert!(output.goals.iter().all(|goal| goal.regions[0].size == 96 * GIB));
	assert_eq!(get_all(&engine), output.goals);
}

#[test]
fn security_state_gates_goals() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	if let Some(dimm) = engine.provider_mut().dimm_mut(DimmId::new(2)) {
		dimm.security = SecurityState::ENABLED | SecurityState::LOCKED;
	}

	let mut status = CommandStatus::new();
	let err = engine
		.create_goal(false, &[], &[], &request(PmType::AppDirect, 0, 0), &mut status)
		.expect_err("Created goal on a locked DIMM");
	assert_eq!(err.code(), StatusCode::InvalidSecurityState);
	assert!(engine.provider().writes().is_empty());

	if let Some(dimm) = engine.provider_mut().dimm_mut(DimmId::new(2)) {
		dimm.security = SecurityState::ENABLED;
	}
	let mut status = CommandStatus::new();
	engine
		.create_goal(false, &[], &[], &request(PmType::AppDirect, 0, 0), &mut status)
		.expect("Unable to create goal");
	assert!(status
		.codes_for(DimmId::new(2))
		.any(|code| code == StatusCode::GoalCreationSecurityUnlocked));
}

#[test]
fn namespaces_block_new_goals() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	engine.provider_mut().set_namespaces(DimmId::new(1), true);

	let mut status = CommandStatus::new();
	let err = engine
		.create_goal(false, &[], &[], &request(PmType::AppDirect, 0, 0), &mut status)
		.expect_err("Created goal over namespaces");
	assert_eq!(err.code(), StatusCode::GoalNamespaceExists);
	assert!(engine.provider().writes().is_empty());
}

#[test]
fn rejected_goal_can_be_replaced() {
	let mut engine = engine(vec![dimm(1, 0, 128), dimm(2, 0, 128)]);
	create(&mut engine, false, &request(PmType::AppDirect, 50, 0));

	// Reject the goal on both DIMMs, without saying why
	for id in [DimmId::new(1), DimmId::new(2)] {
		let bytes = engine.provider().pcd(id).expect("Goal wasn't written");
		let mut pcd = PlatformConfigData::from_bytes(bytes).expect("Unable to parse written goal");
		let input = pcd.input.as_ref().expect("Goal has no config input");
		pcd.output = Some(ConfigOutput {
			sequence:          input.sequence,
			validation_status: 1,
			tables:            vec![],
		});
		let bytes = pcd.to_bytes().expect("Unable to encode rejected goal");
		engine.provider_mut().set_pcd(id, bytes);
	}

	let goals = get_all(&engine);
	assert!(goals.iter().all(|goal| goal.status == GoalConfigStatus::Unknown));

	let goals = create(&mut engine, false, &request(PmType::AppDirect, 25, 0));
	assert!(goals.iter().all(|goal| goal.status == GoalConfigStatus::New));
	assert_eq!(goals[0].volatile_size, 32 * GIB);
}
