//! Capacity reduction and SKU constraints

// Imports
use {
	crate::{
		dimm::Dimm,
		error::{GoalError, PlatformConstraintError, ResourceError},
		platform::Platform,
		request::{GoalRequest, PmType},
		status::{CommandStatus, StatusCode},
		template::{RegionGoalDimm, TemplateMap},
	},
	pmgoal_util::AlignExt,
	std::slice,
};

/// Shrinks the regions of `entries` until `reserved` bytes were taken out of them.
///
/// Every region is shrunk by the same amount each round, rounded up to `align`, so
/// equally sized regions stay equally sized. If the regions don't add up to more than
/// `reserved`, they're all emptied.
///
/// Leaves the bytes that couldn't be taken out in `reserved`.
pub fn reduce_app_direct_per_reserved(entries: &mut [RegionGoalDimm<'_>], reserved: &mut u64, align: u64) {
	let align = align.max(1);
	while *reserved > 0 {
		let with_region = entries.iter().filter(|entry| entry.region > 0).count() as u64;
		if with_region == 0 {
			break;
		}

		let total_region = entries.iter().map(|entry| entry.region).sum::<u64>();
		if total_region <= *reserved {
			*reserved -= total_region;
			for entry in entries.iter_mut() {
				entry.region = 0;
			}
			break;
		}

		let reduce_by = (*reserved / with_region).align_up(align).max(align);
		for entry in entries.iter_mut().filter(|entry| entry.region > 0) {
			let amount = reduce_by.min(entry.region);
			entry.region -= amount;
			*reserved = reserved.saturating_sub(amount);
		}
	}
}

/// Shrinks the largest volatile sizes of `entries` until `excess` bytes were taken out.
///
/// # Errors
/// Returns an error if all volatile capacity was taken out and some excess remains.
pub fn reduce_volatile_per_reserved(
	entries: &mut [RegionGoalDimm<'_>],
	mut excess: u64,
	align: u64,
) -> Result<(), ResourceError> {
	let align = align.max(1);
	while excess > 0 {
		let largest = entries.iter().map(|entry| entry.volatile).max().unwrap_or(0);
		if largest == 0 {
			return Err(ResourceError::UnableToReduce { remaining: excess });
		}
		let second = entries
			.iter()
			.map(|entry| entry.volatile)
			.filter(|&volatile| volatile < largest)
			.max()
			.unwrap_or(0);
		let count = entries.iter().filter(|entry| entry.volatile == largest).count() as u64;

		let reduce_by = (excess / count).align_up(align).max(align).min(largest - second);
		for entry in entries.iter_mut().filter(|entry| entry.volatile == largest) {
			entry.volatile -= reduce_by;
			excess = excess.saturating_sub(reduce_by);
		}
	}

	Ok(())
}

/// Reduces `map` so the socket stays within the mapped memory limit of its CPU SKU.
///
/// `socket_dimms` are all DIMMs on the socket, including the ones not being configured,
/// which keep their currently mapped capacity. Running this on an already reduced map
/// changes nothing.
///
/// # Errors
/// Returns an error if the map can't be reduced enough.
pub fn reduce_for_socket_sku(
	map: &mut TemplateMap<'_>,
	socket_dimms: &[&Dimm],
	pm_type: PmType,
	platform: &Platform,
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	let socket = map.socket;
	let Some(sku) = platform.socket_sku(socket) else {
		tracing::trace!(%socket, "No SKU information for socket, skipping mapped memory check");
		return Ok(());
	};

	// Capacity that stays mapped regardless of this goal
	let untouched = socket_dimms
		.iter()
		.filter(|dimm| !map.symmetric.iter().any(|entry| entry.dimm.id == dimm.id))
		.filter(|dimm| map.reserve.map_or(true, |reserve| reserve.dimm.id != dimm.id))
		.collect::<Vec<_>>();
	let kept = untouched
		.iter()
		.map(|dimm| dimm.mapped_volatile + dimm.mapped_persistent)
		.sum::<u64>();

	// DDR is only mapped while no DIMM on the socket is in memory mode
	let currently_2lm = socket_dimms.iter().any(|dimm| dimm.mapped_volatile > 0);
	let will_be_2lm = map.total_volatile() > 0 || untouched.iter().any(|dimm| dimm.mapped_volatile > 0);
	let ddr = match currently_2lm {
		true => sku.caching_memory,
		false => {
			let mapped = socket_dimms
				.iter()
				.map(|dimm| dimm.mapped_volatile + dimm.mapped_persistent)
				.sum::<u64>();
			sku.total_mapped_memory.saturating_sub(mapped)
		},
	};
	let ddr_mapped = match will_be_2lm {
		true => 0,
		false => ddr,
	};

	let limit = sku.mapped_memory_limit.saturating_sub(kept + ddr_mapped);
	let requested = map.total_volatile() + map.total_regions();
	if requested <= limit {
		return Ok(());
	}

	let mut excess = requested - limit;
	tracing::warn!(%socket, requested, limit, excess, "Reducing goal to the CPU SKU mapped memory limit");
	status.push(socket, StatusCode::MappedMemReducedDueToCpuSku);

	let alignments = &platform.alignments;
	reduce_app_direct_per_reserved(&mut map.asymmetric, &mut excess, alignments.region_persistent);
	if let Some(reserve) = &mut map.reserve {
		reduce_app_direct_per_reserved(slice::from_mut(reserve), &mut excess, alignments.region_persistent);
	}
	reduce_app_direct_per_reserved(&mut map.symmetric, &mut excess, alignments.region_persistent);
	if excess > 0 {
		reduce_volatile_per_reserved(&mut map.symmetric, excess, alignments.region_volatile)?;
	}
	map.rebuild_templates(pm_type);

	Ok(())
}

/// Checks the near memory to far memory ratio of `map`.
///
/// Violations are only reported as warnings, the platform enforces them on boot.
pub fn check_nm_fm_ratio(map: &TemplateMap<'_>, platform: &Platform, status: &mut CommandStatus) {
	let far_memory = map.total_volatile();
	if far_memory == 0 {
		return;
	}
	let Some(near_memory) = platform
		.socket_sku(map.socket)
		.map(|sku| sku.near_memory)
		.filter(|&near_memory| near_memory > 0)
	else {
		return;
	};

	let ratio = &platform.nm_fm_ratio;
	let socket = map.socket;
	if u128::from(far_memory) < u128::from(near_memory) * u128::from(ratio.min) {
		tracing::warn!(%socket, near_memory, far_memory, min = ratio.min, "Near to far memory ratio below bound");
		status.push(socket, StatusCode::NmFmRatioLowerViolation);
	}
	if u128::from(far_memory) > u128::from(near_memory) * u128::from(ratio.max) {
		tracing::warn!(%socket, near_memory, far_memory, max = ratio.max, "Near to far memory ratio above bound");
		status.push(socket, StatusCode::NmFmRatioUpperViolation);
	}
}

/// Checks that all DIMMs share the same SKU modes
///
/// # Errors
/// Returns an error naming the first DIMM that differs from the first DIMM.
pub fn verify_uniform_sku(dimms: &[&Dimm], status: &mut CommandStatus) -> Result<(), GoalError> {
	let Some(first) = dimms.first() else {
		return Ok(());
	};

	match dimms.iter().find(|dimm| dimm.sku != first.sku) {
		Some(dimm) => {
			status.push(dimm.id, StatusCode::DimmSkuModeMismatch);
			Err(PlatformConstraintError::MixedSku(dimm.id).into())
		},
		None => Ok(()),
	}
}

/// Checks that the DIMMs and the platform support the modes `request` needs
///
/// # Errors
/// Returns an error on the first unsupported mode.
pub fn verify_sku_support(
	dimms: &[&Dimm],
	request: &GoalRequest,
	platform: &Platform,
	status: &mut CommandStatus,
) -> Result<(), GoalError> {
	let needs_memory_mode = request.volatile_percent > 0;
	let needs_app_direct = request.pm_type != PmType::Storage;

	if needs_memory_mode && !platform.modes.memory_mode {
		return Err(PlatformConstraintError::MemoryModeNotSupported.into());
	}
	if needs_app_direct && !platform.modes.app_direct {
		return Err(PlatformConstraintError::AppDirectNotSupported.into());
	}

	for dimm in dimms {
		let mode = if needs_memory_mode && !dimm.sku.memory_mode {
			"memory mode"
		} else if needs_app_direct && !dimm.sku.app_direct {
			"AppDirect"
		} else {
			continue;
		};

		status.push(dimm.id, StatusCode::ConfigNotSupportedByCurrentSku);
		return Err(PlatformConstraintError::SkuNotSupported { dimm: dimm.id, mode }.into());
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use {
		super::{check_nm_fm_ratio, reduce_app_direct_per_reserved, reduce_for_socket_sku, reduce_volatile_per_reserved},
		crate::{
			dimm::{Dimm, DimmId, DimmUid, SocketId},
			platform::{Platform, SocketSku},
			request::{PmType, ReserveDimm},
			status::{CommandStatus, StatusCode},
			template::{map_templates, reserve_goal, RegionGoalDimm},
		},
		pmgoal_util::ByteSize,
	};

	const GIB: u64 = ByteSize::GIB;

	fn dimm(id: u16, raw_capacity: u64) -> Dimm {
		let uid = DimmUid {
			serial: u32::from(id),
			..DimmUid::default()
		};
		Dimm::new(DimmId::new(id), uid, SocketId::new(0), raw_capacity)
	}

	#[test]
	fn app_direct_reduction_keeps_regions_equal() {
		let dimms = [dimm(1, 128 * GIB), dimm(2, 128 * GIB), dimm(3, 128 * GIB)];
		let mut entries = dimms
			.iter()
			.map(|dimm| RegionGoalDimm {
				dimm,
				volatile: 0,
				region: 100 * GIB,
			})
			.collect::<Vec<_>>();
		let mut reserved = 10 * GIB;
		reduce_app_direct_per_reserved(&mut entries, &mut reserved, GIB);

		assert_eq!(reserved, 0);
		assert!(entries.iter().all(|entry| entry.region == 96 * GIB));
	}

	#[test]
	fn app_direct_reduction_empties_small_regions() {
		let dimms = [dimm(1, 128 * GIB)];
		let mut entries = vec![RegionGoalDimm {
			dimm:     &dimms[0],
			volatile: 0,
			region:   4 * GIB,
		}];
		let mut reserved = 6 * GIB;
		reduce_app_direct_per_reserved(&mut entries, &mut reserved, GIB);

		assert_eq!(entries[0].region, 0);
		assert_eq!(reserved, 2 * GIB);
	}

	#[test]
	fn volatile_reduction_takes_from_largest_first() {
		let dimms = [dimm(1, 128 * GIB), dimm(2, 256 * GIB)];
		let mut entries = vec![
			RegionGoalDimm {
				dimm:     &dimms[0],
				volatile: 32 * GIB,
				region:   0,
			},
			RegionGoalDimm {
				dimm:     &dimms[1],
				volatile: 64 * GIB,
				region:   0,
			},
		];
		reduce_volatile_per_reserved(&mut entries, 40 * GIB, GIB).expect("Unable to reduce volatile");

		assert_eq!(entries[1].volatile, 28 * GIB);
		assert_eq!(entries[0].volatile, 28 * GIB);
		assert!(reduce_volatile_per_reserved(&mut entries, 100 * GIB, GIB).is_err());
	}

	#[test]
	fn sku_limit_reduces_and_warns() {
		let dimms = [dimm(1, 128 * GIB), dimm(2, 128 * GIB)];
		let targets = dimms.iter().collect::<Vec<_>>();
		let platform = Platform {
			sockets: vec![SocketSku {
				socket:              SocketId::new(0),
				mapped_memory_limit: 192 * GIB,
				total_mapped_memory: 0,
				caching_memory:      0,
				near_memory:         0,
			}],
			..Platform::default()
		};

		let mut status = CommandStatus::new();
		let mut map = map_templates(SocketId::new(0), &targets, &[0, 0], PmType::AppDirect, 0, &platform, &mut status)
			.expect("Unable to map templates");
		reduce_for_socket_sku(&mut map, &targets, PmType::AppDirect, &platform, &mut status)
			.expect("Unable to reduce for SKU");

		assert_eq!(map.total_regions(), 192 * GIB);
		assert!(map.symmetric.iter().all(|entry| entry.region == 96 * GIB));
		assert!(status.contains(StatusCode::MappedMemReducedDueToCpuSku));

		// A second pass is a no-op
		let before = map.total_regions();
		let mut second = CommandStatus::new();
		reduce_for_socket_sku(&mut map, &targets, PmType::AppDirect, &platform, &mut second)
			.expect("Unable to reduce for SKU");
		assert_eq!(map.total_regions(), before);
		assert!(second.objects().is_empty());
	}

	#[test]
	fn sku_limit_reduces_reserve_dimm() {
		let dimms = [dimm(1, 128 * GIB), dimm(2, 128 * GIB)];
		let targets = dimms.iter().collect::<Vec<_>>();
		let platform = Platform {
			sockets: vec![SocketSku {
				socket:              SocketId::new(0),
				mapped_memory_limit: 64 * GIB,
				total_mapped_memory: 0,
				caching_memory:      0,
				near_memory:         0,
			}],
			..Platform::default()
		};

		let mut status = CommandStatus::new();
		let mut map = map_templates(SocketId::new(0), &targets[..1], &[0], PmType::AppDirect, 0, &platform, &mut status)
			.expect("Unable to map templates");
		map.reserve = Some(reserve_goal(&dimms[1], ReserveDimm::AppDirectNotInterleaved, &platform));
		assert_eq!(map.total_regions(), 256 * GIB);

		reduce_for_socket_sku(&mut map, &targets, PmType::AppDirect, &platform, &mut status)
			.expect("Unable to reduce for SKU");
		assert_eq!(map.total_regions(), 64 * GIB);
		assert_eq!(map.reserve.map(|reserve| reserve.region), Some(0));
		assert_eq!(map.symmetric[0].region, 64 * GIB);
	}

	#[test]
	fn nm_fm_ratio_is_advisory() {
		let dimms = [dimm(1, 128 * GIB)];
		let targets = dimms.iter().collect::<Vec<_>>();
		let platform = Platform {
			sockets: vec![SocketSku {
				socket:              SocketId::new(0),
				mapped_memory_limit: u64::MAX,
				total_mapped_memory: 0,
				caching_memory:      0,
				near_memory:         64 * GIB,
			}],
			..Platform::default()
		};

		let mut status = CommandStatus::new();
		let map = map_templates(
			SocketId::new(0),
			&targets,
			&[64 * GIB],
			PmType::AppDirect,
			0,
			&platform,
			&mut status,
		)
		.expect("Unable to map templates");
		check_nm_fm_ratio(&map, &platform, &mut status);

		assert!(status.contains(StatusCode::NmFmRatioLowerViolation));
		assert!(!status.contains(StatusCode::NmFmRatioUpperViolation));
	}
}
