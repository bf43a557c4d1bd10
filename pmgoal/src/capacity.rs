//! Capacity calculation
//!
//! All conversions from percentages to bytes truncate, so that a request never
//! ends up with more capacity than was asked for.

// Imports
use {
	crate::{dimm::Dimm, platform::Alignments},
	pmgoal_util::AlignExt,
};

/// Returns `percent`% of each DIMM's raw capacity, rounded down to `align`
#[must_use]
pub fn capacity_from_percent<T: AsRef<Dimm>>(dimms: &[T], percent: u32, align: u64) -> Vec<u64> {
	dimms
		.iter()
		.map(|dimm| percent_of(dimm.as_ref().raw_capacity, percent).align_down(align))
		.collect()
}

/// Returns `percent`% of `bytes`, truncated
#[must_use]
pub fn percent_of(bytes: u64, percent: u32) -> u64 {
	let value = u128::from(bytes) * u128::from(percent.min(100)) / 100;

	// Note: `percent <= 100`, so this can't exceed `bytes`
	u64::try_from(value).unwrap_or(bytes)
}

/// Returns the volatile size that is actually achievable on a DIMM of `raw` bytes
/// when `requested` bytes of volatile capacity are asked for.
///
/// The persistent partition starts on a partition aligned boundary, which
/// may only shrink the volatile capacity.
#[must_use]
pub fn actual_volatile_size(raw: u64, requested: u64, alignments: &Alignments) -> u64 {
	if requested == 0 {
		return 0;
	}
	if requested >= raw {
		return raw;
	}

	let persistent = (raw - requested).align_up(alignments.region_partition);
	match persistent >= raw {
		true => 0,
		false => (raw - persistent).align_down(alignments.region_volatile),
	}
}

/// Returns the percentage actually achieved when `actual` out of `requested` bytes
/// could be provided for a request of `requested_percent`%.
#[must_use]
pub fn actual_percent(actual: u64, requested: u64, requested_percent: u32) -> f64 {
	match requested {
		0 => f64::from(requested_percent),
		_ => actual as f64 / requested as f64 * f64::from(requested_percent),
	}
}

/// Returns `part` as a percentage of `total`, rounded up
#[must_use]
pub fn percent_ceil(part: u64, total: u64) -> u32 {
	match total {
		0 => 0,
		_ => {
			let percent = (u128::from(part) * 100).div_ceil(u128::from(total));
			u32::try_from(percent.min(100)).unwrap_or(100)
		},
	}
}

/// Returns `part` as a percentage of `total`, rounded down
#[must_use]
pub fn percent_floor(part: u64, total: u64) -> u32 {
	match total {
		0 => 0,
		_ => {
			let percent = u128::from(part) * 100 / u128::from(total);
			u32::try_from(percent.min(100)).unwrap_or(100)
		},
	}
}

#[cfg(test)]
mod tests {
	use {
		super::{actual_percent, actual_volatile_size, capacity_from_percent, percent_ceil, percent_floor},
		crate::{
			dimm::{Dimm, DimmId, DimmUid, SocketId},
			platform::Alignments,
		},
		pmgoal_util::ByteSize,
		rand::{Rng, SeedableRng},
	};

	const GIB: u64 = ByteSize::GIB;

	fn dimm(raw_capacity: u64) -> Dimm {
		Dimm::new(DimmId::new(1), DimmUid::default(), SocketId::new(0), raw_capacity)
	}

	#[test]
	fn capacity_is_proportional_and_aligned() {
		let dimms = [dimm(128 * GIB), dimm(256 * GIB)];
		assert_eq!(capacity_from_percent(&dimms, 25, GIB), [32 * GIB, 64 * GIB]);
		assert_eq!(capacity_from_percent(&dimms, 33, GIB), [42 * GIB, 84 * GIB]);
		assert_eq!(capacity_from_percent(&dimms, 0, GIB), [0, 0]);
	}

	#[test]
	fn capacity_never_overshoots() {
		let mut rng = rand::rngs::StdRng::seed_from_u64(0x706d_676f_616c);
		for _ in 0..1000 {
			let dimms = (0..rng.gen_range(1..=12))
				.map(|_| dimm(rng.gen_range(1..=512) * GIB + rng.gen_range(0..GIB)))
				.collect::<Vec<_>>();
			let percent = rng.gen_range(0..=100);
			let align = [1, 4096, GIB][rng.gen_range(0..3)];

			let total_raw = dimms.iter().map(|dimm| u128::from(dimm.raw_capacity)).sum::<u128>();
			let total = capacity_from_percent(&dimms, percent, align)
				.into_iter()
				.map(u128::from)
				.sum::<u128>();
			assert!(
				total * 100 <= total_raw * u128::from(percent),
				"{percent}% of {total_raw} overshot: {total}"
			);
		}
	}

	#[test]
	fn volatile_size_respects_partition_alignment() {
		let alignments = Alignments::default();
		assert_eq!(actual_volatile_size(128 * GIB, 0, &alignments), 0);
		assert_eq!(actual_volatile_size(128 * GIB, 32 * GIB, &alignments), 32 * GIB);
		assert_eq!(actual_volatile_size(128 * GIB, 200 * GIB, &alignments), 128 * GIB);

		// An unaligned raw capacity loses the remainder on the volatile side
		let raw = 126 * GIB + GIB / 2;
		assert_eq!(actual_volatile_size(raw, 32 * GIB, &alignments), 31 * GIB);
		assert_eq!(actual_volatile_size(raw, GIB / 4, &alignments), 0);
	}

	#[test]
	fn percentages_round_as_requested() {
		assert_eq!(percent_ceil(31 * GIB, 126 * GIB), 25);
		assert_eq!(percent_floor(31 * GIB, 126 * GIB), 24);
		assert_eq!(percent_ceil(0, 0), 0);
		assert!((actual_percent(31 * GIB, 32 * GIB, 25) - 24.21875).abs() < 1e-9);
	}
}
