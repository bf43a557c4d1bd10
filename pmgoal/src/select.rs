//! DIMM selection

// Imports
use {
	crate::{
		dimm::{Dimm, DimmId, Population, SocketId},
		error::{GoalError, ParameterError, SelectionError},
		status::{CommandStatus, StatusCode},
	},
	bitflags::bitflags,
	itertools::Itertools,
};

bitflags! {
	/// Predicates a selected DIMM must fulfill
	#[derive(PartialEq, Eq, Clone, Copy, Debug)]
	pub struct SelectFilter: u8 {
		const MANAGEABLE = 1 << 0;
		const UNMANAGEABLE = 1 << 1;
		const FUNCTIONAL = 1 << 2;
		const NON_FUNCTIONAL = 1 << 3;
		const NO_POPULATION_VIOLATION = 1 << 4;
		const POPULATION_VIOLATION = 1 << 5;
		const NO_UNMAPPED_POPULATION_VIOLATION = 1 << 6;
	}
}

impl SelectFilter {
	/// Predicate pairs that can't be requested together
	const EXCLUSIVE: [(Self, Self); 3] = [
		(Self::MANAGEABLE, Self::UNMANAGEABLE),
		(Self::FUNCTIONAL, Self::NON_FUNCTIONAL),
		(Self::NO_POPULATION_VIOLATION, Self::POPULATION_VIOLATION),
	];

	/// Checks that no mutually exclusive predicates are set
	pub fn validate(self) -> Result<(), ParameterError> {
		match Self::EXCLUSIVE.iter().any(|&(lhs, rhs)| self.contains(lhs | rhs)) {
			true => Err(ParameterError::ExclusiveFilter(self)),
			false => Ok(()),
		}
	}

	/// Returns if `dimm` fulfills all predicates
	#[must_use]
	pub fn matches(self, dimm: &Dimm) -> bool {
		let violation = dimm.has_population_violation();
		[
			(Self::MANAGEABLE, dimm.manageable),
			(Self::UNMANAGEABLE, !dimm.manageable),
			(Self::FUNCTIONAL, dimm.functional),
			(Self::NON_FUNCTIONAL, !dimm.functional),
			(Self::NO_POPULATION_VIOLATION, !violation),
			(Self::POPULATION_VIOLATION, violation),
			(
				Self::NO_UNMAPPED_POPULATION_VIOLATION,
				dimm.population != Population::UnmappedViolation,
			),
		]
		.into_iter()
		.all(|(flag, holds)| !self.contains(flag) || holds)
	}

	/// Returns the status code to report for a DIMM rejected by this filter
	fn rejection_code(self, dimm: &Dimm) -> StatusCode {
		match self.contains(Self::MANAGEABLE) && !dimm.manageable {
			true => StatusCode::ManageableDimmNotFound,
			false => StatusCode::DimmExcluded,
		}
	}
}

/// Selects the DIMMs targeted by a request.
///
/// With no ids given, all DIMMs in `inventory` are candidates. With socket ids, only
/// the DIMMs on those sockets. With DIMM ids, exactly those DIMMs, which must then also
/// lie on one of the sockets, if any were given.
///
/// The result keeps the inventory order. Every rejected id is recorded in `status`.
///
/// # Errors
/// Returns an error if any id is duplicated or unknown, if an explicitly requested DIMM
/// is rejected by `filter`, or if no DIMM remains.
pub fn select_dimms<'a>(
	inventory: &'a [Dimm],
	dimm_ids: &[DimmId],
	socket_ids: &[SocketId],
	filter: SelectFilter,
	status: &mut CommandStatus,
) -> Result<Vec<&'a Dimm>, GoalError> {
	filter.validate()?;

	// Report every duplicate before failing
	let duplicate_dimms = dimm_ids.iter().copied().duplicates().collect::<Vec<_>>();
	let duplicate_sockets = socket_ids.iter().copied().duplicates().collect::<Vec<_>>();
	if !duplicate_dimms.is_empty() || !duplicate_sockets.is_empty() {
		for &dimm in &duplicate_dimms {
			status.push(dimm, StatusCode::DimmIdDuplicated);
		}
		for &socket in &duplicate_sockets {
			status.push(socket, StatusCode::SocketIdDuplicated);
		}
		return Err(SelectionError::Duplicated {
			dimms:   duplicate_dimms,
			sockets: duplicate_sockets,
		}
		.into());
	}

	// Then every unknown id
	let unknown_dimms = dimm_ids
		.iter()
		.copied()
		.filter(|&id| !inventory.iter().any(|dimm| dimm.id == id))
		.collect::<Vec<_>>();
	let unknown_sockets = socket_ids
		.iter()
		.copied()
		.filter(|&socket| !inventory.iter().any(|dimm| dimm.socket == socket))
		.collect::<Vec<_>>();
	if !unknown_dimms.is_empty() || !unknown_sockets.is_empty() {
		for &dimm in &unknown_dimms {
			status.push(dimm, StatusCode::DimmNotFound);
		}
		for &socket in &unknown_sockets {
			status.push(socket, StatusCode::SocketIdNotValid);
		}
		return Err(SelectionError::Unknown {
			dimms:   unknown_dimms,
			sockets: unknown_sockets,
		}
		.into());
	}

	// With both selectors, every DIMM must satisfy both
	if !dimm_ids.is_empty() && !socket_ids.is_empty() {
		let mismatched = inventory
			.iter()
			.filter(|dimm| dimm_ids.contains(&dimm.id) && !socket_ids.contains(&dimm.socket))
			.map(|dimm| dimm.id)
			.collect::<Vec<_>>();
		if !mismatched.is_empty() {
			for &dimm in &mismatched {
				status.push(dimm, StatusCode::DimmSocketMismatch);
			}
			return Err(SelectionError::SocketMismatch(mismatched).into());
		}
	}

	let explicit = !dimm_ids.is_empty();
	let mut excluded = vec![];
	let mut selected = vec![];
	for dimm in inventory {
		let requested = match (explicit, socket_ids.is_empty()) {
			(true, _) => dimm_ids.contains(&dimm.id),
			(false, true) => true,
			(false, false) => socket_ids.contains(&dimm.socket),
		};
		if !requested {
			continue;
		}

		match filter.matches(dimm) {
			true => selected.push(dimm),
			false => match explicit {
				true => {
					status.push(dimm.id, filter.rejection_code(dimm));
					excluded.push(dimm.id);
				},
				false => tracing::trace!(dimm = %dimm.id, ?filter, "Skipping DIMM rejected by filter"),
			},
		}
	}

	if !excluded.is_empty() {
		return Err(SelectionError::Excluded(excluded).into());
	}
	if selected.is_empty() {
		return Err(SelectionError::NotFound.into());
	}

	tracing::debug!(dimms = ?selected.iter().map(|dimm| dimm.id).collect::<Vec<_>>(), "Selected DIMMs");
	Ok(selected)
}

#[cfg(test)]
mod tests {
	use {
		super::{select_dimms, SelectFilter},
		crate::{
			dimm::{Dimm, DimmId, DimmUid, SocketId},
			status::{CommandStatus, StatusCode},
		},
	};

	fn dimm(id: u16, socket: u16) -> Dimm {
		let uid = DimmUid {
			serial: u32::from(id),
			..DimmUid::default()
		};
		Dimm::new(DimmId::new(id), uid, SocketId::new(socket), 128 << 30)
	}

	fn inventory() -> Vec<Dimm> {
		let mut dimms = vec![dimm(0x1, 0), dimm(0x2, 0), dimm(0x11, 1), dimm(0x12, 1)];
		dimms[3].manageable = false;
		dimms
	}

	#[test]
	fn every_duplicate_is_reported() {
		let inventory = inventory();
		let mut status = CommandStatus::new();
		let ids = [DimmId::new(1), DimmId::new(1), DimmId::new(2), DimmId::new(2)];
		let err = select_dimms(&inventory, &ids, &[], SelectFilter::MANAGEABLE, &mut status)
			.expect_err("Duplicates were accepted");

		assert_eq!(err.code(), StatusCode::DimmIdDuplicated);
		assert_eq!(status.objects().len(), 2);
	}

	#[test]
	fn socket_mismatch_fails_whole_call() {
		let inventory = inventory();
		let mut status = CommandStatus::new();
		let err = select_dimms(
			&inventory,
			&[DimmId::new(1), DimmId::new(0x11)],
			&[SocketId::new(0)],
			SelectFilter::MANAGEABLE,
			&mut status,
		)
		.expect_err("Mismatched DIMM was accepted");

		assert_eq!(err.code(), StatusCode::DimmSocketMismatch);
		assert_eq!(status.codes_for(DimmId::new(0x11)).collect::<Vec<_>>(), [
			StatusCode::DimmSocketMismatch
		]);
	}

	#[test]
	fn implicit_candidates_are_filtered() {
		let inventory = inventory();
		let mut status = CommandStatus::new();
		let dimms = select_dimms(&inventory, &[], &[SocketId::new(1)], SelectFilter::MANAGEABLE, &mut status)
			.expect("Unable to select DIMMs");

		assert_eq!(dimms.iter().map(|dimm| dimm.id).collect::<Vec<_>>(), [DimmId::new(0x11)]);
		assert!(status.objects().is_empty());
	}

	#[test]
	fn explicit_unmanageable_dimm_is_rejected() {
		let inventory = inventory();
		let mut status = CommandStatus::new();
		let err = select_dimms(&inventory, &[DimmId::new(0x12)], &[], SelectFilter::MANAGEABLE, &mut status)
			.expect_err("Unmanageable DIMM was accepted");

		assert_eq!(err.code(), StatusCode::DimmExcluded);
		assert!(status.contains(StatusCode::ManageableDimmNotFound));
	}

	#[test]
	fn exclusive_filters_are_rejected() {
		let inventory = inventory();
		let mut status = CommandStatus::new();
		let filter = SelectFilter::MANAGEABLE | SelectFilter::UNMANAGEABLE;
		assert!(select_dimms(&inventory, &[], &[], filter, &mut status).is_err());
	}

	#[test]
	fn unknown_socket_is_reported() {
		let inventory = inventory();
		let mut status = CommandStatus::new();
		let err = select_dimms(&inventory, &[], &[SocketId::new(7)], SelectFilter::empty(), &mut status)
			.expect_err("Unknown socket was accepted");

		assert_eq!(err.code(), StatusCode::SocketIdNotValid);
	}
}
