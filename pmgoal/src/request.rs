//! Goal request

// Imports
use {
	crate::error::{GoalError, ParameterError},
	std::{fmt, str::FromStr},
};

/// Persistent memory type
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PmType {
	/// Interleaved AppDirect
	#[value(name = "app-direct")]
	AppDirect,

	/// Not interleaved AppDirect, one region per DIMM
	#[value(name = "app-direct-not-interleaved")]
	AppDirectNotInterleaved,

	/// Neither volatile nor AppDirect
	#[value(name = "storage")]
	Storage,
}

/// Reserve DIMM kind
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ReserveDimm {
	/// No reserve DIMM
	#[default]
	#[value(name = "none")]
	None,

	/// Reserve DIMM kept as storage
	#[value(name = "storage")]
	Storage,

	/// Reserve DIMM holding a single not interleaved AppDirect region
	#[value(name = "app-direct")]
	AppDirectNotInterleaved,
}

/// Namespace label version
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct LabelVersion {
	/// Major
	pub major: u16,

	/// Minor
	pub minor: u16,
}

impl LabelVersion {
	/// Label version 1.1
	pub const V1_1: Self = Self { major: 1, minor: 1 };
	/// Label version 1.2
	pub const V1_2: Self = Self { major: 1, minor: 2 };

	/// Checks that this version is supported
	pub fn validate(self) -> Result<(), ParameterError> {
		match self == Self::V1_1 || self == Self::V1_2 {
			true => Ok(()),
			false => Err(ParameterError::LabelVersion {
				major: self.major,
				minor: self.minor,
			}),
		}
	}
}

impl Default for LabelVersion {
	fn default() -> Self {
		Self::V1_2
	}
}

impl fmt::Display for LabelVersion {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}", self.major, self.minor)
	}
}

impl FromStr for LabelVersion {
	type Err = ParameterError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let invalid = || ParameterError::LabelVersion { major: 0, minor: 0 };
		let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
		let version = Self {
			major: major.parse().map_err(|_| invalid())?,
			minor: minor.parse().map_err(|_| invalid())?,
		};
		version.validate()?;

		Ok(version)
	}
}

/// Goal request
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct GoalRequest {
	/// Persistent memory type of the non-volatile, non-reserved capacity
	pub pm_type: PmType,

	/// Percentage of capacity to use as volatile memory
	pub volatile_percent: u32,

	/// Percentage of capacity to leave unconfigured
	pub reserved_percent: u32,

	/// Reserve DIMM
	#[serde(default)]
	pub reserve_dimm: ReserveDimm,

	/// Namespace label version to initialize after applying
	#[serde(default)]
	pub label_version: LabelVersion,
}

impl GoalRequest {
	/// Validates this request and returns its normalized form.
	///
	/// A request with no capacity left for AppDirect becomes a [`PmType::Storage`] request.
	pub fn validate(self) -> Result<Self, GoalError> {
		for (what, percent) in [("Volatile", self.volatile_percent), ("Reserved", self.reserved_percent)] {
			if percent > 100 {
				return Err(ParameterError::PercentOutOfRange { what, percent }.into());
			}
		}

		let total = self.volatile_percent + self.reserved_percent;
		if total > 100 {
			return Err(ParameterError::PercentSumOutOfRange {
				volatile: self.volatile_percent,
				reserved: self.reserved_percent,
			}
			.into());
		}
		self.label_version.validate()?;

		let pm_type = match total {
			100 => PmType::Storage,
			_ => self.pm_type,
		};
		if pm_type != self.pm_type {
			tracing::debug!(requested = ?self.pm_type, "No capacity left for AppDirect, requesting storage instead");
		}

		Ok(Self { pm_type, ..self })
	}

	/// Returns if DIMMs with a population violation may be targeted.
	///
	/// Only a volatile-free, not interleaved AppDirect request may target them.
	#[must_use]
	pub fn allows_population_violation(&self) -> bool {
		self.volatile_percent == 0 && self.pm_type == PmType::AppDirectNotInterleaved
	}
}

#[cfg(test)]
mod tests {
	use {
		super::{GoalRequest, LabelVersion, PmType, ReserveDimm},
		crate::status::StatusCode,
	};

	fn request(volatile_percent: u32, reserved_percent: u32) -> GoalRequest {
		GoalRequest {
			pm_type: PmType::AppDirect,
			volatile_percent,
			reserved_percent,
			reserve_dimm: ReserveDimm::None,
			label_version: LabelVersion::default(),
		}
	}

	#[test]
	fn percent_sum_over_100_is_rejected() {
		let err = request(60, 50).validate().expect_err("Sum over 100 was accepted");
		assert_eq!(err.code(), StatusCode::InvalidParameter);
		assert!(request(101, 0).validate().is_err());
	}

	#[test]
	fn full_percent_sum_becomes_storage() {
		let request = request(40, 60).validate().expect("Unable to validate request");
		assert_eq!(request.pm_type, PmType::Storage);
	}

	#[test]
	fn label_version_parses() {
		assert_eq!("1.1".parse::<LabelVersion>().ok(), Some(LabelVersion::V1_1));
		assert!("1.3".parse::<LabelVersion>().is_err());
		assert!("one".parse::<LabelVersion>().is_err());
	}
}
