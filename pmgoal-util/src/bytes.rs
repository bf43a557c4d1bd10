//! Byte sizes

// Imports
use std::fmt;

/// Byte size, displayed in binary units
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ByteSize(pub u64);

impl ByteSize {
	/// Bytes per kibibyte
	pub const KIB: u64 = 1 << 10;
	/// Bytes per mebibyte
	pub const MIB: u64 = 1 << 20;
	/// Bytes per gibibyte
	pub const GIB: u64 = 1 << 30;
	/// Bytes per tebibyte
	pub const TIB: u64 = 1 << 40;

	/// Creates a byte size from whole gibibytes
	#[must_use]
	pub const fn from_gib(gib: u64) -> Self {
		Self(gib * Self::GIB)
	}
}

impl fmt::Display for ByteSize {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let (unit, name) = match self.0 {
			bytes if bytes >= Self::TIB => (Self::TIB, "TiB"),
			bytes if bytes >= Self::GIB => (Self::GIB, "GiB"),
			bytes if bytes >= Self::MIB => (Self::MIB, "MiB"),
			bytes if bytes >= Self::KIB => (Self::KIB, "KiB"),
			bytes => return write!(f, "{bytes} B"),
		};

		// Note: Whole values are printed without a fraction
		match self.0 % unit {
			0 => write!(f, "{} {name}", self.0 / unit),
			_ => write!(f, "{:.3} {name}", self.0 as f64 / unit as f64),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::ByteSize;

	#[test]
	fn display_picks_largest_unit() {
		assert_eq!(ByteSize::from_gib(128).to_string(), "128 GiB");
		assert_eq!(ByteSize(ByteSize::GIB + ByteSize::GIB / 2).to_string(), "1.500 GiB");
		assert_eq!(ByteSize(512).to_string(), "512 B");
		assert_eq!(ByteSize(2 * ByteSize::TIB).to_string(), "2 TiB");
	}
}
