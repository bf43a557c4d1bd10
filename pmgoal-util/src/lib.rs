//! Utilities

// Modules
pub mod bytes;
pub mod logger;

// Exports
pub use bytes::ByteSize;

// Imports
use std::{cell::RefCell, fmt, io};

/// Extension trait for `R: io::Read` types to read a byte array
#[extend::ext(name = ReadByteArray)]
pub impl<R: io::Read> R {
	/// Reads a byte array `[u8; N]` from this reader.
	///
	/// Returns `Err` if unable to read exactly `N` bytes.
	fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N], io::Error> {
		let mut array = [0u8; N];
		self.read_exact(&mut array)?;
		Ok(array)
	}
}

/// Extension trait for aligning byte sizes
#[extend::ext(name = AlignExt)]
pub impl u64 {
	/// Rounds this value down to a multiple of `align`.
	///
	/// An `align` of `0` leaves the value unchanged.
	fn align_down(self, align: u64) -> u64 {
		match align {
			0 => self,
			_ => self - self % align,
		}
	}

	/// Rounds this value up to a multiple of `align`, saturating at the largest multiple.
	fn align_up(self, align: u64) -> u64 {
		match align {
			0 => self,
			_ => match self % align {
				0 => self,
				rem => self.checked_add(align - rem).unwrap_or_else(|| self.align_down(align)),
			},
		}
	}

	/// Returns if this value is a multiple of `align`
	fn is_aligned(self, align: u64) -> bool {
		align == 0 || self % align == 0
	}
}

/// [`fmt::Display`] helper to display using a `FnMut(&mut fmt::Formatter)`
pub struct DisplayWrapper<F: FnMut(&mut fmt::Formatter) -> fmt::Result>(RefCell<F>);

impl<F: FnMut(&mut fmt::Formatter) -> fmt::Result> DisplayWrapper<F> {
	/// Creates a new display wrapper
	#[must_use]
	pub const fn new(func: F) -> Self {
		Self(RefCell::new(func))
	}
}


impl<F: FnMut(&mut fmt::Formatter) -> fmt::Result> fmt::Display for DisplayWrapper<F> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		// Note: `f` cannot be re-entrant, so this cannot fail
		self.0.borrow_mut()(f)
	}
}

#[cfg(test)]
mod tests {
	use super::AlignExt;

	const GIB: u64 = 1 << 30;

	#[test]
	fn align_down_truncates() {
		assert_eq!((5 * GIB + 7).align_down(GIB), 5 * GIB);
		assert_eq!((5 * GIB).align_down(GIB), 5 * GIB);
		assert_eq!(7u64.align_down(0), 7);
	}

	#[test]
	fn align_up_rounds_to_next_multiple() {
		assert_eq!((5 * GIB + 1).align_up(GIB), 6 * GIB);
		assert_eq!((5 * GIB).align_up(GIB), 5 * GIB);
		assert_eq!(u64::MAX.align_up(GIB), u64::MAX.align_down(GIB));
	}
}
