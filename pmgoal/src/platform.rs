//! Platform capability

// Imports
use {
	crate::dimm::SocketId,
	bitflags::bitflags,
	pmgoal_util::ByteSize,
};

/// Platform capability
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Platform {
	/// Alignments
	#[serde(default)]
	pub alignments: Alignments,

	/// Persistent memory interleave capability
	#[serde(default)]
	pub interleave: InterleaveCapability,

	/// Modes supported by the platform
	#[serde(default)]
	pub modes: PlatformModes,

	/// Whether the BIOS allows memory mode with the current DDR population
	#[serde(default = "default_true")]
	pub memory_mode_allowed: bool,

	/// Maximum number of persistent memory interleave sets per die
	#[serde(default = "default_max_interleave_sets_per_die")]
	pub max_interleave_sets_per_die: u32,

	/// Near memory to far memory ratio bounds
	#[serde(default)]
	pub nm_fm_ratio: NmFmRatio,

	/// Per-socket SKU information
	#[serde(default)]
	pub sockets: Vec<SocketSku>,
}

impl Platform {
	/// Returns the SKU information of `socket`, if any
	#[must_use]
	pub fn socket_sku(&self, socket: SocketId) -> Option<&SocketSku> {
		self.sockets.iter().find(|sku| sku.socket == socket)
	}
}

impl Default for Platform {
	fn default() -> Self {
		Self {
			alignments:                  Alignments::default(),
			interleave:                  InterleaveCapability::default(),
			modes:                       PlatformModes::default(),
			memory_mode_allowed:         true,
			max_interleave_sets_per_die: default_max_interleave_sets_per_die(),
			nm_fm_ratio:                 NmFmRatio::default(),
			sockets:                     vec![],
		}
	}
}

/// Region alignments (in bytes)
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Alignments {
	/// Volatile/persistent partition boundary alignment
	pub region_partition: u64,

	/// Volatile size alignment
	pub region_volatile: u64,

	/// Persistent region size alignment
	pub region_persistent: u64,
}

impl Default for Alignments {
	fn default() -> Self {
		Self {
			region_partition:  ByteSize::GIB,
			region_volatile:   ByteSize::GIB,
			region_persistent: ByteSize::GIB,
		}
	}
}

/// Modes supported by the platform
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct PlatformModes {
	/// Memory mode (2LM)
	pub memory_mode: bool,

	/// AppDirect
	pub app_direct: bool,
}

impl Default for PlatformModes {
	fn default() -> Self {
		Self {
			memory_mode: true,
			app_direct:  true,
		}
	}
}

bitflags! {
	/// Channel ways of an interleave set
	#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
	#[derive(serde::Serialize, serde::Deserialize)]
	#[serde(transparent)]
	pub struct ChannelWays: u16 {
		const WAYS_1 = 1 << 0;
		const WAYS_2 = 1 << 1;
		const WAYS_3 = 1 << 2;
		const WAYS_4 = 1 << 3;
		const WAYS_6 = 1 << 4;
		const WAYS_8 = 1 << 5;
		const WAYS_12 = 1 << 6;
		const WAYS_16 = 1 << 7;
		const WAYS_24 = 1 << 8;
	}
}

impl ChannelWays {
	/// All supported participant counts, largest first
	pub const COUNTS: [usize; 9] = [24, 16, 12, 8, 6, 4, 3, 2, 1];

	/// Returns the ways for `count` participants, if supported
	#[must_use]
	pub const fn from_count(count: usize) -> Option<Self> {
		let ways = match count {
			1 => Self::WAYS_1,
			2 => Self::WAYS_2,
			3 => Self::WAYS_3,
			4 => Self::WAYS_4,
			6 => Self::WAYS_6,
			8 => Self::WAYS_8,
			12 => Self::WAYS_12,
			16 => Self::WAYS_16,
			24 => Self::WAYS_24,
			_ => return None,
		};

		Some(ways)
	}

	/// Splits `count` participants into the largest supported way counts
	#[must_use]
	pub fn split(mut count: usize) -> Vec<usize> {
		let mut parts = vec![];
		while count > 0 {
			let part = Self::COUNTS
				.into_iter()
				.find(|&part| part <= count)
				.unwrap_or(1);
			parts.push(part);
			count -= part;
		}

		parts
	}
}

/// Interleave format
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct InterleaveFormat {
	/// Channel interleave size
	pub channel: u8,

	/// iMC interleave size
	pub imc: u8,

	/// Supported channel ways
	pub ways: ChannelWays,

	/// Recommended by the platform
	#[serde(default)]
	pub recommended: bool,
}

/// Persistent memory interleave capability
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct InterleaveCapability {
	/// Interleave alignment, as a power of two
	pub alignment_exponent: u8,

	/// Supported formats
	pub formats: Vec<InterleaveFormat>,
}

impl InterleaveCapability {
	/// Channel interleave size of 4 KiB
	pub const CHANNEL_4KIB: u8 = 0x8;
	/// iMC interleave size of 4 KiB
	pub const IMC_4KIB: u8 = 0x8;

	/// Returns the interleave alignment in bytes
	#[must_use]
	pub fn alignment(&self) -> u64 {
		1u64.checked_shl(u32::from(self.alignment_exponent)).unwrap_or(0)
	}

	/// Finds the format to use for an interleave set with `ways`.
	///
	/// Prefers recommended formats.
	#[must_use]
	pub fn find_format(&self, ways: ChannelWays) -> Option<&InterleaveFormat> {
		let mut supported = self.formats.iter().filter(|format| format.ways.contains(ways));
		let first = supported.next()?;
		match first.recommended {
			true => Some(first),
			false => Some(supported.find(|format| format.recommended).unwrap_or(first)),
		}
	}
}

impl Default for InterleaveCapability {
	fn default() -> Self {
		Self {
			alignment_exponent: 26,
			formats:            vec![InterleaveFormat {
				channel:     Self::CHANNEL_4KIB,
				imc:         Self::IMC_4KIB,
				ways:        ChannelWays::all(),
				recommended: true,
			}],
		}
	}
}

/// Near memory to far memory ratio bounds.
///
/// Expressed as the number of far memory bytes per near memory byte.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct NmFmRatio {
	/// Lower bound
	pub min: u32,

	/// Upper bound
	pub max: u32,
}

impl Default for NmFmRatio {
	fn default() -> Self {
		Self { min: 2, max: 16 }
	}
}

/// Per-socket SKU information
#[derive(Clone, Debug)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct SocketSku {
	/// Socket
	pub socket: SocketId,

	/// Maximum memory the socket may map into the system address space
	pub mapped_memory_limit: u64,

	/// Memory currently mapped into the system address space
	#[serde(default)]
	pub total_mapped_memory: u64,

	/// DDR capacity currently used as memory mode cache
	#[serde(default)]
	pub caching_memory: u64,

	/// DDR capacity available as near memory
	#[serde(default)]
	pub near_memory: u64,
}

fn default_true() -> bool {
	true
}

fn default_max_interleave_sets_per_die() -> u32 {
	2
}

#[cfg(test)]
mod tests {
	use super::{ChannelWays, InterleaveCapability, InterleaveFormat};

	#[test]
	fn unsupported_counts_split_into_supported_ways() {
		assert_eq!(ChannelWays::split(6), [6]);
		assert_eq!(ChannelWays::split(5), [4, 1]);
		assert_eq!(ChannelWays::split(7), [6, 1]);
		assert_eq!(ChannelWays::split(0), Vec::<usize>::new());
	}

	#[test]
	fn recommended_format_is_preferred() {
		let capability = InterleaveCapability {
			alignment_exponent: 26,
			formats:            vec![
				InterleaveFormat {
					channel:     0x4,
					imc:         0x4,
					ways:        ChannelWays::all(),
					recommended: false,
				},
				InterleaveFormat {
					channel:     0x8,
					imc:         0x8,
					ways:        ChannelWays::WAYS_2 | ChannelWays::WAYS_4,
					recommended: true,
				},
			],
		};

		assert_eq!(capability.find_format(ChannelWays::WAYS_4).map(|f| f.channel), Some(0x8));
		assert_eq!(capability.find_format(ChannelWays::WAYS_3).map(|f| f.channel), Some(0x4));
		assert_eq!(capability.alignment(), 1 << 26);
	}
}
