//! Platform config data
//!
//! Each DIMM stores its configuration in a small partition, starting with a
//! configuration header that points at three independent records: the current
//! configuration, the configuration input (the goal) and the configuration output
//! (the result of the last goal the platform processed).
//!
//! All records are tables whose bytes sum to zero.

// Modules
pub mod tables;

// Exports
pub use self::tables::{ConfigInput, ConfigOutput, CurrentConfig, Identification, PcatTable};

// Imports
use {
	anyhow::Context,
	byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
	pmgoal_util::ReadByteArray,
	std::io::{self, Write},
};

/// Table header
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct TableHeader {
	/// Signature
	pub signature: [u8; 4],

	/// Length of the whole table, including this header
	pub length: u32,

	/// Revision
	pub revision: u8,

	/// Checksum
	pub checksum: u8,
}

impl TableHeader {
	/// Returns the size of this header (including any padding)
	pub const BYTE_SIZE: usize = 0xc;
	/// Revision written by us
	pub const REVISION: u8 = 2;

	/// Parses a header from a reader
	pub fn from_reader<R: io::Read>(reader: &mut R) -> Result<Self, anyhow::Error> {
		let signature = reader.read_byte_array().context("Unable to read signature")?;
		let length = reader.read_u32::<LittleEndian>().context("Unable to read length")?;
		let revision = reader.read_u8().context("Unable to read revision")?;
		let checksum = reader.read_u8().context("Unable to read checksum")?;
		let _reserved: [u8; 2] = reader.read_byte_array().context("Unable to read padding")?;

		Ok(Self {
			signature,
			length,
			revision,
			checksum,
		})
	}

	/// Writes a header for a table with `signature` to a writer.
	///
	/// Length and checksum are left zeroed, to be filled in by [`finish_table`].
	pub fn write_placeholder<W: io::Write>(writer: &mut W, signature: [u8; 4]) -> Result<(), anyhow::Error> {
		writer.write_all(&signature).context("Unable to write signature")?;
		writer
			.write_u32::<LittleEndian>(0)
			.context("Unable to write length")?;
		writer.write_u8(Self::REVISION).context("Unable to write revision")?;
		writer.write_u8(0).context("Unable to write checksum")?;
		writer.write_all(&[0; 2]).context("Unable to write padding")?;

		Ok(())
	}
}

/// Returns the byte sum of `bytes`
#[must_use]
pub fn checksum(bytes: &[u8]) -> u8 {
	bytes.iter().fold(0, |sum, &byte| sum.wrapping_add(byte))
}

/// Fills in the length and checksum of the table in `bytes`
pub fn finish_table(bytes: &mut [u8]) -> Result<(), anyhow::Error> {
	anyhow::ensure!(
		bytes.len() >= TableHeader::BYTE_SIZE,
		"Table of {} bytes is smaller than its header",
		bytes.len()
	);
	let length = u32::try_from(bytes.len()).context("Table length doesn't fit in header")?;

	bytes[4..8].copy_from_slice(&length.to_le_bytes());
	bytes[9] = 0;
	bytes[9] = 0u8.wrapping_sub(checksum(bytes));

	Ok(())
}

/// Validates the table with `signature` at the start of `bytes` and returns its bytes
pub fn validate_table(bytes: &[u8], signature: [u8; 4]) -> Result<&[u8], anyhow::Error> {
	let header = TableHeader::from_reader(&mut &*bytes).context("Unable to read table header")?;
	anyhow::ensure!(
		header.signature == signature,
		"Found wrong signature {:?}, expected {:?}",
		header.signature,
		signature
	);

	let length = usize::try_from(header.length).context("Table length doesn't fit in memory")?;
	anyhow::ensure!(
		(TableHeader::BYTE_SIZE..=bytes.len()).contains(&length),
		"Table length {length} is out of bounds (available: {})",
		bytes.len()
	);

	let table = &bytes[..length];
	let sum = checksum(table);
	anyhow::ensure!(sum == 0, "Table checksum mismatch, bytes sum to {sum:#x}");

	Ok(table)
}

/// Platform config data
#[derive(PartialEq, Eq, Clone, Default, Debug)]
pub struct PlatformConfigData {
	/// Current configuration
	pub current: Option<CurrentConfig>,

	/// Configuration input
	pub input: Option<ConfigInput>,

	/// Configuration output
	pub output: Option<ConfigOutput>,
}

impl PlatformConfigData {
	/// Configuration header signature
	pub const SIGNATURE: [u8; 4] = *b"DMHD";
	/// Configuration header size
	pub const HEADER_BYTE_SIZE: usize = 0x24;

	/// Parses platform config data.
	///
	/// Empty data has no records. Corrupt records are dropped, only a corrupt
	/// configuration header is an error.
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, anyhow::Error> {
		if bytes.is_empty() || bytes.iter().all(|&byte| byte == 0) {
			return Ok(Self::default());
		}

		let header = validate_table(bytes, Self::SIGNATURE).context("Unable to validate configuration header")?;
		anyhow::ensure!(
			header.len() >= Self::HEADER_BYTE_SIZE,
			"Configuration header is too small ({} bytes)",
			header.len()
		);

		let mut reader = &header[TableHeader::BYTE_SIZE..];
		let mut records = [(0, 0); 3];
		for record in &mut records {
			let size = reader.read_u32::<LittleEndian>().context("Unable to read record size")?;
			let offset = reader
				.read_u32::<LittleEndian>()
				.context("Unable to read record offset")?;
			*record = (size, offset);
		}
		let [current, input, output] = records;

		Ok(Self {
			current: parse_record(bytes, current, "current config", CurrentConfig::from_bytes),
			input:   parse_record(bytes, input, "config input", ConfigInput::from_bytes),
			output:  parse_record(bytes, output, "config output", ConfigOutput::from_bytes),
		})
	}

	/// Encodes this platform config data, recomputing all checksums
	pub fn to_bytes(&self) -> Result<Vec<u8>, anyhow::Error> {
		let current = self
			.current
			.as_ref()
			.map(CurrentConfig::to_bytes)
			.transpose()
			.context("Unable to encode current config")?;
		let input = self
			.input
			.as_ref()
			.map(ConfigInput::to_bytes)
			.transpose()
			.context("Unable to encode config input")?;
		let output = self
			.output
			.as_ref()
			.map(ConfigOutput::to_bytes)
			.transpose()
			.context("Unable to encode config output")?;

		let mut bytes = vec![];
		TableHeader::write_placeholder(&mut bytes, Self::SIGNATURE).context("Unable to write header")?;

		let mut offset = Self::HEADER_BYTE_SIZE;
		for record in [&current, &input, &output] {
			let (size, record_offset) = match record {
				Some(record) => {
					let record_offset = offset;
					offset += record.len();
					(record.len(), record_offset)
				},
				None => (0, 0),
			};
			bytes
				.write_u32::<LittleEndian>(u32::try_from(size).context("Record is too large")?)
				.context("Unable to write record size")?;
			bytes
				.write_u32::<LittleEndian>(u32::try_from(record_offset).context("Record offset is too large")?)
				.context("Unable to write record offset")?;
		}
		finish_table(&mut bytes).context("Unable to finish configuration header")?;

		for record in [current, input, output].into_iter().flatten() {
			bytes.write_all(&record).context("Unable to write record")?;
		}

		Ok(bytes)
	}
}

/// Parses the record at `(size, offset)`, dropping it if corrupt
fn parse_record<T>(
	bytes: &[u8],
	(size, offset): (u32, u32),
	name: &str,
	parse: impl FnOnce(&[u8]) -> Result<T, anyhow::Error>,
) -> Option<T> {
	if size == 0 {
		return None;
	}

	let start = usize::try_from(offset).ok()?;
	let end = start.checked_add(usize::try_from(size).ok()?)?;
	let res = match bytes.get(start..end) {
		Some(record) => parse(record),
		None => Err(anyhow::anyhow!("Record at {offset:#x} of {size:#x} bytes is out of bounds")),
	};

	match res {
		Ok(record) => Some(record),
		Err(err) => {
			tracing::warn!(?err, "Ignoring corrupt {name} record");
			None
		},
	}
}

#[cfg(test)]
mod tests {
	use {
		super::{ConfigInput, ConfigOutput, CurrentConfig, Identification, PcatTable, PlatformConfigData},
		crate::dimm::{DimmUid, SocketId},
	};

	fn pcd() -> PlatformConfigData {
		PlatformConfigData {
			current: Some(CurrentConfig {
				status:            1,
				volatile_mapped:   0,
				persistent_mapped: 128 << 30,
			}),
			input:   Some(ConfigInput {
				sequence: 7,
				tables:   vec![
					PcatTable::PartitionSizeChange {
						status:            0,
						pm_partition_size: 96 << 30,
					},
					PcatTable::InterleaveInformation {
						index:           1,
						channel:         0x8,
						imc:             0x8,
						ways:            0x8,
						mirror:          false,
						status:          0,
						identifications: vec![Identification {
							uid:              DimmUid {
								manufacturer_id: 0x8089,
								location:        0xa,
								date:            0x1234,
								serial:          0xdead_beef,
							},
							socket:           SocketId::new(1),
							die:              0,
							imc:              1,
							channel:          2,
							slot:             0,
							partition_offset: 32 << 30,
							partition_size:   96 << 30,
						}],
					},
				],
			}),
			output:  None,
		}
	}

	#[test]
	fn encoded_tables_checksum_to_zero() {
		let bytes = pcd().to_bytes().expect("Unable to encode");
		let parsed = PlatformConfigData::from_bytes(&bytes).expect("Unable to parse");
		assert_eq!(parsed, pcd());
		assert_eq!(super::checksum(&bytes[..PlatformConfigData::HEADER_BYTE_SIZE]), 0);
	}

	#[test]
	fn corrupt_input_is_dropped() {
		let mut bytes = pcd().to_bytes().expect("Unable to encode");
		let last = bytes.len() - 1;
		bytes[last] ^= 0xff;

		let parsed = PlatformConfigData::from_bytes(&bytes).expect("Unable to parse");
		assert_eq!(parsed.input, None);
		assert!(parsed.current.is_some());
	}

	#[test]
	fn corrupt_header_is_an_error() {
		let mut bytes = pcd().to_bytes().expect("Unable to encode");
		bytes[0] = b'X';
		assert!(PlatformConfigData::from_bytes(&bytes).is_err());
	}

	#[test]
	fn output_is_independent_of_input() {
		let mut pcd = pcd();
		pcd.output = Some(ConfigOutput {
			sequence:          7,
			validation_status: 0,
			tables:            vec![],
		});
		pcd.input = None;

		let bytes = pcd.to_bytes().expect("Unable to encode");
		let parsed = PlatformConfigData::from_bytes(&bytes).expect("Unable to parse");
		assert_eq!(parsed, pcd);
		assert!(PlatformConfigData::from_bytes(&[]).expect("Unable to parse").input.is_none());
	}
}
