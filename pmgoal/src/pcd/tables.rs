//! Platform config data records

// Imports
use {
	super::{finish_table, validate_table, TableHeader},
	crate::dimm::{DimmUid, SocketId},
	anyhow::Context,
	byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
	pmgoal_util::ReadByteArray,
	std::io::{self, Write},
};

/// Current configuration (`CCUR`)
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct CurrentConfig {
	/// Configuration status
	pub status: u16,

	/// Volatile capacity mapped into the system address space
	pub volatile_mapped: u64,

	/// Persistent capacity mapped into the system address space
	pub persistent_mapped: u64,
}

impl CurrentConfig {
	/// Signature
	pub const SIGNATURE: [u8; 4] = *b"CCUR";

	/// Parses the table in `bytes`
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, anyhow::Error> {
		let table = validate_table(bytes, Self::SIGNATURE)?;
		let mut reader = &table[TableHeader::BYTE_SIZE..];

		let status = reader.read_u16::<LittleEndian>().context("Unable to read status")?;
		let _reserved: [u8; 2] = reader.read_byte_array().context("Unable to read padding")?;
		let volatile_mapped = reader
			.read_u64::<LittleEndian>()
			.context("Unable to read volatile mapped size")?;
		let persistent_mapped = reader
			.read_u64::<LittleEndian>()
			.context("Unable to read persistent mapped size")?;

		Ok(Self {
			status,
			volatile_mapped,
			persistent_mapped,
		})
	}

	/// Encodes this table
	pub fn to_bytes(&self) -> Result<Vec<u8>, anyhow::Error> {
		let mut bytes = vec![];
		TableHeader::write_placeholder(&mut bytes, Self::SIGNATURE)?;
		bytes
			.write_u16::<LittleEndian>(self.status)
			.context("Unable to write status")?;
		bytes.write_all(&[0; 2]).context("Unable to write padding")?;
		bytes
			.write_u64::<LittleEndian>(self.volatile_mapped)
			.context("Unable to write volatile mapped size")?;
		bytes
			.write_u64::<LittleEndian>(self.persistent_mapped)
			.context("Unable to write persistent mapped size")?;

		finish_table(&mut bytes)?;
		Ok(bytes)
	}
}

/// Configuration input (`CIN_`)
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ConfigInput {
	/// Sequence number
	pub sequence: u32,

	/// Tables
	pub tables: Vec<PcatTable>,
}

impl ConfigInput {
	/// Signature
	pub const SIGNATURE: [u8; 4] = *b"CIN_";

	/// Parses the table in `bytes`
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, anyhow::Error> {
		let table = validate_table(bytes, Self::SIGNATURE)?;
		let mut reader = &table[TableHeader::BYTE_SIZE..];

		let sequence = reader.read_u32::<LittleEndian>().context("Unable to read sequence")?;
		let _reserved: [u8; 8] = reader.read_byte_array().context("Unable to read padding")?;
		let tables = PcatTable::read_all(reader).context("Unable to read tables")?;

		Ok(Self { sequence, tables })
	}

	/// Encodes this table
	pub fn to_bytes(&self) -> Result<Vec<u8>, anyhow::Error> {
		let mut bytes = vec![];
		TableHeader::write_placeholder(&mut bytes, Self::SIGNATURE)?;
		bytes
			.write_u32::<LittleEndian>(self.sequence)
			.context("Unable to write sequence")?;
		bytes.write_all(&[0; 8]).context("Unable to write padding")?;
		for table in &self.tables {
			table.to_writer(&mut bytes).context("Unable to write table")?;
		}

		finish_table(&mut bytes)?;
		Ok(bytes)
	}
}

/// Configuration output (`COUT`)
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ConfigOutput {
	/// Sequence number of the input this output is for
	pub sequence: u32,

	/// Validation status, zero on success
	pub validation_status: u8,

	/// Tables, with their status fields filled in
	pub tables: Vec<PcatTable>,
}

impl ConfigOutput {
	/// Signature
	pub const SIGNATURE: [u8; 4] = *b"COUT";

	/// Parses the table in `bytes`
	pub fn from_bytes(bytes: &[u8]) -> Result<Self, anyhow::Error> {
		let table = validate_table(bytes, Self::SIGNATURE)?;
		let mut reader = &table[TableHeader::BYTE_SIZE..];

		let sequence = reader.read_u32::<LittleEndian>().context("Unable to read sequence")?;
		let validation_status = reader.read_u8().context("Unable to read validation status")?;
		let _reserved: [u8; 7] = reader.read_byte_array().context("Unable to read padding")?;
		let tables = PcatTable::read_all(reader).context("Unable to read tables")?;

		Ok(Self {
			sequence,
			validation_status,
			tables,
		})
	}

	/// Encodes this table
	pub fn to_bytes(&self) -> Result<Vec<u8>, anyhow::Error> {
		let mut bytes = vec![];
		TableHeader::write_placeholder(&mut bytes, Self::SIGNATURE)?;
		bytes
			.write_u32::<LittleEndian>(self.sequence)
			.context("Unable to write sequence")?;
		bytes
			.write_u8(self.validation_status)
			.context("Unable to write validation status")?;
		bytes.write_all(&[0; 7]).context("Unable to write padding")?;
		for table in &self.tables {
			table.to_writer(&mut bytes).context("Unable to write table")?;
		}

		finish_table(&mut bytes)?;
		Ok(bytes)
	}

	/// Returns if the platform accepted the input
	#[must_use]
	pub const fn succeeded(&self) -> bool {
		self.validation_status == 0
	}
}

/// Platform configuration attribute table
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum PcatTable {
	/// Partition size change
	PartitionSizeChange {
		/// Status, zero on success
		status: u32,

		/// Size of the persistent partition
		pm_partition_size: u64,
	},

	/// Interleave information
	InterleaveInformation {
		/// Interleave set index
		index: u16,

		/// Channel interleave size
		channel: u8,

		/// iMC interleave size
		imc: u8,

		/// Channel ways
		ways: u16,

		/// Mirrored
		mirror: bool,

		/// Status, zero on success
		status: u8,

		/// DIMMs, in interleave order
		identifications: Vec<Identification>,
	},
}

impl PcatTable {
	/// Partition size change table type
	pub const TYPE_PARTITION_SIZE_CHANGE: u16 = 4;
	/// Interleave information table type
	pub const TYPE_INTERLEAVE_INFORMATION: u16 = 5;

	/// Header size
	pub const HEADER_BYTE_SIZE: usize = 0x4;
	/// Partition size change size
	pub const PARTITION_SIZE_CHANGE_BYTE_SIZE: usize = 0x10;
	/// Interleave information size, without the identifications
	pub const INTERLEAVE_INFORMATION_BYTE_SIZE: usize = 0x18;

	/// AppDirect memory type
	const MEMORY_TYPE_APP_DIRECT: u8 = 1;

	/// Reads all tables until the end of `reader`
	pub fn read_all(mut reader: &[u8]) -> Result<Vec<Self>, anyhow::Error> {
		let mut tables = vec![];
		while !reader.is_empty() {
			let table = Self::from_reader(&mut reader).with_context(|| format!("Unable to read table #{}", tables.len()))?;
			tables.push(table);
		}

		Ok(tables)
	}

	/// Parses a table from a reader
	pub fn from_reader(reader: &mut &[u8]) -> Result<Self, anyhow::Error> {
		let ty = reader.read_u16::<LittleEndian>().context("Unable to read type")?;
		let length = usize::from(reader.read_u16::<LittleEndian>().context("Unable to read length")?);
		anyhow::ensure!(
			length >= Self::HEADER_BYTE_SIZE && length - Self::HEADER_BYTE_SIZE <= reader.len(),
			"Table length {length} is out of bounds"
		);

		let bytes: &[u8] = *reader;
		let (mut body, rest) = bytes.split_at(length - Self::HEADER_BYTE_SIZE);
		*reader = rest;

		let table = match ty {
			Self::TYPE_PARTITION_SIZE_CHANGE => {
				let status = body.read_u32::<LittleEndian>().context("Unable to read status")?;
				let pm_partition_size = body
					.read_u64::<LittleEndian>()
					.context("Unable to read partition size")?;
				Self::PartitionSizeChange {
					status,
					pm_partition_size,
				}
			},
			Self::TYPE_INTERLEAVE_INFORMATION => {
				let index = body.read_u16::<LittleEndian>().context("Unable to read index")?;
				let dimm_count = body.read_u8().context("Unable to read dimm count")?;
				let memory_type = body.read_u8().context("Unable to read memory type")?;
				anyhow::ensure!(
					memory_type == Self::MEMORY_TYPE_APP_DIRECT,
					"Unknown memory type {memory_type}"
				);
				let channel = body.read_u8().context("Unable to read channel interleave size")?;
				let imc = body.read_u8().context("Unable to read iMC interleave size")?;
				let ways = body.read_u16::<LittleEndian>().context("Unable to read channel ways")?;
				let mirror = body.read_u8().context("Unable to read mirror")? != 0;
				let status = body.read_u8().context("Unable to read status")?;
				let _reserved: [u8; 10] = body.read_byte_array().context("Unable to read padding")?;

				let identifications = (0..dimm_count)
					.map(|idx| {
						Identification::from_reader(&mut body).with_context(|| format!("Unable to read identification #{idx}"))
					})
					.collect::<Result<Vec<_>, _>>()?;

				Self::InterleaveInformation {
					index,
					channel,
					imc,
					ways,
					mirror,
					status,
					identifications,
				}
			},
			_ => anyhow::bail!("Unknown table type {ty}"),
		};

		Ok(table)
	}

	/// Writes this table to a writer
	pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<(), anyhow::Error> {
		match self {
			Self::PartitionSizeChange {
				status,
				pm_partition_size,
			} => {
				Self::write_header(
					writer,
					Self::TYPE_PARTITION_SIZE_CHANGE,
					Self::PARTITION_SIZE_CHANGE_BYTE_SIZE,
				)?;
				writer
					.write_u32::<LittleEndian>(*status)
					.context("Unable to write status")?;
				writer
					.write_u64::<LittleEndian>(*pm_partition_size)
					.context("Unable to write partition size")?;
			},
			Self::InterleaveInformation {
				index,
				channel,
				imc,
				ways,
				mirror,
				status,
				identifications,
			} => {
				let dimm_count = u8::try_from(identifications.len()).context("Too many identifications")?;
				let length = Self::INTERLEAVE_INFORMATION_BYTE_SIZE +
					identifications.len() * Identification::BYTE_SIZE;

				Self::write_header(writer, Self::TYPE_INTERLEAVE_INFORMATION, length)?;
				writer
					.write_u16::<LittleEndian>(*index)
					.context("Unable to write index")?;
				writer.write_u8(dimm_count).context("Unable to write dimm count")?;
				writer
					.write_u8(Self::MEMORY_TYPE_APP_DIRECT)
					.context("Unable to write memory type")?;
				writer
					.write_u8(*channel)
					.context("Unable to write channel interleave size")?;
				writer.write_u8(*imc).context("Unable to write iMC interleave size")?;
				writer
					.write_u16::<LittleEndian>(*ways)
					.context("Unable to write channel ways")?;
				writer.write_u8(u8::from(*mirror)).context("Unable to write mirror")?;
				writer.write_u8(*status).context("Unable to write status")?;
				writer.write_all(&[0; 10]).context("Unable to write padding")?;
				for identification in identifications {
					identification
						.to_writer(writer)
						.context("Unable to write identification")?;
				}
			},
		}

		Ok(())
	}

	fn write_header<W: io::Write>(writer: &mut W, ty: u16, length: usize) -> Result<(), anyhow::Error> {
		writer.write_u16::<LittleEndian>(ty).context("Unable to write type")?;
		writer
			.write_u16::<LittleEndian>(u16::try_from(length).context("Table is too large")?)
			.context("Unable to write length")?;

		Ok(())
	}
}

/// DIMM identification within an interleave set
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Identification {
	/// Unique id
	pub uid: DimmUid,

	/// Socket
	pub socket: SocketId,

	/// Die
	pub die: u8,

	/// Memory controller
	pub imc: u8,

	/// Channel
	pub channel: u8,

	/// Slot
	pub slot: u8,

	/// Offset of the region within the persistent partition
	pub partition_offset: u64,

	/// Size of the region on this DIMM
	pub partition_size: u64,
}

impl Identification {
	/// Returns the size of an identification (including any padding)
	pub const BYTE_SIZE: usize = 0x30;

	/// Parses an identification from a reader
	pub fn from_reader<R: io::Read>(reader: &mut R) -> Result<Self, anyhow::Error> {
		let manufacturer_id = reader
			.read_u16::<LittleEndian>()
			.context("Unable to read manufacturer id")?;
		let serial = reader.read_u32::<LittleEndian>().context("Unable to read serial")?;
		let date = reader.read_u16::<LittleEndian>().context("Unable to read date")?;
		let location = reader.read_u8().context("Unable to read location")?;
		let _reserved = reader.read_u8().context("Unable to read padding")?;
		let socket = SocketId::new(reader.read_u16::<LittleEndian>().context("Unable to read socket")?);
		let die = reader.read_u8().context("Unable to read die")?;
		let imc = reader.read_u8().context("Unable to read iMC")?;
		let channel = reader.read_u8().context("Unable to read channel")?;
		let slot = reader.read_u8().context("Unable to read slot")?;
		let partition_offset = reader
			.read_u64::<LittleEndian>()
			.context("Unable to read partition offset")?;
		let partition_size = reader
			.read_u64::<LittleEndian>()
			.context("Unable to read partition size")?;
		let _reserved: [u8; 16] = reader.read_byte_array().context("Unable to read padding")?;

		Ok(Self {
			uid: DimmUid {
				manufacturer_id,
				location,
				date,
				serial,
			},
			socket,
			die,
			imc,
			channel,
			slot,
			partition_offset,
			partition_size,
		})
	}

	/// Writes this identification to a writer
	pub fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<(), anyhow::Error> {
		writer
			.write_u16::<LittleEndian>(self.uid.manufacturer_id)
			.context("Unable to write manufacturer id")?;
		writer
			.write_u32::<LittleEndian>(self.uid.serial)
			.context("Unable to write serial")?;
		writer
			.write_u16::<LittleEndian>(self.uid.date)
			.context("Unable to write date")?;
		writer.write_u8(self.uid.location).context("Unable to write location")?;
		writer.write_u8(0).context("Unable to write padding")?;
		writer
			.write_u16::<LittleEndian>(self.socket.to_u16())
			.context("Unable to write socket")?;
		writer.write_u8(self.die).context("Unable to write die")?;
		writer.write_u8(self.imc).context("Unable to write iMC")?;
		writer.write_u8(self.channel).context("Unable to write channel")?;
		writer.write_u8(self.slot).context("Unable to write slot")?;
		writer
			.write_u64::<LittleEndian>(self.partition_offset)
			.context("Unable to write partition offset")?;
		writer
			.write_u64::<LittleEndian>(self.partition_size)
			.context("Unable to write partition size")?;
		writer.write_all(&[0; 16]).context("Unable to write padding")?;

		Ok(())
	}
}
