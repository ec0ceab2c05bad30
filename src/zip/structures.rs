use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor};

use anyhow::{Result, bail};

/// Sizes and offsets at or above this value live in ZIP64 fields.
pub const ZIP64_LIMIT: u64 = u32::MAX as u64;
/// Entry counts at or above this value live in the ZIP64 end record.
pub const ZIP64_ENTRY_LIMIT: u64 = u16::MAX as u64;
/// Header ID of the ZIP64 extended information extra field.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Sizes and CRC follow the data in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// File name is UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

pub const VERSION_DEFAULT: u16 = 20;
pub const VERSION_ZIP64: u16 = 45;
/// "Version made by" host byte for Unix, so external attributes carry a mode.
pub const CREATOR_UNIX: u16 = 3 << 8;
/// Regular file, rw-r--r--.
pub const UNIX_FILE_MODE: u32 = 0o100644;

/// 1980-01-01 00:00:00, the DOS epoch. Written for every entry.
pub const DOS_EPOCH_DATE: u16 = (1 << 5) | 1;
pub const DOS_EPOCH_TIME: u16 = 0;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Local File Header (LFH) - 30 bytes plus the name
///
/// Written with zero CRC and sizes; the data descriptor carries the real values.
pub struct LocalFileHeader<'a> {
    pub flags: u16,
    pub method: CompressionMethod,
    pub name: &'a str,
}

impl LocalFileHeader<'_> {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;

    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(Self::SIGNATURE);
        out.write_u16::<LittleEndian>(VERSION_DEFAULT)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.method.as_u16())?;
        out.write_u16::<LittleEndian>(DOS_EPOCH_TIME)?;
        out.write_u16::<LittleEndian>(DOS_EPOCH_DATE)?;
        out.write_u32::<LittleEndian>(0)?; // crc32
        out.write_u32::<LittleEndian>(0)?; // compressed size
        out.write_u32::<LittleEndian>(0)?; // uncompressed size
        out.write_u16::<LittleEndian>(name_len(self.name)?)?;
        out.write_u16::<LittleEndian>(0)?; // extra field length
        out.extend_from_slice(self.name.as_bytes());
        Ok(())
    }
}

/// Data descriptor - 16 bytes, or 24 when either size needs 64 bits
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    pub const SIGNATURE: &'static [u8] = b"PK\x07\x08";

    pub fn is_zip64(&self) -> bool {
        self.compressed_size >= ZIP64_LIMIT || self.uncompressed_size >= ZIP64_LIMIT
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(Self::SIGNATURE);
        out.write_u32::<LittleEndian>(self.crc32)?;
        if self.is_zip64() {
            out.write_u64::<LittleEndian>(self.compressed_size)?;
            out.write_u64::<LittleEndian>(self.uncompressed_size)?;
        } else {
            out.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            out.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        }
        Ok(())
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub struct CentralDirectoryHeader<'a> {
    pub flags: u16,
    pub method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub lfh_offset: u64,
    pub name: &'a str,
}

impl CentralDirectoryHeader<'_> {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const MIN_SIZE: usize = 46;

    pub fn is_zip64(&self) -> bool {
        self.compressed_size >= ZIP64_LIMIT
            || self.uncompressed_size >= ZIP64_LIMIT
            || self.lfh_offset >= ZIP64_LIMIT
    }

    /// When any field overflows, all three 32-bit fields are set to
    /// 0xFFFFFFFF and the real values go to the ZIP64 extra field in the
    /// order uncompressed size, compressed size, header offset.
    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let zip64 = self.is_zip64();
        let version = if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT };
        let narrow = |value: u64| if zip64 { u32::MAX } else { value as u32 };

        out.extend_from_slice(Self::SIGNATURE);
        out.write_u16::<LittleEndian>(CREATOR_UNIX | version)?;
        out.write_u16::<LittleEndian>(version)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.method.as_u16())?;
        out.write_u16::<LittleEndian>(DOS_EPOCH_TIME)?;
        out.write_u16::<LittleEndian>(DOS_EPOCH_DATE)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(narrow(self.compressed_size))?;
        out.write_u32::<LittleEndian>(narrow(self.uncompressed_size))?;
        out.write_u16::<LittleEndian>(name_len(self.name)?)?;
        out.write_u16::<LittleEndian>(if zip64 { 28 } else { 0 })?;
        out.write_u16::<LittleEndian>(0)?; // comment length
        out.write_u16::<LittleEndian>(0)?; // disk number start
        out.write_u16::<LittleEndian>(0)?; // internal attributes
        out.write_u32::<LittleEndian>(UNIX_FILE_MODE << 16)?;
        out.write_u32::<LittleEndian>(narrow(self.lfh_offset))?;
        out.extend_from_slice(self.name.as_bytes());

        if zip64 {
            out.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
            out.write_u16::<LittleEndian>(24)?;
            out.write_u64::<LittleEndian>(self.uncompressed_size)?;
            out.write_u64::<LittleEndian>(self.compressed_size)?;
            out.write_u64::<LittleEndian>(self.lfh_offset)?;
        }
        Ok(())
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Build the record, saturating overflowing fields to their ZIP64 markers.
    pub fn new(entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        let entries = entries.min(ZIP64_ENTRY_LIMIT) as u16;
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size: cd_size.min(ZIP64_LIMIT) as u32,
            cd_offset: cd_offset.min(ZIP64_LIMIT) as u32,
            comment_len: 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(Self::SIGNATURE);
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(())
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 locator");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(Self::SIGNATURE);
        out.write_u32::<LittleEndian>(self.disk_with_eocd64)?;
        out.write_u64::<LittleEndian>(self.eocd64_offset)?;
        out.write_u32::<LittleEndian>(self.total_disks)?;
        Ok(())
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn new(entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        Self {
            // size of the remaining record, excluding signature and this field
            eocd64_size: (Self::MIN_SIZE - 12) as u64,
            version_made_by: CREATOR_UNIX | VERSION_ZIP64,
            version_needed: VERSION_ZIP64,
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }

    pub fn write_to(&self, out: &mut Vec<u8>) -> io::Result<()> {
        out.extend_from_slice(Self::SIGNATURE);
        out.write_u64::<LittleEndian>(self.eocd64_size)?;
        out.write_u16::<LittleEndian>(self.version_made_by)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u32::<LittleEndian>(self.disk_number)?;
        out.write_u32::<LittleEndian>(self.disk_with_cd)?;
        out.write_u64::<LittleEndian>(self.disk_entries)?;
        out.write_u64::<LittleEndian>(self.total_entries)?;
        out.write_u64::<LittleEndian>(self.cd_size)?;
        out.write_u64::<LittleEndian>(self.cd_offset)?;
        Ok(())
    }
}

/// Entry metadata as listed in the central directory
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub name: String,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
}

fn name_len(name: &str) -> io::Result<u16> {
    u16::try_from(name.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("entry name is {} bytes, the limit is 65535", name.len()),
        )
    })
}
