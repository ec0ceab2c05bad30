//! In-memory ZIP reader used to inspect assembled archives.
//!
//! ZIP files are read from the end: the End of Central Directory (EOCD)
//! points at the Central Directory, which lists every entry with the offset
//! of its Local File Header. Sizes come from the Central Directory, so
//! entries written with data descriptors are read correctly.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::Crc;
use flate2::read::DeflateDecoder;
use std::io::{Cursor, Read};

use anyhow::{Context, Result, bail};

use super::structures::*;

/// Maximum ZIP comment size allowed by the format (65535 bytes).
const MAX_COMMENT_SIZE: usize = 65535;

/// Reader over a complete archive held in memory
pub struct ArchiveReader<'a> {
    data: &'a [u8],
}

impl<'a> ArchiveReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn slice(&self, offset: u64, len: u64) -> Result<&'a [u8]> {
        let start = usize::try_from(offset)?;
        let end = start
            .checked_add(usize::try_from(len)?)
            .filter(|end| *end <= self.data.len())
            .with_context(|| format!("range {offset}+{len} is past the end of the archive"))?;
        Ok(&self.data[start..end])
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset. Archives with a trailing comment
    /// are handled by scanning backwards for the signature.
    pub fn find_eocd(&self) -> Result<(EndOfCentralDirectory, usize)> {
        let size = self.data.len();
        if size < EndOfCentralDirectory::SIZE {
            bail!("Not a valid ZIP file");
        }

        let search_start = size.saturating_sub(MAX_COMMENT_SIZE + EndOfCentralDirectory::SIZE);
        let last = size - EndOfCentralDirectory::SIZE;

        for i in (search_start..=last).rev() {
            if &self.data[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            // the comment length must account for every remaining byte
            let comment_len = u16::from_le_bytes([self.data[i + 20], self.data[i + 21]]) as usize;
            if comment_len == size - i - EndOfCentralDirectory::SIZE {
                let eocd = EndOfCentralDirectory::from_bytes(&self.data[i..])?;
                return Ok((eocd, i));
            }
        }

        bail!("Not a valid ZIP file")
    }

    /// Read the ZIP64 End of Central Directory through the locator that
    /// sits immediately before the regular EOCD.
    fn read_zip64_eocd(&self, eocd_offset: usize) -> Result<Zip64EOCD> {
        let locator_offset = eocd_offset
            .checked_sub(Zip64EOCDLocator::SIZE)
            .context("Invalid ZIP64 format")?;
        let locator = Zip64EOCDLocator::from_bytes(
            self.slice(locator_offset as u64, Zip64EOCDLocator::SIZE as u64)?,
        )?;

        Zip64EOCD::from_bytes(self.slice(locator.eocd64_offset, Zip64EOCD::MIN_SIZE as u64)?)
    }

    /// List all entries from the Central Directory, in archive order
    pub fn entries(&self) -> Result<Vec<EntryInfo>> {
        let (eocd, eocd_offset) = self.find_eocd()?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset)?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        let mut cursor = Cursor::new(self.slice(cd_offset, cd_size)?);
        (0..total_entries)
            .map(|_| Self::parse_cdfh(&mut cursor))
            .collect()
    }

    fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<EntryInfo> {
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != CentralDirectoryHeader::SIGNATURE {
            bail!("Invalid Central Directory File Header");
        }

        let _version_made_by = cursor.read_u16::<LittleEndian>()?;
        let _version_needed = cursor.read_u16::<LittleEndian>()?;
        let flags = cursor.read_u16::<LittleEndian>()?;
        let compression_method = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
        let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
        let name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_length = cursor.read_u16::<LittleEndian>()?;
        let comment_length = cursor.read_u16::<LittleEndian>()?;
        let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
        let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
        let _external_attrs = cursor.read_u32::<LittleEndian>()?;
        let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut name = vec![0u8; name_length as usize];
        cursor.read_exact(&mut name)?;
        let name = String::from_utf8_lossy(&name).into_owned();

        let extra_end = cursor.position() + extra_length as u64;
        while cursor.position() + 4 <= extra_end {
            let header_id = cursor.read_u16::<LittleEndian>()?;
            let field_size = cursor.read_u16::<LittleEndian>()? as u64;
            let field_end = cursor.position() + field_size;

            if header_id == ZIP64_EXTRA_ID {
                // only the fields saturated in the fixed header are present
                if uncompressed_size == ZIP64_LIMIT {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == ZIP64_LIMIT {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == ZIP64_LIMIT {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            cursor.set_position(field_end);
        }
        cursor.set_position(extra_end + comment_length as u64);

        Ok(EntryInfo {
            name,
            flags,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            lfh_offset,
        })
    }

    /// Offset of the entry's data, just past its Local File Header
    fn data_offset(&self, entry: &EntryInfo) -> Result<u64> {
        let lfh = self.slice(entry.lfh_offset, LocalFileHeader::SIZE as u64)?;
        if &lfh[0..4] != LocalFileHeader::SIGNATURE {
            bail!("Invalid Local File Header for {}", entry.name);
        }

        let mut cursor = Cursor::new(&lfh[26..]);
        let name_length = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_length = cursor.read_u16::<LittleEndian>()? as u64;

        Ok(entry.lfh_offset + LocalFileHeader::SIZE as u64 + name_length + extra_length)
    }

    /// Read and decompress an entry, verifying its size and CRC-32
    pub fn read(&self, entry: &EntryInfo) -> Result<Vec<u8>> {
        let raw = self.slice(self.data_offset(entry)?, entry.compressed_size)?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw.to_vec(),
            CompressionMethod::Deflate => {
                let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
                DeflateDecoder::new(raw).read_to_end(&mut out)?;
                out
            }
            CompressionMethod::Unknown(method) => {
                bail!("Unsupported compression method {method} for {}", entry.name)
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            bail!(
                "{}: expected {} bytes, got {}",
                entry.name,
                entry.uncompressed_size,
                data.len()
            );
        }
        let mut crc = Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            bail!("{}: CRC-32 mismatch", entry.name);
        }

        Ok(data)
    }
}
