use async_trait::async_trait;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::borrow::Cow;
use std::io::{self, Write};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::archive::{ArchiveSink, Compression};

use super::structures::*;

/// Entry currently receiving data
struct OpenEntry {
    name: String,
    flags: u16,
    method: CompressionMethod,
    lfh_offset: u64,
    crc: Crc,
    encoder: Option<DeflateEncoder<Vec<u8>>>,
    compressed_size: u64,
    uncompressed_size: u64,
}

/// Closed entry waiting for its central directory record
struct EntryRecord {
    name: String,
    flags: u16,
    method: CompressionMethod,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    lfh_offset: u64,
}

/// Streaming ZIP writer over any async byte sink
///
/// Nothing is ever seeked: each entry is a local header with zeroed sizes,
/// the (optionally deflated) data, then a data descriptor. Only the
/// per-entry index records are kept until [`finalize`](ArchiveSink::finalize).
pub struct ZipWriter<W> {
    sink: W,
    offset: u64,
    compression: Compression,
    current: Option<OpenEntry>,
    records: Vec<EntryRecord>,
    finalized: bool,
}

impl<W: AsyncWrite + Unpin + Send> ZipWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            offset: 0,
            compression: Compression::default(),
            current: None,
            records: Vec::new(),
            finalized: false,
        }
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Number of entries closed so far
    pub fn entry_count(&self) -> usize {
        self.records.len()
    }

    /// Bytes written to the sink so far
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    async fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sink.write_all(bytes).await?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.finalized {
            return Err(io::Error::other("archive already finalized"));
        }
        Ok(())
    }

    async fn close_current(&mut self) -> io::Result<()> {
        let Some(entry) = self.current.take() else {
            return Ok(());
        };

        let tail = match entry.encoder {
            Some(encoder) => encoder.finish()?,
            None => Vec::new(),
        };
        if !tail.is_empty() {
            self.emit(&tail).await?;
        }

        let descriptor = DataDescriptor {
            crc32: entry.crc.sum(),
            compressed_size: entry.compressed_size + tail.len() as u64,
            uncompressed_size: entry.uncompressed_size,
        };
        let mut buf = Vec::with_capacity(24);
        descriptor.write_to(&mut buf)?;
        self.emit(&buf).await?;

        tracing::debug!(
            entry = %entry.name,
            size = descriptor.uncompressed_size,
            compressed = descriptor.compressed_size,
            "archive entry closed"
        );

        self.records.push(EntryRecord {
            name: entry.name,
            flags: entry.flags,
            method: entry.method,
            crc32: descriptor.crc32,
            compressed_size: descriptor.compressed_size,
            uncompressed_size: descriptor.uncompressed_size,
            lfh_offset: entry.lfh_offset,
        });
        Ok(())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ArchiveSink for ZipWriter<W> {
    async fn create_entry(&mut self, name: &str) -> io::Result<()> {
        self.ensure_open()?;
        self.close_current().await?;

        let method = match self.compression {
            Compression::Stored => CompressionMethod::Stored,
            Compression::Deflate => CompressionMethod::Deflate,
        };
        let mut flags = FLAG_DATA_DESCRIPTOR;
        if !name.is_ascii() {
            flags |= FLAG_UTF8;
        }

        let mut header = Vec::with_capacity(LocalFileHeader::SIZE + name.len());
        LocalFileHeader {
            flags,
            method,
            name,
        }
        .write_to(&mut header)?;

        let lfh_offset = self.offset;
        self.emit(&header).await?;

        self.current = Some(OpenEntry {
            name: name.to_string(),
            flags,
            method,
            lfh_offset,
            crc: Crc::new(),
            encoder: (method == CompressionMethod::Deflate)
                .then(|| DeflateEncoder::new(Vec::new(), flate2::Compression::default())),
            compressed_size: 0,
            uncompressed_size: 0,
        });
        Ok(())
    }

    async fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        let Some(entry) = self.current.as_mut() else {
            return Err(io::Error::other("no archive entry is open"));
        };

        entry.crc.update(buf);
        entry.uncompressed_size += buf.len() as u64;

        let out: Cow<'_, [u8]> = match entry.encoder.as_mut() {
            Some(encoder) => {
                encoder.write_all(buf)?;
                Cow::Owned(std::mem::take(encoder.get_mut()))
            }
            None => Cow::Borrowed(buf),
        };
        entry.compressed_size += out.len() as u64;

        if out.is_empty() {
            return Ok(());
        }
        self.emit(&out).await
    }

    async fn close_entry(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        self.close_current().await
    }

    async fn finalize(&mut self) -> io::Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        if let Some(entry) = self.current.take() {
            tracing::warn!(
                entry = %entry.name,
                "unfinished entry left out of the archive index"
            );
        }

        let cd_offset = self.offset;
        let records = std::mem::take(&mut self.records);
        let mut buf = Vec::new();
        for record in &records {
            buf.clear();
            CentralDirectoryHeader {
                flags: record.flags,
                method: record.method,
                crc32: record.crc32,
                compressed_size: record.compressed_size,
                uncompressed_size: record.uncompressed_size,
                lfh_offset: record.lfh_offset,
                name: &record.name,
            }
            .write_to(&mut buf)?;
            self.emit(&buf).await?;
        }
        let entries = records.len() as u64;
        self.records = records;

        let cd_size = self.offset - cd_offset;
        buf.clear();
        if entries >= ZIP64_ENTRY_LIMIT || cd_size >= ZIP64_LIMIT || cd_offset >= ZIP64_LIMIT {
            let eocd64_offset = self.offset;
            Zip64EOCD::new(entries, cd_size, cd_offset).write_to(&mut buf)?;
            Zip64EOCDLocator {
                disk_with_eocd64: 0,
                eocd64_offset,
                total_disks: 1,
            }
            .write_to(&mut buf)?;
        }
        EndOfCentralDirectory::new(entries, cd_size, cd_offset).write_to(&mut buf)?;
        self.emit(&buf).await?;
        self.sink.flush().await?;

        tracing::debug!(entries, bytes = self.offset, "archive finalized");
        Ok(())
    }
}
