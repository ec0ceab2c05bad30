//! ZIP archive writing and inspection.
//!
//! ## Architecture
//!
//! - [`structures`]: binary records of the ZIP format (headers, descriptors, end records)
//! - [`writer`]: streaming writer, the default [`ArchiveSink`](crate::ArchiveSink)
//! - [`reader`]: in-memory reader for checking what was written
//!
//! ## Layout produced by the writer
//!
//! A ZIP file written without seeking consists of:
//! 1. For each entry: a Local File Header with zeroed sizes, the entry data,
//!    and a data descriptor carrying CRC-32 and sizes
//! 2. The Central Directory with one record per entry
//! 3. ZIP64 end record and locator, when counts or offsets overflow
//! 4. The End of Central Directory (EOCD) record
//!
//! ## Supported Features
//!
//! - STORED and DEFLATE compression methods
//! - ZIP64 extensions for large entries, offsets and entry counts
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - Modification times are fixed at the DOS epoch
//! - Local headers never carry a ZIP64 extra field, since sizes are unknown
//!   when they are written. An entry of 4 GiB or more gets a 24-byte data
//!   descriptor, and only the central directory marks it as ZIP64. Readers
//!   that walk local headers instead of the central directory will misparse
//!   such an entry.

mod reader;
mod structures;
mod writer;

pub use reader::ArchiveReader;
pub use structures::*;
pub use writer::ZipWriter;
