//! # urlzip
//!
//! Stream remote resources into a single ZIP archive without holding the
//! archive, or any one resource, in memory.
//!
//! Sources are fetched one after another and copied chunk by chunk into
//! archive entries. The archive can be written straight into a sink
//! ([`Assembler::write_to`]) or pulled as a stream produced by a background
//! task ([`Assembler::stream`]), e.g. to forward it as an HTTP response body.
//!
//! ## Features
//!
//! - Entries in input order, named by a pluggable [`NameResolver`]
//! - Pluggable [`Fetcher`]; the default is a pooled HTTP client with timeouts
//! - STORED or DEFLATE entries, ZIP64 when sizes or counts require it
//! - The archive is always finalized, even when a source fails
//!
//! ## Example
//!
//! ```no_run
//! use urlzip::{Assembler, SourceDescriptor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let assembler = Assembler::builder().debug(true).build()?;
//!
//!     let sources = vec![
//!         SourceDescriptor::new("https://example.com/a.txt")?,
//!         SourceDescriptor::new("https://example.com/b.txt")?,
//!     ];
//!
//!     let mut file = tokio::fs::File::create("out.zip").await?;
//!     assembler.write_to(&sources, &mut file).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Failures
//!
//! The first failing source stops the run. A sink written directly still
//! receives a complete central directory listing only the entries finished
//! before the failure. A stream delivers the failure as its final item,
//! including a panic inside the background task.

pub mod archive;
pub mod assembler;
pub mod bridge;
pub mod cli;
pub mod error;
pub mod io;
pub mod logging;
pub mod naming;
pub mod source;
pub mod zip;

pub use archive::{ArchiveSink, Compression};
pub use assembler::{Assembler, AssemblerBuilder};
pub use bridge::{ArchiveStream, PipeWriter, StreamBridge};
pub use cli::Cli;
pub use error::{AssemblyError, BuildError, DescriptorError, FetchError, SerializationError};
pub use io::{ByteStream, Fetcher, HttpFetcher, HttpFetcherConfig, LocalFileFetcher, SchemeFetcher};
pub use naming::{FlatNameResolver, NameResolver};
pub use source::SourceDescriptor;

use std::sync::OnceLock;
use tokio::io::AsyncWrite;

static DEFAULT_ASSEMBLER: OnceLock<Assembler> = OnceLock::new();

/// Process-wide assembler with every option at its default, built on first use
pub fn default_assembler() -> Result<&'static Assembler, BuildError> {
    if let Some(assembler) = DEFAULT_ASSEMBLER.get() {
        return Ok(assembler);
    }
    let assembler = Assembler::builder().build()?;
    Ok(DEFAULT_ASSEMBLER.get_or_init(|| assembler))
}

/// [`Assembler::write_to`] on the [`default_assembler`]
pub async fn write_archive<W>(sources: &[SourceDescriptor], sink: W) -> error::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    default_assembler()?.write_to(sources, sink).await
}

/// [`Assembler::stream`] on the [`default_assembler`]
pub fn stream_archive(sources: Vec<SourceDescriptor>) -> Result<ArchiveStream, BuildError> {
    Ok(default_assembler()?.stream(sources))
}
