use async_trait::async_trait;
use std::io;

/// How entry bodies are stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    /// Bytes are written as fetched
    Stored,
    /// DEFLATE at the default level
    #[default]
    Deflate,
}

/// Trait for an archive being written entry by entry into a byte sink
///
/// Entries are strictly sequential: bytes written go to the entry most
/// recently created.
#[async_trait]
pub trait ArchiveSink: Send {
    /// Start a new entry, closing the open one if there is one
    async fn create_entry(&mut self, name: &str) -> io::Result<()>;

    /// Append bytes to the open entry
    async fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Finish the open entry and record it in the index
    async fn close_entry(&mut self) -> io::Result<()>;

    /// Write the index and trailer
    ///
    /// An entry still open at this point was never closed and is left out
    /// of the index. Calling this more than once is a no-op.
    async fn finalize(&mut self) -> io::Result<()>;
}
