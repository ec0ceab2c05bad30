//! Sequential fetch-and-append loop.

use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWrite};

use crate::archive::{ArchiveSink, Compression};
use crate::error::{AssemblyError, BuildError, Result};
use crate::io::{ByteStream, Fetcher, HttpFetcher};
use crate::naming::{FlatNameResolver, NameResolver};
use crate::source::SourceDescriptor;
use crate::zip::ZipWriter;

/// Default size of the buffer used to copy a fetched body into its entry
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Builds archives out of fetched sources.
///
/// Cloning is cheap; clones share the fetcher and name resolver.
#[derive(Clone)]
pub struct Assembler {
    fetcher: Arc<dyn Fetcher>,
    resolver: Arc<dyn NameResolver>,
    debug: bool,
    compression: Compression,
    chunk_size: usize,
}

/// Options for [`Assembler`]; anything left unset uses its default.
#[derive(Default)]
pub struct AssemblerBuilder {
    fetcher: Option<Arc<dyn Fetcher>>,
    resolver: Option<Arc<dyn NameResolver>>,
    debug: bool,
    compression: Compression,
    chunk_size: Option<usize>,
}

impl AssemblerBuilder {
    /// Fetcher used for every source (default: [`HttpFetcher`])
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Share a fetcher, and its connection pool, with other assemblers
    pub fn shared_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Entry naming policy (default: [`FlatNameResolver`])
    pub fn name_resolver(mut self, resolver: impl NameResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Log every source at `info` level as it is fetched
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Copy buffer size (default: [`DEFAULT_CHUNK_SIZE`])
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn build(self) -> std::result::Result<Assembler, BuildError> {
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(BuildError::InvalidChunkSize);
        }

        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new()?),
        };

        Ok(Assembler {
            fetcher,
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(FlatNameResolver::default())),
            debug: self.debug,
            compression: self.compression,
            chunk_size,
        })
    }
}

impl Assembler {
    pub fn builder() -> AssemblerBuilder {
        AssemblerBuilder::default()
    }

    /// Size of the buffer bodies are copied through
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Name the entry for `source` would get
    pub fn entry_name(&self, source: &SourceDescriptor) -> String {
        self.resolver.resolve(source)
    }

    /// Write a ZIP archive of `sources` into `sink`.
    ///
    /// Stops at the first failing source. The archive is finalized on every
    /// path, so after a failure `sink` holds a readable archive containing
    /// only the sources processed before it; nothing inside marks it as
    /// incomplete. A panic in the loop is re-raised after finalizing.
    pub async fn write_to<W>(&self, sources: &[SourceDescriptor], sink: W) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let mut archive = ZipWriter::new(sink).with_compression(self.compression);

        let appended = AssertUnwindSafe(self.append_all(sources, &mut archive))
            .catch_unwind()
            .await;
        let finalized = archive.finalize().await.map_err(AssemblyError::Finalize);

        match appended {
            Ok(Ok(())) => finalized,
            Ok(Err(err)) => {
                if let Err(finalize_err) = finalized {
                    tracing::warn!(error = %finalize_err, "finalize after failed assembly also failed");
                }
                Err(err)
            }
            Err(payload) => {
                if let Err(finalize_err) = finalized {
                    tracing::warn!(error = %finalize_err, "finalize after panic failed");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    /// Append one entry per source to an already open archive, in order.
    ///
    /// Does not finalize `archive`.
    pub async fn append_all<A>(&self, sources: &[SourceDescriptor], archive: &mut A) -> Result<()>
    where
        A: ArchiveSink + ?Sized,
    {
        for source in sources {
            self.append_one(source, archive).await?;
        }
        Ok(())
    }

    async fn append_one<A>(&self, source: &SourceDescriptor, archive: &mut A) -> Result<()>
    where
        A: ArchiveSink + ?Sized,
    {
        let location = source.location();
        let name = self.resolver.resolve(source);

        if self.debug {
            tracing::info!(source = %source, entry = %name, "fetching source");
        } else {
            tracing::debug!(url = location, entry = %name, "fetching source");
        }

        let mut body = self
            .fetcher
            .get(location)
            .await
            .map_err(|source| AssemblyError::Fetch {
                location: location.to_string(),
                source,
            })?;

        archive
            .create_entry(&name)
            .await
            .map_err(|source| AssemblyError::CreateEntry {
                location: location.to_string(),
                source,
            })?;

        let copied = self
            .copy_body(&mut body, archive)
            .await
            .map_err(|source| AssemblyError::Copy {
                location: location.to_string(),
                source,
            })?;
        drop(body);

        tracing::debug!(url = location, entry = %name, bytes = copied, "source appended");
        Ok(())
    }

    /// Copy the body chunk by chunk and close the entry
    async fn copy_body<A>(&self, body: &mut ByteStream, archive: &mut A) -> std::io::Result<u64>
    where
        A: ArchiveSink + ?Sized,
    {
        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;
        loop {
            let n = body.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            archive.write(&buf[..n]).await?;
            total += n as u64;
        }
        archive.close_entry().await?;
        Ok(total)
    }
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("debug", &self.debug)
            .field("compression", &self.compression)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::zip::ArchiveReader;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::io;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio_util::io::StreamReader;

    /// Serves bodies from a map; unknown locations fail
    struct MapFetcher(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn get(&self, location: &str) -> std::result::Result<ByteStream, FetchError> {
            match self.0.get(location) {
                Some(body) => Ok(Box::pin(io::Cursor::new(body.clone()))),
                None => Err(FetchError::Unsupported(location.to_string())),
            }
        }
    }

    /// Archive sink that refuses every entry
    struct RefusingSink;

    #[async_trait]
    impl ArchiveSink for RefusingSink {
        async fn create_entry(&mut self, _name: &str) -> io::Result<()> {
            Err(io::Error::other("read-only archive"))
        }
        async fn write(&mut self, _buf: &[u8]) -> io::Result<()> {
            Ok(())
        }
        async fn close_entry(&mut self) -> io::Result<()> {
            Ok(())
        }
        async fn finalize(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Records every location it is asked for. Locations containing `bad`
    /// deliver a few chunks and then fail with a connection reset.
    struct FlakyFetcher {
        fetched: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Fetcher for FlakyFetcher {
        async fn get(&self, location: &str) -> std::result::Result<ByteStream, FetchError> {
            self.fetched.lock().unwrap().push(location.to_string());
            let chunks: Vec<io::Result<Bytes>> = if location.contains("bad") {
                vec![
                    Ok(Bytes::from_static(b"part")),
                    Ok(Bytes::from_static(b"ial ")),
                    Ok(Bytes::from_static(b"body")),
                    Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
                ]
            } else {
                vec![Ok(Bytes::from_static(b"good"))]
            };
            Ok(Box::pin(StreamReader::new(futures::stream::iter(chunks))))
        }
    }

    /// Accepts `limit` bytes, then fails every write
    struct LimitedSink {
        written: usize,
        limit: usize,
    }

    impl LimitedSink {
        fn new(limit: usize) -> Self {
            Self { written: 0, limit }
        }
    }

    impl AsyncWrite for LimitedSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.written + buf.len() > self.limit {
                return Poll::Ready(Err(io::Error::other("sink full")));
            }
            self.written += buf.len();
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn assembler(bodies: &[(&str, &[u8])]) -> Assembler {
        let map = bodies
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect();
        Assembler::builder()
            .fetcher(MapFetcher(map))
            .chunk_size(4)
            .build()
            .unwrap()
    }

    fn sources(locations: &[&str]) -> Vec<SourceDescriptor> {
        locations
            .iter()
            .map(|l| SourceDescriptor::new(*l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_entries_follow_input_order() {
        let assembler = assembler(&[("http://h/b", b"bee"), ("http://h/a", b"ay")]);
        let mut out = Vec::new();
        assembler
            .write_to(&sources(&["http://h/b", "http://h/a"]), &mut out)
            .await
            .unwrap();

        let reader = ArchiveReader::new(&out);
        let entries = reader.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "h-b");
        assert_eq!(reader.read(&entries[0]).unwrap(), b"bee");
        assert_eq!(entries[1].name, "h-a");
        assert_eq!(reader.read(&entries[1]).unwrap(), b"ay");
    }

    #[tokio::test]
    async fn test_fetch_failure_stops_and_keeps_finalized_prefix() {
        let assembler = assembler(&[("http://h/1", b"one"), ("http://h/3", b"three")]);
        let mut out = Vec::new();
        let err = assembler
            .write_to(&sources(&["http://h/1", "http://h/2", "http://h/3"]), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::Fetch { .. }));
        assert_eq!(err.location(), Some("http://h/2"));

        let entries = ArchiveReader::new(&out).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "h-1");
    }

    #[tokio::test]
    async fn test_copy_failure_stops_and_drops_partial_entry() {
        let fetched = Arc::new(Mutex::new(Vec::new()));
        let assembler = Assembler::builder()
            .fetcher(FlakyFetcher {
                fetched: fetched.clone(),
            })
            .chunk_size(4)
            .build()
            .unwrap();

        let mut out = Vec::new();
        let err = assembler
            .write_to(&sources(&["http://h/ok", "http://h/bad", "http://h/ok2"]), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::Copy { .. }), "{err}");
        assert_eq!(err.location(), Some("http://h/bad"));
        assert_eq!(*fetched.lock().unwrap(), ["http://h/ok", "http://h/bad"]);

        let reader = ArchiveReader::new(&out);
        let entries = reader.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "h-ok");
        assert_eq!(reader.read(&entries[0]).unwrap(), b"good");
    }

    #[tokio::test]
    async fn test_finalize_failure_is_reported_after_clean_loop() {
        let assembler = assembler(&[("http://h/1", b"one")]);
        let mut full = Vec::new();
        assembler
            .write_to(&sources(&["http://h/1"]), &mut full)
            .await
            .unwrap();

        // room for the entry but not for the whole end record
        let sink = LimitedSink::new(full.len() - 1);
        let err = assembler
            .write_to(&sources(&["http://h/1"]), sink)
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::Finalize(_)), "{err}");
        assert_eq!(err.location(), None);
    }

    #[tokio::test]
    async fn test_loop_error_wins_over_finalize_error() {
        let assembler = assembler(&[("http://h/1", b"one")]);
        let mut full = Vec::new();
        assembler
            .write_to(&sources(&["http://h/1"]), &mut full)
            .await
            .unwrap();

        let sink = LimitedSink::new(full.len() - 1);
        let err = assembler
            .write_to(&sources(&["http://h/1", "http://h/missing"]), sink)
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::Fetch { .. }), "{err}");
        assert_eq!(err.location(), Some("http://h/missing"));
    }

    #[tokio::test]
    async fn test_entry_creation_failure_carries_location() {
        let assembler = assembler(&[("http://h/1", b"one")]);
        let err = assembler
            .append_all(&sources(&["http://h/1"]), &mut RefusingSink)
            .await
            .unwrap_err();

        assert!(matches!(err, AssemblyError::CreateEntry { .. }));
        assert_eq!(err.location(), Some("http://h/1"));
    }

    #[tokio::test]
    async fn test_empty_source_list_gives_empty_archive() {
        let assembler = assembler(&[]);
        let mut out = Vec::new();
        assembler.write_to(&[], &mut out).await.unwrap();
        assert!(ArchiveReader::new(&out).entries().unwrap().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let result = Assembler::builder()
            .fetcher(MapFetcher(HashMap::new()))
            .chunk_size(0)
            .build();
        assert!(matches!(result, Err(BuildError::InvalidChunkSize)));
    }

    #[test]
    fn test_custom_resolver() {
        let assembler = Assembler::builder()
            .fetcher(MapFetcher(HashMap::new()))
            .name_resolver(|s: &SourceDescriptor| format!("{}.bin", s.metadata()))
            .build()
            .unwrap();
        let source = SourceDescriptor::new("http://h/x")
            .unwrap()
            .with_metadata(serde_json::json!(42));
        assert_eq!(assembler.entry_name(&source), "42.bin");
    }
}
