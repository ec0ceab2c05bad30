//! Producer/consumer bridge exposing assembly as a pull-based stream.
//!
//! The assembler runs in a spawned task and writes into a [`PipeWriter`];
//! the caller pulls chunks from the matching [`ArchiveStream`]. Writes are
//! gathered into chunks of the assembler's chunk size before they enter the
//! channel. The channel holds one chunk, so a write waits until the previous
//! chunk was taken and memory stays bounded whatever the archive size.
//!
//! How the task ended travels as the last item of the channel:
//! - success: the channel is closed and the stream ends;
//! - assembly failure: an `Err` carrying the [`AssemblyError`] is the last item;
//! - panic: the panic is caught, logged, and delivered as
//!   [`AssemblyError::Panicked`].

use bytes::Bytes;
use futures::{FutureExt, Stream};
use std::any::Any;
use std::io;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tokio_util::sync::PollSender;

use crate::assembler::Assembler;
use crate::error::AssemblyError;
use crate::source::SourceDescriptor;

type Chunk = io::Result<Bytes>;

/// Runs an [`Assembler`] in the background and hands out its output as a stream
#[derive(Debug, Clone)]
pub struct StreamBridge {
    assembler: Assembler,
}

impl StreamBridge {
    pub fn new(assembler: Assembler) -> Self {
        Self { assembler }
    }

    /// Start assembling `sources` and return the archive stream immediately.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self, sources: Vec<SourceDescriptor>) -> ArchiveStream {
        let (writer, stream) = pipe();
        let assembler = self.assembler.clone();
        tokio::spawn(drive(assembler, sources, writer));
        stream
    }
}

impl Assembler {
    /// Shorthand for `StreamBridge::new(self.clone()).start(sources)`
    pub fn stream(&self, sources: Vec<SourceDescriptor>) -> ArchiveStream {
        StreamBridge::new(self.clone()).start(sources)
    }
}

async fn drive(assembler: Assembler, sources: Vec<SourceDescriptor>, mut writer: PipeWriter) {
    // finalize flushes the buffer on every path
    let buffered = BufWriter::with_capacity(assembler.chunk_size(), &mut writer);
    let outcome = AssertUnwindSafe(assembler.write_to(&sources, buffered))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            if let Err(err) = writer.shutdown().await {
                tracing::debug!(error = %err, "archive pipe already closed");
            }
            tracing::debug!(sources = sources.len(), "archive stream complete");
        }
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "archive assembly failed");
            writer.close_with_error(io::Error::other(err)).await;
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(panic = %message, "archive assembly task panicked");
            writer
                .close_with_error(io::Error::other(AssemblyError::Panicked(message)))
                .await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Create a connected writer/stream pair holding at most one chunk in flight
pub fn pipe() -> (PipeWriter, ArchiveStream) {
    let (sender, receiver) = mpsc::channel(1);
    (
        PipeWriter {
            sender: PollSender::new(sender),
        },
        ArchiveStream {
            receiver,
            done: false,
        },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive stream receiver dropped")
}

/// Write half of the pipe
pub struct PipeWriter {
    sender: PollSender<Chunk>,
}

impl PipeWriter {
    /// Close the pipe so the reader's next read fails with `err`
    pub async fn close_with_error(mut self, err: io::Error) {
        let reserved = std::future::poll_fn(|cx| self.sender.poll_reserve(cx)).await;
        if reserved.is_err() || self.sender.send_item(Err(err)).is_err() {
            tracing::debug!("archive stream dropped before the error could be delivered");
        }
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        ready!(self.sender.poll_reserve(cx)).map_err(|_| broken_pipe())?;
        self.sender
            .send_item(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| broken_pipe())?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.sender.close();
        Poll::Ready(Ok(()))
    }
}

/// Read half of the pipe: the archive bytes, chunk by chunk.
///
/// Ends after the last chunk on success. On failure the last item is an
/// `Err` whose inner error is the [`AssemblyError`]; see
/// [`ArchiveStream::assembly_error`].
pub struct ArchiveStream {
    receiver: mpsc::Receiver<Chunk>,
    done: bool,
}

impl ArchiveStream {
    /// Adapt into an [`AsyncRead`](tokio::io::AsyncRead)
    pub fn into_async_read(self) -> StreamReader<Self, Bytes> {
        StreamReader::new(self)
    }

    /// The assembly failure carried by an error read from this stream, if any
    pub fn assembly_error(err: &io::Error) -> Option<&AssemblyError> {
        err.get_ref()?.downcast_ref::<AssemblyError>()
    }
}

impl Stream for ArchiveStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        let item = ready!(self.receiver.poll_recv(cx));
        if matches!(item, None | Some(Err(_))) {
            self.done = true;
        }
        Poll::Ready(item)
    }
}
