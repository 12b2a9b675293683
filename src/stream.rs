//! Stream handles passed to and from backends.
//!
//! A [`ContentStream`] remembers whether the reader underneath can seek. That
//! is what lets [`ReplicateStorage`](crate::ReplicateStorage) replay a stream
//! for the replica after the source has consumed it: [`try_rewind`] succeeds
//! for seekable streams, and [`reopen`] fetches the freshly written content
//! back from a backend when it does not.

use std::fmt;
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, ReadBuf};

use crate::{Filesystem, Result};

trait SeekableRead: AsyncRead + AsyncSeek + Send {}

impl<T: AsyncRead + AsyncSeek + Send> SeekableRead for T {}

enum Reader {
    Seekable(Pin<Box<dyn SeekableRead>>),
    Sequential(Pin<Box<dyn AsyncRead + Send>>),
}

/// A byte stream that may or may not support rewinding.
pub struct ContentStream {
    reader: Reader,
}

impl ContentStream {
    /// Wrap a reader that can seek back to its start.
    pub fn seekable<R>(reader: R) -> Self
    where
        R: AsyncRead + AsyncSeek + Send + 'static,
    {
        Self {
            reader: Reader::Seekable(Box::pin(reader)),
        }
    }

    /// Wrap a single-pass reader (sockets, pipes, decoders).
    pub fn sequential<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            reader: Reader::Sequential(Box::pin(reader)),
        }
    }

    /// An in-memory, seekable stream over `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::seekable(io::Cursor::new(bytes.into()))
    }

    pub fn is_seekable(&self) -> bool {
        matches!(self.reader, Reader::Seekable(_))
    }

    /// Seek back to offset 0.
    ///
    /// Fails with [`io::ErrorKind::Unsupported`] for sequential streams.
    pub async fn rewind(&mut self) -> io::Result<()> {
        match &mut self.reader {
            Reader::Seekable(reader) => {
                let pos = reader.seek(SeekFrom::Start(0)).await?;
                if pos != 0 {
                    return Err(io::Error::other(format!(
                        "rewind landed at offset {pos}"
                    )));
                }
                Ok(())
            }
            Reader::Sequential(_) => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "stream is not seekable",
            )),
        }
    }

    /// Read everything from the current position to the end.
    pub async fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf).await?;
        Ok(buf)
    }
}

impl AsyncRead for ContentStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().reader {
            Reader::Seekable(reader) => reader.as_mut().poll_read(cx, buf),
            Reader::Sequential(reader) => reader.as_mut().poll_read(cx, buf),
        }
    }
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("seekable", &self.is_seekable())
            .finish()
    }
}

/// Rewind `stream` to its start if it supports seeking.
///
/// Returns `false` when the stream is sequential or the seek fails; the stream
/// should then be treated as spent.
pub async fn try_rewind(stream: &mut ContentStream) -> bool {
    if !stream.is_seekable() {
        return false;
    }
    match stream.rewind().await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Stream rewind failed");
            false
        }
    }
}

/// Open a fresh read stream for `path` on `backend`.
pub async fn reopen<F: Filesystem>(backend: &F, path: &str) -> Result<ContentStream> {
    backend.read_stream(path).await
}
