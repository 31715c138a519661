//! Line-oriented duplex stream over one accepted socket
//!
//! `Connection::split` yields a [`LineReader`] that stays with the session's
//! read loop and a [`LineWriter`] that moves into the session's writer task.
//! Every transport failure, including a read timeout, is reported as
//! [`ChatError::ConnectionLost`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time;

use crate::config::MAX_LINE_BYTES;
use crate::error::ChatError;

/// One accepted client socket
pub struct Connection {
    peer: Option<SocketAddr>,
    reader: LineReader<OwnedReadHalf>,
    writer: LineWriter<OwnedWriteHalf>,
}

impl Connection {
    pub fn new(stream: TcpStream, read_timeout: Option<Duration>) -> Self {
        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        Self {
            peer,
            reader: LineReader::new(read_half, read_timeout),
            writer: LineWriter::new(write_half),
        }
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn split(self) -> (LineReader<OwnedReadHalf>, LineWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

/// Reads newline-delimited text
pub struct LineReader<R> {
    inner: BufReader<R>,
    read_timeout: Option<Duration>,
    max_line_bytes: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, read_timeout: Option<Duration>) -> Self {
        Self {
            inner: BufReader::new(inner),
            read_timeout,
            max_line_bytes: MAX_LINE_BYTES,
            buf: Vec::new(),
        }
    }

    pub fn with_max_line_bytes(mut self, max: usize) -> Self {
        self.max_line_bytes = max;
        self
    }

    /// Read the next line without its terminator
    ///
    /// Returns `Ok(None)` at end of stream. Invalid UTF-8 is replaced
    /// rather than rejected. A line longer than the configured maximum
    /// ends the connection.
    pub async fn read_line(&mut self) -> Result<Option<String>, ChatError> {
        self.buf.clear();
        // Room for the content plus `\r\n`
        let limit = self.max_line_bytes as u64 + 2;
        let mut limited = (&mut self.inner).take(limit);
        let n = within(self.read_timeout, limited.read_until(b'\n', &mut self.buf)).await?;
        if n == 0 {
            return Ok(None);
        }

        if !self.buf.ends_with(b"\n") && n as u64 == limit {
            self.buf = Vec::new();
            return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long").into());
        }

        if self.buf.ends_with(b"\n") {
            self.buf.pop();
            if self.buf.ends_with(b"\r") {
                self.buf.pop();
            }
        }
        if self.buf.len() > self.max_line_bytes {
            self.buf = Vec::new();
            return Err(io::Error::new(io::ErrorKind::InvalidData, "line too long").into());
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// Read exactly `len` raw bytes following a header line
    pub async fn read_exact_bytes(&mut self, len: usize) -> Result<Vec<u8>, ChatError> {
        let mut payload = vec![0u8; len];
        within(self.read_timeout, self.inner.read_exact(&mut payload)).await?;
        Ok(payload)
    }

    /// Discard exactly `len` raw bytes without buffering them
    pub async fn skip_bytes(&mut self, len: usize) -> Result<(), ChatError> {
        let mut limited = (&mut self.inner).take(len as u64);
        let copied = within(
            self.read_timeout,
            tokio::io::copy(&mut limited, &mut tokio::io::sink()),
        )
        .await?;
        if copied < len as u64 {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(())
    }
}

/// Apply the optional read timeout to one read operation
async fn within<T>(
    limit: Option<Duration>,
    read: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match limit {
        Some(limit) => time::timeout(limit, read)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))?,
        None => read.await,
    }
}

/// Writes newline-delimited text
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write `line` followed by `\n` and flush
    pub async fn write_line(&mut self, line: &str) -> Result<(), ChatError> {
        let mut encoded = Vec::with_capacity(line.len() + 1);
        encoded.extend_from_slice(line.as_bytes());
        encoded.push(b'\n');
        self.inner.write_all(&encoded).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Best-effort half-close; errors are irrelevant once the session is ending
    pub async fn shutdown(&mut self) {
        let _ = self.inner.shutdown().await;
    }
}
