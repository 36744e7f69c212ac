//! Trait abstraction for reading teleinfo lines to enable testing

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

/// Longest run of bytes accepted without a newline before it is dropped
pub const MAX_LINE_LEN: usize = 4096;

/// Read granularity for the underlying reader
const READ_CHUNK: usize = 512;

/// Trait for line-oriented teleinfo input
#[async_trait]
pub trait LineSource: Send {
    /// Read the next line, without its trailing `\n` / `\r\n`.
    ///
    /// Blocks until a full line is available. Errors on timeout or end of
    /// stream; neither is recoverable mid-line.
    async fn read_line(&mut self) -> io::Result<Bytes>;
}

/// Splits any async byte stream into lines, with a per-line read timeout
pub struct ReaderLineSource<R> {
    reader: R,
    buffer: BytesMut,
    timeout: Duration,
}

impl<R> ReaderLineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub fn new(reader: R, timeout: Duration) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(MAX_LINE_LEN),
            timeout,
        }
    }

    /// Take the next complete line out of the buffer, if any
    fn take_line(&mut self) -> Option<Bytes> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line = self.buffer.split_to(pos + 1);
        line.truncate(pos);
        if line.ends_with(b"\r") {
            line.truncate(pos - 1);
        }
        Some(line.freeze())
    }
}

#[async_trait]
impl<R> LineSource for ReaderLineSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_line(&mut self) -> io::Result<Bytes> {
        loop {
            if let Some(line) = self.take_line() {
                if line.len() > MAX_LINE_LEN {
                    warn!("Dropping overlong line ({} bytes)", line.len());
                    continue;
                }
                return Ok(line);
            }

            if self.buffer.len() > MAX_LINE_LEN {
                warn!("Dropping {} bytes received without a newline", self.buffer.len());
                self.buffer.clear();
            }

            self.buffer.reserve(READ_CHUNK);
            let read = tokio::time::timeout(self.timeout, self.reader.read_buf(&mut self.buffer))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no data received within {:?}", self.timeout),
                    )
                })??;

            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "teleinfo stream closed",
                ));
            }
        }
    }
}
