use crate::constants::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::core_error::{FtpError, FtpResult};
use log::{debug, trace};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Moves bytes between a local source/sink and a data connection through one
/// fixed-size buffer. Binary only: bytes are never translated.
#[derive(Debug, Clone)]
pub struct TransferPump {
    buffer_size: usize,
    stall_timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl Default for TransferPump {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl TransferPump {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE),
            stall_timeout: None,
            cancel: None,
        }
    }

    /// Abort when a single read makes no progress for `timeout`.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Stop at the next chunk boundary once `token` is cancelled. The error
    /// still carries the bytes moved so far.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Streams `source` into the data connection, then closes its write half
    /// so the peer sees end-of-data.
    pub async fn send<R, W>(&self, source: &mut R, data: &mut W) -> FtpResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let bytes = self.copy(source, data).await?;
        if let Err(source) = data.shutdown().await {
            return Err(FtpError::TransferInterrupted { bytes, source });
        }
        debug!("Sent {} bytes, data connection write half closed", bytes);
        Ok(bytes)
    }

    /// Drains the data connection into `sink` until the peer closes it.
    pub async fn receive<R, W>(&self, data: &mut R, sink: &mut W) -> FtpResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let bytes = self.copy(data, sink).await?;
        debug!("Received {} bytes, peer closed data connection", bytes);
        Ok(bytes)
    }

    async fn copy<R, W>(&self, reader: &mut R, writer: &mut W) -> FtpResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut buffer = vec![0u8; self.buffer_size];
        let mut bytes: u64 = 0;

        loop {
            let step = self.step(reader, writer, &mut buffer);
            let moved = match &self.cancel {
                Some(token) => tokio::select! {
                    moved = step => moved,
                    _ = token.cancelled() => Err(io::Error::new(
                        io::ErrorKind::Interrupted,
                        "transfer aborted",
                    )),
                },
                None => step.await,
            };
            let n = match moved {
                Ok(0) => break,
                Ok(n) => n,
                Err(source) => return Err(FtpError::TransferInterrupted { bytes, source }),
            };
            bytes += n as u64;
            trace!("Pumped {} bytes ({} total)", n, bytes);
        }

        if let Err(source) = writer.flush().await {
            return Err(FtpError::TransferInterrupted { bytes, source });
        }
        Ok(bytes)
    }

    /// Reads one chunk and writes it out. Returns 0 at end of input.
    async fn step<R, W>(&self, reader: &mut R, writer: &mut W, buffer: &mut [u8]) -> io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let n = self.read_chunk(reader, buffer).await?;
        if n > 0 {
            writer.write_all(&buffer[..n]).await?;
        }
        Ok(n)
    }

    async fn read_chunk<R>(&self, reader: &mut R, buffer: &mut [u8]) -> io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        match self.stall_timeout {
            Some(timeout) => tokio::time::timeout(timeout, reader.read(buffer))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "transfer stalled"))?,
            None => reader.read(buffer).await,
        }
    }
}
