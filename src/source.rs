//! Byte sources (C12): raw-bytes-in, no protocol knowledge.
//!
//! Grounded on `pytap/core/source.py::{TcpSource, SerialSource}`, re-expressed
//! as an async trait over `tokio`/`tokio-serial` rather than the blocking
//! socket calls the reference implementation makes — the connection pattern
//! (read with a bounded timeout, distinguish "nothing arrived" from "peer
//! closed") follows `egill-Avero/src/bin/gateway-analysis.rs`'s RS485 reader.

use crate::error::SourceError;
use log::warn;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;

/// A raw byte provider a [`crate::coordinator::HostCoordinator`] reads from.
///
/// Implementations have no protocol knowledge: they hand back whatever bytes
/// arrived, or an empty slice if none did before the read timed out.
#[async_trait::async_trait]
pub trait ByteSource: Send {
    /// Reads up to `buf.len()` bytes, returning the number read.
    ///
    /// Returns `Ok(0)` on a read timeout with nothing available — this is
    /// not end-of-stream. Returns [`SourceError::Closed`] if the peer closed
    /// the connection.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;

    /// Closes the underlying connection. Idempotent.
    async fn close(&mut self);

    /// Re-establishes the connection after [`SourceError::Closed`] or
    /// [`SourceError::Io`], using whatever address/path the source was
    /// constructed with.
    async fn reconnect(&mut self) -> Result<(), SourceError>;
}

const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP socket byte source.
pub struct TcpSource {
    stream: Option<TcpStream>,
    host: String,
    port: u16,
}

impl TcpSource {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpSource { stream: None, host: host.into(), port }
    }

    /// Opens the TCP connection and applies best-effort keepalive tuning.
    pub async fn connect(&mut self) -> Result<(), SourceError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        if let Err(e) = apply_keepalive(&stream) {
            warn!("tcp keepalive tuning unsupported on this platform: {e}");
        }
        self.stream = Some(stream);
        Ok(())
    }
}

#[cfg(unix)]
fn apply_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};
    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(10))
        .with_interval(Duration::from_secs(5))
        .with_retries(3);
    sock.set_tcp_keepalive(&keepalive)
}

#[cfg(not(unix))]
fn apply_keepalive(_stream: &TcpStream) -> std::io::Result<()> {
    Ok(())
}

#[async_trait::async_trait]
impl ByteSource for TcpSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SourceError::Closed);
        };
        match tokio::time::timeout(READ_TIMEOUT, stream.read(buf)).await {
            Ok(Ok(0)) => Err(SourceError::Closed),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(SourceError::Io(e)),
            Err(_elapsed) => Ok(0),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
    }

    async fn reconnect(&mut self) -> Result<(), SourceError> {
        self.connect().await
    }
}

/// Serial port byte source, 8N1 at a configurable baud rate.
pub struct SerialSource {
    port: Option<tokio_serial::SerialStream>,
    path: String,
    baud_rate: u32,
}

impl SerialSource {
    pub const DEFAULT_BAUD_RATE: u32 = 38_400;

    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        SerialSource { port: None, path: path.into(), baud_rate }
    }

    pub async fn connect(&mut self) -> Result<(), SourceError> {
        let port = tokio_serial::new(&self.path, self.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(Duration::from_secs(1))
            .open_native_async()
            .map_err(|e| SourceError::Io(std::io::Error::other(e)))?;
        self.port = Some(port);
        Ok(())
    }
}

#[async_trait::async_trait]
impl ByteSource for SerialSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        let Some(port) = self.port.as_mut() else {
            return Err(SourceError::Closed);
        };
        match tokio::time::timeout(Duration::from_secs(1), port.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Ok(Err(e)) => Err(SourceError::Io(e)),
            Err(_elapsed) => Ok(0),
        }
    }

    async fn close(&mut self) {
        self.port = None;
    }

    async fn reconnect(&mut self) -> Result<(), SourceError> {
        self.connect().await
    }
}
