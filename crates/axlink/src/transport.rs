//! TCP transport to a KISS TNC, with framing folded in.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::kiss::{FrameExtractor, wrap_data};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_POLL_TIMEOUT: Duration = Duration::from_millis(200);
const READ_CHUNK: usize = 4096;

/// Dial `host:port`, failing after [`CONNECT_TIMEOUT`], and split the
/// resulting stream into independent read/write halves so the engine can
/// drive a read loop and accept writes from other tasks concurrently.
pub async fn connect(host: &str, port: u16) -> Result<(TransportReader, TransportWriter)> {
    let addr = format!("{host}:{port}");
    let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .map_err(|_| Error::Connect {
            host: host.to_string(),
            port,
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
        })?
        .map_err(|source| Error::Connect { host: host.to_string(), port, source })?;
    stream.set_nodelay(true).ok();
    debug!(%addr, "connected to KISS host");

    let (read_half, write_half) = stream.into_split();
    Ok((
        TransportReader {
            read_half,
            extractor: FrameExtractor::new(),
            read_buf: BytesMut::zeroed(READ_CHUNK),
        },
        TransportWriter { write_half },
    ))
}

/// Read side of a KISS transport: pulls raw bytes and extracts complete,
/// unescaped data frames.
pub struct TransportReader {
    read_half: OwnedReadHalf,
    extractor: FrameExtractor,
    read_buf: BytesMut,
}

impl TransportReader {
    /// Poll the socket for up to [`READ_POLL_TIMEOUT`], returning any
    /// complete KISS data frames extracted from what arrived. An empty
    /// result with `Ok` means the poll simply timed out with nothing new;
    /// callers loop on this to stay responsive to cancellation.
    pub async fn poll_frames(&mut self) -> Result<Vec<Vec<u8>>> {
        let read = timeout(READ_POLL_TIMEOUT, self.read_half.read(&mut self.read_buf)).await;
        let n = match read {
            Ok(Ok(0)) => return Err(Error::Lost("peer closed the connection".into())),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(Error::Lost(e.to_string())),
            Err(_) => return Ok(Vec::new()),
        };
        let frames = self.extractor.feed(&self.read_buf[..n]);
        if !frames.is_empty() {
            debug!(count = frames.len(), "extracted KISS frame(s)");
        }
        Ok(frames)
    }
}

/// Write side of a KISS transport. Cheap to hand to multiple callers behind
/// a lock; each `send_frame` call is a single `write_all` so frames never
/// interleave on the wire.
pub struct TransportWriter {
    write_half: OwnedWriteHalf,
}

impl TransportWriter {
    /// Send an already-built AX.25 frame, KISS-wrapping it for port 0.
    pub async fn send_frame(&mut self, raw: &[u8]) -> Result<()> {
        let framed = wrap_data(raw);
        self.write_half.write_all(&framed).await?;
        self.write_half.flush().await?;
        Ok(())
    }

    pub async fn close(&mut self) {
        let _ = self.write_half.shutdown().await;
    }
}
