use bytes::BytesMut;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Request, Response};
use crate::transport::codec::{DecodeError, Frame, FrameCodec};

const READ_BUFFER_CAPACITY: usize = 8 * 1024;

/// Opens a TCP connection to `addr`, trying every resolved address in turn.
///
/// # Arguments
///
/// * `addr` - `host:port` to connect to
/// * `timeout` - Upper bound for each connection attempt
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let socket_addrs = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| RpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        match tokio::time::timeout(timeout, TcpStream::connect(socket_addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true).map_err(|e| map_io_error(e, "set_nodelay"))?;
                return Ok(stream);
            }
            Ok(Err(e)) => last_err = Some(e.to_string()),
            Err(_) => last_err = Some(format!("timed out after {}ms", timeout.as_millis())),
        }
    }

    Err(RpcError::Connection(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err.unwrap_or_else(|| "no address resolved".to_string())
    )))
}

/// Maps I/O failures onto the engine's error kinds.
pub fn map_io_error(err: std::io::Error, context: &str) -> RpcError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            RpcError::Transport(format!("{}: timed out", context))
        }
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => {
            RpcError::Connection(format!("{}: connection lost", context))
        }
        _ => RpcError::Connection(format!("{}: {}", context, err)),
    }
}

/// Read side of a framed connection.
///
/// Bytes are accumulated across reads until the codec can cut a whole frame,
/// so frames split over several TCP segments are reassembled transparently.
pub struct FrameReader {
    read: OwnedReadHalf,
    buffer: BytesMut,
    codec: FrameCodec,
}

impl FrameReader {
    pub fn new(read: OwnedReadHalf, codec: FrameCodec) -> Self {
        Self {
            read,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            codec,
        }
    }

    /// Next frame from the peer, or `Ok(None)` when the peer closed cleanly
    /// between frames. Any error leaves the connection unusable.
    pub async fn next_frame(&mut self) -> std::result::Result<Option<Frame>, DecodeError> {
        loop {
            if let Some(frame) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(frame));
            }

            let read = self.read.read_buf(&mut self.buffer).await.map_err(|e| DecodeError {
                error: map_io_error(e, "read frame"),
                reply: None,
            })?;

            if read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(DecodeError {
                    error: RpcError::Connection(format!(
                        "connection closed with {} bytes of a partial frame",
                        self.buffer.len()
                    )),
                    reply: None,
                });
            }
        }
    }
}

/// Write side of a framed connection, shared by every task that answers or
/// sends on it. Each frame is written whole, in lock acquisition order.
pub struct FrameWriter {
    write: Mutex<OwnedWriteHalf>,
    codec: FrameCodec,
}

impl FrameWriter {
    pub fn new(write: OwnedWriteHalf, codec: FrameCodec) -> Self {
        Self {
            write: Mutex::new(write),
            codec,
        }
    }

    pub async fn write_request(&self, request: &Request) -> Result<()> {
        let mut buf = BytesMut::new();
        self.codec.encode_request(request, &mut buf)?;
        self.write_bytes(&buf).await
    }

    pub async fn write_response(&self, response: &Response) -> Result<()> {
        let mut buf = BytesMut::new();
        self.codec.encode_response(response, &mut buf)?;
        self.write_bytes(&buf).await
    }

    async fn write_bytes(&self, buf: &[u8]) -> Result<()> {
        let mut write = self.write.lock().await;
        write
            .write_all(buf)
            .await
            .map_err(|e| map_io_error(e, "write frame"))?;
        write.flush().await.map_err(|e| map_io_error(e, "flush frame"))
    }

    pub async fn shutdown(&self) {
        let mut write = self.write.lock().await;
        let _ = write.shutdown().await;
    }
}

/// Splits a connected stream into a frame reader and a shareable frame writer.
pub fn framed(stream: TcpStream, codec: FrameCodec) -> (FrameReader, FrameWriter) {
    let (read, write) = stream.into_split();
    (FrameReader::new(read, codec.clone()), FrameWriter::new(write, codec))
}
