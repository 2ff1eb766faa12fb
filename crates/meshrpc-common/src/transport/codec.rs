//! Wire framing.
//!
//! Every message travels as
//!
//! ```text
//! [2B magic][1B type][8B request id][4B length][length bytes payload]
//! ```
//!
//! with all integers big-endian. The payload is produced by the endpoint's
//! [`Serializer`]; the frame type tells the decoder which shape to expect.

use bytes::{Buf, BufMut, BytesMut};
use std::sync::Arc;
use thiserror::Error;

use crate::protocol::error::{Result, RpcError};
use crate::protocol::{Request, RequestId, Response};
use crate::transport::serializer::{JsonSerializer, Serializer};

/// Marker opening every frame.
pub const MAGIC: u16 = 0x4d52;

/// Bytes before the payload: magic, type, request id, length.
pub const HEADER_LENGTH: usize = 2 + 1 + 8 + 4;

/// Default cap on payload size (16 MiB).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Response = 1,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MessageType::Request),
            1 => Some(MessageType::Response),
            _ => None,
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(Request),
    /// A response. When the payload could not be deserialized this carries
    /// the serialization error for the frame's request id instead.
    Response(Response),
    /// A request whose payload could not be deserialized. The connection stays
    /// usable; the enclosed error response should be written back to the peer.
    Rejected(Response),
}

/// A frame the decoder cannot get past. The connection must be closed once
/// `reply` (if any) has been written.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct DecodeError {
    pub error: RpcError,
    /// Error response for the peer, present when the rejected frame was a
    /// request whose id could be read.
    pub reply: Option<Response>,
}

/// Encodes and decodes frames around a pluggable serializer.
///
/// Decoding is resumable: when fewer bytes than a full frame are buffered,
/// [`decode`](FrameCodec::decode) returns `Ok(None)` and leaves the buffer
/// untouched so the next read can complete the frame.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use meshrpc_common::protocol::Request;
/// use meshrpc_common::transport::{Frame, FrameCodec};
/// use serde_json::json;
///
/// let codec = FrameCodec::json();
/// let request = Request::new("demo.Echo", "echo", vec![json!("hi")]);
///
/// let mut buf = BytesMut::new();
/// codec.encode_request(&request, &mut buf).unwrap();
///
/// let mut partial = buf.split_to(10);
/// assert!(codec.decode(&mut partial).unwrap().is_none());
///
/// partial.unsplit(buf);
/// assert_eq!(codec.decode(&mut partial).unwrap(), Some(Frame::Request(request)));
/// ```
#[derive(Clone)]
pub struct FrameCodec {
    serializer: Arc<dyn Serializer>,
    max_content_length: usize,
}

impl FrameCodec {
    pub fn new(serializer: Arc<dyn Serializer>, max_content_length: usize) -> Self {
        Self {
            serializer,
            max_content_length,
        }
    }

    /// JSON payloads with the default size cap.
    pub fn json() -> Self {
        Self::new(Arc::new(JsonSerializer), DEFAULT_MAX_CONTENT_LENGTH)
    }

    pub fn serializer_name(&self) -> &'static str {
        self.serializer.name()
    }

    pub fn max_content_length(&self) -> usize {
        self.max_content_length
    }

    pub fn encode_request(&self, request: &Request, dst: &mut BytesMut) -> Result<()> {
        let payload = self.serializer.serialize_request(request)?;
        self.encode_frame(MessageType::Request, request.request_id, &payload, dst)
    }

    pub fn encode_response(&self, response: &Response, dst: &mut BytesMut) -> Result<()> {
        let payload = self.serializer.serialize_response(response)?;
        self.encode_frame(MessageType::Response, response.request_id, &payload, dst)
    }

    fn encode_frame(
        &self,
        message_type: MessageType,
        request_id: RequestId,
        payload: &[u8],
        dst: &mut BytesMut,
    ) -> Result<()> {
        if payload.len() > self.max_content_length || payload.len() > u32::MAX as usize {
            return Err(RpcError::Framework(format!(
                "frame content length over limit, size: {} > {}",
                payload.len(),
                self.max_content_length
            )));
        }

        dst.reserve(HEADER_LENGTH + payload.len());
        dst.put_u16(MAGIC);
        dst.put_u8(message_type as u8);
        dst.put_u64(request_id);
        dst.put_u32(payload.len() as u32);
        dst.put_slice(payload);
        Ok(())
    }

    /// Decodes the next frame from `src`.
    ///
    /// * `Ok(None)` - not enough bytes yet; nothing was consumed
    /// * `Ok(Some(frame))` - one frame was consumed
    /// * `Err(_)` - the stream is unusable (bad magic, unknown type, oversized payload)
    pub fn decode(&self, src: &mut BytesMut) -> std::result::Result<Option<Frame>, DecodeError> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let mut header = &src[..HEADER_LENGTH];
        let magic = header.get_u16();
        if magic != MAGIC {
            return Err(DecodeError {
                error: RpcError::Framework(format!("frame header not supported, magic: {:#06x}", magic)),
                reply: None,
            });
        }

        let type_byte = header.get_u8();
        let request_id = header.get_u64();
        let length = header.get_u32() as usize;

        let message_type = MessageType::from_byte(type_byte).ok_or_else(|| DecodeError {
            error: RpcError::Framework(format!("unknown message type: {}", type_byte)),
            reply: None,
        })?;

        if length > self.max_content_length {
            let error = RpcError::Framework(format!(
                "frame content length over limit, size: {} > {}",
                length, self.max_content_length
            ));
            let reply = (message_type == MessageType::Request)
                .then(|| Response::error(request_id, error.clone()));
            return Err(DecodeError { error, reply });
        }

        if src.len() < HEADER_LENGTH + length {
            src.reserve(HEADER_LENGTH + length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LENGTH);
        let payload = src.split_to(length);

        let frame = match message_type {
            MessageType::Request => match self.serializer.deserialize_request(&payload) {
                Ok(mut request) => {
                    request.request_id = request_id;
                    Frame::Request(request)
                }
                Err(e) => Frame::Rejected(Response::error(request_id, e)),
            },
            MessageType::Response => match self.serializer.deserialize_response(&payload) {
                Ok(mut response) => {
                    response.request_id = request_id;
                    Frame::Response(response)
                }
                Err(e) => Frame::Response(Response::error(request_id, e)),
            },
        };

        Ok(Some(frame))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::json()
    }
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("serializer", &self.serializer.name())
            .field("max_content_length", &self.max_content_length)
            .finish()
    }
}
