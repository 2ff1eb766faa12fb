//! MeshRPC Transport Layer
//!
//! Framing and TCP plumbing shared by client and server endpoints.
//!
//! # Architecture
//!
//! - **Serializer**: turns a `Request`/`Response` into payload bytes, chosen by
//!   the `serialization` URL parameter ([`JsonSerializer`] by default)
//! - **Frame codec**: `[2B magic][1B type][8B request id][4B length][payload]`,
//!   big-endian, with resumable decoding and a payload size cap
//! - **TCP**: one persistent duplex connection per client endpoint, split into
//!   a [`FrameReader`] and a shared [`FrameWriter`]
//!
//! # Components
//!
//! - **[`FrameCodec`]**: Encode/decode frames around a [`Serializer`]
//! - **[`FrameReader`]** / **[`FrameWriter`]**: Framed halves of a connection
//! - **[`TcpServer`]**: Accept loop used by server endpoints
//! - **[`ChannelState`]**: Endpoint lifecycle
//!
//! # Example
//!
//! ```no_run
//! use meshrpc_common::transport::{self, FrameCodec, Frame};
//! use meshrpc_common::protocol::Request;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn run() -> meshrpc_common::Result<()> {
//! let stream = transport::connect("127.0.0.1:20880", Duration::from_secs(1)).await?;
//! let (mut reader, writer) = transport::framed(stream, FrameCodec::json());
//!
//! writer.write_request(&Request::new("demo.Echo", "echo", vec![json!("hi")])).await?;
//! if let Ok(Some(Frame::Response(response))) = reader.next_frame().await {
//!     println!("{:?}", response.into_result());
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod serializer;
pub mod state;
pub mod tcp;
pub mod tcp_server;

pub use codec::{DecodeError, Frame, FrameCodec, MessageType, DEFAULT_MAX_CONTENT_LENGTH, HEADER_LENGTH, MAGIC};
pub use serializer::{JsonSerializer, Serializer};
pub use state::{AtomicChannelState, ChannelState};
pub use tcp::{connect, framed, map_io_error, FrameReader, FrameWriter};
pub use tcp_server::TcpServer;

#[cfg(test)]
mod tests;
