//! MeshRPC Common Types and Transport
//!
//! This crate provides the protocol definitions, endpoint addresses and the
//! framed TCP transport shared by every MeshRPC component.
//!
//! # Overview
//!
//! MeshRPC lets callers invoke remote services as if they were local: calls
//! are framed, routed to a dynamically discovered set of providers, balanced,
//! retried under a pluggable HA policy and correlated back by request id.
//! This crate contains the pieces both sides of a connection agree on:
//!
//! - **Addresses**: [`Url`] with typed, defaulted parameters
//! - **Protocol Layer**: [`Request`], [`Response`] and the [`RpcError`] sum type
//! - **Transport Layer**: serializers, the frame codec and TCP helpers
//!
//! # Wire Format
//!
//! - **Frame**: `[2B magic][1B type][8B request id][4B length][payload]`, big-endian
//! - **Serialization**: JSON by default, selected per endpoint by URL
//! - **Max Payload Size**: 16 MiB by default (`maxContentLength`)
//!
//! # Example
//!
//! ```
//! use meshrpc_common::{Request, Response, RpcError};
//! use serde_json::json;
//!
//! let request = Request::new("demo.Calculator", "add", vec![json!(1), json!(2)]);
//! let response = Response::success(request.request_id, json!(3));
//! assert_eq!(response.into_result(), Ok(json!(3)));
//!
//! let failed = Response::error(request.request_id, RpcError::Business("overflow".into()));
//! assert!(failed.into_result().unwrap_err().is_business());
//! ```

pub mod protocol;
pub mod transport;
pub mod url;

pub use protocol::*;
pub use url::{service_key, Url, UrlParam};
