//! MeshRPC Response Types
//!
//! This module defines the RPC response structure.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::{Result, RpcError};
use super::RequestId;

/// RPC method result (JSON value)
pub type RpcResult = serde_json::Value;

/// The outcome of one [`Request`](super::Request).
///
/// # Response Flow
///
/// 1. The server endpoint decodes a `Request` and hands it to a worker
/// 2. The message router invokes the provider and builds a `Response`
/// 3. The response is framed with the original request id and written back
/// 4. The client endpoint correlates it to the pending call by that id
///
/// Exactly one of `result` and `error` is set.
///
/// # Example
///
/// ```
/// use meshrpc_common::protocol::{Response, RpcError};
/// use serde_json::json;
///
/// let ok = Response::success(7, json!({"pi": 3.14159}));
/// assert!(ok.is_success());
///
/// let failed = Response::error(7, RpcError::Business("division by zero".into()));
/// assert_eq!(failed.into_result(), Err(RpcError::Business("division by zero".into())));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Request identifier this response corresponds to
    pub request_id: RequestId,
    /// Result value (present on success)
    pub result: Option<RpcResult>,
    /// Failure (present on error)
    pub error: Option<RpcError>,
    #[serde(default)]
    pub attachments: HashMap<String, String>,
    /// Time the provider side spent on the request, in milliseconds
    #[serde(default)]
    pub process_time_ms: u64,
}

impl Response {
    /// Creates a successful response.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The request identifier (must match the request's id)
    /// * `result` - The result value
    pub fn success(request_id: RequestId, result: RpcResult) -> Self {
        Response {
            request_id,
            result: Some(result),
            error: None,
            attachments: HashMap::new(),
            process_time_ms: 0,
        }
    }

    /// Creates an error response.
    ///
    /// # Arguments
    ///
    /// * `request_id` - The request identifier (must match the request's id)
    /// * `error` - What went wrong
    pub fn error(request_id: RequestId, error: RpcError) -> Self {
        Response {
            request_id,
            result: None,
            error: Some(error),
            attachments: HashMap::new(),
            process_time_ms: 0,
        }
    }

    pub fn with_process_time(mut self, process_time_ms: u64) -> Self {
        self.process_time_ms = process_time_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Unwraps into the result value or the carried error.
    pub fn into_result(self) -> Result<RpcResult> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(RpcResult::Null)),
        }
    }
}
