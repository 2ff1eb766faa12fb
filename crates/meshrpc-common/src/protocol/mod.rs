pub mod error;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use error::{ErrorKind, Result, RpcError};
pub use requests::{next_request_id, InvocationMode, Request, RequestId, RpcArgs};
pub use responses::{Response, RpcResult};
