//! MeshRPC Server
//!
//! This crate provides the service side of MeshRPC: providers that bind
//! method handlers to an interface, the message router that dispatches by
//! service key, a bounded worker pool for business execution and the TCP
//! server endpoint that ties them together.
//!
//! # Example
//!
//! ```no_run
//! use meshrpc_common::transport::FrameCodec;
//! use meshrpc_common::Url;
//! use meshrpc_server::{MessageRouter, Provider, ServerEndpoint};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run() -> meshrpc_common::Result<()> {
//! let router = Arc::new(MessageRouter::new());
//! router.add_provider(Arc::new(
//!     Provider::builder("demo.Echo")
//!         .method("ping", |_| Ok(json!("pong")))
//!         .build(),
//! ))?;
//!
//! let url = Url::parse("meshrpc://127.0.0.1:20880/demo.Echo")?;
//! let server = ServerEndpoint::bind(url, router, FrameCodec::json()).await?;
//! println!("listening on {}", server.local_addr());
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod provider;
pub mod router;
pub mod server;
pub mod worker_pool;

pub use context::CallContext;
pub use provider::{MethodFuture, MethodHandler, Provider, ProviderBuilder};
pub use router::MessageRouter;
pub use server::ServerEndpoint;
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
