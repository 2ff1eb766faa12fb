//! MeshRPC
//!
//! Cluster-aware RPC over framed TCP. Consumers call an interface through a
//! [`ServiceStub`]; each call is balanced across the providers a registry
//! currently reports, retried under the configured HA strategy and correlated
//! back to its caller by request id. Providers expose named methods through a
//! [`Provider`] exported on a shared server endpoint.
//!
//! The member crates are re-exported whole:
//!
//! - [`common`]: URLs, requests, responses, errors and the frame codec
//! - [`client`]: call handles, the client endpoint and references
//! - [`server`]: providers, the message router, worker pool and server endpoint
//! - [`cluster`]: load balancing, HA, discovery, clusters and bootstrap
//!
//! # Example
//!
//! ```no_run
//! use meshrpc::{Bootstrap, Extensions, Provider, ReferenceConfig, ServiceConfig};
//! use serde_json::json;
//!
//! # async fn example() -> meshrpc::Result<()> {
//! let bootstrap = Bootstrap::new(Extensions::with_defaults());
//!
//! let calculator = Provider::builder("demo.Calculator")
//!     .method("add", |args| {
//!         let sum: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
//!         Ok(json!(sum))
//!     })
//!     .build();
//! bootstrap.export(&calculator, &ServiceConfig::new("demo.Calculator")).await?;
//!
//! let stub = bootstrap.refer(&ReferenceConfig::new("demo.Calculator")).await?;
//! let sum: i64 = stub.call_as("add", vec![json!(1), json!(2)]).await?;
//! assert_eq!(sum, 3);
//! # Ok(())
//! # }
//! ```

pub use meshrpc_client as client;
pub use meshrpc_cluster as cluster;
pub use meshrpc_common as common;
pub use meshrpc_server as server;

pub use meshrpc_cluster::{
    ApplicationConfig, Bootstrap, DefaultCluster, Extensions, ProtocolConfig, ReferenceConfig, RegistryConfig,
    ServiceConfig, ServiceExport, ServiceStub,
};
pub use meshrpc_common::{Request, Response, Result, RpcError, Url, UrlParam};
pub use meshrpc_server::{CallContext, Provider};
