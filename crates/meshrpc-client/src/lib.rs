//! MeshRPC client side: call handles, the connection-owning client endpoint
//! and the [`Reference`] abstraction clusters are built from.

pub mod endpoint;
pub mod future;
pub mod reference;

pub use endpoint::{ClientConfig, ClientEndpoint};
pub use future::{FutureState, ResponseFuture};
pub use reference::{Reference, RpcReference};
