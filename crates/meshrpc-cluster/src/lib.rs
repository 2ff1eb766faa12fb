//! MeshRPC Cluster
//!
//! Client-side view of a service: a [`DefaultCluster`] keeps the live set of
//! references for one interface current with its registries, selects one per
//! call through a [`LoadBalance`] and recovers from failures through an
//! [`HaStrategy`]. The [`Bootstrap`] ties configuration to clusters on the
//! consumer side and to exported servers on the provider side.

pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod extension;
pub mod ha;
pub mod load_balance;
pub mod protocol;
pub mod registry;
pub mod stub;

#[cfg(test)]
mod testing;

pub use bootstrap::{Bootstrap, ServiceExport};
pub use cluster::DefaultCluster;
pub use config::{ApplicationConfig, ProtocolConfig, ReferenceConfig, RegistryConfig, ServiceConfig};
pub use extension::Extensions;
pub use ha::{FailFastStrategy, FailOverStrategy, HaStrategy};
pub use load_balance::{LoadBalance, RandomLoadBalance, ReferenceSet, RoundRobinLoadBalance};
pub use protocol::{Exporter, Protocol, RpcProtocol};
pub use registry::{
    DirectRegistry, DirectRegistryFactory, LocalRegistry, LocalRegistryFactory, NotifyListener, Registry,
    RegistryFactory,
};
pub use stub::ServiceStub;
