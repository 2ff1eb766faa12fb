use meshrpc_common::protocol::{Result, RpcError};
use meshrpc_common::transport::{FrameCodec, JsonSerializer, Serializer};
use meshrpc_common::{Url, UrlParam};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ha::{FailFastStrategy, FailOverStrategy, HaStrategy};
use crate::load_balance::{LoadBalance, RandomLoadBalance, RoundRobinLoadBalance};
use crate::registry::{DirectRegistryFactory, LocalRegistryFactory, Registry, RegistryFactory};

type LoadBalanceCtor = Arc<dyn Fn() -> Arc<dyn LoadBalance> + Send + Sync>;
type HaStrategyCtor = Arc<dyn Fn() -> Arc<dyn HaStrategy> + Send + Sync>;

/// Named implementations of every pluggable capability.
///
/// Built once at startup and passed to whatever needs to resolve a name
/// from configuration. Load balances and HA strategies are constructed fresh
/// per lookup (each cluster owns its own); serializers and registry factories
/// are shared.
///
/// # Example
///
/// ```
/// use meshrpc_cluster::Extensions;
///
/// let extensions = Extensions::with_defaults();
/// assert_eq!(extensions.load_balance("random").unwrap().name(), "random");
/// assert!(extensions.ha_strategy("nope").is_err());
/// ```
#[derive(Clone, Default)]
pub struct Extensions {
    load_balances: HashMap<String, LoadBalanceCtor>,
    ha_strategies: HashMap<String, HaStrategyCtor>,
    serializers: HashMap<String, Arc<dyn Serializer>>,
    registry_factories: HashMap<String, Arc<dyn RegistryFactory>>,
}

impl Extensions {
    /// Registry with nothing in it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in implementations:
    /// `random`/`roundrobin`, `failfast`/`failover`, `json`, `local`/`direct`.
    pub fn with_defaults() -> Self {
        let mut extensions = Self::new();
        extensions.register_load_balance("random", || Arc::new(RandomLoadBalance::new()));
        extensions.register_load_balance("roundrobin", || Arc::new(RoundRobinLoadBalance::new()));
        extensions.register_ha_strategy("failfast", || Arc::new(FailFastStrategy));
        extensions.register_ha_strategy("failover", || Arc::new(FailOverStrategy));
        extensions.register_serializer(Arc::new(JsonSerializer));
        extensions.register_registry_factory("local", Arc::new(LocalRegistryFactory::new()));
        extensions.register_registry_factory("direct", Arc::new(DirectRegistryFactory));
        extensions
    }

    pub fn register_load_balance<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn LoadBalance> + Send + Sync + 'static,
    {
        self.load_balances.insert(name.into(), Arc::new(ctor));
    }

    pub fn register_ha_strategy<F>(&mut self, name: impl Into<String>, ctor: F)
    where
        F: Fn() -> Arc<dyn HaStrategy> + Send + Sync + 'static,
    {
        self.ha_strategies.insert(name.into(), Arc::new(ctor));
    }

    /// Registers `serializer` under its own name.
    pub fn register_serializer(&mut self, serializer: Arc<dyn Serializer>) {
        self.serializers.insert(serializer.name().to_string(), serializer);
    }

    pub fn register_registry_factory(&mut self, protocol: impl Into<String>, factory: Arc<dyn RegistryFactory>) {
        self.registry_factories.insert(protocol.into(), factory);
    }

    pub fn load_balance(&self, name: &str) -> Result<Arc<dyn LoadBalance>> {
        self.load_balances
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| RpcError::Config(format!("unknown load balance: {}", name)))
    }

    pub fn ha_strategy(&self, name: &str) -> Result<Arc<dyn HaStrategy>> {
        self.ha_strategies
            .get(name)
            .map(|ctor| ctor())
            .ok_or_else(|| RpcError::Config(format!("unknown ha strategy: {}", name)))
    }

    pub fn serializer(&self, name: &str) -> Result<Arc<dyn Serializer>> {
        self.serializers
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::Config(format!("unknown serialization: {}", name)))
    }

    pub fn registry_factory(&self, protocol: &str) -> Result<Arc<dyn RegistryFactory>> {
        self.registry_factories.get(protocol).cloned().ok_or_else(|| {
            RpcError::Config(format!(
                "could not find extension for registry protocol: {}",
                protocol
            ))
        })
    }

    /// The registry for `url`, resolved by the URL's protocol.
    pub fn registry(&self, url: &Url) -> Result<Arc<dyn Registry>> {
        self.registry_factory(&url.protocol)?.get_registry(url)
    }

    /// Frame codec for an endpoint URL: its `serialization` and
    /// `maxContentLength` parameters.
    pub fn codec(&self, url: &Url) -> Result<FrameCodec> {
        let serializer = self.serializer(url.str_param(UrlParam::Serialization))?;
        let max = url.int_param(UrlParam::MaxContentLength).max(0) as usize;
        Ok(FrameCodec::new(serializer, max))
    }
}
