use meshrpc_common::protocol::{Result, RpcError};
use meshrpc_common::{Url, UrlParam};
use meshrpc_server::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cluster::DefaultCluster;
use crate::config::{ReferenceConfig, ServiceConfig};
use crate::extension::Extensions;
use crate::protocol::{Exporter, Protocol, RpcProtocol};
use crate::registry::Registry;
use crate::stub::ServiceStub;

/// Wires configuration to clusters, stubs and exporters.
///
/// One bootstrap per process: it owns the protocols, so every service
/// exported through it shares servers per address, and every reference
/// resolves its registries through the same [`Extensions`].
///
/// # Example
///
/// ```no_run
/// use meshrpc_cluster::{Bootstrap, Extensions};
/// use meshrpc_cluster::config::{ReferenceConfig, ServiceConfig};
/// use meshrpc_server::Provider;
/// use serde_json::json;
///
/// # async fn example() -> meshrpc_common::Result<()> {
/// let bootstrap = Bootstrap::new(Extensions::with_defaults());
///
/// let provider = Provider::builder("demo.Echo")
///     .method("echo", |args| Ok(args.into_iter().next().unwrap_or_default()))
///     .build();
/// let exported = bootstrap.export(&provider, &ServiceConfig::new("demo.Echo")).await?;
///
/// let stub = bootstrap.refer(&ReferenceConfig::new("demo.Echo")).await?;
/// assert_eq!(stub.call("echo", vec![json!("hi")]).await?, json!("hi"));
///
/// bootstrap.unexport(exported).await;
/// # Ok(())
/// # }
/// ```
pub struct Bootstrap {
    extensions: Arc<Extensions>,
    protocols: HashMap<String, Arc<dyn Protocol>>,
}

/// A provider exported on every configured protocol and registered with
/// every configured registry.
pub struct ServiceExport {
    exporters: Vec<Exporter>,
    registered: Vec<(Arc<dyn Registry>, Url)>,
}

impl ServiceExport {
    pub fn exporters(&self) -> &[Exporter] {
        &self.exporters
    }

    /// The bound exposure URLs.
    pub fn urls(&self) -> Vec<Url> {
        self.exporters.iter().map(|e| e.url().clone()).collect()
    }
}

impl Bootstrap {
    /// Bootstrap with the TCP protocol registered under `meshrpc`.
    pub fn new(extensions: Extensions) -> Self {
        let extensions = Arc::new(extensions);
        let rpc: Arc<dyn Protocol> = Arc::new(RpcProtocol::new(extensions.clone()));
        let mut protocols = HashMap::new();
        protocols.insert(rpc.name().to_string(), rpc);
        Self { extensions, protocols }
    }

    /// Adds (or replaces) a protocol under its own name.
    pub fn with_protocol(mut self, protocol: Arc<dyn Protocol>) -> Self {
        self.protocols.insert(protocol.name().to_string(), protocol);
        self
    }

    pub fn extensions(&self) -> &Arc<Extensions> {
        &self.extensions
    }

    pub fn protocol(&self, name: &str) -> Result<Arc<dyn Protocol>> {
        self.protocols
            .get(name)
            .cloned()
            .ok_or_else(|| RpcError::Config(format!("unknown protocol: {}", name)))
    }

    /// Builds and initializes the cluster for a reference URL.
    ///
    /// Load balance and HA strategy are resolved from the URL's
    /// `loadbalance`/`haStrategy` parameters.
    pub async fn build_cluster(
        &self,
        interface_name: &str,
        url: &Url,
        registry_urls: &[Url],
    ) -> Result<Arc<DefaultCluster>> {
        let registries = registry_urls
            .iter()
            .map(|r| self.extensions.registry(r))
            .collect::<Result<Vec<_>>>()?;
        let load_balance = self.extensions.load_balance(url.str_param(UrlParam::LoadBalance))?;
        let ha_strategy = self.extensions.ha_strategy(url.str_param(UrlParam::HaStrategy))?;
        let protocol = self.protocol(&url.protocol)?;

        let cluster = DefaultCluster::new(
            interface_name,
            url.clone(),
            registries,
            protocol,
            load_balance,
            ha_strategy,
        );
        cluster.init().await?;
        Ok(cluster)
    }

    /// One cluster per configured protocol, behind a single stub.
    pub async fn refer(&self, config: &ReferenceConfig) -> Result<ServiceStub> {
        let registry_urls = config.registry_urls()?;
        if registry_urls.is_empty() {
            return Err(RpcError::Config(format!(
                "Should set registry config for reference: {}",
                config.interface
            )));
        }

        let mut clusters = Vec::with_capacity(config.protocols.len());
        for url in config.to_urls() {
            match self.build_cluster(&config.interface, &url, &registry_urls).await {
                Ok(cluster) => clusters.push(cluster),
                Err(e) => {
                    for cluster in &clusters {
                        cluster.destroy().await;
                    }
                    return Err(e);
                }
            }
        }
        info!(interface = %config.interface, clusters = clusters.len(), "Referred");
        Ok(ServiceStub::new(&config.interface, clusters))
    }

    /// Exports `provider` on every protocol, then registers every bound URL
    /// with every registry. A failed registration undoes the whole export.
    pub async fn export(&self, provider: &Provider, config: &ServiceConfig) -> Result<ServiceExport> {
        if provider.interface_name() != config.interface {
            return Err(RpcError::Config(format!(
                "provider {} does not implement {}",
                provider.interface_name(),
                config.interface
            )));
        }

        let registries = config
            .registry_urls()?
            .iter()
            .map(|r| self.extensions.registry(r))
            .collect::<Result<Vec<_>>>()?;

        let mut export = ServiceExport {
            exporters: Vec::new(),
            registered: Vec::new(),
        };

        for url in config.to_urls() {
            let exporter = match self.export_one(provider, &url).await {
                Ok(exporter) => exporter,
                Err(e) => {
                    self.unexport(export).await;
                    return Err(e);
                }
            };
            let bound = exporter.url().clone();
            export.exporters.push(exporter);

            for registry in &registries {
                if let Err(e) = registry.register(&bound).await {
                    error!(registry = %registry.url().get_uri(), url = %bound.get_uri(), "Register failed: {}", e);
                    self.unexport(export).await;
                    return Err(RpcError::Framework(format!("register error! {}", e)));
                }
                export.registered.push((registry.clone(), bound.clone()));
            }
        }
        Ok(export)
    }

    async fn export_one(&self, provider: &Provider, url: &Url) -> Result<Exporter> {
        self.protocol(&url.protocol)?.export(provider, url).await
    }

    /// Unregisters first, logging failures, then unexports every exporter.
    pub async fn unexport(&self, export: ServiceExport) {
        for (registry, url) in &export.registered {
            if let Err(e) = registry.unregister(url).await {
                warn!(registry = %registry.url().get_uri(), url = %url.get_uri(), "Unregister failed: {}", e);
            }
        }
        for exporter in &export.exporters {
            exporter.unexport();
        }
    }

    /// Closes every server opened by every protocol.
    pub async fn shutdown(&self) {
        for protocol in self.protocols.values() {
            protocol.destroy().await;
        }
    }
}
