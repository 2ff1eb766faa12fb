use arc_swap::ArcSwap;
use async_trait::async_trait;
use meshrpc_client::Reference;
use meshrpc_common::protocol::{Request, Response, Result, RpcError};
use meshrpc_common::{Url, UrlParam};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::ha::HaStrategy;
use crate::load_balance::{LoadBalance, ReferenceSet};
use crate::protocol::Protocol;
use crate::registry::{NotifyListener, Registry};

/// Consumer-side parameters a reference inherits from its cluster's URL.
const CONSUMER_PARAMS: [UrlParam; 4] = [
    UrlParam::Timeout,
    UrlParam::ConnectTimeout,
    UrlParam::Retries,
    UrlParam::SweepInterval,
];

/// References contributed by one registry, keyed by the registry URL.
type SourceReferences = Vec<(String, Vec<Arc<dyn Reference>>)>;

/// The live set of references for one interface, kept current by discovery.
///
/// Every registry notification replaces that registry's reference list; the
/// effective set is the union over all registries and is swapped in whole, so
/// the load balance always selects from a complete snapshot. A reference that
/// a registry still reports is reused as-is, never rebuilt.
///
/// # Lifecycle
///
/// 1. [`init`](Self::init): seed from each registry's snapshot, subscribe
/// 2. notifications rebuild the set
/// 3. [`destroy`](Self::destroy): unsubscribe and destroy every reference
pub struct DefaultCluster {
    interface_name: String,
    url: Url,
    registries: Vec<Arc<dyn Registry>>,
    protocol: Arc<dyn Protocol>,
    load_balance: Arc<dyn LoadBalance>,
    ha_strategy: Arc<dyn HaStrategy>,
    sources: tokio::sync::Mutex<SourceReferences>,
    references: ArcSwap<Vec<Arc<dyn Reference>>>,
    available: AtomicBool,
    /// Set under `sources` by destroy; later notifications are dropped.
    destroyed: AtomicBool,
}

impl DefaultCluster {
    pub fn new(
        interface_name: impl Into<String>,
        url: Url,
        registries: Vec<Arc<dyn Registry>>,
        protocol: Arc<dyn Protocol>,
        load_balance: Arc<dyn LoadBalance>,
        ha_strategy: Arc<dyn HaStrategy>,
    ) -> Arc<Self> {
        Arc::new(Self {
            interface_name: interface_name.into(),
            url,
            registries,
            protocol,
            load_balance,
            ha_strategy,
            sources: tokio::sync::Mutex::new(Vec::new()),
            references: ArcSwap::from_pointee(Vec::new()),
            available: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Current effective reference set.
    pub fn references(&self) -> ReferenceSet {
        self.references.load_full()
    }

    pub fn load_balance(&self) -> &Arc<dyn LoadBalance> {
        &self.load_balance
    }

    pub fn ha_strategy(&self) -> &Arc<dyn HaStrategy> {
        &self.ha_strategy
    }

    /// Seeds the set from every registry and subscribes for changes.
    ///
    /// With `check=true`, an empty set after seeding or a failed subscription
    /// fails initialization. Otherwise the cluster starts empty and calls fail
    /// until discovery catches up.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        let check = self.url.bool_param(UrlParam::Check);

        for registry in &self.registries {
            match registry.discover(&self.url).await {
                Ok(urls) => self.notify(registry.url(), urls).await,
                Err(e) => error!(
                    url = %self.url,
                    registry = %registry.url().get_uri(),
                    "Cluster init discover failed: {}",
                    e
                ),
            }

            let listener: Arc<dyn NotifyListener> = self.clone();
            if let Err(e) = registry.subscribe(&self.url, listener).await {
                if check {
                    return Err(e);
                }
                warn!(registry = %registry.url().get_uri(), "Cluster subscribe failed: {}", e);
            }
        }

        let count = self.references.load().len();
        info!(url = %self.url, references = count, "Cluster init over");
        if count == 0 {
            let registries: Vec<String> = self.registries.iter().map(|r| r.url().get_uri()).collect();
            let message = format!(
                "Cluster No service urls for the reference:{}, registries:{:?}",
                self.url, registries
            );
            warn!("{}", message);
            if check {
                return Err(RpcError::Framework(message));
            }
        }

        self.available.store(true, Ordering::Release);
        Ok(())
    }

    /// Unsubscribes, unregisters the cluster's URL and destroys every reference.
    pub async fn destroy(self: &Arc<Self>) {
        self.available.store(false, Ordering::Release);

        let listener: Arc<dyn NotifyListener> = self.clone();
        for registry in &self.registries {
            if let Err(e) = registry.unsubscribe(&self.url, &listener).await {
                warn!(registry = %registry.url().get_uri(), "Unsubscribe failed: {}", e);
            }
            if let Err(e) = registry.unregister(&self.url).await {
                warn!(registry = %registry.url().get_uri(), "Unregister failed: {}", e);
            }
        }

        let owned: Vec<Arc<dyn Reference>> = {
            let mut sources = self.sources.lock().await;
            self.destroyed.store(true, Ordering::Release);
            let owned: Vec<Arc<dyn Reference>> = sources.drain(..).flat_map(|(_, refs)| refs).collect();
            self.references.store(Arc::new(Vec::new()));
            self.load_balance.on_refresh(Vec::new());
            owned
        };
        for reference in owned {
            reference.destroy().await;
        }
        info!(url = %self.url, "Cluster destroyed");
    }

    /// Calls through the HA strategy.
    ///
    /// Business errors come back as `Err`, unchanged. Any other failure,
    /// including an unavailable cluster, comes back as an error response for
    /// the request's id.
    pub async fn call(&self, request: &Request) -> Result<Response> {
        if !self.is_available() {
            return Ok(Response::error(
                request.request_id,
                RpcError::ServiceUnavailable("service not available".into()),
            ));
        }

        match self.ha_strategy.call(request, self.load_balance.as_ref()).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_business() => Err(e),
            Err(e) => Ok(Response::error(request.request_id, e)),
        }
    }

    /// Provider URL with this cluster's explicit consumer parameters laid over.
    fn reference_url(&self, service_url: &Url) -> Url {
        CONSUMER_PARAMS
            .iter()
            .filter_map(|p| self.url.param(p.name()).map(|v| (p.name(), v)))
            .fold(service_url.clone(), |url, (name, value)| url.with_param(name, value))
    }

    fn refresh(&self, sources: &SourceReferences) {
        let union: Vec<Arc<dyn Reference>> = sources
            .iter()
            .flat_map(|(_, refs)| refs.iter().cloned())
            .collect();
        self.load_balance.on_refresh(union.clone());
        self.references.store(Arc::new(union));
    }
}

fn same_reference(a: &Arc<dyn Reference>, b: &Arc<dyn Reference>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[async_trait]
impl NotifyListener for DefaultCluster {
    async fn notify(&self, registry_url: &Url, urls: Vec<Url>) {
        if urls.is_empty() {
            warn!(
                registry = %registry_url.get_uri(),
                service = %self.url,
                "Cluster config change notify, urls is empty"
            );
            return;
        }
        info!(
            registry = %registry_url.get_uri(),
            service = %self.url,
            urls = urls.len(),
            "Cluster config change notify"
        );

        let key = registry_url.get_uri_with_params();
        let mut sources = self.sources.lock().await;
        if self.destroyed.load(Ordering::Acquire) {
            info!(service = %self.url, "Cluster destroyed, dropping notification");
            return;
        }
        let previous: Vec<Arc<dyn Reference>> = sources
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, refs)| refs.clone())
            .unwrap_or_default();

        let mut fresh: Vec<Arc<dyn Reference>> = Vec::new();
        for url in urls.iter().filter(|u| u.can_serve(&self.url)) {
            let targets = |r: &&Arc<dyn Reference>| r.url() == url || r.service_url() == url;
            if fresh.iter().any(|r| targets(&r)) {
                continue;
            }
            if let Some(existing) = previous.iter().find(targets) {
                fresh.push(existing.clone());
                continue;
            }

            match self.protocol.refer(&self.interface_name, &self.reference_url(url), url) {
                Ok(reference) => {
                    if let Err(e) = reference.init().await {
                        warn!(url = %url.get_uri(), "Reference init failed, will reconnect on call: {}", e);
                    }
                    fresh.push(reference);
                }
                Err(e) => warn!(url = %url.get_uri(), "Refer failed: {}", e),
            }
        }

        let removed: Vec<Arc<dyn Reference>> = previous
            .into_iter()
            .filter(|old| !fresh.iter().any(|r| same_reference(r, old)))
            .collect();

        match sources.iter_mut().find(|(k, _)| *k == key) {
            Some((_, refs)) => *refs = fresh,
            None => sources.push((key, fresh)),
        }
        self.refresh(&sources);
        drop(sources);

        for reference in removed {
            info!(url = %reference.service_url().get_uri(), "Reference removed by discovery");
            reference.destroy().await;
        }
    }
}
