//! Discovery backends.
//!
//! A [`Registry`] stores provider registrations and pushes the complete
//! current provider list to every subscribed [`NotifyListener`] whenever it
//! changes. Two in-process backends ship with the crate:
//!
//! - **local**: a shared in-memory table, one per registry URI
//! - **direct**: no storage at all; the registry URL's own address is the
//!   one and only provider

use async_trait::async_trait;
use meshrpc_common::protocol::Result;
use meshrpc_common::Url;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Receives the complete provider list of one registry.
#[async_trait]
pub trait NotifyListener: Send + Sync {
    async fn notify(&self, registry_url: &Url, urls: Vec<Url>);
}

#[async_trait]
pub trait Registry: Send + Sync {
    fn url(&self) -> &Url;

    async fn register(&self, url: &Url) -> Result<()>;

    async fn unregister(&self, url: &Url) -> Result<()>;

    async fn subscribe(&self, url: &Url, listener: Arc<dyn NotifyListener>) -> Result<()>;

    async fn unsubscribe(&self, url: &Url, listener: &Arc<dyn NotifyListener>) -> Result<()>;

    async fn discover(&self, url: &Url) -> Result<Vec<Url>>;
}

/// Creates (or reuses) the registry for a registry URL.
pub trait RegistryFactory: Send + Sync {
    fn get_registry(&self, url: &Url) -> Result<Arc<dyn Registry>>;
}

fn same_listener(a: &Arc<dyn NotifyListener>, b: &Arc<dyn NotifyListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// ============================================================================
// Local registry
// ============================================================================

#[derive(Default)]
struct LocalState {
    registered: HashMap<String, Vec<Url>>,
    subscribers: HashMap<String, Vec<Arc<dyn NotifyListener>>>,
}

/// In-memory registry keyed by service key (`group/interface/version`).
///
/// Publications are serialized: a listener sees the provider lists of one
/// service key in the order the changes were made, and the last list it
/// receives is the current one.
pub struct LocalRegistry {
    url: Url,
    state: Mutex<LocalState>,
    publish_lock: tokio::sync::Mutex<()>,
}

impl LocalRegistry {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            state: Mutex::new(LocalState::default()),
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn publish(&self, service_key: &str) {
        // snapshot and delivery under one guard, or a slow listener can
        // receive an older list after a newer one
        let _guard = self.publish_lock.lock().await;
        let (urls, listeners) = {
            let state = self.state.lock();
            (
                state.registered.get(service_key).cloned().unwrap_or_default(),
                state.subscribers.get(service_key).cloned().unwrap_or_default(),
            )
        };
        debug!(service_key, providers = urls.len(), listeners = listeners.len(), "Publishing provider list");
        for listener in listeners {
            listener.notify(&self.url, urls.clone()).await;
        }
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn register(&self, url: &Url) -> Result<()> {
        let key = url.service_key();
        {
            let mut state = self.state.lock();
            let urls = state.registered.entry(key.clone()).or_default();
            if urls.contains(url) {
                return Ok(());
            }
            urls.push(url.clone());
        }
        info!(registry = %self.url.get_uri(), url = %url.get_uri(), "Registered");
        self.publish(&key).await;
        Ok(())
    }

    async fn unregister(&self, url: &Url) -> Result<()> {
        let key = url.service_key();
        {
            let mut state = self.state.lock();
            let Some(urls) = state.registered.get_mut(&key) else {
                return Ok(());
            };
            let before = urls.len();
            urls.retain(|u| u != url);
            if urls.len() == before {
                return Ok(());
            }
        }
        info!(registry = %self.url.get_uri(), url = %url.get_uri(), "Unregistered");
        self.publish(&key).await;
        Ok(())
    }

    async fn subscribe(&self, url: &Url, listener: Arc<dyn NotifyListener>) -> Result<()> {
        let mut state = self.state.lock();
        let listeners = state.subscribers.entry(url.service_key()).or_default();
        if !listeners.iter().any(|l| same_listener(l, &listener)) {
            listeners.push(listener);
        }
        Ok(())
    }

    async fn unsubscribe(&self, url: &Url, listener: &Arc<dyn NotifyListener>) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(listeners) = state.subscribers.get_mut(&url.service_key()) {
            listeners.retain(|l| !same_listener(l, listener));
        }
        Ok(())
    }

    async fn discover(&self, url: &Url) -> Result<Vec<Url>> {
        let state = self.state.lock();
        Ok(state
            .registered
            .get(&url.service_key())
            .cloned()
            .unwrap_or_default())
    }
}

/// Hands out one [`LocalRegistry`] per registry URI.
#[derive(Default)]
pub struct LocalRegistryFactory {
    registries: Mutex<HashMap<String, Arc<LocalRegistry>>>,
}

impl LocalRegistryFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryFactory for LocalRegistryFactory {
    fn get_registry(&self, url: &Url) -> Result<Arc<dyn Registry>> {
        let mut registries = self.registries.lock();
        let registry = registries
            .entry(url.get_uri())
            .or_insert_with(|| Arc::new(LocalRegistry::new(url.clone())))
            .clone();
        Ok(registry)
    }
}

// ============================================================================
// Direct registry
// ============================================================================

/// Registry pointing every reference at the registry URL's own address.
pub struct DirectRegistry {
    url: Url,
}

impl DirectRegistry {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Registry for DirectRegistry {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn register(&self, _url: &Url) -> Result<()> {
        Ok(())
    }

    async fn unregister(&self, _url: &Url) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self, _url: &Url, _listener: Arc<dyn NotifyListener>) -> Result<()> {
        Ok(())
    }

    async fn unsubscribe(&self, _url: &Url, _listener: &Arc<dyn NotifyListener>) -> Result<()> {
        Ok(())
    }

    /// The reference URL re-targeted at the registry's host and port.
    async fn discover(&self, url: &Url) -> Result<Vec<Url>> {
        let mut provider = url.clone();
        provider.host = self.url.host.clone();
        provider.port = self.url.port;
        Ok(vec![provider])
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectRegistryFactory;

impl RegistryFactory for DirectRegistryFactory {
    fn get_registry(&self, url: &Url) -> Result<Arc<dyn Registry>> {
        Ok(Arc::new(DirectRegistry::new(url.clone())))
    }
}
