use meshrpc_common::protocol::{Request, Response, Result, RpcError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::provider::Provider;

/// Service-side dispatch from service key to [`Provider`].
///
/// Registration and removal are serialized by one lock per router. Dispatch
/// takes the lock only long enough to clone the provider handle.
#[derive(Debug, Default)]
pub struct MessageRouter {
    providers: Mutex<HashMap<String, Arc<Provider>>>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under its service key. A second provider for the
    /// same key is a configuration error.
    pub fn add_provider(&self, provider: Arc<Provider>) -> Result<()> {
        let key = provider.service_key();
        let mut providers = self.providers.lock();
        if providers.contains_key(&key) {
            return Err(RpcError::Config(format!(
                "provider already exists serviceKey={}",
                key
            )));
        }
        info!(service_key = %key, "Provider registered");
        providers.insert(key, provider);
        Ok(())
    }

    /// Removes the provider registered under `service_key`, if any.
    pub fn remove_provider(&self, service_key: &str) -> Option<Arc<Provider>> {
        let removed = self.providers.lock().remove(service_key);
        if removed.is_some() {
            info!(service_key = %service_key, "Provider removed");
        }
        removed
    }

    pub fn provider(&self, service_key: &str) -> Option<Arc<Provider>> {
        self.providers.lock().get(service_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.providers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatches one request. Always yields a response: a missing provider
    /// becomes a framework error response.
    pub async fn handle(&self, request: &Request) -> Response {
        let key = request.service_key();
        let Some(provider) = self.provider(&key) else {
            debug!(service_key = %key, "No provider for request");
            return Response::error(
                request.request_id,
                RpcError::Framework(format!("provider not exist serviceKey={}", key)),
            );
        };
        provider.invoke(request).await
    }
}
