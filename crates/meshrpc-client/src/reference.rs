use async_trait::async_trait;
use meshrpc_common::protocol::error::{Result, RpcError};
use meshrpc_common::protocol::{Request, Response};
use meshrpc_common::transport::FrameCodec;
use meshrpc_common::Url;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::warn;

use crate::endpoint::{ClientConfig, ClientEndpoint};

/// Client-side handle to one remote endpoint behind one interface.
///
/// `call` returns `Ok` only for successful responses: a response carrying an
/// error is surfaced as that error, so HA strategies can classify it.
#[async_trait]
pub trait Reference: Send + Sync {
    fn interface_name(&self) -> &str;

    /// The reference's own URL (consumer-side parameters such as `retries`).
    fn url(&self) -> &Url;

    /// The provider URL this reference was built for.
    fn service_url(&self) -> &Url;

    fn is_available(&self) -> bool;

    /// Calls currently in flight through this reference.
    fn active_count(&self) -> usize;

    async fn init(&self) -> Result<()>;

    async fn call(&self, request: &Request) -> Result<Response>;

    async fn destroy(&self);
}

/// Decrements the in-flight counter however the call ends.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// [`Reference`] backed by a TCP [`ClientEndpoint`].
pub struct RpcReference {
    interface_name: String,
    url: Url,
    service_url: Url,
    endpoint: ClientEndpoint,
    active: AtomicUsize,
    destroyed: AtomicBool,
}

impl RpcReference {
    pub fn new(interface_name: impl Into<String>, url: Url, service_url: Url, codec: FrameCodec) -> Self {
        let endpoint = ClientEndpoint::new(service_url.clone(), ClientConfig::from_url(&url), codec);
        Self {
            interface_name: interface_name.into(),
            url,
            service_url,
            endpoint,
            active: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &ClientEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Reference for RpcReference {
    fn interface_name(&self) -> &str {
        &self.interface_name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn service_url(&self) -> &Url {
        &self.service_url
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire) && !self.endpoint.is_closed()
    }

    fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Connects eagerly. A failed connect is not fatal: the endpoint
    /// reconnects on the next call.
    async fn init(&self) -> Result<()> {
        if let Err(e) = self.endpoint.open().await {
            warn!(url = %self.service_url.get_uri(), "Reference init could not connect: {}", e);
            return Err(e);
        }
        Ok(())
    }

    async fn call(&self, request: &Request) -> Result<Response> {
        if !self.is_available() {
            return Err(RpcError::Framework(format!(
                "node is not available, url={}",
                self.url.get_uri()
            )));
        }

        let _active = ActiveGuard::enter(&self.active);
        let response = self.endpoint.request(request).await?;
        match response.error {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }

    async fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.endpoint.close().await;
        }
    }
}
