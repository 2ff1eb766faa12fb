//! In-memory references, protocol and load balance for unit tests.

use async_trait::async_trait;
use meshrpc_client::Reference;
use meshrpc_common::protocol::{Request, Response, Result, RpcError};
use meshrpc_common::{Url, UrlParam};
use meshrpc_server::Provider;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balance::{LoadBalance, ReferenceSet};
use crate::protocol::{Exporter, Protocol};

pub(crate) struct MockReference {
    url: Url,
    service_url: Url,
    outcome: Result<Value>,
    calls: AtomicUsize,
    available: AtomicBool,
    destroyed: AtomicBool,
}

impl MockReference {
    pub(crate) fn new(url: Url, service_url: Url, outcome: Result<Value>) -> Arc<Self> {
        Arc::new(Self {
            url,
            service_url,
            outcome,
            calls: AtomicUsize::new(0),
            available: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
        })
    }

    pub(crate) fn ok(host: &str) -> Arc<Self> {
        let url = Url::new("meshrpc", host, 20880, "demo.Echo");
        Self::new(url.clone(), url, Ok(json!(host)))
    }

    pub(crate) fn with_retries(host: &str, retries: i64, outcome: Result<Value>) -> Arc<Self> {
        let url = Url::new("meshrpc", host, 20880, "demo.Echo").with(UrlParam::Retries, retries);
        Self::new(url.clone(), url, outcome)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reference for MockReference {
    fn interface_name(&self) -> &str {
        &self.url.path
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn service_url(&self) -> &Url {
        &self.service_url
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst) && !self.is_destroyed()
    }

    fn active_count(&self) -> usize {
        0
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn call(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .clone()
            .map(|value| Response::success(request.request_id, value))
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Hands out its references in order, cycling, and counts selections.
pub(crate) struct ScriptedLoadBalance {
    references: Vec<Arc<dyn Reference>>,
    selections: AtomicUsize,
}

impl ScriptedLoadBalance {
    pub(crate) fn new(references: Vec<Arc<MockReference>>) -> Self {
        Self {
            references: references.into_iter().map(|r| r as Arc<dyn Reference>).collect(),
            selections: AtomicUsize::new(0),
        }
    }

    pub(crate) fn selections(&self) -> usize {
        self.selections.load(Ordering::SeqCst)
    }
}

impl LoadBalance for ScriptedLoadBalance {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn on_refresh(&self, _references: Vec<Arc<dyn Reference>>) {}

    fn select(&self, _request: &Request) -> Result<Arc<dyn Reference>> {
        let n = self.selections.fetch_add(1, Ordering::SeqCst);
        if self.references.is_empty() {
            return Err(RpcError::ServiceUnavailable("empty".into()));
        }
        Ok(self.references[n % self.references.len()].clone())
    }

    fn references(&self) -> ReferenceSet {
        Arc::new(self.references.clone())
    }
}

/// Protocol whose references answer with their provider's host name.
#[derive(Default)]
pub(crate) struct MockProtocol {
    referred: Mutex<Vec<Arc<MockReference>>>,
}

impl MockProtocol {
    pub(crate) fn refer_count(&self) -> usize {
        self.referred.lock().len()
    }

    pub(crate) fn referred(&self) -> Vec<Arc<MockReference>> {
        self.referred.lock().clone()
    }
}

#[async_trait]
impl Protocol for MockProtocol {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn refer(&self, _interface_name: &str, url: &Url, service_url: &Url) -> Result<Arc<dyn Reference>> {
        let reference = MockReference::new(url.clone(), service_url.clone(), Ok(json!(service_url.host)));
        self.referred.lock().push(reference.clone());
        Ok(reference)
    }

    async fn export(&self, _provider: &Provider, url: &Url) -> Result<Exporter> {
        Err(RpcError::Config(format!("mock protocol cannot export {}", url.get_uri())))
    }

    async fn destroy(&self) {}
}
