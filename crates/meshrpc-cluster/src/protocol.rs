use async_trait::async_trait;
use meshrpc_client::{Reference, RpcReference};
use meshrpc_common::protocol::{Result, RpcError};
use meshrpc_common::Url;
use meshrpc_server::{MessageRouter, Provider, ServerEndpoint};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use crate::extension::Extensions;

/// Builds references for consumers and exposes providers on servers.
#[async_trait]
pub trait Protocol: Send + Sync {
    fn name(&self) -> &'static str;

    /// A reference for `interface_name` with consumer URL `url`, talking to
    /// the provider at `service_url`. Not yet connected.
    fn refer(&self, interface_name: &str, url: &Url, service_url: &Url) -> Result<Arc<dyn Reference>>;

    /// Exposes `provider` at `url`.
    async fn export(&self, provider: &Provider, url: &Url) -> Result<Exporter>;

    /// Closes every server this protocol opened.
    async fn destroy(&self);
}

/// Handle for one exported provider.
pub struct Exporter {
    url: Url,
    router: Arc<MessageRouter>,
    exported: Arc<Mutex<HashSet<String>>>,
}

impl Exporter {
    /// The exposure URL, carrying the port actually bound.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Removes the provider from its server. The server keeps running for
    /// any other provider it hosts.
    pub fn unexport(&self) {
        self.router.remove_provider(&self.url.service_key());
        self.exported.lock().remove(&self.url.protocol_key());
        info!(url = %self.url.get_uri(), "Unexported");
    }
}

/// The TCP protocol: [`RpcReference`] on the consumer side, one shared
/// [`ServerEndpoint`] per `host:port` on the provider side.
pub struct RpcProtocol {
    extensions: Arc<Extensions>,
    servers: tokio::sync::Mutex<HashMap<String, Arc<ServerEndpoint>>>,
    exported: Arc<Mutex<HashSet<String>>>,
}

impl RpcProtocol {
    pub fn new(extensions: Arc<Extensions>) -> Self {
        Self {
            extensions,
            servers: tokio::sync::Mutex::new(HashMap::new()),
            exported: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    async fn server_for(&self, url: &Url) -> Result<Arc<ServerEndpoint>> {
        let key = format!("{}:{}", url.host, url.port);
        let mut servers = self.servers.lock().await;
        if let Some(server) = servers.get(&key) {
            return Ok(server.clone());
        }

        let codec = self.extensions.codec(url)?;
        let server = Arc::new(ServerEndpoint::bind(url.clone(), Arc::new(MessageRouter::new()), codec).await?);
        servers.insert(format!("{}:{}", url.host, server.local_addr().port()), server.clone());
        servers.insert(key, server.clone());
        Ok(server)
    }
}

#[async_trait]
impl Protocol for RpcProtocol {
    fn name(&self) -> &'static str {
        "meshrpc"
    }

    fn refer(&self, interface_name: &str, url: &Url, service_url: &Url) -> Result<Arc<dyn Reference>> {
        let codec = self.extensions.codec(url)?;
        let reference = RpcReference::new(interface_name, url.clone(), service_url.clone(), codec);
        info!(interface = interface_name, url = %service_url.get_uri(), "Referred");
        Ok(Arc::new(reference))
    }

    async fn export(&self, provider: &Provider, url: &Url) -> Result<Exporter> {
        let mut url = url.clone();
        url.path = provider.interface_name().to_string();
        let requested_key = url.protocol_key();
        if !self.exported.lock().insert(requested_key.clone()) {
            return Err(RpcError::Config(format!(
                "service already exist, url={}",
                url.get_uri()
            )));
        }

        let exported = async {
            let server = self.server_for(&url).await?;
            let mut bound = url.clone();
            bound.port = server.local_addr().port();

            let provider = Arc::new(provider.with_url(bound.clone()));
            server.router().add_provider(provider)?;
            Ok::<_, RpcError>((bound, server))
        }
        .await;

        match exported {
            Ok((bound, server)) => {
                // port 0 resolves to the bound port; track the resolved key
                let mut keys = self.exported.lock();
                keys.remove(&requested_key);
                keys.insert(bound.protocol_key());
                drop(keys);

                info!(url = %bound.get_uri(), "Exported");
                Ok(Exporter {
                    url: bound,
                    router: server.router().clone(),
                    exported: self.exported.clone(),
                })
            }
            Err(e) => {
                self.exported.lock().remove(&requested_key);
                Err(e)
            }
        }
    }

    async fn destroy(&self) {
        let servers: Vec<Arc<ServerEndpoint>> = self.servers.lock().await.drain().map(|(_, s)| s).collect();
        for server in servers {
            server.close();
        }
        self.exported.lock().clear();
    }
}
