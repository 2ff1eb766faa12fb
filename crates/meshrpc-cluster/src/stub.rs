use meshrpc_common::protocol::{InvocationMode, Request, Response, Result, RpcArgs, RpcError};
use meshrpc_common::UrlParam;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::cluster::DefaultCluster;

/// Client-side stand-in for a remote interface.
///
/// Each call becomes a [`Request`] routed through the first available
/// cluster (clusters are tried in configuration order), and the response is
/// unwrapped into the method's result or its error.
pub struct ServiceStub {
    interface_name: String,
    clusters: Vec<Arc<DefaultCluster>>,
}

impl ServiceStub {
    pub fn new(interface_name: impl Into<String>, clusters: Vec<Arc<DefaultCluster>>) -> Self {
        Self {
            interface_name: interface_name.into(),
            clusters,
        }
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn clusters(&self) -> &[Arc<DefaultCluster>] {
        &self.clusters
    }

    pub async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        let request = Request::new(&self.interface_name, method, args);
        self.invoke(request).await?.into_result()
    }

    /// Calls `method` and deserializes its result into `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, args: RpcArgs) -> Result<T> {
        let value = self.call(method, args).await?;
        serde_json::from_value(value).map_err(|e| {
            RpcError::Serialization(format!(
                "cannot decode result of {}.{}: {}",
                self.interface_name, method, e
            ))
        })
    }

    /// Sends without waiting for an answer. Only delivery failures surface.
    pub async fn call_oneway(&self, method: &str, args: RpcArgs) -> Result<()> {
        let request = Request::new(&self.interface_name, method, args).with_mode(InvocationMode::Oneway);
        self.invoke(request).await?.into_result().map(|_| ())
    }

    async fn invoke(&self, mut request: Request) -> Result<Response> {
        let cluster = self
            .clusters
            .iter()
            .find(|c| c.is_available())
            .or_else(|| self.clusters.first())
            .ok_or_else(|| {
                RpcError::ServiceUnavailable(format!("no cluster for {}", self.interface_name))
            })?;

        request.set_attachment(UrlParam::Version.name(), cluster.url().version());
        request.set_attachment(UrlParam::Group.name(), cluster.url().group());
        cluster.call(&request).await
    }

    /// Destroys every cluster.
    pub async fn destroy(&self) {
        for cluster in &self.clusters {
            cluster.destroy().await;
        }
    }
}
