//! Declarative configuration for services and references.
//!
//! Every struct deserializes from camelCase JSON with all fields optional,
//! and assembles the URLs the rest of the stack runs on.
//!
//! # Example
//!
//! ```
//! use meshrpc_cluster::config::ReferenceConfig;
//! use meshrpc_common::UrlParam;
//!
//! let config: ReferenceConfig = serde_json::from_str(
//!     r#"{"interface": "demo.Echo", "group": "blue", "retries": 2}"#,
//! ).unwrap();
//! let urls = config.to_urls();
//! assert_eq!(urls[0].path, "demo.Echo");
//! assert_eq!(urls[0].group(), "blue");
//! assert_eq!(urls[0].str_param(UrlParam::Side), "consumer");
//! ```

use meshrpc_common::protocol::{Result, RpcError};
use meshrpc_common::{Url, UrlParam};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_PROTOCOL: &str = "meshrpc";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 20880;
pub const DEFAULT_REGISTRY: &str = "local";

const REGISTRY_PATH: &str = "meshrpc.Registry";

fn timestamp() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Reads a JSON configuration file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RpcError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| RpcError::Config(format!("invalid config {}: {}", path.display(), e)))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationConfig {
    pub name: String,
}

/// One exposure of a service (or one way of reaching it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProtocolConfig {
    pub name: String,
    pub host: String,
    /// Port 0 binds an ephemeral port on export.
    pub port: u16,
    pub serialization: Option<String>,
    pub max_content_length: Option<u64>,
    pub min_worker_thread: Option<u32>,
    pub max_worker_thread: Option<u32>,
    pub worker_queue_size: Option<u32>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROTOCOL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            serialization: None,
            max_content_length: None,
            min_worker_thread: None,
            max_worker_thread: None,
            worker_queue_size: None,
        }
    }
}

impl ProtocolConfig {
    fn base_url(&self, interface_name: &str) -> Url {
        let serialization = self
            .serialization
            .as_deref()
            .unwrap_or(UrlParam::Serialization.default_value());
        let url = Url::new(&self.name, &self.host, self.port, interface_name)
            .with(UrlParam::Serialization, serialization);

        [
            (UrlParam::MaxContentLength, self.max_content_length),
            (UrlParam::MinWorkerThreads, self.min_worker_thread.map(u64::from)),
            (UrlParam::MaxWorkerThreads, self.max_worker_thread.map(u64::from)),
            (UrlParam::WorkerQueueSize, self.worker_queue_size.map(u64::from)),
        ]
        .into_iter()
        .filter_map(|(param, value)| value.map(|v| (param, v)))
        .fold(url, |url, (param, value)| url.with(param, value))
    }
}

/// A discovery backend. A blank address means an in-process `local` registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub protocol: String,
    /// `host:port`
    pub address: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            protocol: DEFAULT_REGISTRY.to_string(),
            address: None,
        }
    }
}

impl RegistryConfig {
    /// Direct registry pointing at one provider.
    pub fn direct(address: impl Into<String>) -> Self {
        Self {
            protocol: "direct".to_string(),
            address: Some(address.into()),
        }
    }

    pub fn to_url(&self, application: &ApplicationConfig) -> Result<Url> {
        let (protocol, host, port) = match self.address.as_deref().map(str::trim) {
            None | Some("") => (DEFAULT_REGISTRY, DEFAULT_HOST, 0),
            Some(address) => {
                let (host, port) = address.rsplit_once(':').ok_or_else(|| {
                    RpcError::InvalidUrl(format!("registry address must be host:port: {}", address))
                })?;
                let port = port
                    .parse::<u16>()
                    .map_err(|_| RpcError::InvalidUrl(format!("bad registry port: {}", address)))?;
                (self.protocol.as_str(), host, port)
            }
        };

        Ok(Url::new(protocol, host, port, REGISTRY_PATH)
            .with(UrlParam::Application, &application.name)
            .with(UrlParam::Timestamp, timestamp()))
    }
}

fn registry_urls(application: &ApplicationConfig, registries: &[RegistryConfig]) -> Result<Vec<Url>> {
    registries.iter().map(|r| r.to_url(application)).collect()
}

fn default_protocols() -> Vec<ProtocolConfig> {
    vec![ProtocolConfig::default()]
}

fn default_registries() -> Vec<RegistryConfig> {
    vec![RegistryConfig::default()]
}

fn default_check() -> bool {
    true
}

/// Consumer side of one interface: one cluster per protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReferenceConfig {
    pub interface: String,
    pub application: ApplicationConfig,
    #[serde(default = "default_protocols")]
    pub protocols: Vec<ProtocolConfig>,
    #[serde(default = "default_registries")]
    pub registries: Vec<RegistryConfig>,
    pub version: Option<String>,
    pub group: Option<String>,
    pub timeout: Option<u64>,
    pub connect_timeout: Option<u64>,
    pub retries: Option<u32>,
    pub load_balance: Option<String>,
    pub ha_strategy: Option<String>,
    #[serde(default = "default_check")]
    pub check: bool,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            application: ApplicationConfig::default(),
            protocols: default_protocols(),
            registries: default_registries(),
            version: None,
            group: None,
            timeout: None,
            connect_timeout: None,
            retries: None,
            load_balance: None,
            ha_strategy: None,
            check: true,
        }
    }
}

impl ReferenceConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Self::default()
        }
    }

    /// Reference URLs, one per protocol.
    pub fn to_urls(&self) -> Vec<Url> {
        let stamp = timestamp();
        self.protocols
            .iter()
            .map(|protocol| {
                let url = protocol
                    .base_url(&self.interface)
                    .with(UrlParam::Application, &self.application.name)
                    .with(UrlParam::Version, or_default(&self.version, UrlParam::Version))
                    .with(UrlParam::Group, or_default(&self.group, UrlParam::Group))
                    .with(UrlParam::Side, "consumer")
                    .with(UrlParam::Timeout, self.timeout.unwrap_or(default_int(UrlParam::Timeout)))
                    .with(UrlParam::Check, self.check)
                    .with(UrlParam::Timestamp, stamp);

                [
                    (UrlParam::ConnectTimeout, self.connect_timeout.map(|v| v.to_string())),
                    (UrlParam::Retries, self.retries.map(|v| v.to_string())),
                    (UrlParam::LoadBalance, self.load_balance.clone()),
                    (UrlParam::HaStrategy, self.ha_strategy.clone()),
                ]
                .into_iter()
                .filter_map(|(param, value)| value.map(|v| (param, v)))
                .fold(url, |url, (param, value)| url.with(param, value))
            })
            .collect()
    }

    pub fn registry_urls(&self) -> Result<Vec<Url>> {
        registry_urls(&self.application, &self.registries)
    }
}

/// Provider side of one interface: exported on every protocol, registered
/// with every registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub interface: String,
    pub application: ApplicationConfig,
    #[serde(default = "default_protocols")]
    pub protocols: Vec<ProtocolConfig>,
    #[serde(default = "default_registries")]
    pub registries: Vec<RegistryConfig>,
    pub version: Option<String>,
    pub group: Option<String>,
    pub timeout: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            application: ApplicationConfig::default(),
            protocols: default_protocols(),
            registries: default_registries(),
            version: None,
            group: None,
            timeout: None,
        }
    }
}

impl ServiceConfig {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Self::default()
        }
    }

    /// Export URLs, one per protocol.
    pub fn to_urls(&self) -> Vec<Url> {
        let stamp = timestamp();
        self.protocols
            .iter()
            .map(|protocol| {
                protocol
                    .base_url(&self.interface)
                    .with(UrlParam::Application, &self.application.name)
                    .with(UrlParam::Version, or_default(&self.version, UrlParam::Version))
                    .with(UrlParam::Group, or_default(&self.group, UrlParam::Group))
                    .with(UrlParam::Side, "provider")
                    .with(UrlParam::Timeout, self.timeout.unwrap_or(default_int(UrlParam::Timeout)))
                    .with(UrlParam::Timestamp, stamp)
            })
            .collect()
    }

    pub fn registry_urls(&self) -> Result<Vec<Url>> {
        registry_urls(&self.application, &self.registries)
    }
}

fn or_default(value: &Option<String>, param: UrlParam) -> &str {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or(param.default_value())
}

fn default_int(param: UrlParam) -> u64 {
    param.default_value().parse().unwrap_or_default()
}
