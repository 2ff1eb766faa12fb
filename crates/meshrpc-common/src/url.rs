//! Endpoint addresses.
//!
//! Every exposure, reference and discovery backend is identified by a [`Url`]
//! of the form `protocol://host:port/path?k1=v1&k2=v2`. Tunables travel on the
//! parameter map and are read back through [`UrlParam`], which knows each
//! parameter's wire name and default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::protocol::error::{Result, RpcError};

/// Well-known URL parameters together with their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlParam {
    Application,
    Version,
    Group,
    Side,
    Timestamp,
    Check,
    Retries,
    Timeout,
    ConnectTimeout,
    LoadBalance,
    HaStrategy,
    Serialization,
    MaxContentLength,
    MinWorkerThreads,
    MaxWorkerThreads,
    WorkerQueueSize,
    SweepInterval,
}

impl UrlParam {
    /// Name of the parameter as it appears in the query string.
    pub fn name(&self) -> &'static str {
        match self {
            UrlParam::Application => "application",
            UrlParam::Version => "version",
            UrlParam::Group => "group",
            UrlParam::Side => "side",
            UrlParam::Timestamp => "timestamp",
            UrlParam::Check => "check",
            UrlParam::Retries => "retries",
            UrlParam::Timeout => "timeout",
            UrlParam::ConnectTimeout => "connectTimeout",
            UrlParam::LoadBalance => "loadbalance",
            UrlParam::HaStrategy => "haStrategy",
            UrlParam::Serialization => "serialization",
            UrlParam::MaxContentLength => "maxContentLength",
            UrlParam::MinWorkerThreads => "minWorkerThread",
            UrlParam::MaxWorkerThreads => "maxWorkerThread",
            UrlParam::WorkerQueueSize => "workerQueueSize",
            UrlParam::SweepInterval => "sweepInterval",
        }
    }

    /// Value used when the parameter is absent.
    pub fn default_value(&self) -> &'static str {
        match self {
            UrlParam::Application => "",
            UrlParam::Version => "1.0.0",
            UrlParam::Group => "default",
            UrlParam::Side => "",
            UrlParam::Timestamp => "0",
            UrlParam::Check => "true",
            UrlParam::Retries => "0",
            UrlParam::Timeout => "500",
            UrlParam::ConnectTimeout => "1000",
            UrlParam::LoadBalance => "random",
            UrlParam::HaStrategy => "failfast",
            UrlParam::Serialization => "json",
            UrlParam::MaxContentLength => "16777216",
            UrlParam::MinWorkerThreads => "20",
            UrlParam::MaxWorkerThreads => "200",
            UrlParam::WorkerQueueSize => "1024",
            UrlParam::SweepInterval => "5000",
        }
    }
}

/// An immutable endpoint address.
///
/// Two URLs are equal when protocol, host, port, path and the full parameter
/// map are equal; parameter order never matters.
///
/// # Example
///
/// ```
/// use meshrpc_common::{Url, UrlParam};
///
/// let url = Url::parse("meshrpc://127.0.0.1:20880/demo.Echo?group=blue&retries=2").unwrap();
/// assert_eq!(url.port, 20880);
/// assert_eq!(url.group(), "blue");
/// assert_eq!(url.int_param(UrlParam::Retries), 2);
/// assert_eq!(url.version(), "1.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

impl Url {
    pub fn new(
        protocol: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
    ) -> Self {
        Url {
            protocol: protocol.into(),
            host: host.into(),
            port,
            path: path.into(),
            parameters: HashMap::new(),
        }
    }

    /// Parses `protocol://host:port/path?k1=v1&k2`.
    ///
    /// A parameter without `=` maps to itself. Host, port and path are all
    /// optional; the protocol is required.
    pub fn parse(input: &str) -> Result<Url> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RpcError::InvalidUrl("url is empty".to_string()));
        }

        let (body, query) = match input.split_once('?') {
            Some((body, query)) => (body, Some(query)),
            None => (input, None),
        };

        let mut parameters = HashMap::new();
        if let Some(query) = query {
            for part in query.split('&').map(str::trim).filter(|p| !p.is_empty()) {
                match part.split_once('=') {
                    Some((key, value)) => parameters.insert(key.to_string(), value.to_string()),
                    None => parameters.insert(part.to_string(), part.to_string()),
                };
            }
        }

        let (protocol, rest) = match body.split_once("://") {
            Some(("", _)) => {
                return Err(RpcError::InvalidUrl(format!("url missing protocol: \"{}\"", input)))
            }
            Some((protocol, rest)) => (protocol, rest),
            None => return Err(RpcError::InvalidUrl(format!("url missing protocol: \"{}\"", input))),
        };

        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, path),
            None => (rest, ""),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() => {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| RpcError::InvalidUrl(format!("bad port in \"{}\": {}", input, e)))?;
                (host, port)
            }
            Some((host, _)) => (host, 0),
            None => (authority, 0),
        };

        Ok(Url {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            parameters,
        })
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.insert(name.into(), value.to_string());
        self
    }

    pub fn with(self, param: UrlParam, value: impl ToString) -> Self {
        self.with_param(param.name(), value)
    }

    pub fn remove_param(mut self, name: &str) -> Self {
        self.parameters.remove(name);
        self
    }

    /// Raw parameter lookup without defaults.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// String parameter, falling back to the declared default.
    pub fn str_param(&self, param: UrlParam) -> &str {
        match self.parameters.get(param.name()) {
            Some(value) if !value.is_empty() => value,
            _ => param.default_value(),
        }
    }

    /// Integer parameter; an unparsable value reads as the default.
    pub fn int_param(&self, param: UrlParam) -> i64 {
        self.str_param(param)
            .parse()
            .or_else(|_| param.default_value().parse())
            .unwrap_or(0)
    }

    pub fn bool_param(&self, param: UrlParam) -> bool {
        self.str_param(param).eq_ignore_ascii_case("true")
    }

    pub fn version(&self) -> &str {
        self.str_param(UrlParam::Version)
    }

    pub fn group(&self) -> &str {
        self.str_param(UrlParam::Group)
    }

    /// Whether a provider at `self` can serve a reference described by `reference`.
    ///
    /// Only path, protocol, version and serialization take part; every other
    /// parameter (timeouts, retries, ...) is irrelevant to compatibility.
    pub fn can_serve(&self, reference: &Url) -> bool {
        self.path == reference.path
            && self.protocol == reference.protocol
            && self.version() == reference.version()
            && self.str_param(UrlParam::Serialization) == reference.str_param(UrlParam::Serialization)
    }

    /// `protocol://host:port/path`
    pub fn get_uri(&self) -> String {
        format!("{}://{}:{}/{}", self.protocol, self.host, self.port, self.path)
    }

    /// [`get_uri`](Self::get_uri) followed by every parameter, sorted by name.
    pub fn get_uri_with_params(&self) -> String {
        let mut params: Vec<_> = self.parameters.iter().collect();
        params.sort();
        let query: Vec<String> = params.into_iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{}?{}", self.get_uri(), query.join("&"))
    }

    pub fn host_port_string(&self) -> String {
        if self.port == 0 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `group/path/version`
    pub fn service_key(&self) -> String {
        service_key(self.group(), &self.path, self.version())
    }

    /// `protocol://host:port/group/path/version`
    pub fn protocol_key(&self) -> String {
        format!(
            "{}://{}/{}/{}/{}",
            self.protocol,
            self.host_port_string(),
            self.group(),
            self.path,
            self.version()
        )
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?group={}", self.get_uri(), self.group())
    }
}

impl std::str::FromStr for Url {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        Url::parse(s)
    }
}

/// Service key shared by routers and stubs: `group/interface/version`.
pub fn service_key(group: &str, interface: &str, version: &str) -> String {
    format!("{}/{}/{}", group, interface, version)
}
