use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::url::{service_key, UrlParam};

pub type RequestId = u64;
pub type RpcArgs = Vec<serde_json::Value>;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// How the caller waits for the outcome of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationMode {
    /// Block until the response arrives or the deadline passes.
    #[default]
    Sync,
    /// Register the call and hand back its handle immediately.
    Async,
    /// Fire and forget: no handle, no response.
    Oneway,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub request_id: RequestId,
    pub interface_name: String,
    pub method_name: String,
    pub arguments: RpcArgs,
    #[serde(default)]
    pub parameter_types: Vec<String>,
    #[serde(default)]
    pub attachments: HashMap<String, String>,
    #[serde(default)]
    pub mode: InvocationMode,
}

impl Request {
    pub fn new(
        interface_name: impl Into<String>,
        method_name: impl Into<String>,
        arguments: RpcArgs,
    ) -> Self {
        Request {
            request_id: next_request_id(),
            interface_name: interface_name.into(),
            method_name: method_name.into(),
            arguments,
            parameter_types: Vec::new(),
            attachments: HashMap::new(),
            mode: InvocationMode::Sync,
        }
    }

    pub fn with_mode(mut self, mode: InvocationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_parameter_types(mut self, types: Vec<String>) -> Self {
        self.parameter_types = types;
        self
    }

    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attachment(key, value);
        self
    }

    pub fn set_attachment(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attachments.insert(key.into(), value.into());
    }

    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    /// Routing key derived from the `group`/`version` attachments, with the
    /// declared defaults when either is missing.
    pub fn service_key(&self) -> String {
        let group = self
            .attachment(UrlParam::Group.name())
            .unwrap_or(UrlParam::Group.default_value());
        let version = self
            .attachment(UrlParam::Version.name())
            .unwrap_or(UrlParam::Version.default_value());
        service_key(group, &self.interface_name, version)
    }

    pub fn is_oneway(&self) -> bool {
        self.mode == InvocationMode::Oneway
    }
}

/// Next id from the process-wide counter. Ids start at 1 and only grow.
pub fn next_request_id() -> RequestId {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}
