use futures::future::BoxFuture;
use futures::FutureExt;
use meshrpc_common::protocol::{Request, Response, RpcArgs, RpcError};
use meshrpc_common::{Url, UrlParam};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Future returned by a method handler.
pub type MethodFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// A named method of an exposed interface.
pub type MethodHandler = Arc<dyn Fn(RpcArgs) -> MethodFuture + Send + Sync>;

/// Server-side binding of method handlers to one interface.
///
/// The provider's URL carries the `group` and `version` it is exposed under;
/// together with the interface name they form the service key the
/// [`MessageRouter`](crate::MessageRouter) dispatches on.
///
/// # Example
///
/// ```
/// use meshrpc_server::Provider;
/// use serde_json::{json, Value};
///
/// let provider = Provider::builder("demo.Calculator")
///     .method("add", |args| {
///         let a = args.first().and_then(Value::as_i64).unwrap_or(0);
///         let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
///         Ok(json!(a + b))
///     })
///     .build();
///
/// assert!(provider.has_method("add"));
/// assert_eq!(provider.service_key(), "default/demo.Calculator/1.0.0");
/// ```
pub struct Provider {
    interface_name: String,
    url: Url,
    methods: HashMap<String, MethodHandler>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("Provider")
            .field("interface_name", &self.interface_name)
            .field("url", &self.url.to_string())
            .field("methods", &methods)
            .finish()
    }
}

impl Provider {
    pub fn builder(interface_name: impl Into<String>) -> ProviderBuilder {
        let interface_name = interface_name.into();
        ProviderBuilder {
            url: Url::new("meshrpc", "", 0, interface_name.clone()),
            interface_name,
            methods: HashMap::new(),
        }
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns a copy of this provider exposed under `url`. The path is
    /// always the interface name.
    pub fn with_url(&self, url: Url) -> Provider {
        let mut url = url;
        url.path = self.interface_name.clone();
        Provider {
            interface_name: self.interface_name.clone(),
            url,
            methods: self.methods.clone(),
        }
    }

    pub fn service_key(&self) -> String {
        self.url.service_key()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the requested method and turns its outcome into a response.
    ///
    /// An unknown method is a framework error. A handler error or panic is a
    /// business error.
    pub async fn invoke(&self, request: &Request) -> Response {
        let Some(handler) = self.methods.get(&request.method_name) else {
            return Response::error(
                request.request_id,
                RpcError::Framework(format!(
                    "service method not exist: {}.{}",
                    self.interface_name, request.method_name
                )),
            );
        };

        let call = handler(request.arguments.clone());
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => Response::success(request.request_id, value),
            Ok(Err(e)) => Response::error(request.request_id, RpcError::Business(format!("{:#}", e))),
            Err(panic) => Response::error(
                request.request_id,
                RpcError::Business(format!(
                    "{}.{} panicked: {}",
                    self.interface_name,
                    request.method_name,
                    panic_message(panic.as_ref())
                )),
            ),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Builder for [`Provider`].
pub struct ProviderBuilder {
    interface_name: String,
    url: Url,
    methods: HashMap<String, MethodHandler>,
}

impl ProviderBuilder {
    /// Registers a synchronous method.
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RpcArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.methods.insert(
            name.into(),
            Arc::new(move |args| {
                let handler = handler.clone();
                async move { handler(args) }.boxed()
            }),
        );
        self
    }

    /// Registers an asynchronous method.
    pub fn async_method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RpcArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.methods
            .insert(name.into(), Arc::new(move |args| handler(args).boxed()));
        self
    }

    pub fn version(mut self, version: impl ToString) -> Self {
        self.url = self.url.with(UrlParam::Version, version);
        self
    }

    pub fn group(mut self, group: impl ToString) -> Self {
        self.url = self.url.with(UrlParam::Group, group);
        self
    }

    pub fn build(self) -> Provider {
        Provider {
            interface_name: self.interface_name,
            url: self.url,
            methods: self.methods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calculator() -> Provider {
        Provider::builder("demo.Calculator")
            .method("add", |args| {
                let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
                Ok(json!(sum))
            })
            .method("divide", |args| {
                let a = args.first().and_then(Value::as_i64).unwrap_or(0);
                let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
                if b == 0 {
                    anyhow::bail!("division by zero");
                }
                Ok(json!(a / b))
            })
            .method("explode", |_| panic!("boom"))
            .async_method("later", |args| async move {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok(json!(args.len()))
            })
            .build()
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let provider = calculator();
        let request = Request::new("demo.Calculator", "add", vec![json!(2), json!(3)]);
        let response = provider.invoke(&request).await;
        assert_eq!(response.request_id, request.request_id);
        assert_eq!(response.into_result(), Ok(json!(5)));
    }

    #[tokio::test]
    async fn test_async_method() {
        let provider = calculator();
        let request = Request::new("demo.Calculator", "later", vec![json!(1), json!(2)]);
        assert_eq!(provider.invoke(&request).await.into_result(), Ok(json!(2)));
    }

    #[tokio::test]
    async fn test_handler_error_is_business() {
        let provider = calculator();
        let request = Request::new("demo.Calculator", "divide", vec![json!(1), json!(0)]);
        let error = provider.invoke(&request).await.into_result().unwrap_err();
        assert_eq!(error, RpcError::Business("division by zero".into()));
    }

    #[tokio::test]
    async fn test_panic_is_business() {
        let provider = calculator();
        let request = Request::new("demo.Calculator", "explode", vec![]);
        let error = provider.invoke(&request).await.into_result().unwrap_err();
        assert!(error.is_business());
        assert!(error.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_unknown_method_is_framework() {
        let provider = calculator();
        let request = Request::new("demo.Calculator", "subtract", vec![]);
        let error = provider.invoke(&request).await.into_result().unwrap_err();
        assert!(matches!(error, RpcError::Framework(_)));
    }

    #[test]
    fn test_service_key_follows_url() {
        let provider = Provider::builder("demo.Calculator").version("2.0").group("blue").build();
        assert_eq!(provider.service_key(), "blue/demo.Calculator/2.0");

        let moved = provider.with_url(Url::new("meshrpc", "127.0.0.1", 20880, "ignored"));
        assert_eq!(moved.url().path, "demo.Calculator");
        assert_eq!(moved.service_key(), "default/demo.Calculator/1.0.0");
    }
}
