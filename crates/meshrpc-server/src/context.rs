use meshrpc_common::protocol::{Request, RequestId};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

tokio::task_local! {
    static CALL_CONTEXT: CallContext;
}

/// Per-call execution context, visible to provider code while the call runs.
///
/// The context is bound to the task executing the call and disappears when
/// that call's future completes, fails or is dropped.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: RequestId,
    pub interface_name: String,
    pub method_name: String,
    pub attachments: HashMap<String, String>,
    pub remote_addr: Option<SocketAddr>,
    pub started: Instant,
}

impl CallContext {
    pub fn new(request: &Request, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            request_id: request.request_id,
            interface_name: request.interface_name.clone(),
            method_name: request.method_name.clone(),
            attachments: request.attachments.clone(),
            remote_addr,
            started: Instant::now(),
        }
    }

    /// The context of the call running on this task, if any.
    pub fn current() -> Option<CallContext> {
        CALL_CONTEXT.try_with(Clone::clone).ok()
    }

    /// Runs `fut` with `self` as the current context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CALL_CONTEXT.scope(self, fut).await
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
