use async_trait::async_trait;
use meshrpc_common::protocol::{Request, Response, Result};
use meshrpc_common::UrlParam;
use tracing::warn;

use crate::load_balance::LoadBalance;

/// Retry policy wrapped around reference selection.
#[async_trait]
pub trait HaStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn call(&self, request: &Request, load_balance: &dyn LoadBalance) -> Result<Response>;
}

/// Select once, call once, propagate any failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailFastStrategy;

#[async_trait]
impl HaStrategy for FailFastStrategy {
    fn name(&self) -> &'static str {
        "failfast"
    }

    async fn call(&self, request: &Request, load_balance: &dyn LoadBalance) -> Result<Response> {
        let reference = load_balance.select(request)?;
        reference.call(request).await
    }
}

/// Retries non-business failures on freshly selected references.
///
/// The retry budget is the `retries` parameter of the first selected
/// reference's URL, clamped at zero, for `retries + 1` attempts in total.
/// A business error ends the call at once.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailOverStrategy;

#[async_trait]
impl HaStrategy for FailOverStrategy {
    fn name(&self) -> &'static str {
        "failover"
    }

    async fn call(&self, request: &Request, load_balance: &dyn LoadBalance) -> Result<Response> {
        let mut reference = load_balance.select(request)?;
        let retries = reference.url().int_param(UrlParam::Retries).max(0) as usize;

        let mut attempt = 0;
        loop {
            let error = match reference.call(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_business() => return Err(e),
                Err(e) => e,
            };

            warn!(
                request_id = request.request_id,
                attempt = attempt + 1,
                url = %reference.url().get_uri(),
                "FailOver call failed: {}",
                error
            );
            if attempt >= retries {
                return Err(error);
            }

            attempt += 1;
            reference = load_balance.select(request)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrpc_common::protocol::RpcError;
    use crate::testing::{MockReference, ScriptedLoadBalance};
    use serde_json::json;
    use std::sync::Arc;

    fn request() -> Request {
        Request::new("demo.Echo", "echo", vec![])
    }

    fn failing_a(retries: i64) -> Arc<MockReference> {
        MockReference::with_retries("a", retries, Err(RpcError::Framework("a is broken".into())))
    }

    #[tokio::test]
    async fn test_failover_moves_to_next_reference() {
        let a = failing_a(1);
        let b = MockReference::ok("b");
        let lb = ScriptedLoadBalance::new(vec![a.clone(), b.clone()]);

        let response = FailOverStrategy.call(&request(), &lb).await.unwrap();
        assert_eq!(response.into_result(), Ok(json!("b")));
        assert_eq!(lb.selections(), 2);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_failfast_single_attempt() {
        let a = failing_a(1);
        let b = MockReference::ok("b");
        let lb = ScriptedLoadBalance::new(vec![a.clone(), b.clone()]);

        let err = FailFastStrategy.call(&request(), &lb).await.unwrap_err();
        assert_eq!(err, RpcError::Framework("a is broken".into()));
        assert_eq!(lb.selections(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_business_error_not_retried() {
        let a = MockReference::with_retries("a", 5, Err(RpcError::Business("insufficient funds".into())));
        let b = MockReference::ok("b");
        let lb = ScriptedLoadBalance::new(vec![a.clone(), b.clone()]);

        let err = FailOverStrategy.call(&request(), &lb).await.unwrap_err();
        assert_eq!(err, RpcError::Business("insufficient funds".into()));
        assert_eq!(lb.selections(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_retries_exhausted_propagates_last_error() {
        let a = MockReference::with_retries("a", 2, Err(RpcError::Timeout(500)));
        let lb = ScriptedLoadBalance::new(vec![a.clone()]);

        let err = FailOverStrategy.call(&request(), &lb).await.unwrap_err();
        assert_eq!(err, RpcError::Timeout(500));
        assert_eq!(a.calls(), 3);
    }

    #[tokio::test]
    async fn test_negative_retries_clamped() {
        let a = failing_a(-3);
        let b = MockReference::ok("b");
        let lb = ScriptedLoadBalance::new(vec![a.clone(), b.clone()]);

        assert!(FailOverStrategy.call(&request(), &lb).await.is_err());
        assert_eq!(lb.selections(), 1);
    }
}
