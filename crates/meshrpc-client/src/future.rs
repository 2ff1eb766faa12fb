use meshrpc_common::protocol::error::{Result, RpcError};
use meshrpc_common::protocol::{RequestId, Response};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Where a call handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureState {
    New,
    Done,
    Cancelled,
}

#[derive(Debug)]
enum Outcome {
    Pending,
    Done(Result<Response>),
    Cancelled,
}

/// Handle for one outstanding call.
///
/// A handle moves from `New` to `Done` (response or failure) or to
/// `Cancelled`, exactly once: the first writer wins, later writers are
/// ignored, and every waiter is released when the state becomes terminal.
///
/// # Example
///
/// ```
/// use meshrpc_client::ResponseFuture;
/// use meshrpc_common::{Response, RpcError};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let future = ResponseFuture::new(1, Duration::from_millis(500));
/// assert!(future.complete(Response::success(1, json!("first"))));
/// assert!(!future.fail(RpcError::Timeout(500)));
/// assert_eq!(future.result().unwrap().unwrap().into_result(), Ok(json!("first")));
/// ```
#[derive(Debug)]
pub struct ResponseFuture {
    request_id: RequestId,
    created: Instant,
    timeout: Duration,
    connection_id: u64,
    outcome: Mutex<Outcome>,
    notify: Notify,
}

impl ResponseFuture {
    pub fn new(request_id: RequestId, timeout: Duration) -> Self {
        Self::for_connection(request_id, timeout, 0)
    }

    pub(crate) fn for_connection(request_id: RequestId, timeout: Duration, connection_id: u64) -> Self {
        Self {
            request_id,
            created: Instant::now(),
            timeout,
            connection_id,
            outcome: Mutex::new(Outcome::Pending),
            notify: Notify::new(),
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn state(&self) -> FutureState {
        match &*self.outcome.lock() {
            Outcome::Pending => FutureState::New,
            Outcome::Done(_) => FutureState::Done,
            Outcome::Cancelled => FutureState::Cancelled,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state() != FutureState::New
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == FutureState::Cancelled
    }

    /// Timed out once the configured timeout has fully elapsed since creation.
    pub fn is_timeout(&self) -> bool {
        self.created.elapsed() >= self.timeout
    }

    /// Completes with the peer's response. Returns `false` if already terminal.
    pub fn complete(&self, response: Response) -> bool {
        self.finish(Outcome::Done(Ok(response)))
    }

    /// Completes with a failure. Returns `false` if already terminal.
    pub fn fail(&self, error: RpcError) -> bool {
        self.finish(Outcome::Done(Err(error)))
    }

    /// Cancels the call. Returns `false` if already terminal.
    pub fn cancel(&self) -> bool {
        self.finish(Outcome::Cancelled)
    }

    fn finish(&self, outcome: Outcome) -> bool {
        {
            let mut current = self.outcome.lock();
            if !matches!(*current, Outcome::Pending) {
                return false;
            }
            *current = outcome;
        }
        self.notify.notify_waiters();
        true
    }

    /// Terminal outcome, if reached.
    pub fn result(&self) -> Option<Result<Response>> {
        match &*self.outcome.lock() {
            Outcome::Pending => None,
            Outcome::Done(result) => Some(result.clone()),
            Outcome::Cancelled => Some(Err(RpcError::Framework(format!(
                "request {} cancelled",
                self.request_id
            )))),
        }
    }

    /// Waits until the handle is terminal or its deadline passes. On deadline
    /// the handle fails itself with a timeout, unless a response won the race.
    pub async fn wait(&self) -> Result<Response> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.result() {
                return result;
            }

            let remaining = self.timeout.saturating_sub(self.created.elapsed());
            if remaining.is_zero() || tokio::time::timeout(remaining, notified).await.is_err() {
                self.fail(RpcError::Timeout(self.timeout.as_millis() as u64));
            }
        }
    }
}
