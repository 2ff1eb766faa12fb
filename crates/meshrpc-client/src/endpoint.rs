use arc_swap::ArcSwapOption;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use meshrpc_common::protocol::error::{ErrorKind, Result, RpcError};
use meshrpc_common::protocol::{InvocationMode, Request, RequestId, Response};
use meshrpc_common::transport::{self, AtomicChannelState, ChannelState, Frame, FrameCodec, FrameReader, FrameWriter};
use meshrpc_common::{Url, UrlParam};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::future::ResponseFuture;

type PendingCalls = DashMap<RequestId, Arc<ResponseFuture>>;

/// Client endpoint configuration.
///
/// # Default Configuration
///
/// - `request_timeout`: 500ms
/// - `connect_timeout`: 1000ms
/// - `sweep_interval`: 5s
///
/// The frame size cap belongs to the [`FrameCodec`] the endpoint is built with.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for each sync call, measured from send
    pub request_timeout: Duration,
    /// Upper bound for establishing the connection
    pub connect_timeout: Duration,
    /// Period of the timeout sweep over the pending-call table
    pub sweep_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_url(&Url::new("", "", 0, ""))
    }
}

impl ClientConfig {
    pub fn from_url(url: &Url) -> Self {
        let millis = |param: UrlParam| Duration::from_millis(url.int_param(param).max(0) as u64);
        Self {
            request_timeout: millis(UrlParam::Timeout),
            connect_timeout: millis(UrlParam::ConnectTimeout),
            sweep_interval: millis(UrlParam::SweepInterval).max(Duration::from_millis(1)),
        }
    }
}

struct Connection {
    id: u64,
    writer: FrameWriter,
    reader_task: JoinHandle<()>,
    active: Arc<AtomicBool>,
}

impl Connection {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// One persistent connection to one remote address, with call correlation.
///
/// Requests are written in submission order; responses are matched to their
/// pending call purely by request id, in whatever order they arrive. Every
/// pending entry is removed exactly once: by its response, by a send failure,
/// by the caller's deadline, by the timeout sweep, or by the connection going
/// away. A response that finds no entry is dropped.
pub struct ClientEndpoint {
    url: Url,
    config: ClientConfig,
    codec: FrameCodec,
    state: Arc<AtomicChannelState>,
    pending: Arc<PendingCalls>,
    connection: ArcSwapOption<Connection>,
    connect_lock: tokio::sync::Mutex<()>,
    next_connection_id: AtomicU64,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ClientEndpoint {
    /// Creates an endpoint for `url`. Nothing is connected until
    /// [`open`](Self::open) or the first call.
    pub fn new(url: Url, config: ClientConfig, codec: FrameCodec) -> Self {
        Self {
            url,
            config,
            codec,
            state: Arc::new(AtomicChannelState::new(ChannelState::New)),
            pending: Arc::new(DashMap::new()),
            connection: ArcSwapOption::empty(),
            connect_lock: tokio::sync::Mutex::new(()),
            next_connection_id: AtomicU64::new(0),
            sweeper: parking_lot::Mutex::new(None),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Connects eagerly.
    pub async fn open(&self) -> Result<()> {
        self.state.set(ChannelState::Init);
        self.channel().await.map(|_| ())
    }

    /// Returns the live connection, reconnecting if it has gone away.
    /// Concurrent callers share a single connect attempt.
    async fn channel(&self) -> Result<Arc<Connection>> {
        if let Some(conn) = self.active_connection() {
            return Ok(conn);
        }

        let _guard = self.connect_lock.lock().await;
        if let Some(conn) = self.active_connection() {
            return Ok(conn);
        }

        match self.connect().await {
            Ok(conn) => {
                self.connection.store(Some(conn.clone()));
                self.ensure_sweeper();
                self.state.set(ChannelState::Available);
                Ok(conn)
            }
            Err(e) => {
                self.state.set(ChannelState::Unavailable);
                Err(e)
            }
        }
    }

    fn active_connection(&self) -> Option<Arc<Connection>> {
        self.connection.load_full().filter(|conn| conn.is_active())
    }

    async fn connect(&self) -> Result<Arc<Connection>> {
        if self.state.is_closed() {
            return Err(RpcError::Transport(format!(
                "client endpoint for {} is closed",
                self.url.get_uri()
            )));
        }

        let addr = self.url.host_port_string();
        let stream = transport::connect(&addr, self.config.connect_timeout).await?;
        let (reader, writer) = transport::framed(stream, self.codec.clone());

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed) + 1;
        let active = Arc::new(AtomicBool::new(true));
        let reader_task = tokio::spawn(read_loop(
            reader,
            self.pending.clone(),
            self.state.clone(),
            id,
            active.clone(),
            addr.clone(),
        ));

        info!(addr = %addr, connection = id, "Client connected");
        Ok(Arc::new(Connection {
            id,
            writer,
            reader_task,
            active,
        }))
    }

    fn ensure_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let pending = self.pending.clone();
        let period = self.config.sweep_interval;
        let timeout_ms = self.config.request_timeout.as_millis() as u64;
        *sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                sweep(&pending, timeout_ms);
            }
        }));
    }

    /// Removes and fails every pending call whose deadline has passed.
    /// Returns how many entries were removed.
    pub fn sweep_timeouts(&self) -> usize {
        sweep(&self.pending, self.config.request_timeout.as_millis() as u64)
    }

    /// Registers a call handle, sends the request and returns the handle
    /// without waiting.
    pub async fn invoke_async(&self, request: &Request) -> Result<Arc<ResponseFuture>> {
        let conn = self.channel().await?;
        self.send_on(&conn, request).await
    }

    async fn send_on(&self, conn: &Connection, request: &Request) -> Result<Arc<ResponseFuture>> {
        let future = Arc::new(ResponseFuture::for_connection(
            request.request_id,
            self.config.request_timeout,
            conn.id,
        ));

        match self.pending.entry(request.request_id) {
            Entry::Occupied(_) => {
                return Err(RpcError::Framework(format!(
                    "request {} is already pending",
                    request.request_id
                )))
            }
            Entry::Vacant(slot) => {
                slot.insert(future.clone());
            }
        }

        // the reader may have exited, and swept this connection's calls,
        // before the entry went in
        if !conn.is_active() {
            self.pending.remove(&request.request_id);
            let e = RpcError::Transport(format!(
                "connection to {} lost before request {} was sent",
                self.url.host_port_string(),
                request.request_id
            ));
            future.fail(e.clone());
            return Err(e);
        }

        if let Err(e) = conn.writer.write_request(request).await {
            self.pending.remove(&request.request_id);
            if e.kind() == ErrorKind::Transport {
                conn.active.store(false, Ordering::Release);
            }
            future.fail(e.clone());
            return Err(e);
        }

        debug!(request_id = request.request_id, method = %request.method_name, "Request sent");
        Ok(future)
    }

    /// Sends the request and waits for its response or deadline.
    pub async fn invoke_sync(&self, request: &Request) -> Result<Response> {
        let future = self.invoke_async(request).await?;
        let result = future.wait().await;
        self.pending.remove(&request.request_id);
        result
    }

    /// Sends the request without registering a handle.
    pub async fn invoke_oneway(&self, request: &Request) -> Result<()> {
        let conn = self.channel().await?;
        if let Err(e) = conn.writer.write_request(request).await {
            if e.kind() == ErrorKind::Transport {
                conn.active.store(false, Ordering::Release);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Dispatches on the request's invocation mode. A oneway request yields an
    /// empty success once written.
    pub async fn request(&self, request: &Request) -> Result<Response> {
        match request.mode {
            InvocationMode::Sync | InvocationMode::Async => self.invoke_sync(request).await,
            InvocationMode::Oneway => {
                self.invoke_oneway(request).await?;
                Ok(Response::success(request.request_id, serde_json::Value::Null))
            }
        }
    }

    /// Stops the sweep, drops the connection and fails every pending call.
    pub async fn close(&self) {
        self.state.set(ChannelState::Closed);

        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }

        if let Some(conn) = self.connection.swap(None) {
            conn.active.store(false, Ordering::Release);
            conn.writer.shutdown().await;
        }

        let ids: Vec<RequestId> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, future)) = self.pending.remove(&id) {
                future.fail(RpcError::Transport(format!(
                    "client endpoint for {} closed",
                    self.url.get_uri()
                )));
            }
        }

        info!(url = %self.url.get_uri(), "Client endpoint closed");
    }
}

impl Drop for ClientEndpoint {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

fn sweep(pending: &PendingCalls, timeout_ms: u64) -> usize {
    let candidates: Vec<RequestId> = pending
        .iter()
        .filter(|entry| entry.value().is_timeout() || entry.value().is_done())
        .map(|entry| *entry.key())
        .collect();

    let mut removed = 0;
    for id in candidates {
        if let Some((_, future)) = pending.remove_if(&id, |_, f| f.is_timeout() || f.is_done()) {
            if future.fail(RpcError::Timeout(timeout_ms)) {
                warn!(request_id = id, "Request timed out, removed by sweep");
            }
            removed += 1;
        }
    }
    removed
}

async fn read_loop(
    mut reader: FrameReader,
    pending: Arc<PendingCalls>,
    state: Arc<AtomicChannelState>,
    connection_id: u64,
    active: Arc<AtomicBool>,
    addr: String,
) {
    let reason = loop {
        match reader.next_frame().await {
            Ok(Some(Frame::Response(response))) => match pending.remove(&response.request_id) {
                Some((_, future)) => {
                    future.complete(response);
                }
                None => {
                    debug!(request_id = response.request_id, "Dropping response with no pending call");
                }
            },
            Ok(Some(_)) => warn!(addr = %addr, "Ignoring request frame on client connection"),
            Ok(None) => break RpcError::Connection(format!("connection to {} closed by peer", addr)),
            Err(e) => {
                warn!(addr = %addr, "Client connection failed: {}", e);
                break e.error;
            }
        }
    };

    active.store(false, Ordering::Release);
    state.set(ChannelState::Unavailable);

    let ids: Vec<RequestId> = pending
        .iter()
        .filter(|entry| entry.value().connection_id() == connection_id)
        .map(|entry| *entry.key())
        .collect();
    for id in ids {
        if let Some((_, future)) = pending.remove(&id) {
            future.fail(reason.clone());
        }
    }
}
