use meshrpc_common::protocol::{ErrorKind, Request, Response, Result};
use meshrpc_common::transport::{framed, AtomicChannelState, ChannelState, Frame, FrameCodec, FrameWriter, TcpServer};
use meshrpc_common::Url;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::router::MessageRouter;
use crate::worker_pool::{WorkerPool, WorkerPoolConfig};

/// Listening endpoint that feeds decoded requests to a [`MessageRouter`].
///
/// Each connection is read by its own task. Requests are executed on a
/// bounded [`WorkerPool`], never on the reading task; when the pool refuses a
/// job the caller immediately gets an overload response for its request id.
/// Oneway requests are executed but never answered.
pub struct ServerEndpoint {
    url: Url,
    local_addr: SocketAddr,
    router: Arc<MessageRouter>,
    pool: Arc<WorkerPool>,
    state: AtomicChannelState,
    shutdown: watch::Sender<bool>,
    accept_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ServerEndpoint {
    /// Binds `url`'s host and port (port 0 picks a free port) and starts
    /// accepting connections.
    ///
    /// # Arguments
    /// * `url` - Exposure address; worker pool sizing is read from its parameters
    /// * `router` - Dispatch table shared with the exporting protocol
    /// * `codec` - Frame codec for every accepted connection
    pub async fn bind(url: Url, router: Arc<MessageRouter>, codec: FrameCodec) -> Result<Self> {
        let bind_addr = format!("{}:{}", url.host, url.port);
        let server = TcpServer::new(&bind_addr).await?;
        let local_addr = server.local_addr()?;

        let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::from_url(&url)));
        let (shutdown, _) = watch::channel(false);

        let handler = {
            let router = router.clone();
            let pool = pool.clone();
            let shutdown = shutdown.clone();
            move |stream: TcpStream, peer: SocketAddr| {
                serve_connection(
                    stream,
                    peer,
                    codec.clone(),
                    router.clone(),
                    pool.clone(),
                    shutdown.subscribe(),
                )
            }
        };

        let accept_task = tokio::spawn(async move {
            if let Err(e) = server.run_with_handler(handler).await {
                warn!("Accept loop stopped: {}", e);
            }
        });

        info!(addr = %local_addr, "Server endpoint listening");
        Ok(Self {
            url,
            local_addr,
            router,
            pool,
            state: AtomicChannelState::new(ChannelState::Available),
            shutdown,
            accept_task: parking_lot::Mutex::new(Some(accept_task)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn state(&self) -> ChannelState {
        self.state.get()
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Stops accepting, closes every open connection and shuts the pool.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.state.set(ChannelState::Closed);
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
        let _ = self.shutdown.send(true);
        self.pool.shutdown();
        info!(addr = %self.local_addr, "Server endpoint closed");
    }
}

impl Drop for ServerEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    codec: FrameCodec,
    router: Arc<MessageRouter>,
    pool: Arc<WorkerPool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, writer) = framed(stream, codec);
    let writer = Arc::new(writer);

    loop {
        let frame = tokio::select! {
            frame = reader.next_frame() => frame,
            _ = shutdown.changed() => break,
        };

        match frame {
            Ok(Some(Frame::Request(request))) => dispatch(request, peer, &router, &pool, &writer).await,
            Ok(Some(Frame::Rejected(reply))) => {
                warn!(peer = %peer, request_id = reply.request_id, "Rejected undecodable request");
                write_reply(&writer, reply).await;
            }
            Ok(Some(Frame::Response(response))) => {
                debug!(peer = %peer, request_id = response.request_id, "Ignoring response frame on server connection");
            }
            Ok(None) => {
                debug!(peer = %peer, "Connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(peer = %peer, "Closing connection: {}", e);
                if let Some(reply) = e.reply {
                    write_reply(&writer, reply).await;
                }
                break;
            }
        }
    }

    writer.shutdown().await;
}

async fn dispatch(
    request: Request,
    peer: SocketAddr,
    router: &Arc<MessageRouter>,
    pool: &WorkerPool,
    writer: &Arc<FrameWriter>,
) {
    let started = Instant::now();
    let request_id = request.request_id;
    let oneway = request.is_oneway();

    let job = {
        let router = router.clone();
        let writer = writer.clone();
        async move {
            let context = CallContext::new(&request, Some(peer));
            let response = context.scope(router.handle(&request)).await;
            if !oneway {
                let elapsed = started.elapsed().as_millis() as u64;
                write_reply(&writer, response.with_process_time(elapsed)).await;
            }
        }
    };

    if let Err(e) = pool.try_submit(job) {
        warn!(peer = %peer, request_id, "Worker pool rejected request: {}", e);
        if !oneway {
            let elapsed = started.elapsed().as_millis() as u64;
            write_reply(writer, Response::error(request_id, e).with_process_time(elapsed)).await;
        }
    }
}

/// Writes `response`, falling back to an error response for the same id when
/// the response itself cannot be encoded.
async fn write_reply(writer: &FrameWriter, response: Response) {
    let request_id = response.request_id;
    match writer.write_response(&response).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::Transport => {
            debug!(request_id, "Could not write response: {}", e);
        }
        Err(e) => {
            warn!(request_id, "Could not encode response: {}", e);
            let fallback = Response::error(request_id, e).with_process_time(response.process_time_ms);
            if let Err(e) = writer.write_response(&fallback).await {
                debug!(request_id, "Could not write fallback response: {}", e);
            }
        }
    }
}
