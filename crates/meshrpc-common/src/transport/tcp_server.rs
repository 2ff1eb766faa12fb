use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use crate::protocol::error::{Result, RpcError};

/// Async TCP listener that hands every accepted connection to a handler task.
pub struct TcpServer {
    listener: TcpListener,
}

impl TcpServer {
    /// Creates a new TCP server bound to the specified address.
    ///
    /// # Arguments
    /// * `bind_addr` - The address to bind to (e.g., "0.0.0.0:20880")
    pub async fn new(bind_addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| RpcError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RpcError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Accepts connections forever, spawning one task per connection.
    ///
    /// Accept errors (e.g. file descriptor exhaustion) are logged and the loop
    /// keeps going.
    ///
    /// # Arguments
    /// * `handler` - Drives one connection until it closes
    pub async fn run_with_handler<F, Fut>(&self, handler: F) -> Result<()>
    where
        F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, "set_nodelay failed: {}", e);
            }
            tracing::debug!(peer = %peer_addr, "Connection established");

            let handler = handler.clone();
            tokio::spawn(async move {
                handler(stream, peer_addr).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_server_creation() {
        let server = TcpServer::new("127.0.0.1:0").await;
        assert!(server.is_ok());
    }

    #[tokio::test]
    async fn test_tcp_server_local_addr() {
        let server = TcpServer::new("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_failure_is_connection_error() {
        let first = TcpServer::new("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap().to_string();
        let second = TcpServer::new(&taken).await;
        assert!(matches!(second, Err(RpcError::Connection(_))));
    }
}
