//! HTTP server setup and connection handling.

use super::router;
use crate::manager::DropManager;
use dropflow_core::error::{DropflowError, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Configuration for the RPC server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on. 0 picks a free port.
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        let host: std::net::IpAddr = self.host.parse().unwrap_or([0, 0, 0, 0].into());
        SocketAddr::new(host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Serves one manager over HTTP.
pub struct RpcServer {
    listener: TcpListener,
    addr: SocketAddr,
    manager: Arc<dyn DropManager>,
}

impl RpcServer {
    /// Bind the listening socket.
    pub async fn bind(config: &ServerConfig, manager: Arc<dyn DropManager>) -> Result<Self> {
        let listener =
            TcpListener::bind(config.socket_addr())
                .await
                .map_err(|e| DropflowError::Io {
                    path: PathBuf::from(format!("{}:{}", config.host, config.port)),
                    cause: e.to_string(),
                })?;
        let addr = listener.local_addr().map_err(|e| DropflowError::Io {
            path: PathBuf::from(format!("{}:{}", config.host, config.port)),
            cause: e.to_string(),
        })?;
        Ok(Self {
            listener,
            addr,
            manager,
        })
    }

    /// Address actually bound, including the chosen port when 0 was asked for.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept connections until `shutdown` fires or its sender is dropped.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        tracing::info!(
            manager = %self.manager.name(),
            addr = %self.addr,
            "RPC server started"
        );

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    let (stream, remote_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let io = TokioIo::new(stream);
                    let manager = Arc::clone(&self.manager);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let manager = Arc::clone(&manager);
                            async move { router::route(req, manager).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await
                            && !e.is_incomplete_message()
                        {
                            tracing::warn!(
                                remote = %remote_addr,
                                error = %e,
                                "HTTP connection error"
                            );
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!(manager = %self.manager.name(), "RPC server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run on the current runtime; dropping or firing the returned sender
    /// stops the server.
    pub fn spawn(self) -> (oneshot::Sender<()>, tokio::task::JoinHandle<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (tx, tokio::spawn(self.run(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn server_config_socket_addr() {
        let config = ServerConfig::new("127.0.0.1", 9000);
        let addr = config.socket_addr();

        assert_eq!(addr.port(), 9000);
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
    }
}
