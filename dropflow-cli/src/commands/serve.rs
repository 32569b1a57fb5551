//! Serve commands - run a manager behind the RPC server.

use anyhow::{Context, Result};
use dropflow_manager::{
    CompositeManager, DropManager, ManagerClient, ManagerConfig, NodeManager, RpcServer,
    ServerConfig,
};
use std::sync::Arc;

/// A subordinate or peer manager named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Name the manager is known by in drop specs.
    pub name: String,
    /// Base URL of its RPC server.
    pub url: String,
}

impl Endpoint {
    /// Parse `NAME=URL`, or `HOST:PORT` naming the manager after its
    /// address.
    pub fn parse(raw: &str) -> Result<Self> {
        let (name, url) = match raw.split_once('=') {
            Some((name, url)) => (name.trim(), url.trim()),
            None => (raw.trim(), raw.trim()),
        };
        if name.is_empty() || url.is_empty() {
            anyhow::bail!("Invalid manager endpoint '{raw}', expected NAME=URL or HOST:PORT");
        }
        let url = if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{url}")
        };
        Ok(Self {
            name: name.to_string(),
            url,
        })
    }

    fn connect(&self, config: &ManagerConfig) -> Result<Arc<dyn DropManager>> {
        let client = ManagerClient::new(&self.name, &self.url, config.rpc_timeout())
            .with_context(|| format!("Invalid URL for manager '{}'", self.name))?;
        Ok(Arc::new(client))
    }
}

/// Run a node manager.
pub async fn node(name: &str, host: &str, port: u16, peers: &[String]) -> Result<()> {
    let config = ManagerConfig::from_env().context("Invalid manager configuration")?;
    let nm = NodeManager::new(name, config.clone());
    for raw in peers {
        nm.register_peer(Endpoint::parse(raw)?.connect(&config)?);
    }
    serve(Arc::new(nm), host, port).await
}

/// Run a data island manager.
pub async fn island(name: &str, host: &str, port: u16, nodes: &[String]) -> Result<()> {
    let config = ManagerConfig::from_env().context("Invalid manager configuration")?;
    let dim = composite(CompositeManager::island(name, config.clone()), nodes, &config)?;
    serve(Arc::new(dim), host, port).await
}

/// Run a master manager.
pub async fn master(name: &str, host: &str, port: u16, islands: &[String]) -> Result<()> {
    let config = ManagerConfig::from_env().context("Invalid manager configuration")?;
    let mm = composite(CompositeManager::master(name, config.clone()), islands, &config)?;
    serve(Arc::new(mm), host, port).await
}

fn composite(
    manager: CompositeManager,
    subordinates: &[String],
    config: &ManagerConfig,
) -> Result<CompositeManager> {
    subordinates.iter().try_fold(manager, |manager, raw| {
        Ok(manager.with_subordinate(Endpoint::parse(raw)?.connect(config)?))
    })
}

async fn serve(manager: Arc<dyn DropManager>, host: &str, port: u16) -> Result<()> {
    let info = manager.info().await?;
    let server = RpcServer::bind(&ServerConfig::new(host, port), manager)
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    let addr = server.local_addr();

    println!("Starting {} manager '{}'...", info.level, info.name);
    println!();
    println!("Server: http://{addr}/api");
    if !info.hosts.is_empty() {
        println!("Subordinates: {}", info.hosts.join(", "));
    }
    println!();
    println!("Press Ctrl+C to stop.");

    let (shutdown, handle) = server.spawn();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    tracing::info!("Shutdown signal received");
    println!();
    println!("Shutting down...");

    // The receiver may already be gone if the server stopped on its own.
    let _ = shutdown.send(());
    handle.await.context("Server task panicked")??;
    Ok(())
}
