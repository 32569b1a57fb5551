//! CLI command implementations.

pub mod schedule;
pub mod serve;
pub mod status;
pub mod submit;

use anyhow::Result;
use dropflow_manager::{ManagerClient, ManagerConfig};

/// A client for the manager at `url`, bounded by the configured RPC timeout.
pub fn client(url: &str) -> Result<ManagerClient> {
    let config = ManagerConfig::from_env()?;
    Ok(ManagerClient::new(url, url, config.rpc_timeout())?)
}
