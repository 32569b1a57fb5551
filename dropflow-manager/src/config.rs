//! Manager configuration.

use dropflow_core::error::{DropflowError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on a single call to a subordinate or peer manager.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;

/// Configuration shared by every manager level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Upper bound on each subordinate or peer call, in milliseconds.
    pub rpc_timeout_ms: u64,

    /// Root directory for file-backed drops. Each session gets a
    /// subdirectory.
    pub data_dir: PathBuf,

    /// Reach peers this manager has no handle for at `http://<node>`.
    pub peer_http: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            data_dir: env::temp_dir().join("dropflow"),
            peer_http: false,
        }
    }
}

impl ManagerConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ManagerConfigBuilder {
        ManagerConfigBuilder::default()
    }

    /// Read the configuration from the environment.
    ///
    /// - `DROPFLOW_RPC_TIMEOUT_MS`: subordinate call timeout
    /// - `DROPFLOW_DATA_DIR`: root for file-backed drops
    /// - `DROPFLOW_PEER_HTTP`: "true" or "1" to reach unknown peers over HTTP
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let rpc_timeout_ms = match env::var("DROPFLOW_RPC_TIMEOUT_MS") {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| DropflowError::Config {
                cause: format!("DROPFLOW_RPC_TIMEOUT_MS='{raw}': {e}"),
            })?,
            Err(_) => defaults.rpc_timeout_ms,
        };

        let data_dir = env::var("DROPFLOW_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let peer_http = env::var("DROPFLOW_PEER_HTTP")
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(defaults.peer_http);

        let config = Self {
            rpc_timeout_ms,
            data_dir,
            peer_http,
        };
        config.validate()?;
        Ok(config)
    }

    /// Subordinate call timeout.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_timeout_ms == 0 {
            return Err(DropflowError::Config {
                cause: "rpc_timeout_ms must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`ManagerConfig`].
#[derive(Debug, Default)]
pub struct ManagerConfigBuilder {
    config: ManagerConfig,
}

impl ManagerConfigBuilder {
    /// Set the subordinate call timeout.
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.config.rpc_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the data directory.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Reach unknown peers over HTTP.
    pub fn peer_http(mut self, enabled: bool) -> Self {
        self.config.peer_http = enabled;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ManagerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
