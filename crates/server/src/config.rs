//! `remedy.toml` configuration.
//!
//! Every section is optional; an empty file yields an in-memory server on
//! `127.0.0.1:8080` with the built-in policy.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [state]
//! backend = "redis"
//! url = "redis://127.0.0.1:6379"
//!
//! [executor]
//! max_retries = 3
//! timeout_seconds = 30
//!
//! [approval]
//! workflow = "webhook"
//! webhook_url = "https://hooks.example.com/remedy"
//!
//! [policy]
//! path = "policy.toml"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use remedy_executor::{ExecutorConfig as RetryConfig, RetryStrategy};

use crate::error::ServerError;

/// Top-level configuration for the remedy server.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemedyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
}

impl RemedyConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ServerError> {
        toml::from_str(source).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// HTTP server bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum time to wait for in-flight requests on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Which state store holds jobs and active slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    #[default]
    Memory,
    Redis,
}

/// Configuration for the state store backend.
#[derive(Debug, Default, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: Option<String>,
    /// Key prefix for backends that support it.
    pub prefix: Option<String>,
    /// Namespace segment of every job key. Defaults to `remedy`.
    pub namespace: Option<String>,
}

/// Retry and timeout limits around executor calls.
#[derive(Debug, Default, Deserialize)]
pub struct ExecutorConfig {
    pub max_retries: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub retry_base_millis: Option<u64>,
    pub retry_max_millis: Option<u64>,
}

impl ExecutorConfig {
    /// Overlay the configured values on the executor defaults.
    pub fn to_retry_config(&self) -> RetryConfig {
        let mut config = RetryConfig::default();
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(timeout) = self.timeout_seconds {
            config.execution_timeout = Duration::from_secs(timeout);
        }
        if let Some(concurrent) = self.max_concurrent {
            config.max_concurrent = concurrent;
        }
        if self.retry_base_millis.is_some() || self.retry_max_millis.is_some() {
            config.retry_strategy = RetryStrategy::capped_exponential(
                Duration::from_millis(self.retry_base_millis.unwrap_or(100)),
                Duration::from_millis(self.retry_max_millis.unwrap_or(5_000)),
            );
        }
        config
    }
}

/// How approval requests reach a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalBackend {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub workflow: ApprovalBackend,
    /// Required when `workflow = "webhook"`.
    pub webhook_url: Option<String>,
    /// Extra headers sent with every webhook call.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PolicyConfig {
    /// Policy artifact to load. The built-in policy is used when unset.
    pub path: Option<PathBuf>,
}

/// Seed data for the in-process resource inventory.
#[derive(Debug, Default, Deserialize)]
pub struct InventoryConfig {
    /// JSON file holding an array of resource snapshots.
    pub seed: Option<PathBuf>,
}
