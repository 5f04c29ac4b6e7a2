use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

mod env;

// Re-export config types owned by other modules
pub use crate::ingest::OverflowPolicy;
pub use crate::snapshot::config::SnapshotConfig;

/// Complete cabtrack configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CabConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub merge: MergeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

/// Bearer-token gate in front of ingestion, proximity and dispatch routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Tokens accepted by the static verifier
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Delivery channel between connection handlers and merge workers
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Per-shard queue capacity (messages). With `overflow = "drop_oldest"`
    /// the queue is rounded up to the next power of two, so the default
    /// 10 000 holds up to 16 384 messages.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// What to do when a shard queue is full
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

fn default_channel_capacity() -> usize {
    10_000
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Merge worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MergeConfig {
    /// Number of identity shards, one worker each
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Retries after a failed write before the update is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff between retries (doubles per attempt)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_workers() -> usize {
    1
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    50
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Spatial store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// H3 resolution of the spherical index (0-15)
    #[serde(default = "default_h3_resolution")]
    pub h3_resolution: u8,
    /// Grid rings searched before falling back to a full scan
    #[serde(default = "default_max_rings")]
    pub max_rings: u32,
    /// Deadline for every store call
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_h3_resolution() -> u8 {
    8
}

fn default_max_rings() -> u32 {
    64
}

fn default_store_timeout_ms() -> u64 {
    3000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            h3_resolution: default_h3_resolution(),
            max_rings: default_max_rings(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Dispatch facade configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Base URL of the proximity service; defaults to this process
    #[serde(default)]
    pub proximity_base_url: Option<String>,
    #[serde(default = "default_dispatch_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_dispatch_timeout_ms() -> u64 {
    5000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            proximity_base_url: None,
            timeout_ms: default_dispatch_timeout_ms(),
        }
    }
}

impl CabConfig {
    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ingest.channel_capacity == 0 {
            bail!("ingest.channel_capacity must be at least 1");
        }
        if self.merge.workers == 0 {
            bail!("merge.workers must be at least 1");
        }
        if self.store.h3_resolution > 15 {
            bail!(
                "store.h3_resolution must be between 0 and 15, got {}",
                self.store.h3_resolution
            );
        }
        if self.store.timeout_ms == 0 {
            bail!("store.timeout_ms must be positive");
        }
        if self.auth.enabled && self.auth.tokens.is_empty() {
            bail!("auth.enabled requires at least one entry in auth.tokens");
        }
        Ok(())
    }

    /// Base URL the dispatch facade uses to reach the proximity endpoints
    pub fn proximity_base_url(&self) -> String {
        self.dispatch.proximity_base_url.clone().unwrap_or_else(|| {
            let host = if self.server.bind_addr == "0.0.0.0" {
                "127.0.0.1"
            } else {
                self.server.bind_addr.as_str()
            };
            format!("http://{}:{}", host, self.server.port)
        })
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<CabConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: CabConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Load the file at `path` if present, apply environment overrides, validate.
pub fn load(path: &Path) -> Result<CabConfig> {
    let mut config = if path.exists() {
        info!(path = %path.display(), "Loading configuration file");
        load_config(path)?
    } else {
        info!(path = %path.display(), "No configuration file, using defaults");
        CabConfig::default()
    };
    env::apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}
