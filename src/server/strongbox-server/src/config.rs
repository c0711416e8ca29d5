//! Server configuration from command-line flags and environment.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use strongbox_crypto::MasterKey;
use strongbox_storage::{MemoryBackend, StorageBackend};
use strongbox_storage_sqlite::SqliteBackend;
use strongbox_vault::config::DEFAULT_CACHE_CAPACITY;
use strongbox_vault::{parse_master_keys, VaultConfig, VaultService};

/// SQLite namespace holding DEK records.
const STORAGE_NAMESPACE: &str = "vault";

/// Server configuration.
#[derive(Parser, Clone)]
#[command(name = "strongbox-server")]
#[command(about = "Strongbox - envelope encryption vault server")]
#[command(version)]
pub struct ServerConfig {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8300", env = "STRONGBOX_BIND_ADDRESS")]
    pub bind: String,

    /// Directory of the SQLite key store
    #[arg(long, default_value = "data", env = "STRONGBOX_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Master keys, primary first: comma-separated `base64` or `id:base64`
    #[arg(long, env = "STRONGBOX_MASTER_KEYS", hide_env_values = true)]
    pub master_keys: Option<String>,

    /// Maximum number of unwrapped DEKs kept in memory
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY, env = "STRONGBOX_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    /// Lifetime of a cached DEK, in seconds
    #[arg(long, default_value_t = 600, env = "STRONGBOX_CACHE_TTL_SECS")]
    pub cache_ttl_secs: u64,

    /// Bound on every storage call, in milliseconds
    #[arg(long, env = "STRONGBOX_STORAGE_TIMEOUT_MS")]
    pub storage_timeout_ms: Option<u64>,

    /// Enable development mode (in-memory storage, ephemeral master key if none given)
    #[arg(long, env = "STRONGBOX_DEV_MODE")]
    pub dev: bool,
}

impl ServerConfig {
    fn master_keys(&self) -> Result<Vec<MasterKey>> {
        match (&self.master_keys, self.dev) {
            (Some(value), _) => {
                parse_master_keys(value).context("Invalid master key configuration")
            },
            (None, true) => {
                let key = MasterKey::generate().context("Failed to generate master key")?;
                warn!(
                    master_key_id = %key.id(),
                    "No master key configured - using an ephemeral key, data will not survive a restart"
                );
                Ok(vec![key])
            },
            (None, false) => {
                bail!("Master keys are required: set --master-keys or STRONGBOX_MASTER_KEYS")
            },
        }
    }

    async fn storage(&self) -> Result<Arc<dyn StorageBackend>> {
        if self.dev {
            info!("Using in-memory storage");
            return Ok(Arc::new(MemoryBackend::new()));
        }

        let backend = SqliteBackend::open(&self.data_dir, STORAGE_NAMESPACE)
            .await
            .with_context(|| format!("Failed to open storage in {}", self.data_dir.display()))?;
        info!(path = %backend.path().display(), "Using SQLite storage");

        Ok(Arc::new(backend))
    }

    /// Builds the vault described by this configuration.
    pub async fn build_vault(&self) -> Result<VaultService> {
        let master_keys = self.master_keys()?;
        let storage = self.storage().await?;

        let mut config = VaultConfig::new(storage, master_keys)
            .with_cache_capacity(self.cache_capacity)
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs));
        if let Some(ms) = self.storage_timeout_ms {
            config = config.with_storage_timeout(Duration::from_millis(ms));
        }

        VaultService::new(config).context("Failed to initialize vault")
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("data_dir", &self.data_dir)
            .field("master_keys", &self.master_keys.as_ref().map(|_| "[REDACTED]"))
            .field("cache_capacity", &self.cache_capacity)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("storage_timeout_ms", &self.storage_timeout_ms)
            .field("dev", &self.dev)
            .finish()
    }
}
