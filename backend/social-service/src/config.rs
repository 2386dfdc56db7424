/// Configuration management for Social Service
///
/// Loads configuration from environment variables.
use anyhow::{bail, Context, Result};
use document_store::{DocumentStore, MemoryStore, RedisStore};
use graph_service::GraphConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Document store configuration
    pub store: StoreConfig,
    /// Connection graph behaviour
    pub graph: GraphConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (development, staging, production)
    pub env: String,
    /// User id the sync process signs in as
    pub viewer_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            other => bail!("unknown STORE_BACKEND {other:?} (expected memory or redis)"),
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Redis URL, required for the redis backend
    pub redis_url: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_change_channel")]
    pub change_channel: String,
}

// Default values
fn default_key_prefix() -> String {
    RedisStore::DEFAULT_KEY_PREFIX.to_string()
}

fn default_change_channel() -> String {
    RedisStore::DEFAULT_CHANNEL.to_string()
}

impl StoreConfig {
    /// Build the configured store
    pub async fn connect(&self) -> Result<Arc<dyn DocumentStore>> {
        match self.backend {
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreBackend::Redis => {
                let url = self
                    .redis_url
                    .as_deref()
                    .context("REDIS_URL must be set when STORE_BACKEND=redis")?;
                let store = RedisStore::with_namespace(
                    url,
                    self.key_prefix.clone(),
                    self.change_channel.clone(),
                )
                .await
                .context("Failed to connect to Redis")?;
                Ok(Arc::new(store))
            }
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            viewer_id: std::env::var("VIEWER_ID").ok().filter(|v| !v.trim().is_empty()),
        };

        let backend = match std::env::var("STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StoreBackend::Memory,
        };
        let redis_url = std::env::var("REDIS_URL").ok();
        if backend == StoreBackend::Redis && redis_url.is_none() {
            bail!("REDIS_URL environment variable not set");
        }

        let store = StoreConfig {
            backend,
            redis_url,
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| default_key_prefix()),
            change_channel: std::env::var("STORE_CHANGE_CHANNEL")
                .unwrap_or_else(|_| default_change_channel()),
        };

        let graph = GraphConfig::from_env().context("Invalid connection graph settings")?;

        Ok(Config { app, store, graph })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        for var in [
            "APP_ENV",
            "VIEWER_ID",
            "STORE_BACKEND",
            "REDIS_URL",
            "STORE_KEY_PREFIX",
            "STORE_CHANGE_CHANNEL",
            "CONNECTIONS_STRICT",
            "SUGGESTION_LIMIT",
        ] {
            std::env::remove_var(var);
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.viewer_id, None);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.key_prefix, "linkup");
        assert_eq!(config.store.change_channel, "linkup:changes");
        assert!(config.graph.strict_transitions);
        assert_eq!(config.graph.suggestion_limit, 3);

        std::env::set_var("STORE_BACKEND", "redis");
        assert!(Config::from_env().is_err());

        std::env::set_var("REDIS_URL", "redis://localhost");
        std::env::set_var("CONNECTIONS_STRICT", "false");
        let config = Config::from_env().unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert!(!config.graph.strict_transitions);

        for var in ["STORE_BACKEND", "REDIS_URL", "CONNECTIONS_STRICT"] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("Redis".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }
}
