use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;

use crate::ethereum::retry::RetryPolicy;
use crate::ethereum::scanner::DEFAULT_TRACE_PAGE_SIZE;

const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: HashMap<String, NetworkConfig>,
    pub default_network: String,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub scan: ScanConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: Option<String>,
}

/// Block ranges and batching used by the transaction profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Earliest block the node serves traces for
    #[serde(default = "default_trace_start_block")]
    pub trace_start_block: u64,

    /// First block searched for incoming logs
    #[serde(default = "default_log_start_block")]
    pub log_start_block: u64,

    /// Blocks covered by a single trace_filter call
    #[serde(default = "default_window_size")]
    pub window_size: u64,

    /// Maximum traces requested per window
    #[serde(default = "default_trace_page_size")]
    pub trace_page_size: u64,
}

fn default_trace_start_block() -> u64 {
    16_856_925
}

fn default_log_start_block() -> u64 {
    0xE1_C2C7
}

fn default_window_size() -> u64 {
    100
}

fn default_trace_page_size() -> u64 {
    DEFAULT_TRACE_PAGE_SIZE
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            trace_start_block: default_trace_start_block(),
            log_start_block: default_log_start_block(),
            window_size: default_window_size(),
            trace_page_size: default_trace_page_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub transport: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        networks.insert(
            "base_sepolia".to_string(),
            NetworkConfig {
                rpc_url: format!("https://rpc.ankr.com/base_sepolia/{}", API_KEY_PLACEHOLDER),
                chain_id: 84532,
                explorer_url: Some("https://sepolia.basescan.org".to_string()),
            },
        );

        networks.insert(
            "ethereum".to_string(),
            NetworkConfig {
                rpc_url: format!("https://rpc.ankr.com/eth/{}", API_KEY_PLACEHOLDER),
                chain_id: 1,
                explorer_url: Some("https://etherscan.io".to_string()),
            },
        );

        networks.insert(
            "local".to_string(),
            NetworkConfig {
                rpc_url: "http://127.0.0.1:8545".to_string(),
                chain_id: 31337,
                explorer_url: None,
            },
        );

        Self {
            networks,
            default_network: "base_sepolia".to_string(),
            retry: RetryPolicy::default(),
            scan: ScanConfig::default(),
            server: ServerConfig {
                transport: "stdio".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_env_vars();
        config
    }

    pub fn network(&self, name: Option<&str>) -> Result<&NetworkConfig> {
        let name = name.unwrap_or(&self.default_network);
        self.networks
            .get(name)
            .ok_or_else(|| anyhow!("Network '{}' not configured", name))
    }

    /// Apply environment variable substitutions to configuration
    fn apply_env_vars(&mut self) {
        self.apply_overrides(
            std::env::var("RPC_API_KEY").ok(),
            std::env::var("ARCHIVE_RPC_URL").ok(),
        );
    }

    fn apply_overrides(&mut self, api_key: Option<String>, rpc_url: Option<String>) {
        match api_key {
            Some(api_key) => {
                tracing::info!("Using RPC_API_KEY environment variable for RPC URLs");
                for (network_name, network_config) in &mut self.networks {
                    if network_config.rpc_url.contains(API_KEY_PLACEHOLDER) {
                        network_config.rpc_url = network_config
                            .rpc_url
                            .replace(API_KEY_PLACEHOLDER, &api_key);
                        tracing::debug!("Updated {} RPC URL with API key", network_name);
                    }
                }
            }
            None => {
                for (network_name, network_config) in &self.networks {
                    if network_config.rpc_url.contains(API_KEY_PLACEHOLDER) {
                        tracing::warn!(
                            "RPC URL for {} still contains the API key placeholder, set RPC_API_KEY",
                            network_name
                        );
                    }
                }
            }
        }

        if let Some(rpc_url) = rpc_url {
            if let Some(network_config) = self.networks.get_mut(&self.default_network) {
                tracing::info!(
                    "Using ARCHIVE_RPC_URL for default network {}",
                    self.default_network
                );
                network_config.rpc_url = rpc_url;
            }
        }
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("archive-profiler").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Archive Profiler Configuration File
# Networks, retry behaviour and scan ranges for the archive node profiler

# Default network to use when none is specified
default_network = "base_sepolia"

# Network configurations. Profiling needs an archive node with the trace API.
[networks.base_sepolia]
rpc_url = "https://rpc.ankr.com/base_sepolia/YOUR_API_KEY_HERE"
chain_id = 84532
explorer_url = "https://sepolia.basescan.org"

[networks.ethereum]
rpc_url = "https://rpc.ankr.com/eth/YOUR_API_KEY_HERE"
chain_id = 1
explorer_url = "https://etherscan.io"

[networks.local]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

# Retry policy for every RPC call: linear backoff of base_delay_ms * attempt
[retry]
max_retries = 3
base_delay_ms = 1000

# Block ranges scanned when profiling an address
[scan]
trace_start_block = 16856925   # earliest block with trace data on the node
log_start_block = 14795463     # first block searched for incoming logs
window_size = 100              # blocks per trace_filter call
trace_page_size = 10000        # max traces per window

# Server configuration
[server]
transport = "stdio"

# Environment variables that can be used:
# RPC_API_KEY - replaces YOUR_API_KEY_HERE in every rpc_url
# ARCHIVE_RPC_URL - overrides the rpc_url of the default network
"#;
        sample_config.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sample_config_parses() {
        let config: Config = toml::from_str(&Config::generate_sample()).unwrap();

        assert_eq!(config.default_network, "base_sepolia");
        assert_eq!(config.networks.len(), 3);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(config.networks["local"].explorer_url, None);
    }

    #[test]
    fn test_scan_and_retry_sections_default() {
        let config: Config = toml::from_str(
            r#"
default_network = "local"

[networks.local]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

[scan]
window_size = 25

[server]
transport = "stdio"
"#,
        )
        .unwrap();

        assert_eq!(config.scan.window_size, 25);
        assert_eq!(config.scan.trace_start_block, 16_856_925);
        assert_eq!(config.scan.log_start_block, 14_795_463);
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("secret".to_string()), None);
        assert_eq!(
            config.networks["ethereum"].rpc_url,
            "https://rpc.ankr.com/eth/secret"
        );
        assert_eq!(config.networks["local"].rpc_url, "http://127.0.0.1:8545");

        config.apply_overrides(None, Some("http://archive:8545".to_string()));
        assert_eq!(
            config.network(None).unwrap().rpc_url,
            "http://archive:8545"
        );
    }

    #[test]
    fn test_unknown_network() {
        let config = Config::default();
        assert!(config.network(Some("ethereum")).is_ok());
        assert!(config.network(Some("goerli")).is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.scan.window_size = 10;
        config.retry = RetryPolicy::new(5, 200);
        config.save_to_file(&path).await.unwrap();

        let loaded = Config::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.scan.window_size, 10);
        assert_eq!(loaded.retry, RetryPolicy::new(5, 200));
        assert_eq!(loaded.networks.len(), config.networks.len());
    }

    #[tokio::test]
    async fn test_load_or_default_falls_back() {
        let temp_dir = tempdir().unwrap();
        let config = Config::load_or_default(Some(temp_dir.path().join("missing.toml"))).await;
        assert!(config.networks.contains_key(&config.default_network));
    }
}
