//! Configuration module for mona-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{FileConfig, LedgerConfig, SubscribersConfig};
use alloy_primitives::Address;
use alloy_primitives::hex::FromHexError;
use mona_core::config::{PollScheduleConfig, RegistryConfig, WatcherConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("no ledger RPC URL configured (set RPC_URL or [ledger] rpc_url)")]
    MissingRpcUrl,

    #[error("no contract address configured (set CONTRACT_ADDRESS or [ledger] contract_address)")]
    MissingContractAddress,

    #[error("invalid contract address: {0}")]
    InvalidContractAddress(#[from] FromHexError),
}

/// Values from the command line and environment that take precedence over
/// the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Full listen address; wins over everything else.
    pub listen: Option<SocketAddr>,
    /// Port only, applied to the file's listen address.
    pub port: Option<u16>,
    pub rpc_url: Option<Url>,
    pub contract_address: Option<String>,
}

/// Server-level settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub watcher: WatcherConfig,
    pub registry: RegistryConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    overrides: Overrides,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, or fall back to defaults if it does not exist
    /// 2. Apply CLI and environment overrides
    /// 3. Validate and build the typed configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    path = %self.config_path.display(),
                    "Config file not found, using defaults and environment"
                );
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        self.build(file_config)
    }

    /// Apply overrides to an already-parsed file and validate the result.
    pub fn build(&self, mut file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        if let Some(port) = self.overrides.port {
            file_config.server.listen.set_port(port);
        }
        if let Some(listen) = self.overrides.listen {
            file_config.server.listen = listen;
        }
        if let Some(rpc_url) = &self.overrides.rpc_url {
            file_config.ledger.rpc_url = Some(rpc_url.clone());
        }
        if let Some(address) = &self.overrides.contract_address {
            file_config.ledger.contract_address = Some(address.clone());
        }

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
            },
            watcher: watcher_config(file_config.ledger)?,
            registry: registry_config(file_config.subscribers)?,
        })
    }
}

fn watcher_config(ledger: LedgerConfig) -> Result<WatcherConfig, ConfigError> {
    if ledger.poll_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "poll_interval_secs must be greater than zero".into(),
        ));
    }
    if ledger.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "request_timeout_secs must be greater than zero".into(),
        ));
    }
    if ledger.max_block_range == Some(0) {
        return Err(ConfigError::ValidationError(
            "max_block_range must be greater than zero when set".into(),
        ));
    }

    let rpc_url = ledger.rpc_url.ok_or(ConfigError::MissingRpcUrl)?;
    let contract_address: Address = ledger
        .contract_address
        .ok_or(ConfigError::MissingContractAddress)?
        .trim()
        .parse()?;

    Ok(WatcherConfig {
        rpc_url,
        contract_address,
        request_timeout: Duration::from_secs(ledger.request_timeout_secs),
        max_block_range: ledger.max_block_range,
        start_block: ledger.start_block,
        schedule: PollScheduleConfig {
            poll_interval: Duration::from_secs(ledger.poll_interval_secs),
            max_backoff: Duration::from_secs(ledger.max_backoff_secs),
            breaker_threshold: ledger.breaker_threshold,
            breaker_cooldown: Duration::from_secs(ledger.breaker_cooldown_secs),
        },
    })
}

fn registry_config(subscribers: SubscribersConfig) -> Result<RegistryConfig, ConfigError> {
    if subscribers.max_subscribers == 0 {
        return Err(ConfigError::ValidationError(
            "max_subscribers must be greater than zero".into(),
        ));
    }
    if subscribers.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "queue_capacity must be greater than zero".into(),
        ));
    }
    if subscribers.write_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "write_timeout_secs must be greater than zero".into(),
        ));
    }
    Ok(RegistryConfig {
        max_subscribers: subscribers.max_subscribers,
        queue_capacity: subscribers.queue_capacity,
        write_timeout: Duration::from_secs(subscribers.write_timeout_secs),
    })
}
