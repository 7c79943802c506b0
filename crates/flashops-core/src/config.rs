//! Console configuration.
//!
//! A TOML file (`flashops.toml` by default) defines the data directory, the
//! network the console administers, and the confirmation-polling policy.
//! Every field has a default so an empty file is a valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryConfig;

/// Errors from configuration handling.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration is well-formed but invalid.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level console configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Directory holding the ledger document, backups, and exports.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Network parameters.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Confirmation polling policy.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            network: NetworkConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ConsoleConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.network.user_fee_percent > 100 {
            return Err(ConfigError::Validation(format!(
                "network.user_fee_percent must be 0-100, got {}",
                self.network.user_fee_percent
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters of the administered network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Human-readable network name.
    #[serde(default = "default_network_name")]
    pub name: String,

    /// Full-node RPC endpoint.
    #[serde(default)]
    pub endpoint: String,

    /// Block-explorer base URL used in operator output.
    #[serde(default = "default_explorer")]
    pub explorer: String,

    /// Fee limit for state-changing transactions, base units.
    #[serde(default = "default_fee_limit")]
    pub fee_limit: u64,

    /// Origin energy limit for deployments.
    #[serde(default = "default_energy_limit")]
    pub origin_energy_limit: u64,

    /// Share of energy paid by the caller, in percent.
    #[serde(default = "default_user_fee_percent")]
    pub user_fee_percent: u8,

    /// Minimum operator balance required before a deploy, whole TRX.
    #[serde(default = "default_min_deploy_balance")]
    pub min_deploy_balance_trx: u64,
}

fn default_network_name() -> String {
    "TRON Mainnet".to_string()
}

fn default_explorer() -> String {
    "https://tronscan.org".to_string()
}

const fn default_fee_limit() -> u64 {
    1_000_000_000
}

const fn default_energy_limit() -> u64 {
    10_000_000
}

const fn default_user_fee_percent() -> u8 {
    100
}

const fn default_min_deploy_balance() -> u64 {
    100
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: default_network_name(),
            endpoint: String::new(),
            explorer: default_explorer(),
            fee_limit: default_fee_limit(),
            origin_energy_limit: default_energy_limit(),
            user_fee_percent: default_user_fee_percent(),
            min_deploy_balance_trx: default_min_deploy_balance(),
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config = ConsoleConfig::from_toml("").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.network.fee_limit, 1_000_000_000);
        assert_eq!(config.network.user_fee_percent, 100);
        assert_eq!(config.retry.max_attempts, 20);
    }

    #[test]
    fn test_partial_override() {
        let config = ConsoleConfig::from_toml(
            r#"
            data_dir = "/var/lib/flashops"

            [network]
            endpoint = "https://api.trongrid.io"
            fee_limit = 500000000

            [retry]
            max_attempts = 40
            delay = "5s"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/flashops"));
        assert_eq!(config.network.endpoint, "https://api.trongrid.io");
        assert_eq!(config.network.fee_limit, 500_000_000);
        assert_eq!(config.retry.max_attempts, 40);
        assert_eq!(config.retry.delay.as_secs(), 5);
    }

    #[test]
    fn test_validation_rejects_bad_fee_percent() {
        let result = ConsoleConfig::from_toml(
            r#"
            [network]
            user_fee_percent = 150
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_round_trip() {
        let config = ConsoleConfig::default();
        let toml = config.to_toml().unwrap();
        let parsed = ConsoleConfig::from_toml(&toml).unwrap();
        assert_eq!(parsed.network.fee_limit, config.network.fee_limit);
    }
}
