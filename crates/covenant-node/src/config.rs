//! Node configuration types
//!
//! Layered from an optional TOML file and `COVENANT__SECTION__KEY`
//! environment variables, later layers winning.

use crate::error::Result;
use covenant_economics::{ConsensusParams, StakingPolicy};
use covenant_oracle::OracleSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "COVENANT";

/// Complete node configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node operation settings
    #[serde(default)]
    pub node: NodeSettings,

    /// Consensus parameters
    #[serde(default)]
    pub consensus: ConsensusParams,

    /// Local admission policy for stakes
    #[serde(default)]
    pub staking: StakingPolicy,

    /// Oracle refresh and freshness settings
    #[serde(default)]
    pub oracle: OracleSettings,

    /// Cache snapshot settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Load from `path` (if given and present) plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// As `load`, reading overrides from `<prefix>__SECTION__KEY`
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Configuration for `network`: mainnet unless the test network is named
    pub fn for_network(network: &str) -> Self {
        let consensus = match network {
            "test" | "testnet" => ConsensusParams::testnet(),
            _ => ConsensusParams::mainnet(),
        };
        Self {
            node: NodeSettings {
                network: consensus.network.clone(),
                ..NodeSettings::default()
            },
            consensus,
            ..Self::default()
        }
    }

    /// Render the effective configuration
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        Path::new(&self.node.data_dir).join(&self.cache.snapshot_file)
    }
}

/// Basic node settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Network name
    #[serde(default = "default_network")]
    pub network: String,

    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_network() -> String {
    "main".to_string()
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
        }
    }
}

/// Snapshot persistence
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// File name inside the data directory
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,

    /// Blocks between checkpoints; 0 writes only at shutdown
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Load the snapshot when the engine opens
    #[serde(default = "default_true")]
    pub load_on_open: bool,
}

fn default_snapshot_file() -> String {
    "appcache.dat".to_string()
}

fn default_checkpoint_interval() -> u64 {
    // One day of blocks
    205
}

fn default_true() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_file: default_snapshot_file(),
            checkpoint_interval: default_checkpoint_interval(),
            load_on_open: true,
        }
    }
}

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format
    #[serde(default)]
    pub format: LogFormat,

    /// Include module targets in plain output
    #[serde(default = "default_true")]
    pub with_target: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            with_target: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::Fixed;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = NodeConfig::load_with_prefix(None, "COVENANT_TEST_EMPTY").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.consensus, ConsensusParams::mainnet());
        assert!(!config.staking.dash_stake_enabled);
        assert_eq!(config.oracle.refresh_interval_secs, 3_600);
        assert_eq!(config.cache.checkpoint_interval, 205);
    }

    #[test]
    fn test_file_layer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covenant.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[node]
data_dir = "/var/lib/covenant"

[staking]
dash_stake_enabled = true
minimum_stake_usd = "12.5"

[cache]
checkpoint_interval = 10

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = NodeConfig::load_with_prefix(Some(&path), "COVENANT_TEST_FILE").unwrap();
        assert_eq!(config.node.data_dir, "/var/lib/covenant");
        assert!(config.staking.dash_stake_enabled);
        assert_eq!(config.staking.minimum_stake_usd, Fixed::parse("12.5").unwrap());
        // Untouched keys keep their defaults
        assert_eq!(config.staking.height_tolerance, 1);
        assert_eq!(config.cache.checkpoint_interval, 10);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.snapshot_path(), Path::new("/var/lib/covenant/appcache.dat"));
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("covenant.toml");
        std::fs::write(&path, "[cache]\ncheckpoint_interval = 10\n").unwrap();

        std::env::set_var("COVENANT_TEST_ENV__CACHE__CHECKPOINT_INTERVAL", "42");
        let config = NodeConfig::load_with_prefix(Some(&path), "COVENANT_TEST_ENV").unwrap();
        std::env::remove_var("COVENANT_TEST_ENV__CACHE__CHECKPOINT_INTERVAL");
        assert_eq!(config.cache.checkpoint_interval, 42);
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            NodeConfig::load_with_prefix(Some(&dir.path().join("absent.toml")), "COVENANT_TEST_ABSENT")
                .unwrap();
        assert_eq!(config.node, NodeSettings::default());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let config = NodeConfig::for_network("testnet");
        let text = config.to_toml().unwrap();
        assert!(text.contains("[consensus]"));
        let back: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
        assert_eq!(back.node.network, "test");
    }
}
