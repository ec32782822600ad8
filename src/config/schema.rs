//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the configuration daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// RPC listener configuration.
    pub listener: ListenerConfig,

    /// Schema, boot file, and startup restore settings.
    pub store: StoreConfig,

    /// Commit action execution settings.
    pub commit: CommitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// RPC listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:7171").
    pub bind_address: String,

    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7171".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Schema definition file.
    pub schema_path: PathBuf,

    /// Boot-configuration file written by `save`.
    pub boot_config_path: PathBuf,

    /// Load and commit the boot configuration at startup.
    pub restore_on_start: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from("/opt/configd/schema.toml"),
            boot_config_path: PathBuf::from("/config/config.boot"),
            restore_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Upper bound on one action's run time; exceeding it fails the commit.
    pub action_timeout_secs: u64,

    /// Shell used to run action commands.
    pub shell: PathBuf,
}

impl CommitConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs)
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            action_timeout_secs: 300,
            shell: PathBuf::from("/bin/sh"),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9171".to_string(),
        }
    }
}
