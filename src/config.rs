//! Tool configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via NETADAPTER_CONFIG or --config)
//! 3. Environment variables

use netadapter_connector::ConnectorConfig;
use netadapter_discovery::{CollectorConfig, ResponderConfig};
use netadapter_protocol::{
    COLLECTOR_TIMEOUT, DEFAULT_MULTICAST_GROUP, DEFAULT_MULTICAST_PORT, DEFAULT_PORT,
    RESPONDER_TIMEOUT, SHUTDOWN_POLL_CYCLES, SHUTDOWN_POLL_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stream connection settings.
    pub network: NetworkConfig,
    /// Multicast discovery settings.
    pub discovery: DiscoveryConfig,
}

impl Config {
    /// Loads configuration from `path` (or NETADAPTER_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("NETADAPTER_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.network.apply_overrides(&lookup);
        self.discovery.apply_overrides(&lookup);
    }

    /// Rejects settings no transport could use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.discovery.group.is_multicast() {
            return Err(ConfigError::ValidationError(format!(
                "discovery.group {} is not a multicast address",
                self.discovery.group
            )));
        }
        if self.network.connect_timeout_ms == 0 || self.network.read_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "network timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Stream connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Adapter host listen port.
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 10_000,
        }
    }
}

impl NetworkConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("NETADAPTER_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(ms) = lookup("NETADAPTER_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.connect_timeout_ms = ms;
        }
        if let Some(ms) = lookup("NETADAPTER_READ_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.read_timeout_ms = ms;
        }
    }

    /// Builds a connector config for `addr`, adding the default port when
    /// `addr` has none.
    pub fn connector_config(&self, addr: &str) -> ConnectorConfig {
        let addr = if addr.contains(':') {
            addr.to_string()
        } else {
            format!("{}:{}", addr, self.port)
        };
        ConnectorConfig::new(addr)
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
    }
}

/// Multicast discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Interface for group membership; 0.0.0.0 lets the OS choose.
    pub interface: Ipv4Addr,
    pub responder_timeout_ms: u64,
    pub collector_timeout_ms: u64,
    pub shutdown_poll_interval_ms: u64,
    pub shutdown_poll_cycles: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_MULTICAST_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            responder_timeout_ms: RESPONDER_TIMEOUT.as_millis() as u64,
            collector_timeout_ms: COLLECTOR_TIMEOUT.as_millis() as u64,
            shutdown_poll_interval_ms: SHUTDOWN_POLL_INTERVAL.as_millis() as u64,
            shutdown_poll_cycles: SHUTDOWN_POLL_CYCLES,
        }
    }
}

impl DiscoveryConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(group) = lookup("NETADAPTER_MULTICAST_GROUP").and_then(|v| v.parse().ok()) {
            self.group = group;
        }
        if let Some(port) = lookup("NETADAPTER_MULTICAST_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(iface) = lookup("NETADAPTER_MULTICAST_INTERFACE").and_then(|v| v.parse().ok())
        {
            self.interface = iface;
        }
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::default()
            .with_group(self.group)
            .with_port(self.port)
            .with_interface(self.interface)
            .with_timeout(Duration::from_millis(self.collector_timeout_ms))
    }

    pub fn responder_config(&self) -> ResponderConfig {
        let mut config = ResponderConfig::default()
            .with_group(self.group)
            .with_port(self.port)
            .with_interface(self.interface)
            .with_timeout(Duration::from_millis(self.responder_timeout_ms));
        config.poll_interval = Duration::from_millis(self.shutdown_poll_interval_ms);
        config.poll_cycles = self.shutdown_poll_cycles;
        config
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
