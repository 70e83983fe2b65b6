//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `WEMO_BRIDGE_BIND_PORT`
    pub bind_port: u16,

    /// Only scan on the interface with this IPv4 address.
    /// Override: `WEMO_BRIDGE_INTERFACE_IP`
    pub interface_ip: Option<Ipv4Addr>,

    /// Receive window of one discovery scan (seconds).
    /// Override: `WEMO_BRIDGE_SCAN_TIMEOUT`
    pub scan_timeout_secs: u64,

    /// Poll interval for switches and sockets (seconds).
    /// Override: `WEMO_BRIDGE_POLL_INTERVAL`
    pub poll_interval_secs: u64,

    /// Poll interval for motion sensors (seconds).
    pub motion_poll_interval_secs: u64,

    /// Enable SSDP multicast discovery.
    pub discovery_ssdp_multicast: bool,

    /// Enable SSDP broadcast discovery.
    pub discovery_ssdp_broadcast: bool,

    /// Capacity of the bus event channel.
    pub event_channel_capacity: usize,

    /// Interval between driver status reports (seconds).
    pub status_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = wemo_core::Config::default();
        Self {
            bind_port: 49480,
            interface_ip: core.interface_ip,
            scan_timeout_secs: core.scan_timeout_secs,
            poll_interval_secs: core.poll_interval_secs,
            motion_poll_interval_secs: core.motion_poll_interval_secs,
            discovery_ssdp_multicast: core.discovery_ssdp_multicast,
            discovery_ssdp_broadcast: core.discovery_ssdp_broadcast,
            event_channel_capacity: core.event_channel_capacity,
            status_interval_secs: core.status_interval_secs,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`; unparseable values are ignored with a warning.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = parsed(&lookup, "WEMO_BRIDGE_BIND_PORT") {
            self.bind_port = port;
        }
        if let Some(ip) = parsed(&lookup, "WEMO_BRIDGE_INTERFACE_IP") {
            self.interface_ip = Some(ip);
        }
        if let Some(secs) = parsed(&lookup, "WEMO_BRIDGE_SCAN_TIMEOUT") {
            self.scan_timeout_secs = secs;
        }
        if let Some(secs) = parsed(&lookup, "WEMO_BRIDGE_POLL_INTERVAL") {
            self.poll_interval_secs = secs;
        }
    }

    /// Converts to wemo-core's Config type and validates it.
    ///
    /// Runs before anything is built from the config, so a zero capacity or
    /// interval is reported instead of reaching the bus constructor.
    pub fn core_config(&self) -> Result<wemo_core::Config> {
        let core = self.to_core_config();
        core.validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid configuration")?;
        Ok(core)
    }

    /// Converts to wemo-core's Config type.
    pub fn to_core_config(&self) -> wemo_core::Config {
        wemo_core::Config {
            scan_timeout_secs: self.scan_timeout_secs,
            poll_interval_secs: self.poll_interval_secs,
            motion_poll_interval_secs: self.motion_poll_interval_secs,
            discovery_ssdp_multicast: self.discovery_ssdp_multicast,
            discovery_ssdp_broadcast: self.discovery_ssdp_broadcast,
            interface_ip: self.interface_ip,
            event_channel_capacity: self.event_channel_capacity,
            status_interval_secs: self.status_interval_secs,
            ..Default::default()
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let val = lookup(key)?;
    let parsed = val.parse().ok();
    if parsed.is_none() {
        log::warn!("Ignoring invalid {}={:?}", key, val);
    }
    parsed
}
