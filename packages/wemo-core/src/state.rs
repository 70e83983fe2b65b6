//! Core configuration.
//!
//! [`Config`] carries every tunable of the bridge engine. The server fills it
//! from YAML, environment and CLI; tests mostly use `Config::default()`.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::wemo::discovery::ssdp::SsdpConfig;
use crate::wemo::discovery::DiscoveryConfig;

/// Bridge engine configuration. Every field has a default.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Discovery
    /// Receive window of one scan (seconds). Scans run back to back.
    pub scan_timeout_secs: u64,

    /// Enable SSDP multicast discovery.
    pub discovery_ssdp_multicast: bool,

    /// Enable SSDP broadcast discovery.
    pub discovery_ssdp_broadcast: bool,

    /// Number of M-SEARCH packets to send per scan.
    pub ssdp_send_count: u64,

    /// Delay between M-SEARCH packet retries (milliseconds).
    pub ssdp_retry_delay_ms: u64,

    /// Only scan on the interface with this address (all interfaces if unset).
    pub interface_ip: Option<Ipv4Addr>,

    /// Timeout for fetching one `setup.xml` (seconds).
    pub description_fetch_timeout_secs: u64,

    // Polling
    /// Poll interval for switches and sockets (seconds).
    pub poll_interval_secs: u64,

    /// Poll interval for motion sensors (seconds).
    pub motion_poll_interval_secs: u64,

    // Bus
    /// Capacity of the bus event broadcast channel.
    pub event_channel_capacity: usize,

    /// Interval between driver status reports on the bus (seconds).
    pub status_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 3,
            discovery_ssdp_multicast: true,
            discovery_ssdp_broadcast: false,
            ssdp_send_count: 3,
            ssdp_retry_delay_ms: 800,
            interface_ip: None,
            description_fetch_timeout_secs: 2,
            poll_interval_secs: 5,
            motion_poll_interval_secs: 2,
            event_channel_capacity: 256,
            status_interval_secs: 30,
        }
    }
}

impl Config {
    /// Validates that every value is usable at runtime.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        let nonzero = [
            ("scan_timeout_secs", self.scan_timeout_secs),
            ("poll_interval_secs", self.poll_interval_secs),
            ("motion_poll_interval_secs", self.motion_poll_interval_secs),
            ("description_fetch_timeout_secs", self.description_fetch_timeout_secs),
            ("ssdp_send_count", self.ssdp_send_count),
            ("status_interval_secs", self.status_interval_secs),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(format!("{name} must be > 0"));
            }
        }
        if self.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be > 0".into());
        }
        if !self.discovery_ssdp_multicast && !self.discovery_ssdp_broadcast {
            return Err("at least one SSDP discovery method must be enabled".into());
        }
        Ok(())
    }

    /// Transport-level discovery settings derived from this config.
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            ssdp_multicast_enabled: self.discovery_ssdp_multicast,
            ssdp_broadcast_enabled: self.discovery_ssdp_broadcast,
            ssdp: SsdpConfig {
                send_count: self.ssdp_send_count,
                retry_delay: Duration::from_millis(self.ssdp_retry_delay_ms),
                discovery_timeout: Duration::from_secs(self.scan_timeout_secs),
                interface_ip: self.interface_ip,
                ..SsdpConfig::default()
            },
            description_fetch_timeout: Duration::from_secs(self.description_fetch_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.motion_poll_interval_secs, 2);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let config = Config {
            poll_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "poll_interval_secs must be > 0"
        );

        let config = Config {
            event_channel_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            status_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "status_interval_secs must be > 0"
        );
    }

    #[test]
    fn needs_one_discovery_method() {
        let config = Config {
            discovery_ssdp_multicast: false,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"poll_interval_secs": 10, "interface_ip": "10.0.1.2"}"#)
                .unwrap();
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.interface_ip, Some(Ipv4Addr::new(10, 0, 1, 2)));
        assert_eq!(config.scan_timeout_secs, 3);
    }

    #[test]
    fn discovery_config_follows_scan_window() {
        let config = Config {
            scan_timeout_secs: 7,
            interface_ip: Some(Ipv4Addr::new(10, 0, 0, 9)),
            ..Config::default()
        };
        let discovery = config.discovery_config();
        assert_eq!(discovery.ssdp.discovery_timeout, Duration::from_secs(7));
        assert_eq!(discovery.ssdp.interface_ip, Some(Ipv4Addr::new(10, 0, 0, 9)));
        assert!(!discovery.ssdp_broadcast_enabled);
    }
}
