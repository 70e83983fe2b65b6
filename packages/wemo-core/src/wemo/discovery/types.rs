//! Shared types for WeMo appliance discovery.
//!
//! This module contains types used by the SSDP scanner, the device
//! description fetcher, and the engine that consumes their results.

use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Discovery method identifier for tracking which methods found each appliance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryMethod {
    /// SSDP multicast to 239.255.255.250:1900
    SsdpMulticast,
    /// SSDP broadcast (directed per-interface + limited 255.255.255.255)
    SsdpBroadcast,
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SsdpMulticast => write!(f, "SSDP multicast"),
            Self::SsdpBroadcast => write!(f, "SSDP broadcast"),
        }
    }
}

/// Errors that can occur during discovery and descriptor retrieval.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Failed to bind UDP socket for discovery.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// No usable network interfaces found.
    #[error("no usable network interfaces found")]
    NoInterfaces,

    /// All enabled discovery methods failed.
    #[error("all discovery methods failed: {0:?}")]
    AllMethodsFailed(Vec<(DiscoveryMethod, String)>),

    /// The device description could not be retrieved.
    #[error("failed to fetch device description from {url}: {reason}")]
    DescriptionFetch {
        /// The LOCATION URL that was requested.
        url: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The device description was retrieved but lacks required fields.
    #[error("invalid device description at {0}")]
    InvalidDescription(String),

    /// The SSDP LOCATION header is not a usable `http://host:port/...` URL.
    #[error("invalid LOCATION url: {0}")]
    InvalidLocation(String),
}

/// Convenient Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Network address used to reach an appliance's UPnP services.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NetworkHandle {
    /// IP address (or host name) of the appliance.
    pub host: String,
    /// UPnP HTTP port (WeMo firmware picks one of 49152-49155).
    pub port: u16,
}

impl NetworkHandle {
    /// Creates a new handle.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses the host and port out of an SSDP LOCATION URL.
    ///
    /// ```ignore
    /// let handle = NetworkHandle::from_location("http://192.168.1.20:49153/setup.xml")?;
    /// assert_eq!(handle.port, 49153);
    /// ```
    pub fn from_location(location: &str) -> DiscoveryResult<Self> {
        let invalid = || DiscoveryError::InvalidLocation(location.to_string());

        let rest = location.strip_prefix("http://").ok_or_else(invalid)?;
        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }

    /// Returns the `http://host:port` base URL for control requests.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Snapshot of one appliance as reported by a discovery scan.
///
/// Produced fresh by every scan; the registry keeps only the most recent one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Where to send control requests.
    pub handle: NetworkHandle,
    /// Serial number, stable across rediscoveries (the identity key).
    pub serial_number: String,
    /// MAC address as reported by the appliance (may be empty).
    pub mac_address: String,
    /// User-configured name.
    pub friendly_name: String,
    /// Raw UPnP device type, e.g. `urn:Belkin:device:controllee:1`.
    pub device_type: String,
    /// Model name (e.g., "Socket", "Insight").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Firmware version string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    /// Normalized UPnP UDN (e.g. `Socket-1_0-221239K11002F6`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udn: Option<String>,
}

/// Intermediate struct for appliance data before descriptor retrieval.
#[derive(Debug, Clone)]
pub struct DiscoveredAppliance {
    /// IP address the SSDP response came from.
    pub ip: String,
    /// UUID from the USN header (e.g. `Socket-1_0-221239K11002F6`), may be empty.
    pub uuid: String,
    /// SSDP LOCATION URL of the device description.
    pub location: String,
    /// Which discovery methods found this appliance.
    pub methods: HashSet<DiscoveryMethod>,
}

impl DiscoveredAppliance {
    /// Creates a new discovered appliance from a single SSDP response.
    pub fn new(ip: String, uuid: String, location: String, method: DiscoveryMethod) -> Self {
        let mut methods = HashSet::new();
        methods.insert(method);
        Self {
            ip,
            uuid,
            location,
            methods,
        }
    }

    /// Key used to merge duplicate responses (USN UUID, else LOCATION).
    pub fn dedup_key(&self) -> &str {
        if self.uuid.is_empty() {
            &self.location
        } else {
            &self.uuid
        }
    }

    /// Merges another response for the same appliance into this one.
    pub fn merge(&mut self, other: DiscoveredAppliance) {
        self.methods.extend(other.methods);
    }
}

/// Normalizes a UPnP UUID as found in USN or UDN fields.
///
/// Strips the `uuid:` prefix and any `::urn:...` suffix.
pub fn normalize_uuid(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed
        .get(..5)
        .filter(|p| p.eq_ignore_ascii_case("uuid:"))
        .map(|_| &trimmed[5..])
        .unwrap_or(trimmed);

    match without_prefix.find("::") {
        Some(idx) => without_prefix[..idx].to_string(),
        None => without_prefix.to_string(),
    }
}

/// Virtual interface prefixes to filter out during discovery.
pub const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "lo", "docker", "veth", "br-", "virbr", "vmnet", "vbox", "tun", "tap",
];

/// Checks if an interface name belongs to a virtual/container interface.
pub fn is_virtual_interface(name: &str) -> bool {
    let name_lower = name.to_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| name_lower.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_from_location_extracts_host_and_port() {
        let handle = NetworkHandle::from_location("http://192.168.1.20:49153/setup.xml").unwrap();
        assert_eq!(handle.host, "192.168.1.20");
        assert_eq!(handle.port, 49153);
        assert_eq!(handle.base_url(), "http://192.168.1.20:49153");
        assert_eq!(handle.to_string(), "192.168.1.20:49153");
    }

    #[test]
    fn handle_from_location_rejects_missing_port() {
        assert!(matches!(
            NetworkHandle::from_location("http://192.168.1.20/setup.xml"),
            Err(DiscoveryError::InvalidLocation(_))
        ));
    }

    #[test]
    fn handle_from_location_rejects_non_http() {
        assert!(NetworkHandle::from_location("https://192.168.1.20:49153/setup.xml").is_err());
        assert!(NetworkHandle::from_location("garbage").is_err());
        assert!(NetworkHandle::from_location("http://:49153/setup.xml").is_err());
    }

    #[test]
    fn normalize_uuid_strips_prefix_and_suffix() {
        assert_eq!(
            normalize_uuid("uuid:Socket-1_0-221239K11002F6::urn:Belkin:service:basicevent:1"),
            "Socket-1_0-221239K11002F6"
        );
        assert_eq!(
            normalize_uuid("UUID:Insight-1_0-231550K1200093"),
            "Insight-1_0-231550K1200093"
        );
        assert_eq!(normalize_uuid("Sensor-1_0-2211"), "Sensor-1_0-2211");
    }

    #[test]
    fn dedup_key_falls_back_to_location() {
        let appliance = DiscoveredAppliance::new(
            "10.0.1.5".into(),
            String::new(),
            "http://10.0.1.5:49153/setup.xml".into(),
            DiscoveryMethod::SsdpMulticast,
        );
        assert_eq!(appliance.dedup_key(), "http://10.0.1.5:49153/setup.xml");
    }

    #[test]
    fn merge_unions_methods() {
        let mut a = DiscoveredAppliance::new(
            "10.0.1.5".into(),
            "Socket-1_0-1".into(),
            "http://10.0.1.5:49153/setup.xml".into(),
            DiscoveryMethod::SsdpMulticast,
        );
        let b = DiscoveredAppliance::new(
            "10.0.1.5".into(),
            "Socket-1_0-1".into(),
            "http://10.0.1.5:49153/setup.xml".into(),
            DiscoveryMethod::SsdpBroadcast,
        );
        a.merge(b);
        assert_eq!(a.methods.len(), 2);
    }

    #[test]
    fn test_is_virtual_interface() {
        assert!(is_virtual_interface("lo"));
        assert!(is_virtual_interface("docker0"));
        assert!(is_virtual_interface("veth1234"));
        assert!(!is_virtual_interface("eth0"));
        assert!(!is_virtual_interface("wlan0"));
    }
}
