//! Multi-method WeMo appliance discovery.
//!
//! # Architecture
//!
//! ```text
//! DiscoveryCoordinator
//! ├── SSDP Multicast (239.255.255.250:1900)
//! └── SSDP Broadcast (directed per-interface + 255.255.255.255)
//! ```
//!
//! # Discovery Pipeline
//!
//! 1. Run all enabled methods in parallel
//! 2. Merge duplicate responses by USN UUID
//! 3. Fetch `setup.xml` per appliance on demand ([`DiscoveryCoordinator::fetch_descriptor`])

pub mod ssdp;
pub mod types;

pub use types::{
    normalize_uuid, DeviceDescriptor, DiscoveredAppliance, DiscoveryError, DiscoveryMethod,
    DiscoveryResult, NetworkHandle,
};

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use std::time::Duration;

use self::ssdp::SsdpConfig;

/// Configuration for the discovery coordinator.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Enable SSDP multicast discovery.
    pub ssdp_multicast_enabled: bool,
    /// Enable SSDP broadcast discovery.
    pub ssdp_broadcast_enabled: bool,
    /// SSDP configuration.
    pub ssdp: SsdpConfig,
    /// Timeout for fetching device descriptions.
    pub description_fetch_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ssdp_multicast_enabled: true,
            ssdp_broadcast_enabled: false,
            ssdp: SsdpConfig::default(),
            description_fetch_timeout: Duration::from_secs(2),
        }
    }
}

/// Coordinates SSDP discovery methods and device description retrieval.
pub struct DiscoveryCoordinator {
    config: DiscoveryConfig,
    http_client: Client,
}

impl DiscoveryCoordinator {
    /// Creates a new coordinator sharing the given HTTP client.
    pub fn new(config: DiscoveryConfig, http_client: Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Runs every enabled method in parallel for one `window` and merges the results.
    ///
    /// Fails only when every enabled method failed; an empty network is `Ok(vec![])`.
    pub async fn discover(&self, window: Duration) -> DiscoveryResult<Vec<DiscoveredAppliance>> {
        let ssdp_config = SsdpConfig {
            discovery_timeout: window,
            ..self.config.ssdp.clone()
        };

        log::debug!(
            "[Discovery] Scanning for {}ms (multicast={}, broadcast={})",
            window.as_millis(),
            self.config.ssdp_multicast_enabled,
            self.config.ssdp_broadcast_enabled
        );

        let (multicast_result, broadcast_result) = tokio::join!(
            async {
                if self.config.ssdp_multicast_enabled {
                    Some(ssdp::discover_multicast(&ssdp_config).await)
                } else {
                    None
                }
            },
            async {
                if self.config.ssdp_broadcast_enabled {
                    Some(ssdp::discover_broadcast(&ssdp_config).await)
                } else {
                    None
                }
            }
        );

        let mut all_discovered = Vec::new();
        let mut method_errors = Vec::new();

        for (method, result) in [
            (DiscoveryMethod::SsdpMulticast, multicast_result),
            (DiscoveryMethod::SsdpBroadcast, broadcast_result),
        ] {
            match result {
                Some(Ok(appliances)) => {
                    log::debug!("[Discovery] {} found {} appliance(s)", method, appliances.len());
                    all_discovered.extend(appliances);
                }
                Some(Err(e)) => {
                    log::warn!("[Discovery] {} failed: {}", method, e);
                    method_errors.push((method, e.to_string()));
                }
                None => {}
            }
        }

        if all_discovered.is_empty() && !method_errors.is_empty() {
            return Err(DiscoveryError::AllMethodsFailed(method_errors));
        }

        Ok(ssdp::dedup_appliances(all_discovered))
    }

    /// Fetches and parses the device description at an SSDP LOCATION.
    pub async fn fetch_descriptor(&self, location: &str) -> DiscoveryResult<DeviceDescriptor> {
        let handle = NetworkHandle::from_location(location)?;
        let fetch_error = |reason: String| DiscoveryError::DescriptionFetch {
            url: location.to_string(),
            reason,
        };

        let response = self
            .http_client
            .get(location)
            .timeout(self.config.description_fetch_timeout)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        parse_device_description(&body, handle)
            .ok_or_else(|| DiscoveryError::InvalidDescription(location.to_string()))
    }
}

/// Parses a WeMo `setup.xml` device description.
///
/// `deviceType`, `friendlyName` and `serialNumber` are required. Only the first
/// occurrence of each element is used.
pub fn parse_device_description(xml: &str, handle: NetworkHandle) -> Option<DeviceDescriptor> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut device_type = None;
    let mut friendly_name = None;
    let mut serial_number = None;
    let mut mac_address = None;
    let mut model_name = None;
    let mut firmware_version = None;
    let mut udn = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let slot = match e.local_name().as_ref() {
                    b"deviceType" => Some(&mut device_type),
                    b"friendlyName" => Some(&mut friendly_name),
                    b"serialNumber" => Some(&mut serial_number),
                    b"macAddress" => Some(&mut mac_address),
                    b"modelName" => Some(&mut model_name),
                    b"firmwareVersion" => Some(&mut firmware_version),
                    b"UDN" => Some(&mut udn),
                    _ => None,
                };
                if let Some(slot) = slot.filter(|s| s.is_none()) {
                    *slot = reader
                        .read_text(e.name())
                        .ok()
                        .map(|t| html_escape::decode_html_entities(&t).trim().to_string())
                        .filter(|t| !t.is_empty());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::trace!("[Discovery] Error parsing device description: {:?}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Some(DeviceDescriptor {
        handle,
        serial_number: serial_number?,
        mac_address: mac_address.unwrap_or_default(),
        friendly_name: friendly_name?,
        device_type: device_type?,
        model_name,
        firmware_version,
        udn: udn.map(|u| normalize_uuid(&u)),
    })
}
