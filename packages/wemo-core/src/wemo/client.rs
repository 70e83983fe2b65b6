//! High-level WeMo client commands.
//!
//! Relay control, binary-state reads and Insight power telemetry on top of
//! the SOAP transport, plus [`WemoClientImpl`] which implements the trait
//! abstractions used by the engine.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::discovery::{
    DeviceDescriptor, DiscoveredAppliance, DiscoveryConfig, DiscoveryCoordinator, DiscoveryResult,
    NetworkHandle,
};
use super::services::WemoService;
use super::soap::{SoapError, SoapRequestBuilder, SoapResult};
use super::traits::{ApplianceControl, ApplianceDiscovery};
use super::utils::{extract_xml_text, parse_binary_state, parse_insight_power_mw};

// ─────────────────────────────────────────────────────────────────────────────
// BasicEvent
// ─────────────────────────────────────────────────────────────────────────────

/// Switches the relay via `SetBinaryState`.
///
/// The appliance answers with the resulting state; `Error` means the command
/// was rejected even though the HTTP exchange succeeded.
pub async fn set_binary_state(client: &Client, handle: &NetworkHandle, on: bool) -> SoapResult<()> {
    let response = SoapRequestBuilder::new(client, handle)
        .service(WemoService::BasicEvent)
        .action("SetBinaryState")
        .arg("BinaryState", if on { "1" } else { "0" })
        .send()
        .await?;

    match extract_xml_text(&response, "BinaryState") {
        Some(value) if value.eq_ignore_ascii_case("error") => Err(SoapError::Fault(format!(
            "{} rejected SetBinaryState({})",
            handle,
            u8::from(on)
        ))),
        _ => Ok(()),
    }
}

/// Reads the raw binary state via `GetBinaryState`.
pub async fn get_binary_state(client: &Client, handle: &NetworkHandle) -> SoapResult<u8> {
    let response = SoapRequestBuilder::new(client, handle)
        .service(WemoService::BasicEvent)
        .action("GetBinaryState")
        .send()
        .await?;

    parse_binary_state_response(&response)
}

fn parse_binary_state_response(xml: &str) -> SoapResult<u8> {
    let value = extract_xml_text(xml, "BinaryState")
        .ok_or_else(|| SoapError::Parse("missing BinaryState".into()))?;
    parse_binary_state(&value)
        .ok_or_else(|| SoapError::Parse(format!("unexpected BinaryState {:?}", value)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Insight
// ─────────────────────────────────────────────────────────────────────────────

/// Reads the instantaneous power draw (milliwatts) via `GetInsightParams`.
pub async fn get_insight_power(client: &Client, handle: &NetworkHandle) -> SoapResult<u64> {
    let response = SoapRequestBuilder::new(client, handle)
        .service(WemoService::Insight)
        .action("GetInsightParams")
        .send()
        .await?;

    parse_insight_response(&response)
}

fn parse_insight_response(xml: &str) -> SoapResult<u64> {
    let value = extract_xml_text(xml, "InsightParams")
        .ok_or_else(|| SoapError::Parse("missing InsightParams".into()))?;
    parse_insight_power_mw(&value)
        .ok_or_else(|| SoapError::Parse(format!("unexpected InsightParams {:?}", value)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Concrete WeMo client backed by SSDP discovery and SOAP control.
pub struct WemoClientImpl {
    /// HTTP client shared by SOAP calls and description fetches.
    client: Client,
    discovery: DiscoveryCoordinator,
}

impl std::fmt::Debug for WemoClientImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WemoClientImpl")
            .field("client", &"Client")
            .finish_non_exhaustive()
    }
}

impl WemoClientImpl {
    /// Creates a client with default discovery settings.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self::with_discovery_config(client, DiscoveryConfig::default())
    }

    /// Creates a client with custom discovery configuration.
    #[must_use]
    pub fn with_discovery_config(client: Client, discovery_config: DiscoveryConfig) -> Self {
        Self {
            discovery: DiscoveryCoordinator::new(discovery_config, client.clone()),
            client,
        }
    }
}

#[async_trait]
impl ApplianceDiscovery for WemoClientImpl {
    async fn discover(&self, timeout: Duration) -> DiscoveryResult<Vec<DiscoveredAppliance>> {
        self.discovery.discover(timeout).await
    }

    async fn fetch_descriptor(&self, location: &str) -> DiscoveryResult<DeviceDescriptor> {
        self.discovery.fetch_descriptor(location).await
    }
}

#[async_trait]
impl ApplianceControl for WemoClientImpl {
    async fn set_power(&self, handle: &NetworkHandle, on: bool) -> SoapResult<()> {
        set_binary_state(&self.client, handle, on).await
    }

    async fn get_binary_state(&self, handle: &NetworkHandle) -> SoapResult<u8> {
        get_binary_state(&self.client, handle).await
    }

    async fn get_power_sample(&self, handle: &NetworkHandle) -> SoapResult<u64> {
        get_insight_power(&self.client, handle).await
    }
}
