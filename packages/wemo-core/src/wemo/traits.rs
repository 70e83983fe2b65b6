//! Trait abstractions for WeMo appliance operations.
//!
//! These traits enable dependency injection for testability and modularity.
//! Services depend on traits rather than concrete implementations.

use std::time::Duration;

use async_trait::async_trait;

use super::discovery::{DeviceDescriptor, DiscoveredAppliance, DiscoveryResult, NetworkHandle};
use super::soap::SoapResult;

/// Trait for appliance discovery operations.
///
/// Used by `DiscoveryService` to find appliances and resolve their descriptors.
#[async_trait]
pub trait ApplianceDiscovery: Send + Sync {
    /// Scans the network for appliances for at most `timeout`.
    async fn discover(&self, timeout: Duration) -> DiscoveryResult<Vec<DiscoveredAppliance>>;

    /// Retrieves the device descriptor from an SSDP LOCATION URL.
    async fn fetch_descriptor(&self, location: &str) -> DiscoveryResult<DeviceDescriptor>;
}

/// Trait for appliance control and telemetry.
///
/// Used by the on/off command handler and the per-device synchronizer.
#[async_trait]
pub trait ApplianceControl: Send + Sync {
    /// Switches the appliance relay on or off.
    async fn set_power(&self, handle: &NetworkHandle, on: bool) -> SoapResult<()>;

    /// Reads the raw binary state.
    ///
    /// Non-zero means "on" for switches and "motion present" for sensors.
    async fn get_binary_state(&self, handle: &NetworkHandle) -> SoapResult<u8>;

    /// Reads the instantaneous power draw in milliwatts (Insight only).
    async fn get_power_sample(&self, handle: &NetworkHandle) -> SoapResult<u64>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Combined Traits (for trait objects)
// ─────────────────────────────────────────────────────────────────────────────

/// Combined trait for all WeMo operations.
///
/// Used by the composition root to share one client across services.
#[async_trait]
pub trait WemoClient: ApplianceDiscovery + ApplianceControl {}

/// Blanket implementation for any type implementing both traits.
impl<T: ApplianceDiscovery + ApplianceControl> WemoClient for T {}
