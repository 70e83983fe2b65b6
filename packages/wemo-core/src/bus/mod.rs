//! Home-automation bus boundary.
//!
//! The engine talks to the bus only through the [`Bus`], [`Channel`] and
//! [`CommandHandler`] traits:
//!
//! - the driver announces itself once ([`Bus::announce_driver`]),
//! - each bound appliance is announced with its identity and signatures
//!   ([`Bus::announce_device`]),
//! - one channel per capability is exported under that device
//!   ([`Bus::export_channel`]); on/off channels carry a command handler.
//!
//! [`LocalBus`] is the in-process implementation served over HTTP/WebSocket.

mod events;
mod local;

pub use events::BusEvent;
pub use local::{ChannelSnapshot, LocalBus};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors returned by bus registration calls.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// The bus refused the announcement.
    #[error("bus rejected registration: {0}")]
    Rejected(String),

    /// A device with this id was already announced.
    #[error("device already announced: {0}")]
    AlreadyAnnounced(String),

    /// The handle does not refer to an announced device.
    #[error("unknown device handle: {0}")]
    UnknownDevice(String),

    /// The device already exports a channel of this kind.
    #[error("channel already exported: {0}")]
    DuplicateChannel(String),
}

/// Errors returned when applying an inbound command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// No channel with this id exists.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// The channel does not accept commands.
    #[error("channel {0} does not accept commands")]
    NotCommandable(String),

    /// The appliance rejected the command or could not be reached.
    #[error("appliance command failed: {0}")]
    Appliance(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Driver announcement payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    /// Reverse-DNS driver identifier.
    pub id: String,
    /// Human-readable driver name.
    pub name: String,
    /// Driver version.
    pub version: String,
}

/// Periodic driver heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatus {
    /// Reverse-DNS driver identifier.
    pub id: String,
    /// Devices currently in the registry.
    pub devices: usize,
    /// Seconds since the driver started.
    pub uptime_secs: u64,
}

/// Identity of one appliance on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Stable device id (the appliance serial number).
    pub id: String,
    /// Driver tag owning this device.
    pub driver: String,
    /// Friendly name at announcement time.
    pub name: String,
    /// MAC address as reported by the appliance.
    pub mac_address: String,
}

/// Presentation metadata passed through to the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSignatures {
    pub manufacturer: String,
    pub product_name: String,
    /// `Switch` or `Motion`.
    pub product_type: String,
    /// Raw UPnP device type.
    pub product_model_id: String,
    /// `socket`, `switch` or `motion`.
    pub thing_type: String,
}

/// Opaque handle to an announced device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusHandle(String);

impl BusHandle {
    /// Creates a handle for the given device id.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self(device_id.into())
    }

    /// The announced device id.
    pub fn device_id(&self) -> &str {
        &self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of a capability channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    /// Relay on/off state plus the set-on/off command.
    OnOff,
    /// Instantaneous power draw in watts.
    Power,
    /// Motion-detected events.
    Motion,
}

impl ChannelKind {
    /// Path segment used in channel ids (`{device}/{slug}`).
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            Self::OnOff => "on-off",
            Self::Power => "power",
            Self::Motion => "motion",
        }
    }

    /// Builds the channel id for this kind under a device.
    #[must_use]
    pub fn channel_id(&self, handle: &BusHandle) -> String {
        format!("{}/{}", handle.device_id(), self.slug())
    }
}

/// Value pushed on a state channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ChannelValue {
    OnOff(bool),
    /// Watts.
    Power(f64),
}

/// Inbound command delivered to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ChannelCommand {
    /// Switch the appliance relay on (`true`) or off (`false`).
    SetOnOff(bool),
}

/// An exported capability channel.
pub trait Channel: Send + Sync {
    /// Bus-wide channel id.
    fn id(&self) -> &str;

    fn kind(&self) -> ChannelKind;

    /// Publishes the current state.
    fn push_state(&self, value: ChannelValue);

    /// Fires a stateless event (motion detected).
    fn push_event(&self);
}

/// Receives inbound commands for a channel.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Applies the command, reporting failure to the caller.
    async fn handle(&self, command: ChannelCommand) -> Result<(), CommandError>;
}

/// The bus client used by the driver.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Announces the driver itself. Called once at startup.
    async fn announce_driver(&self, info: DriverInfo) -> Result<(), BusError>;

    /// Publishes a driver heartbeat.
    async fn report_status(&self, status: DriverStatus) -> Result<(), BusError>;

    /// Announces a device and returns the handle channels are exported under.
    async fn announce_device(
        &self,
        identity: DeviceIdentity,
        signatures: DeviceSignatures,
    ) -> Result<BusHandle, BusError>;

    /// Exports one capability channel under an announced device.
    async fn export_channel(
        &self,
        handle: &BusHandle,
        kind: ChannelKind,
        handler: Option<Arc<dyn CommandHandler>>,
    ) -> Result<Arc<dyn Channel>, BusError>;

    /// Removes an announced device together with every channel exported
    /// under it.
    async fn withdraw_device(&self, handle: &BusHandle) -> Result<(), BusError>;
}
