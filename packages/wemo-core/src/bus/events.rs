use serde::Serialize;

use super::{ChannelKind, ChannelValue, DeviceIdentity, DeviceSignatures, DriverInfo, DriverStatus};

/// Everything observable on the local bus, streamed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BusEvent {
    /// The driver announced itself.
    DriverAnnounced {
        driver: DriverInfo,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Periodic driver heartbeat.
    DriverStatus {
        status: DriverStatus,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A device was announced.
    DeviceAnnounced {
        identity: DeviceIdentity,
        signatures: DeviceSignatures,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A capability channel was exported.
    ChannelExported {
        #[serde(rename = "channelId")]
        channel_id: String,
        #[serde(rename = "deviceId")]
        device_id: String,
        kind: ChannelKind,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A device and its channels were removed after a failed binding.
    DeviceWithdrawn {
        #[serde(rename = "deviceId")]
        device_id: String,
        #[serde(rename = "channelIds")]
        channel_ids: Vec<String>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A state channel published a value.
    StateChanged {
        #[serde(rename = "channelId")]
        channel_id: String,
        value: ChannelValue,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A motion channel fired.
    MotionDetected {
        #[serde(rename = "channelId")]
        channel_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}
