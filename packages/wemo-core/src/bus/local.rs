//! In-process bus implementation.
//!
//! [`LocalBus`] keeps every announced device and exported channel in memory,
//! remembers the last value pushed on each channel, and mirrors every
//! announcement and push onto a `tokio::sync::broadcast` channel that the
//! WebSocket handler subscribes to.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use super::{
    Bus, BusError, BusEvent, BusHandle, Channel, ChannelCommand, ChannelKind, ChannelValue,
    CommandError, CommandHandler, DeviceIdentity, DeviceSignatures, DriverInfo, DriverStatus,
};
use crate::utils::now_millis;

struct AnnouncedDevice {
    channel_ids: Vec<String>,
}

struct ChannelEntry {
    kind: ChannelKind,
    handler: Option<Arc<dyn CommandHandler>>,
    last_value: Option<ChannelValue>,
    last_event_at: Option<u64>,
}

/// Read-only view of one exported channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSnapshot {
    pub id: String,
    pub kind: ChannelKind,
    /// Whether the channel accepts inbound commands.
    pub commandable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_value: Option<ChannelValue>,
    /// Unix timestamp (ms) of the last motion event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<u64>,
}

struct Inner {
    tx: broadcast::Sender<BusEvent>,
    driver: RwLock<Option<DriverInfo>>,
    status: RwLock<Option<DriverStatus>>,
    devices: DashMap<String, AnnouncedDevice>,
    channels: DashMap<String, ChannelEntry>,
}

impl Inner {
    fn emit(&self, event: BusEvent) {
        tracing::debug!(?event, "bus_event");
        if let Err(e) = self.tx.send(event) {
            log::trace!("[Bus] No broadcast receivers: {}", e);
        }
    }
}

/// In-process [`Bus`] with a broadcast event stream.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<Inner>,
}

impl LocalBus {
    /// Creates a bus whose event stream buffers `capacity` events per subscriber.
    ///
    /// # Panics
    /// Panics if `capacity` is zero; `Config::validate` rejects that value.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                tx,
                driver: RwLock::new(None),
                status: RwLock::new(None),
                devices: DashMap::new(),
                channels: DashMap::new(),
            }),
        }
    }

    /// Returns a new receiver for the bus event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.inner.tx.subscribe()
    }

    /// The announced driver, if any.
    pub fn driver(&self) -> Option<DriverInfo> {
        self.inner.driver.read().clone()
    }

    /// The last driver heartbeat, if any.
    pub fn status(&self) -> Option<DriverStatus> {
        self.inner.status.read().clone()
    }

    /// Snapshot of one channel.
    pub fn channel(&self, channel_id: &str) -> Option<ChannelSnapshot> {
        self.inner
            .channels
            .get(channel_id)
            .map(|entry| snapshot(channel_id, &entry))
    }

    /// Snapshots of every channel exported under a device, in export order.
    pub fn device_channels(&self, device_id: &str) -> Vec<ChannelSnapshot> {
        let ids = match self.inner.devices.get(device_id) {
            Some(device) => device.channel_ids.clone(),
            None => return Vec::new(),
        };
        ids.iter().filter_map(|id| self.channel(id)).collect()
    }

    /// Routes an inbound command to the channel's handler.
    ///
    /// The handler's result is returned as-is; failures are not retried.
    pub async fn dispatch(
        &self,
        channel_id: &str,
        command: ChannelCommand,
    ) -> Result<(), CommandError> {
        // Clone the handler out so no map guard is held across the await
        let handler = {
            let entry = self
                .inner
                .channels
                .get(channel_id)
                .ok_or_else(|| CommandError::UnknownChannel(channel_id.to_string()))?;
            entry
                .handler
                .clone()
                .ok_or_else(|| CommandError::NotCommandable(channel_id.to_string()))?
        };

        log::debug!("[Bus] Dispatching {:?} to {}", command, channel_id);
        handler.handle(command).await
    }
}

fn snapshot(id: &str, entry: &ChannelEntry) -> ChannelSnapshot {
    ChannelSnapshot {
        id: id.to_string(),
        kind: entry.kind,
        commandable: entry.handler.is_some(),
        last_value: entry.last_value,
        last_event_at: entry.last_event_at,
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn announce_driver(&self, info: DriverInfo) -> Result<(), BusError> {
        log::info!("[Bus] Driver announced: {} ({})", info.name, info.id);
        *self.inner.driver.write() = Some(info.clone());
        self.inner.emit(BusEvent::DriverAnnounced {
            driver: info,
            timestamp: now_millis(),
        });
        Ok(())
    }

    async fn report_status(&self, status: DriverStatus) -> Result<(), BusError> {
        *self.inner.status.write() = Some(status.clone());
        self.inner.emit(BusEvent::DriverStatus {
            status,
            timestamp: now_millis(),
        });
        Ok(())
    }

    async fn announce_device(
        &self,
        identity: DeviceIdentity,
        signatures: DeviceSignatures,
    ) -> Result<BusHandle, BusError> {
        if identity.id.is_empty() {
            return Err(BusError::Rejected("device id is empty".into()));
        }

        match self.inner.devices.entry(identity.id.clone()) {
            Entry::Occupied(_) => return Err(BusError::AlreadyAnnounced(identity.id)),
            Entry::Vacant(slot) => {
                slot.insert(AnnouncedDevice {
                    channel_ids: Vec::new(),
                });
            }
        }

        let handle = BusHandle::new(identity.id.clone());
        self.inner.emit(BusEvent::DeviceAnnounced {
            identity,
            signatures,
            timestamp: now_millis(),
        });
        Ok(handle)
    }

    async fn export_channel(
        &self,
        handle: &BusHandle,
        kind: ChannelKind,
        handler: Option<Arc<dyn CommandHandler>>,
    ) -> Result<Arc<dyn Channel>, BusError> {
        let channel_id = kind.channel_id(handle);

        {
            let mut device = self
                .inner
                .devices
                .get_mut(handle.device_id())
                .ok_or_else(|| BusError::UnknownDevice(handle.device_id().to_string()))?;

            match self.inner.channels.entry(channel_id.clone()) {
                Entry::Occupied(_) => return Err(BusError::DuplicateChannel(channel_id)),
                Entry::Vacant(slot) => {
                    slot.insert(ChannelEntry {
                        kind,
                        handler,
                        last_value: None,
                        last_event_at: None,
                    });
                }
            }
            device.channel_ids.push(channel_id.clone());
        }

        self.inner.emit(BusEvent::ChannelExported {
            channel_id: channel_id.clone(),
            device_id: handle.device_id().to_string(),
            kind,
            timestamp: now_millis(),
        });

        Ok(Arc::new(LocalChannel {
            id: channel_id,
            kind,
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn withdraw_device(&self, handle: &BusHandle) -> Result<(), BusError> {
        let (device_id, device) = self
            .inner
            .devices
            .remove(handle.device_id())
            .ok_or_else(|| BusError::UnknownDevice(handle.device_id().to_string()))?;

        for channel_id in &device.channel_ids {
            self.inner.channels.remove(channel_id);
        }

        log::info!(
            "[Bus] Withdrew {} ({} channel(s))",
            device_id,
            device.channel_ids.len()
        );
        self.inner.emit(BusEvent::DeviceWithdrawn {
            device_id,
            channel_ids: device.channel_ids,
            timestamp: now_millis(),
        });
        Ok(())
    }
}

/// Channel handle returned by [`LocalBus::export_channel`].
struct LocalChannel {
    id: String,
    kind: ChannelKind,
    inner: Arc<Inner>,
}

impl Channel for LocalChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn push_state(&self, value: ChannelValue) {
        if let Some(mut entry) = self.inner.channels.get_mut(&self.id) {
            entry.last_value = Some(value);
        }
        self.inner.emit(BusEvent::StateChanged {
            channel_id: self.id.clone(),
            value,
            timestamp: now_millis(),
        });
    }

    fn push_event(&self) {
        let timestamp = now_millis();
        if let Some(mut entry) = self.inner.channels.get_mut(&self.id) {
            entry.last_event_at = Some(timestamp);
        }
        self.inner.emit(BusEvent::MotionDetected {
            channel_id: self.id.clone(),
            timestamp,
        });
    }
}
