//! Exports one bus channel per capability of a newly classified appliance.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::classifier::Capability;
use super::registry::DeviceRecord;
use crate::bus::{
    Bus, BusError, BusHandle, Channel, ChannelCommand, ChannelKind, CommandError, CommandHandler,
    DeviceIdentity, DeviceSignatures,
};
use crate::protocol_constants::{DEVICE_DRIVER_TAG, MANUFACTURER, PRODUCT_NAME};
use crate::wemo::ApplianceControl;

/// Binding failure.
///
/// `Announce` is fatal for the process; `Export` only abandons the device.
#[derive(Debug, Error)]
pub enum BindError {
    /// The device identity could not be announced on the bus.
    #[error("failed to announce device {serial}: {source}")]
    Announce {
        serial: String,
        #[source]
        source: BusError,
    },

    /// A capability channel could not be exported.
    #[error("failed to export {kind:?} channel for {serial}: {source}")]
    Export {
        serial: String,
        kind: ChannelKind,
        #[source]
        source: BusError,
    },
}

/// Channels exported for one device; absent kinds were not in its capability set.
pub struct DeviceChannels {
    pub handle: BusHandle,
    pub on_off: Option<Arc<dyn Channel>>,
    pub power: Option<Arc<dyn Channel>>,
    pub motion: Option<Arc<dyn Channel>>,
}

impl DeviceChannels {
    /// Ids of the exported channels, in export order.
    pub fn ids(&self) -> Vec<String> {
        [&self.on_off, &self.power, &self.motion]
            .into_iter()
            .flatten()
            .map(|c| c.id().to_string())
            .collect()
    }
}

/// Translates on/off commands into appliance power commands.
///
/// Reads the record's current handle on every command so address changes
/// picked up by discovery take effect immediately.
struct OnOffCommandHandler {
    record: Arc<DeviceRecord>,
    control: Arc<dyn ApplianceControl>,
}

#[async_trait]
impl CommandHandler for OnOffCommandHandler {
    async fn handle(&self, command: ChannelCommand) -> Result<(), CommandError> {
        let ChannelCommand::SetOnOff(on) = command;
        let handle = self.record.handle();
        log::info!(
            "[Binder] Switching {} ({}) {}",
            self.record.serial(),
            handle,
            if on { "on" } else { "off" }
        );
        self.control.set_power(&handle, on).await.map_err(|e| {
            log::warn!("[Binder] Command for {} failed: {}", self.record.serial(), e);
            CommandError::Appliance(e.to_string())
        })
    }
}

/// Creates the bus identity and channel bindings for classified devices.
pub struct ChannelBinder {
    bus: Arc<dyn Bus>,
    control: Arc<dyn ApplianceControl>,
}

impl ChannelBinder {
    pub fn new(bus: Arc<dyn Bus>, control: Arc<dyn ApplianceControl>) -> Self {
        Self { bus, control }
    }

    /// Announces the device and exports one channel per capability.
    pub async fn bind(&self, record: &Arc<DeviceRecord>) -> Result<Arc<DeviceChannels>, BindError> {
        let serial = record.serial().to_string();
        let (identity, signatures) = identity_for(record);

        let handle = self
            .bus
            .announce_device(identity, signatures)
            .await
            .map_err(|source| BindError::Announce {
                serial: serial.clone(),
                source,
            })?;

        let mut channels = DeviceChannels {
            handle,
            on_off: None,
            power: None,
            motion: None,
        };

        for capability in record.capabilities().iter() {
            let (kind, handler, slot) = match capability {
                Capability::Switchable => {
                    let handler: Arc<dyn CommandHandler> = Arc::new(OnOffCommandHandler {
                        record: Arc::clone(record),
                        control: Arc::clone(&self.control),
                    });
                    (ChannelKind::OnOff, Some(handler), &mut channels.on_off)
                }
                Capability::PowerMetered => (ChannelKind::Power, None, &mut channels.power),
                Capability::MotionSensing => (ChannelKind::Motion, None, &mut channels.motion),
            };

            let channel = match self.bus.export_channel(&channels.handle, kind, handler).await {
                Ok(channel) => channel,
                Err(source) => {
                    // Channels exported so far must not outlive the abandoned device
                    self.withdraw(&channels.handle).await;
                    return Err(BindError::Export {
                        serial,
                        kind,
                        source,
                    });
                }
            };
            log::debug!("[Binder] Exported {}", channel.id());
            *slot = Some(channel);
        }

        log::info!(
            "[Binder] Bound {} with {} channel(s)",
            serial,
            record.capabilities().len()
        );
        Ok(Arc::new(channels))
    }

    async fn withdraw(&self, handle: &BusHandle) {
        if let Err(e) = self.bus.withdraw_device(handle).await {
            log::warn!("[Binder] Failed to withdraw {}: {}", handle.device_id(), e);
        }
    }
}

/// Builds the identity and signature payloads announced for a device.
pub fn identity_for(record: &DeviceRecord) -> (DeviceIdentity, DeviceSignatures) {
    let descriptor = record.descriptor();
    let thing_type = record.thing_type();

    let identity = DeviceIdentity {
        id: record.serial().to_string(),
        driver: DEVICE_DRIVER_TAG.to_string(),
        name: descriptor.friendly_name,
        mac_address: descriptor.mac_address,
    };
    let signatures = DeviceSignatures {
        manufacturer: MANUFACTURER.to_string(),
        product_name: PRODUCT_NAME.to_string(),
        product_type: thing_type.product_type().to_string(),
        product_model_id: descriptor.device_type,
        thing_type: thing_type.as_str().to_string(),
    };
    (identity, signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{ChannelValue, LocalBus};
    use crate::services::classifier::{CapabilitySet, ThingType};
    use crate::services::registry::DeviceRegistry;
    use crate::services::test_support::{descriptor, FakeAppliance, FakeBus};

    fn record(
        registry: &DeviceRegistry,
        serial: &str,
        caps: &[Capability],
        thing: ThingType,
    ) -> Arc<DeviceRecord> {
        registry
            .insert(
                descriptor(serial, "Lamp", "urn:Belkin:device:insight:1"),
                CapabilitySet::of(caps),
                thing,
            )
            .unwrap()
    }

    #[tokio::test]
    async fn binds_one_channel_per_capability() {
        let registry = DeviceRegistry::new();
        let bus = Arc::new(LocalBus::new(16));
        let binder = ChannelBinder::new(bus.clone(), Arc::new(FakeAppliance::default()));
        let record = record(
            &registry,
            "S1",
            &[Capability::Switchable, Capability::PowerMetered],
            ThingType::Socket,
        );

        let channels = binder.bind(&record).await.unwrap();
        assert_eq!(channels.ids(), ["S1/on-off", "S1/power"]);
        assert!(channels.motion.is_none());
        assert!(bus.channel("S1/on-off").unwrap().commandable);
        assert!(!bus.channel("S1/power").unwrap().commandable);
    }

    #[tokio::test]
    async fn on_off_command_reaches_appliance() {
        let registry = DeviceRegistry::new();
        let bus = Arc::new(LocalBus::new(16));
        let appliance = Arc::new(FakeAppliance::default());
        let binder = ChannelBinder::new(bus.clone(), appliance.clone());
        let record = record(&registry, "S1", &[Capability::Switchable], ThingType::Socket);
        binder.bind(&record).await.unwrap();

        bus.dispatch("S1/on-off", ChannelCommand::SetOnOff(true))
            .await
            .unwrap();
        assert_eq!(appliance.power_commands(), vec![true]);

        appliance.fail_commands(true);
        let err = bus
            .dispatch("S1/on-off", ChannelCommand::SetOnOff(false))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Appliance(_)));
    }

    #[tokio::test]
    async fn announce_failure_is_reported_as_announce() {
        let registry = DeviceRegistry::new();
        let bus = Arc::new(FakeBus::default());
        bus.fail_announce(true);
        let binder = ChannelBinder::new(bus.clone(), Arc::new(FakeAppliance::default()));
        let record = record(&registry, "S1", &[Capability::Switchable], ThingType::Socket);

        let err = binder.bind(&record).await.err().unwrap();
        assert!(matches!(err, BindError::Announce { .. }));
        assert_eq!(bus.exported_count(), 0);
    }

    #[tokio::test]
    async fn export_failure_is_reported_as_export() {
        let registry = DeviceRegistry::new();
        let bus = Arc::new(FakeBus::default());
        bus.fail_export(Some(ChannelKind::Power));
        let binder = ChannelBinder::new(bus.clone(), Arc::new(FakeAppliance::default()));
        let record = record(
            &registry,
            "S1",
            &[Capability::Switchable, Capability::PowerMetered],
            ThingType::Socket,
        );

        match binder.bind(&record).await.err().unwrap() {
            BindError::Export { kind, serial, .. } => {
                assert_eq!(kind, ChannelKind::Power);
                assert_eq!(serial, "S1");
            }
            other => panic!("unexpected {other:?}"),
        }

        // The on/off channel exported before the failure is gone again
        assert_eq!(bus.withdrawn(), vec!["S1".to_string()]);
        assert!(bus.channel("S1/on-off").is_none());
        assert!(bus.handler("S1/on-off").is_none());
    }

    #[tokio::test]
    async fn signatures_carry_thing_type() {
        let registry = DeviceRegistry::new();
        let record = record(&registry, "S7", &[Capability::MotionSensing], ThingType::Motion);
        let (identity, signatures) = identity_for(&record);
        assert_eq!(identity.id, "S7");
        assert_eq!(identity.driver, "wemo");
        assert_eq!(signatures.manufacturer, "Belkin");
        assert_eq!(signatures.product_type, "Motion");
        assert_eq!(signatures.thing_type, "motion");
        assert_eq!(signatures.product_model_id, "urn:Belkin:device:insight:1");
    }

    #[tokio::test]
    async fn pushed_values_land_on_local_bus() {
        let registry = DeviceRegistry::new();
        let bus = Arc::new(LocalBus::new(16));
        let binder = ChannelBinder::new(bus.clone(), Arc::new(FakeAppliance::default()));
        let record = record(&registry, "S1", &[Capability::Switchable], ThingType::Socket);
        let channels = binder.bind(&record).await.unwrap();

        channels
            .on_off
            .as_ref()
            .unwrap()
            .push_state(ChannelValue::OnOff(true));
        assert_eq!(
            bus.channel("S1/on-off").unwrap().last_value,
            Some(ChannelValue::OnOff(true))
        );
    }
}
