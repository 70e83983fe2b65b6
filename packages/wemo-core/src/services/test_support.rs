//! In-memory appliance and bus fakes shared by the engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bus::{
    Bus, BusError, BusHandle, Channel, ChannelKind, ChannelValue, CommandHandler, DeviceIdentity,
    DeviceSignatures, DriverInfo, DriverStatus,
};
use crate::wemo::discovery::{
    DeviceDescriptor, DiscoveredAppliance, DiscoveryError, DiscoveryMethod, DiscoveryResult,
    NetworkHandle,
};
use crate::wemo::soap::{SoapError, SoapResult};
use crate::wemo::{ApplianceControl, ApplianceDiscovery};

pub fn descriptor(serial: &str, name: &str, device_type: &str) -> DeviceDescriptor {
    DeviceDescriptor {
        handle: NetworkHandle::new("10.0.1.5", 49153),
        serial_number: serial.into(),
        mac_address: String::new(),
        friendly_name: name.into(),
        device_type: device_type.into(),
        model_name: None,
        firmware_version: None,
        udn: None,
    }
}

fn location_for(serial: &str) -> String {
    format!("http://10.0.1.5:49153/setup.xml?serial={serial}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Appliance
// ─────────────────────────────────────────────────────────────────────────────

/// Scriptable appliance population plus control surface.
#[derive(Default)]
pub struct FakeAppliance {
    population: Mutex<Vec<DeviceDescriptor>>,
    unreachable: Mutex<Vec<String>>,
    fail_scan: AtomicBool,
    scans: AtomicUsize,
    binary_state: Mutex<u8>,
    power_mw: Mutex<u64>,
    fail_queries: AtomicBool,
    fail_commands: AtomicBool,
    power_commands: Mutex<Vec<bool>>,
    state_queries: AtomicUsize,
}

impl FakeAppliance {
    pub fn set_population(&self, descriptors: Vec<DeviceDescriptor>) {
        *self.population.lock() = descriptors;
    }

    /// Makes descriptor fetches for `serial` fail.
    pub fn set_unreachable(&self, serial: &str) {
        self.unreachable.lock().push(serial.to_string());
    }

    pub fn fail_scan(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn set_binary_state(&self, state: u8) {
        *self.binary_state.lock() = state;
    }

    pub fn set_power_mw(&self, mw: u64) {
        *self.power_mw.lock() = mw;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn power_commands(&self) -> Vec<bool> {
        self.power_commands.lock().clone()
    }

    pub fn state_queries(&self) -> usize {
        self.state_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplianceDiscovery for FakeAppliance {
    async fn discover(&self, _timeout: Duration) -> DiscoveryResult<Vec<DiscoveredAppliance>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if self.fail_scan.load(Ordering::SeqCst) {
            return Err(DiscoveryError::NoInterfaces);
        }
        Ok(self
            .population
            .lock()
            .iter()
            .map(|d| {
                DiscoveredAppliance::new(
                    d.handle.host.clone(),
                    d.udn.clone().unwrap_or_default(),
                    location_for(&d.serial_number),
                    DiscoveryMethod::SsdpMulticast,
                )
            })
            .collect())
    }

    async fn fetch_descriptor(&self, location: &str) -> DiscoveryResult<DeviceDescriptor> {
        let descriptor = self
            .population
            .lock()
            .iter()
            .find(|d| location_for(&d.serial_number) == location)
            .cloned()
            .ok_or_else(|| DiscoveryError::InvalidDescription(location.to_string()))?;

        if self.unreachable.lock().contains(&descriptor.serial_number) {
            return Err(DiscoveryError::DescriptionFetch {
                url: location.to_string(),
                reason: "connection refused".into(),
            });
        }
        Ok(descriptor)
    }
}

#[async_trait]
impl ApplianceControl for FakeAppliance {
    async fn set_power(&self, _handle: &NetworkHandle, on: bool) -> SoapResult<()> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(SoapError::Fault("Error".into()));
        }
        self.power_commands.lock().push(on);
        *self.binary_state.lock() = u8::from(on);
        Ok(())
    }

    async fn get_binary_state(&self, _handle: &NetworkHandle) -> SoapResult<u8> {
        self.state_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(SoapError::HttpStatus(500, "unreachable".into()));
        }
        Ok(*self.binary_state.lock())
    }

    async fn get_power_sample(&self, _handle: &NetworkHandle) -> SoapResult<u64> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(SoapError::HttpStatus(500, "unreachable".into()));
        }
        Ok(*self.power_mw.lock())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bus
// ─────────────────────────────────────────────────────────────────────────────

/// Channel that records everything pushed on it.
pub struct RecordingChannel {
    id: String,
    kind: ChannelKind,
    states: Mutex<Vec<ChannelValue>>,
    events: AtomicUsize,
}

impl RecordingChannel {
    pub fn new(id: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id: id.into(),
            kind,
            states: Mutex::new(Vec::new()),
            events: AtomicUsize::new(0),
        }
    }

    pub fn states(&self) -> Vec<ChannelValue> {
        self.states.lock().clone()
    }

    pub fn events(&self) -> usize {
        self.events.load(Ordering::SeqCst)
    }
}

impl Channel for RecordingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn push_state(&self, value: ChannelValue) {
        self.states.lock().push(value);
    }

    fn push_event(&self) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }
}

/// Bus that records announcements and can be told to fail.
#[derive(Default)]
pub struct FakeBus {
    fail_announce: AtomicBool,
    fail_export: Mutex<Option<ChannelKind>>,
    announced: Mutex<Vec<DeviceIdentity>>,
    channels: Mutex<HashMap<String, Arc<RecordingChannel>>>,
    handlers: Mutex<HashMap<String, Arc<dyn CommandHandler>>>,
    withdrawn: Mutex<Vec<String>>,
    statuses: Mutex<Vec<DriverStatus>>,
}

impl FakeBus {
    pub fn fail_announce(&self, fail: bool) {
        self.fail_announce.store(fail, Ordering::SeqCst);
    }

    pub fn fail_export(&self, kind: Option<ChannelKind>) {
        *self.fail_export.lock() = kind;
    }

    pub fn announced(&self) -> Vec<DeviceIdentity> {
        self.announced.lock().clone()
    }

    pub fn exported_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn channel(&self, id: &str) -> Option<Arc<RecordingChannel>> {
        self.channels.lock().get(id).cloned()
    }

    pub fn handler(&self, id: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.lock().get(id).cloned()
    }

    pub fn withdrawn(&self) -> Vec<String> {
        self.withdrawn.lock().clone()
    }

    pub fn statuses(&self) -> Vec<DriverStatus> {
        self.statuses.lock().clone()
    }
}

#[async_trait]
impl Bus for FakeBus {
    async fn announce_driver(&self, _info: DriverInfo) -> Result<(), BusError> {
        if self.fail_announce.load(Ordering::SeqCst) {
            return Err(BusError::Rejected("bus offline".into()));
        }
        Ok(())
    }

    async fn report_status(&self, status: DriverStatus) -> Result<(), BusError> {
        self.statuses.lock().push(status);
        Ok(())
    }

    async fn announce_device(
        &self,
        identity: DeviceIdentity,
        _signatures: DeviceSignatures,
    ) -> Result<BusHandle, BusError> {
        if self.fail_announce.load(Ordering::SeqCst) {
            return Err(BusError::Rejected("bus offline".into()));
        }
        let handle = BusHandle::new(identity.id.clone());
        self.announced.lock().push(identity);
        Ok(handle)
    }

    async fn export_channel(
        &self,
        handle: &BusHandle,
        kind: ChannelKind,
        handler: Option<Arc<dyn CommandHandler>>,
    ) -> Result<Arc<dyn Channel>, BusError> {
        if *self.fail_export.lock() == Some(kind) {
            return Err(BusError::Rejected(format!("{kind:?} export refused")));
        }
        let id = kind.channel_id(handle);
        let channel = Arc::new(RecordingChannel::new(id.clone(), kind));
        self.channels.lock().insert(id.clone(), Arc::clone(&channel));
        if let Some(handler) = handler {
            self.handlers.lock().insert(id, handler);
        }
        Ok(channel)
    }

    async fn withdraw_device(&self, handle: &BusHandle) -> Result<(), BusError> {
        let prefix = format!("{}/", handle.device_id());
        self.channels.lock().retain(|id, _| !id.starts_with(&prefix));
        self.handlers.lock().retain(|id, _| !id.starts_with(&prefix));
        self.withdrawn.lock().push(handle.device_id().to_string());
        Ok(())
    }
}
