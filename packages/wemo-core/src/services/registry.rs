//! Identity-keyed store of known appliances.
//!
//! The registry owns the serial → [`DeviceRecord`] mapping. Records are never
//! removed; rediscovery only refreshes the stored descriptor.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use super::binder::DeviceChannels;
use super::classifier::{CapabilitySet, ThingType};
use crate::wemo::discovery::{DeviceDescriptor, NetworkHandle};

/// Registry misuse. Both variants indicate a caller bug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// `insert` was called for a serial that already has a record.
    #[error("device {0} is already registered")]
    AlreadyRegistered(String),

    /// `refresh` was called for a serial with no record.
    #[error("device {0} is not registered")]
    NotRegistered(String),
}

/// Result of binding a record's channels. Set at most once per record.
#[derive(Clone)]
pub enum Binding {
    /// Channels exported; a synchronizer is running.
    Bound(Arc<DeviceChannels>),
    /// Registration was abandoned after a failure; no synchronizer runs.
    Abandoned(String),
}

/// The long-lived entity for one appliance.
pub struct DeviceRecord {
    serial: String,
    descriptor: RwLock<DeviceDescriptor>,
    capabilities: CapabilitySet,
    thing_type: ThingType,
    binding: OnceLock<Binding>,
}

impl DeviceRecord {
    fn new(descriptor: DeviceDescriptor, capabilities: CapabilitySet, thing_type: ThingType) -> Self {
        Self {
            serial: descriptor.serial_number.clone(),
            descriptor: RwLock::new(descriptor),
            capabilities,
            thing_type,
            binding: OnceLock::new(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Snapshot of the most recent descriptor.
    pub fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor.read().clone()
    }

    /// Current network handle (follows address changes across scans).
    pub fn handle(&self) -> NetworkHandle {
        self.descriptor.read().handle.clone()
    }

    pub fn friendly_name(&self) -> String {
        self.descriptor.read().friendly_name.clone()
    }

    /// Capabilities fixed at creation.
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    pub fn thing_type(&self) -> ThingType {
        self.thing_type
    }

    /// Binding outcome, `None` while binding is still in progress.
    pub fn binding(&self) -> Option<&Binding> {
        self.binding.get()
    }

    /// Exported channels, if binding succeeded.
    pub fn channels(&self) -> Option<&Arc<DeviceChannels>> {
        match self.binding.get() {
            Some(Binding::Bound(channels)) => Some(channels),
            _ => None,
        }
    }

    /// Records the binding outcome. Returns false if one was already recorded.
    pub(crate) fn set_binding(&self, binding: Binding) -> bool {
        self.binding.set(binding).is_ok()
    }
}

impl std::fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("serial", &self.serial)
            .field("capabilities", &self.capabilities)
            .field("thing_type", &self.thing_type)
            .field("bound", &self.channels().is_some())
            .finish_non_exhaustive()
    }
}

/// Mutex-guarded serial → record map shared by discovery and command handling.
#[derive(Default)]
pub struct DeviceRegistry {
    records: Mutex<HashMap<String, Arc<DeviceRecord>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, serial: &str) -> Option<Arc<DeviceRecord>> {
        self.records.lock().get(serial).cloned()
    }

    /// Creates the record for a newly classified appliance.
    ///
    /// Callers must `lookup` first; an existing serial is an error.
    pub fn insert(
        &self,
        descriptor: DeviceDescriptor,
        capabilities: CapabilitySet,
        thing_type: ThingType,
    ) -> Result<Arc<DeviceRecord>, RegistryError> {
        let mut records = self.records.lock();
        let serial = descriptor.serial_number.clone();
        if records.contains_key(&serial) {
            return Err(RegistryError::AlreadyRegistered(serial));
        }

        let record = Arc::new(DeviceRecord::new(descriptor, capabilities, thing_type));
        records.insert(serial.clone(), Arc::clone(&record));
        log::info!(
            "[Registry] Registered {} ({} device(s) known)",
            serial,
            records.len()
        );
        Ok(record)
    }

    /// Replaces the stored descriptor of an existing record.
    ///
    /// Capabilities and bindings are untouched even if the device type changed.
    pub fn refresh(
        &self,
        serial: &str,
        descriptor: DeviceDescriptor,
    ) -> Result<Arc<DeviceRecord>, RegistryError> {
        let record = self
            .lookup(serial)
            .ok_or_else(|| RegistryError::NotRegistered(serial.to_string()))?;

        {
            let mut current = record.descriptor.write();
            if current.device_type != descriptor.device_type {
                log::debug!(
                    "[Registry] {} now reports type {} (was {}); keeping original capabilities",
                    serial,
                    descriptor.device_type,
                    current.device_type
                );
            }
            if current.friendly_name != descriptor.friendly_name || current.handle != descriptor.handle
            {
                log::info!(
                    "[Registry] {} refreshed: {:?} @ {}",
                    serial,
                    descriptor.friendly_name,
                    descriptor.handle
                );
            }
            *current = descriptor;
        }

        Ok(record)
    }

    /// All records, sorted by serial.
    pub fn snapshot(&self) -> Vec<Arc<DeviceRecord>> {
        let mut records: Vec<_> = self.records.lock().values().cloned().collect();
        records.sort_by(|a, b| a.serial.cmp(&b.serial));
        records
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
