//! The bridge engine.
//!
//! Classifies discovered appliances, keeps them in the registry, binds their
//! bus channels and keeps those channels in step with the hardware.

pub mod binder;
pub mod classifier;
pub mod discovery_service;
pub mod registry;
pub mod synchronizer;

#[cfg(test)]
pub(crate) mod test_support;

pub use binder::{BindError, ChannelBinder, DeviceChannels};
pub use classifier::{classify, Capability, CapabilitySet, Classification, ThingType};
pub use discovery_service::{DescriptorOutcome, DiscoveryService, DiscoverySettings, ScanSummary};
pub use registry::{Binding, DeviceRecord, DeviceRegistry, RegistryError};
pub use synchronizer::{poll_interval_for, StateSynchronizer};
