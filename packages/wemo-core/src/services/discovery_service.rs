//! The discovery loop.
//!
//! Scans back to back, resolves each responder's descriptor, and feeds it
//! through classification, registration and binding. Newly bound devices get
//! a [`StateSynchronizer`]; known devices only have their descriptor refreshed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::binder::{BindError, ChannelBinder};
use super::classifier::{classify, Classification};
use super::registry::{Binding, DeviceRegistry};
use super::synchronizer::{poll_interval_for, StateSynchronizer};
use crate::error::{BridgeError, BridgeResult};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::Config;
use crate::wemo::discovery::DeviceDescriptor;
use crate::wemo::{ApplianceControl, ApplianceDiscovery, WemoClient};

/// Timing knobs for the loop and the synchronizers it starts.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Receive window of one scan.
    pub scan_timeout: Duration,
    pub poll_interval: Duration,
    pub motion_poll_interval: Duration,
    /// Maximum concurrent `setup.xml` fetches per scan.
    pub max_concurrent_fetches: usize,
}

impl From<&Config> for DiscoverySettings {
    fn from(config: &Config) -> Self {
        Self {
            scan_timeout: Duration::from_secs(config.scan_timeout_secs),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            motion_poll_interval: Duration::from_secs(config.motion_poll_interval_secs),
            max_concurrent_fetches: 8,
        }
    }
}

/// What happened to one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorOutcome {
    /// Known serial; descriptor refreshed.
    Refreshed,
    /// New serial; bound and synchronizing.
    Registered,
    /// New serial; a channel export failed so the device was abandoned.
    Abandoned,
    /// Unsupported or contradictory type; not registered.
    Ignored,
}

/// Counters for one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub discovered: usize,
    pub registered: usize,
    pub refreshed: usize,
    pub abandoned: usize,
    pub ignored: usize,
    pub fetch_failures: usize,
    /// The scan itself failed (no interfaces, all methods failed).
    pub scan_failed: bool,
}

impl ScanSummary {
    fn record(&mut self, outcome: DescriptorOutcome) {
        match outcome {
            DescriptorOutcome::Refreshed => self.refreshed += 1,
            DescriptorOutcome::Registered => self.registered += 1,
            DescriptorOutcome::Abandoned => self.abandoned += 1,
            DescriptorOutcome::Ignored => self.ignored += 1,
        }
    }
}

/// Owns the discovery loop and starts synchronizers for bound devices.
pub struct DiscoveryService<S = TokioSpawner> {
    discovery: Arc<dyn ApplianceDiscovery>,
    control: Arc<dyn ApplianceControl>,
    registry: Arc<DeviceRegistry>,
    binder: ChannelBinder,
    spawner: S,
    cancel: CancellationToken,
    settings: DiscoverySettings,
    /// Serials already reported as unsupported, to log them once.
    ignored: Mutex<HashSet<String>>,
}

impl<S: TaskSpawner> DiscoveryService<S> {
    /// Creates the service.
    ///
    /// Synchronizers are spawned on `spawner` with child tokens of `cancel`.
    pub fn new<C: WemoClient + 'static>(
        client: Arc<C>,
        registry: Arc<DeviceRegistry>,
        binder: ChannelBinder,
        spawner: S,
        cancel: CancellationToken,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            discovery: client.clone(),
            control: client,
            registry,
            binder,
            spawner,
            cancel,
            settings,
            ignored: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Runs scans back to back until a fatal error occurs.
    ///
    /// Each cycle takes at least one scan window, so a scan that fails fast
    /// does not spin.
    pub async fn run(&self) -> BridgeError {
        log::info!(
            "[Discovery] Starting discovery loop (scan window {:?})",
            self.settings.scan_timeout
        );

        loop {
            let started = tokio::time::Instant::now();
            if let Err(e) = self.scan_once().await {
                log::error!("[Discovery] Fatal: {}", e);
                return e;
            }
            tokio::time::sleep_until(started + self.settings.scan_timeout).await;
        }
    }

    /// Performs one scan and processes every descriptor it yields.
    ///
    /// Only a failed device-identity announcement (or a registry invariant
    /// violation) is returned as an error; scan and fetch failures are logged
    /// and counted.
    pub async fn scan_once(&self) -> BridgeResult<ScanSummary> {
        let mut summary = ScanSummary::default();

        let appliances = match self.discovery.discover(self.settings.scan_timeout).await {
            Ok(appliances) => appliances,
            Err(e) => {
                log::warn!("[Discovery] Scan failed: {}", e);
                summary.scan_failed = true;
                return Ok(summary);
            }
        };
        summary.discovered = appliances.len();

        let discovery = &self.discovery;
        let fetched: Vec<_> = stream::iter(appliances)
            .map(|appliance| async move {
                let result = discovery.fetch_descriptor(&appliance.location).await;
                (appliance, result)
            })
            .buffer_unordered(self.settings.max_concurrent_fetches.max(1))
            .collect()
            .await;

        for (appliance, result) in fetched {
            match result {
                Ok(descriptor) => {
                    let outcome = self.process_descriptor(descriptor).await?;
                    summary.record(outcome);
                }
                Err(e) => {
                    log::warn!(
                        "[Discovery] Skipping {} this scan: {}",
                        appliance.location,
                        e
                    );
                    summary.fetch_failures += 1;
                }
            }
        }

        log::debug!("[Discovery] Scan complete: {:?}", summary);
        Ok(summary)
    }

    /// Routes one descriptor to refresh or classify-register-bind.
    pub async fn process_descriptor(
        &self,
        descriptor: DeviceDescriptor,
    ) -> BridgeResult<DescriptorOutcome> {
        let serial = descriptor.serial_number.clone();

        if self.registry.lookup(&serial).is_some() {
            self.registry.refresh(&serial, descriptor)?;
            return Ok(DescriptorOutcome::Refreshed);
        }

        let (capabilities, thing_type) = match classify(&descriptor.device_type) {
            Classification::Supported {
                capabilities,
                thing_type,
            } => (capabilities, thing_type),
            Classification::Unsupported => {
                self.note_ignored(&descriptor, "unsupported device type");
                return Ok(DescriptorOutcome::Ignored);
            }
            Classification::Contradictory => {
                self.note_ignored(&descriptor, "contradictory device type");
                return Ok(DescriptorOutcome::Ignored);
            }
        };

        let record = self.registry.insert(descriptor, capabilities, thing_type)?;

        match self.binder.bind(&record).await {
            Ok(channels) => {
                record.set_binding(Binding::Bound(Arc::clone(&channels)));
                let interval = poll_interval_for(
                    capabilities,
                    self.settings.poll_interval,
                    self.settings.motion_poll_interval,
                );
                let synchronizer = StateSynchronizer::new(
                    Arc::clone(&record),
                    channels,
                    Arc::clone(&self.control),
                    interval,
                );
                self.spawner
                    .spawn(synchronizer.run(self.cancel.child_token()));
                Ok(DescriptorOutcome::Registered)
            }
            Err(e @ BindError::Export { .. }) => {
                log::warn!("[Discovery] Abandoning {}: {}", serial, e);
                record.set_binding(Binding::Abandoned(e.to_string()));
                Ok(DescriptorOutcome::Abandoned)
            }
            Err(e @ BindError::Announce { .. }) => {
                record.set_binding(Binding::Abandoned(e.to_string()));
                Err(BridgeError::BusRegistration(e.to_string()))
            }
        }
    }

    fn note_ignored(&self, descriptor: &DeviceDescriptor, reason: &str) {
        let first = self
            .ignored
            .lock()
            .insert(descriptor.serial_number.clone());
        if first {
            log::warn!(
                "[Discovery] Ignoring {} ({:?}): {} {:?}",
                descriptor.serial_number,
                descriptor.friendly_name,
                reason,
                descriptor.device_type
            );
        } else {
            log::debug!(
                "[Discovery] Still ignoring {}: {}",
                descriptor.serial_number,
                reason
            );
        }
    }
}
