//! The bridge driver lifecycle.
//!
//! [`WemoDriver::start`] announces the driver on the bus and spawns the
//! discovery loop plus a periodic status report. [`WemoDriver::run`] resolves
//! when the loop hits a fatal error (or is cancelled).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, DriverInfo, DriverStatus};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol_constants::{DRIVER_ID, DRIVER_NAME};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{DeviceRegistry, DiscoveryService};

/// Identity this driver announces on the bus.
pub fn driver_info() -> DriverInfo {
    DriverInfo {
        id: DRIVER_ID.to_string(),
        name: DRIVER_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

pub struct WemoDriver<S = TokioSpawner> {
    bus: Arc<dyn Bus>,
    discovery: Arc<DiscoveryService<S>>,
    spawner: S,
    cancel: CancellationToken,
    status_interval: Duration,
    started: AtomicBool,
    fatal_rx: Mutex<Option<oneshot::Receiver<BridgeError>>>,
}

impl<S: TaskSpawner + 'static> WemoDriver<S> {
    pub fn new(
        bus: Arc<dyn Bus>,
        discovery: Arc<DiscoveryService<S>>,
        spawner: S,
        cancel: CancellationToken,
        status_interval: Duration,
    ) -> Self {
        Self {
            bus,
            discovery,
            spawner,
            cancel,
            status_interval,
            started: AtomicBool::new(false),
            fatal_rx: Mutex::new(None),
        }
    }

    /// Announces the driver and starts the discovery loop.
    ///
    /// # Errors
    ///
    /// `BusRegistration` if the bus refuses the driver announcement,
    /// `Internal` if the driver was already started.
    pub async fn start(&self) -> BridgeResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BridgeError::Internal("driver already started".into()));
        }

        let info = driver_info();
        log::info!("[Driver] Announcing {} v{}", info.name, info.version);
        self.bus.announce_driver(info).await?;

        let (fatal_tx, fatal_rx) = oneshot::channel();
        *self.fatal_rx.lock() = Some(fatal_rx);

        let discovery = Arc::clone(&self.discovery);
        let cancel = self.cancel.clone();
        self.spawner.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("[Driver] Discovery loop cancelled");
                }
                err = discovery.run() => {
                    // Nothing survives a failed device registration
                    cancel.cancel();
                    let _ = fatal_tx.send(err);
                }
            }
        });

        self.spawner.spawn(report_status(
            Arc::clone(&self.bus),
            Arc::clone(self.discovery.registry()),
            self.status_interval,
            self.cancel.clone(),
        ));

        Ok(())
    }

    /// Waits for the discovery loop to end.
    ///
    /// Returns the fatal error that stopped it, or `None` if it was cancelled
    /// (or the driver was never started).
    pub async fn run(&self) -> Option<BridgeError> {
        let fatal_rx = self.fatal_rx.lock().take()?;
        fatal_rx.await.ok()
    }

    /// Cancels the loop and every synchronizer, then waits for them to stop.
    pub async fn shutdown(&self) {
        log::info!("[Driver] Shutting down");
        self.cancel.cancel();
        self.spawner.shutdown().await;
        log::info!("[Driver] Shutdown complete");
    }
}

/// Publishes a heartbeat every `every` until cancelled. Failed reports are
/// logged and do not stop the driver.
async fn report_status(
    bus: Arc<dyn Bus>,
    registry: Arc<DeviceRegistry>,
    every: Duration,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let status = DriverStatus {
                    id: DRIVER_ID.to_string(),
                    devices: registry.len(),
                    uptime_secs: started.elapsed().as_secs(),
                };
                if let Err(e) = bus.report_status(status).await {
                    log::warn!("[Driver] Status report failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::bus::LocalBus;
    use crate::services::test_support::{descriptor, FakeAppliance, FakeBus};
    use crate::services::{ChannelBinder, DeviceRegistry, DiscoverySettings};

    fn driver(bus: Arc<dyn Bus>, appliance: Arc<FakeAppliance>) -> WemoDriver {
        let spawner = TokioSpawner::current();
        let cancel = CancellationToken::new();
        let discovery = Arc::new(DiscoveryService::new(
            appliance.clone(),
            Arc::new(DeviceRegistry::new()),
            ChannelBinder::new(Arc::clone(&bus), appliance),
            spawner.clone(),
            cancel.clone(),
            DiscoverySettings {
                scan_timeout: Duration::from_secs(3),
                poll_interval: Duration::from_secs(5),
                motion_poll_interval: Duration::from_secs(2),
                max_concurrent_fetches: 4,
            },
        ));
        WemoDriver::new(bus, discovery, spawner, cancel, Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn start_announces_driver_then_discovers() {
        let bus = Arc::new(LocalBus::new(64));
        let appliance = Arc::new(FakeAppliance::default());
        appliance.set_population(vec![descriptor("S1", "Lamp", "Belkin.Controllee")]);
        let driver = driver(bus.clone(), appliance.clone());

        driver.start().await.unwrap();
        assert_eq!(bus.driver().unwrap().id, "com.ninjablocks.wemo");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(bus.channel("S1/on-off").is_some());

        driver.shutdown().await;
        assert!(driver.run().await.is_none());
    }

    #[tokio::test]
    async fn driver_rejection_fails_start() {
        let bus = Arc::new(FakeBus::default());
        bus.fail_announce(true);
        let driver = driver(bus, Arc::new(FakeAppliance::default()));

        let err = driver.start().await.unwrap_err();
        assert!(matches!(err, BridgeError::BusRegistration(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn device_rejection_ends_run_with_fatal_error() {
        let bus = Arc::new(FakeBus::default());
        let appliance = Arc::new(FakeAppliance::default());
        let driver = driver(bus.clone(), appliance.clone());
        driver.start().await.unwrap();

        bus.fail_announce(true);
        appliance.set_population(vec![descriptor("S1", "Lamp", "Belkin.Controllee")]);

        let err = driver.run().await.unwrap();
        assert!(matches!(err, BridgeError::BusRegistration(_)));
        assert!(driver.cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn status_is_reported_until_shutdown() {
        let bus = Arc::new(FakeBus::default());
        let appliance = Arc::new(FakeAppliance::default());
        appliance.set_population(vec![descriptor("S1", "Lamp", "Belkin.Controllee")]);
        let driver = driver(bus.clone(), appliance);
        driver.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(60_010)).await;
        let statuses = bus.statuses();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].id, "com.ninjablocks.wemo");
        assert_eq!(statuses[2].devices, 1);
        assert_eq!(statuses[2].uptime_secs, 60);

        driver.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(bus.statuses().len(), 3);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let bus = Arc::new(LocalBus::new(8));
        let driver = driver(bus, Arc::new(FakeAppliance::default()));
        driver.start().await.unwrap();
        assert!(matches!(
            driver.start().await,
            Err(BridgeError::Internal(_))
        ));
        driver.shutdown().await;
    }
}
