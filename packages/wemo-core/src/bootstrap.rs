//! Application bootstrap and dependency wiring.
//!
//! This module is the composition root: the one place where the transport,
//! the engine services and the driver are instantiated and wired together.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::bus::{Bus, LocalBus};
use crate::driver::WemoDriver;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol_constants::SOAP_TIMEOUT_SECS;
use crate::runtime::TokioSpawner;
use crate::services::{ChannelBinder, DeviceRegistry, DiscoveryService, DiscoverySettings};
use crate::state::Config;
use crate::wemo::{ApplianceControl, WemoClientImpl};

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Registry of known appliances.
    pub registry: Arc<DeviceRegistry>,
    /// The bus every device and channel is announced on.
    pub bus: Arc<LocalBus>,
    /// Driver lifecycle (start / run / shutdown).
    pub driver: Arc<WemoDriver>,
    /// Discovery loop, exposed for one-off scans.
    pub discovery_service: Arc<DiscoveryService>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Root cancellation token; cancelling it stops every background task.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        self.driver.shutdown().await;
        log::info!(
            "[Bootstrap] Shutdown complete ({} device(s) known)",
            self.registry.len()
        );
    }
}

/// Creates the shared HTTP client for all appliance communication.
fn create_http_client() -> BridgeResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(SOAP_TIMEOUT_SECS))
        .build()
        .map_err(|e| BridgeError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Bootstraps all services with their dependencies.
///
/// Services are created in dependency order:
///
/// 1. Shared infrastructure (HTTP client, spawner, cancellation token)
/// 2. Appliance client (depends on HTTP client)
/// 3. Registry and channel binder (depends on bus, client)
/// 4. Discovery service (depends on all of the above)
/// 5. Driver (depends on bus, discovery service)
///
/// Nothing is started; call `driver.start()` once the caller is ready.
///
/// # Errors
///
/// Returns `Configuration` if `config` fails validation.
pub fn bootstrap_services(config: &Config, bus: Arc<LocalBus>) -> BridgeResult<BootstrappedServices> {
    config.validate().map_err(BridgeError::Configuration)?;

    let spawner = TokioSpawner::current();
    let http_client = create_http_client()?;
    let cancel_token = CancellationToken::new();

    let wemo = Arc::new(WemoClientImpl::with_discovery_config(
        http_client,
        config.discovery_config(),
    ));

    let registry = Arc::new(DeviceRegistry::new());
    let binder = ChannelBinder::new(
        Arc::clone(&bus) as Arc<dyn Bus>,
        Arc::clone(&wemo) as Arc<dyn ApplianceControl>,
    );

    let discovery_service = Arc::new(DiscoveryService::new(
        wemo,
        Arc::clone(&registry),
        binder,
        spawner.clone(),
        cancel_token.clone(),
        DiscoverySettings::from(config),
    ));

    let driver = Arc::new(WemoDriver::new(
        Arc::clone(&bus) as Arc<dyn Bus>,
        Arc::clone(&discovery_service),
        spawner.clone(),
        cancel_token.clone(),
        Duration::from_secs(config.status_interval_secs),
    ));

    Ok(BootstrappedServices {
        registry,
        bus,
        driver,
        discovery_service,
        spawner,
        cancel_token,
    })
}
