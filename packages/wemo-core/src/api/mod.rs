//! HTTP/WebSocket API layer.
//!
//! Exposes the local bus to external automation logic: a registry view,
//! inbound on/off commands and a live event stream.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bootstrap::BootstrappedServices;
use crate::bus::{ChannelCommand, ChannelSnapshot, LocalBus};
use crate::error::{BridgeError, BridgeResult};
use crate::services::{Binding, CapabilitySet, DeviceRecord, DeviceRegistry};

pub mod http;
pub mod response;
pub mod ws;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind or serve on the TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
    pub bus: Arc<LocalBus>,
}

impl AppState {
    pub fn new(registry: Arc<DeviceRegistry>, bus: Arc<LocalBus>) -> Self {
        Self { registry, bus }
    }

    pub fn from_services(services: &BootstrappedServices) -> Self {
        Self::new(Arc::clone(&services.registry), Arc::clone(&services.bus))
    }

    /// Views of every known device, sorted by serial.
    pub fn devices(&self) -> Vec<DeviceView> {
        self.registry
            .snapshot()
            .iter()
            .map(|record| DeviceView::build(record, &self.bus))
            .collect()
    }

    pub fn device(&self, serial: &str) -> BridgeResult<DeviceView> {
        let record = self
            .registry
            .lookup(serial)
            .ok_or_else(|| BridgeError::DeviceNotFound(serial.to_string()))?;
        Ok(DeviceView::build(&record, &self.bus))
    }

    /// Routes an on/off command to the device's on/off channel.
    ///
    /// # Errors
    ///
    /// `DeviceNotFound` for an unknown serial, `NotCommandable` when the device
    /// has no bound on/off channel, `CommandFailed` when the appliance rejects
    /// the command.
    pub async fn set_on_off(&self, serial: &str, on: bool) -> BridgeResult<()> {
        let record = self
            .registry
            .lookup(serial)
            .ok_or_else(|| BridgeError::DeviceNotFound(serial.to_string()))?;
        let channel_id = record
            .channels()
            .and_then(|channels| channels.on_off.as_ref())
            .map(|channel| channel.id().to_string())
            .ok_or_else(|| BridgeError::NotCommandable(serial.to_string()))?;

        self.bus
            .dispatch(&channel_id, ChannelCommand::SetOnOff(on))
            .await?;
        Ok(())
    }
}

/// Binding state as reported over the API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "reason")]
pub enum BindingView {
    Pending,
    Bound,
    Abandoned(String),
}

/// One registry record plus its published channel values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub serial: String,
    pub name: String,
    pub device_type: String,
    pub mac_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    /// `host:port` of the appliance's HTTP endpoint.
    pub address: String,
    pub capabilities: CapabilitySet,
    pub thing_type: &'static str,
    pub binding: BindingView,
    pub channels: Vec<ChannelSnapshot>,
}

impl DeviceView {
    fn build(record: &DeviceRecord, bus: &LocalBus) -> Self {
        let descriptor = record.descriptor();
        let (binding, channels) = match record.binding() {
            None => (BindingView::Pending, Vec::new()),
            Some(Binding::Bound(channels)) => (
                BindingView::Bound,
                bus.device_channels(channels.handle.device_id()),
            ),
            Some(Binding::Abandoned(reason)) => (BindingView::Abandoned(reason.clone()), Vec::new()),
        };

        Self {
            serial: record.serial().to_string(),
            name: descriptor.friendly_name,
            device_type: descriptor.device_type,
            mac_address: descriptor.mac_address,
            model_name: descriptor.model_name,
            firmware_version: descriptor.firmware_version,
            address: descriptor.handle.to_string(),
            capabilities: record.capabilities(),
            thing_type: record.thing_type().as_str(),
            binding,
            channels,
        }
    }
}

/// Binds `0.0.0.0:port` and serves the API until `shutdown` fires.
pub async fn start_server(
    state: AppState,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("[Server] Listening on http://{}", listener.local_addr()?);

    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    log::info!("[Server] Stopped");
    Ok(())
}
