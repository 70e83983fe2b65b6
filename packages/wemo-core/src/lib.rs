//! WeMo Core - shared library for the WeMo bridge.
//!
//! Finds Belkin WeMo appliances on the LAN, classifies them by capability,
//! announces them on a home-automation bus and keeps their bus channels in
//! step with the hardware.
//!
//! # Architecture
//!
//! - [`wemo`]: Appliance transport (SSDP discovery, `setup.xml`, SOAP control)
//! - [`bus`]: Bus boundary and the in-process [`LocalBus`](bus::LocalBus)
//! - [`services`]: Classifier, registry, channel binder, synchronizer, discovery loop
//! - [`driver`]: Driver lifecycle (announce, run, shutdown)
//! - [`api`]: HTTP/WebSocket surface over the local bus
//! - [`bootstrap`]: Composition root
//! - [`runtime`]: Task spawning abstraction
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`ApplianceDiscovery`](wemo::ApplianceDiscovery) / [`ApplianceControl`](wemo::ApplianceControl):
//!   device transport
//! - [`Bus`](bus::Bus), [`Channel`](bus::Channel), [`CommandHandler`](bus::CommandHandler):
//!   bus boundary
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod bus;
pub mod driver;
pub mod error;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod state;
pub mod utils;
pub mod wemo;

// Re-export commonly used types at the crate root
pub use error::{BridgeError, BridgeResult, DiscoveryResult, ErrorCode, SoapResult};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::Config;
pub use utils::now_millis;

pub use bus::{Bus, BusEvent, ChannelKind, ChannelValue, LocalBus};
pub use driver::WemoDriver;
pub use services::{
    Capability, CapabilitySet, Classification, DeviceRecord, DeviceRegistry, DiscoveryService,
    ThingType,
};
pub use wemo::{ApplianceControl, ApplianceDiscovery, WemoClient, WemoClientImpl};

pub use bootstrap::{bootstrap_services, BootstrappedServices};
pub use api::{start_server, AppState, ServerError};
