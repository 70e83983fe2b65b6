//! WeMo appliance discovery and control.
//!
//! # Module Structure
//!
//! - `discovery` - SSDP scan and `setup.xml` descriptor retrieval
//! - `services` - UPnP service definitions (URNs, paths)
//! - `traits` - Trait abstractions for testability
//! - `client` - `WemoClientImpl` concrete trait implementation
//! - `soap` - Low-level SOAP protocol implementation
//! - `utils` - XML helpers and WeMo value parsing

pub mod client;
pub mod discovery;
pub mod services;
pub mod soap;
pub mod traits;
pub mod utils;

pub use services::WemoService;

pub use traits::{ApplianceControl, ApplianceDiscovery, WemoClient};

pub use client::WemoClientImpl;
