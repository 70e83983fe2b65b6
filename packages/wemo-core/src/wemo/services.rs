//! WeMo UPnP service definitions.
//!
//! Single source of truth for the service URNs and control paths used by
//! SOAP commands.

use serde::Serialize;

/// WeMo UPnP services used for control and telemetry.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WemoService {
    /// Relay / motion state (GetBinaryState, SetBinaryState).
    BasicEvent,
    /// Energy telemetry on Insight switches (GetInsightParams).
    Insight,
}

impl WemoService {
    /// Returns the UPnP service URN for SOAP requests.
    #[must_use]
    pub fn urn(&self) -> &'static str {
        match self {
            Self::BasicEvent => "urn:Belkin:service:basicevent:1",
            Self::Insight => "urn:Belkin:service:insight:1",
        }
    }

    /// Returns the UPnP control endpoint path for SOAP requests.
    #[must_use]
    pub fn control_path(&self) -> &'static str {
        match self {
            Self::BasicEvent => "/upnp/control/basicevent1",
            Self::Insight => "/upnp/control/insight1",
        }
    }

    /// Returns a human-readable name for this service.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::BasicEvent => "BasicEvent",
            Self::Insight => "Insight",
        }
    }
}
