//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (UPnP/SSDP, the Belkin
//! WeMo device services) and changing them would break protocol compliance.

// ─────────────────────────────────────────────────────────────────────────────
// SSDP
// ─────────────────────────────────────────────────────────────────────────────

/// Standard SSDP multicast address and port.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Limited broadcast address for fallback discovery.
pub const SSDP_LIMITED_BROADCAST_ADDR: &str = "255.255.255.255:1900";

/// SSDP search target answered by every WeMo appliance.
pub const WEMO_SEARCH_TARGET: &str = "urn:Belkin:service:basicevent:1";

/// Marker that identifies a WeMo SSDP response (matched case-insensitively).
pub const WEMO_RESPONSE_MARKER: &str = "urn:Belkin";

// ─────────────────────────────────────────────────────────────────────────────
// HTTP/SOAP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for SOAP HTTP requests (seconds).
///
/// 10 seconds is reasonable for LAN operations.
pub const SOAP_TIMEOUT_SECS: u64 = 10;

/// Field index of the instantaneous power reading (milliwatts) in the
/// `|`-separated `InsightParams` value.
pub const INSIGHT_CURRENT_POWER_FIELD: usize = 7;

/// Milliwatts per watt, used to normalize Insight power samples.
pub const MILLIWATTS_PER_WATT: f64 = 1000.0;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Driver identifier announced on the bus.
pub const DRIVER_ID: &str = "com.ninjablocks.wemo";

/// Human-readable driver name announced on the bus.
pub const DRIVER_NAME: &str = "driver-wemo";

/// Driver tag attached to every device identity exported on the bus.
pub const DEVICE_DRIVER_TAG: &str = "wemo";

/// Manufacturer reported in device signatures.
pub const MANUFACTURER: &str = "Belkin";

/// Product name reported in device signatures.
pub const PRODUCT_NAME: &str = "Wemo";

/// Service identifier returned by the health endpoint.
pub const SERVICE_ID: &str = "wemo-bridge";
