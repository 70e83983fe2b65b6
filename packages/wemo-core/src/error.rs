//! Centralized error types for the WeMo bridge core library.
//!
//! - Each layer keeps its own `thiserror` enum and converts into
//!   [`BridgeError`] at the service boundary.
//! - [`BridgeError`] is the application-wide error; [`ErrorCode`] gives it a
//!   machine-readable code, and it renders as a JSON body through
//!   `IntoResponse`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::bus::{BusError, CommandError};
use crate::services::RegistryError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

/// Application-wide error type for the WeMo bridge.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum BridgeError {
    /// The bus refused the driver or a device identity. Fatal.
    #[error("Bus registration failed: {0}")]
    BusRegistration(String),

    /// No registered device with this serial.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device has no channel accepting this command.
    #[error("Device does not accept this command: {0}")]
    NotCommandable(String),

    /// The appliance rejected or did not answer a command.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ErrorCode for BridgeError {
    fn code(&self) -> &'static str {
        match self {
            Self::BusRegistration(_) => "bus_registration_failed",
            Self::DeviceNotFound(_) => "device_not_found",
            Self::NotCommandable(_) => "not_commandable",
            Self::CommandFailed(_) => "command_failed",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }
}

impl BridgeError {
    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotCommandable(_) => StatusCode::CONFLICT,
            Self::CommandFailed(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) | Self::BusRegistration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Type Aliases
// ─────────────────────────────────────────────────────────────────────────────

pub use crate::wemo::discovery::DiscoveryResult;
pub use crate::wemo::soap::SoapResult;

/// Convenient Result alias for application-wide operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<BusError> for BridgeError {
    fn from(err: BusError) -> Self {
        Self::BusRegistration(err.to_string())
    }
}

impl From<CommandError> for BridgeError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::UnknownChannel(_) | CommandError::NotCommandable(_) => {
                Self::NotCommandable(err.to_string())
            }
            CommandError::Appliance(_) => Self::CommandFailed(err.to_string()),
        }
    }
}

impl From<RegistryError> for BridgeError {
    fn from(err: RegistryError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_errors_map_to_caller_facing_statuses() {
        let err = BridgeError::from(CommandError::Appliance("SOAP fault: Error".into()));
        assert_eq!(err.code(), "command_failed");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);

        let err = BridgeError::from(CommandError::UnknownChannel("S1/on-off".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn unknown_device_is_not_found() {
        let err = BridgeError::DeviceNotFound("S9".into());
        assert_eq!(err.code(), "device_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bus_errors_are_registration_failures() {
        let err = BridgeError::from(BusError::Rejected("offline".into()));
        assert!(matches!(err, BridgeError::BusRegistration(_)));
        assert_eq!(err.code(), "bus_registration_failed");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn registry_errors_are_internal() {
        let err = BridgeError::from(RegistryError::NotRegistered("S1".into()));
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn into_response_renders_json_body() {
        let response = BridgeError::NotCommandable("S3".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "not_commandable");
        assert_eq!(body["status"], 409);
    }
}
