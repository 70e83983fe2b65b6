//! Low-level SOAP protocol implementation for WeMo UPnP services.
//!
//! This module handles the raw SOAP envelope building, HTTP transport,
//! and fault detection. For high-level appliance commands, see `client.rs`.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use super::discovery::NetworkHandle;
use super::services::WemoService;
use super::utils::{escape_xml, extract_xml_text};
use crate::protocol_constants::SOAP_TIMEOUT_SECS;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during SOAP operations with WeMo appliances.
#[derive(Debug, Error)]
pub enum SoapError {
    /// HTTP request to the appliance failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Appliance returned a non-success HTTP status without a SOAP fault.
    #[error("HTTP error {0}: {1}")]
    HttpStatus(u16, String),

    /// Appliance returned a SOAP fault, or rejected the command.
    #[error("SOAP fault: {0}")]
    Fault(String),

    /// Failed to parse the SOAP response.
    #[error("Failed to parse SOAP response: {0}")]
    Parse(String),
}

/// Convenient Result alias for SOAP operations.
pub type SoapResult<T> = Result<T, SoapError>;

impl SoapError {
    /// Returns true if the appliance was simply unreachable for this request.
    ///
    /// Appliances drop off Wi-Fi and come back regularly, so timeouts and
    /// refused connections are expected between scans.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SoapError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Request/Response
// ─────────────────────────────────────────────────────────────────────────────

/// Sends a SOAP request to a WeMo appliance.
///
/// Builds the envelope, posts it to `endpoint` on the appliance and maps
/// SOAP faults and HTTP errors into [`SoapError`].
pub async fn send_soap_request(
    client: &Client,
    handle: &NetworkHandle,
    endpoint: &str,
    service: &str,
    action: &str,
    args: &[(&str, &str)],
) -> SoapResult<String> {
    let url = format!("{}{}", handle.base_url(), endpoint);

    // Single line with no leading whitespace; WeMo's parser rejects XML
    // with whitespace before the root element
    let mut body = format!(
        r#"<?xml version="1.0" encoding="utf-8"?><s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/"><s:Body><u:{} xmlns:u="{}">"#,
        action, service
    );

    for (k, v) in args {
        body.push_str(&format!("<{k}>{}</{k}>", escape_xml(v)));
    }

    body.push_str(&format!(r#"</u:{}></s:Body></s:Envelope>"#, action));

    log::debug!("[SOAP] {} -> {} (body: {} bytes)", action, url, body.len());
    log::trace!("[SOAP] Request body: {}", body);

    let start = std::time::Instant::now();
    let res = client
        .post(&url)
        .header("Content-Type", "text/xml; charset=\"utf-8\"")
        .header("SOAPAction", format!("\"{}#{}\"", service, action))
        .body(body)
        .timeout(Duration::from_secs(SOAP_TIMEOUT_SECS))
        .send()
        .await;

    log::trace!(
        "[SOAP] {} completed in {:?}: {:?}",
        action,
        start.elapsed(),
        res.as_ref().map(|r| r.status())
    );

    let res = res?;

    let status = res.status();
    let response_text = res.text().await?;

    // SOAP faults usually arrive with a 500 status
    if response_text.contains("<s:Fault>") || response_text.contains("<soap:Fault>") {
        let fault_msg = extract_xml_text(&response_text, "faultstring")
            .unwrap_or_else(|| "Unknown SOAP fault".to_string());
        return Err(SoapError::Fault(fault_msg));
    }

    if !status.is_success() {
        return Err(SoapError::HttpStatus(status.as_u16(), response_text));
    }

    Ok(response_text)
}

// ─────────────────────────────────────────────────────────────────────────────
// SOAP Request Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for constructing and sending SOAP requests to WeMo appliances.
///
/// # Example
/// ```ignore
/// let response = SoapRequestBuilder::new(&client, &handle)
///     .service(WemoService::BasicEvent)
///     .action("SetBinaryState")
///     .arg("BinaryState", "1")
///     .send()
///     .await?;
/// ```
pub struct SoapRequestBuilder<'a> {
    client: &'a Client,
    handle: &'a NetworkHandle,
    service: Option<WemoService>,
    action: Option<&'a str>,
    args: Vec<(&'a str, String)>,
}

impl<'a> SoapRequestBuilder<'a> {
    /// Creates a new SOAP request builder targeting `handle`.
    #[must_use]
    pub fn new(client: &'a Client, handle: &'a NetworkHandle) -> Self {
        Self {
            client,
            handle,
            service: None,
            action: None,
            args: Vec::new(),
        }
    }

    /// Sets the WeMo service for this request.
    #[must_use]
    pub fn service(mut self, service: WemoService) -> Self {
        self.service = Some(service);
        self
    }

    /// Sets the SOAP action name.
    #[must_use]
    pub fn action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }

    /// Adds an argument to the SOAP request.
    ///
    /// Arguments are included in the SOAP body in the order they are added.
    #[must_use]
    pub fn arg(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.args.push((key, value.into()));
        self
    }

    /// Sends the SOAP request and returns the response body.
    ///
    /// # Errors
    /// Returns `SoapError` if the service or action is not set, or if the
    /// request fails.
    pub async fn send(self) -> SoapResult<String> {
        let service = self
            .service
            .ok_or_else(|| SoapError::Fault("SoapRequestBuilder: service not set".into()))?;
        let action = self
            .action
            .ok_or_else(|| SoapError::Fault("SoapRequestBuilder: action not set".into()))?;

        let args: Vec<(&str, &str)> = self.args.iter().map(|(k, v)| (*k, v.as_str())).collect();

        send_soap_request(
            self.client,
            self.handle,
            service.control_path(),
            service.urn(),
            action,
            &args,
        )
        .await
    }

    /// Returns the request parts without sending.
    #[cfg(test)]
    pub fn into_parts(self) -> Option<(WemoService, &'a str, Vec<(&'a str, String)>)> {
        let service = self.service?;
        let action = self.action?;
        Some((service, action, self.args))
    }
}
