//! Async SOAP client for UPnP control endpoints.
//!
//! Every remote control operation goes through [`invoke_action`]: it builds
//! the envelope, POSTs it, runs the lenient decoder, and on failure parses
//! the standard fault payload. No other component re-implements SOAP fault
//! handling.

use std::sync::OnceLock;
use std::time::Duration;

use tracing::debug;

use rezoupnp::soap::{ActionResponse, build_soap_request, decode_action_response, parse_soap_fault};

use crate::errors::ControlError;

/// Bound on every outbound SOAP call.
pub const SOAP_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(SOAP_TIMEOUT)
            .build()
            .expect("HTTP client construction cannot fail with static options")
    })
}

/// Invokes a UPnP SOAP action and decodes the `<Action>Response` contents.
pub async fn invoke_action(
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<ActionResponse, ControlError> {
    let body_xml = build_soap_request(service_type, action, args)
        .map_err(|err| ControlError::Malformed(format!("cannot build SOAP request: {err}")))?;

    // SOAPACTION identifies the action: "urn:service#Action".
    let soap_action_header = format!(r#""{}#{}""#, service_type, action);

    debug!(control_url, action, "Invoking UPnP action");

    let response = http_client()
        .post(control_url)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPACTION", &soap_action_header)
        .body(body_xml)
        .send()
        .await
        .map_err(|err| {
            ControlError::Network(format!("{} POST to {} failed: {}", action, control_url, err))
        })?;

    let status = response.status();
    // The body is read regardless of status; HTTP 500 carries the fault.
    let raw_body = response.text().await.map_err(|err| {
        ControlError::Network(format!("reading {} response body failed: {}", action, err))
    })?;

    if !status.is_success() {
        return Err(fault_or(
            action,
            &raw_body,
            ControlError::Network(format!(
                "{} failed with HTTP status {} and body: {}",
                action, status, raw_body
            )),
        ));
    }

    match decode_action_response(&raw_body, action) {
        Ok(decoded) => Ok(decoded),
        Err(err) => Err(fault_or(
            action,
            &raw_body,
            ControlError::Malformed(format!("{}: {}", action, err)),
        )),
    }
}

/// Prefers a parsed UPnP fault over the given transport error.
fn fault_or(action: &str, raw_body: &str, fallback: ControlError) -> ControlError {
    if let Some(fault) = parse_soap_fault(raw_body) {
        if let Some(detail) = fault.upnp_error {
            return ControlError::Fault {
                action: action.to_string(),
                code: detail.error_code,
                description: detail.error_description,
            };
        }
        if !fault.fault_string.is_empty() {
            return ControlError::Malformed(format!(
                "{} faulted: {} ({})",
                action, fault.fault_string, fault.fault_code
            ));
        }
    }
    fallback
}

/// Parses a required u32 return value.
pub fn require_u32(response: &ActionResponse, name: &str) -> Result<u32, ControlError> {
    let text = response
        .get(name)
        .ok_or_else(|| ControlError::Malformed(format!("missing {} element", name)))?;
    text.trim()
        .parse::<u32>()
        .map_err(|_| ControlError::bad_value(name, text))
}
