//! Lenient decoding of SOAP action responses.
//!
//! Real devices answer with anything from clean SOAP XML to byte-order
//! marks, leading garbage, vendor namespace prefixes, or (for bridged
//! devices) plain JSON. This module is the single normalizing step: every
//! caller hands the raw body here and receives the ordered contents of the
//! `<Action>Response` element, never branching on wire format itself.

use serde_json::Value;
use xmltree::{Element, XMLNode};

use super::find_child_with_suffix;
use crate::errors::UpnpError;

/// Decoded contents of an `<Action>Response` element, in document order.
#[derive(Debug, Clone, Default)]
pub struct ActionResponse {
    pub values: Vec<(String, String)>,
}

impl ActionResponse {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, name: &str) -> Result<&str, UpnpError> {
        self.get(name)
            .ok_or_else(|| UpnpError::MissingElement(name.to_string()))
    }
}

/// Strips a UTF-8 byte-order mark and any leading bytes before the first
/// `<`, then removes namespace prefixes from element names.
pub fn sanitize_xml(raw: &str) -> String {
    let no_bom = raw.trim_start_matches('\u{feff}');
    let from_tag = match no_bom.find('<') {
        Some(idx) => &no_bom[idx..],
        None => no_bom,
    };
    strip_element_prefixes(from_tag)
}

/// Removes `prefix:` from element names (`<u:Play>` becomes `<Play>`).
///
/// Attributes are left untouched; an `xmlns:u` declaration without users is
/// harmless, and stripping element names is enough for devices that emit
/// prefixes without declaring them.
fn strip_element_prefixes(xml: &str) -> String {
    let bytes = xml.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }

        // Comments, processing instructions and declarations pass through.
        if i + 1 < bytes.len() && (bytes[i + 1] == b'!' || bytes[i + 1] == b'?') {
            let end = xml[i..].find('>').map(|e| i + e + 1).unwrap_or(bytes.len());
            out.extend_from_slice(&bytes[i..end]);
            i = end;
            continue;
        }

        out.push(b'<');
        i += 1;
        if i < bytes.len() && bytes[i] == b'/' {
            out.push(b'/');
            i += 1;
        }

        let name_start = i;
        while i < bytes.len() && !matches!(bytes[i], b' ' | b'\t' | b'\r' | b'\n' | b'>' | b'/') {
            i += 1;
        }
        let name = &bytes[name_start..i];
        match name.iter().rposition(|&b| b == b':') {
            Some(colon) => out.extend_from_slice(&name[colon + 1..]),
            None => out.extend_from_slice(name),
        }
    }

    // Only ASCII prefix bytes were removed, so the buffer stays valid UTF-8.
    String::from_utf8(out).expect("prefix stripping preserves UTF-8")
}

/// Decodes a raw response body (XML or JSON text) into the contents of
/// `<{action}Response>`.
pub fn decode_action_response(raw: &str, action: &str) -> Result<ActionResponse, UpnpError> {
    let trimmed = raw.trim_start_matches('\u{feff}').trim_start();

    if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|err| UpnpError::Malformed(format!("invalid JSON response: {err}")))?;
        return decode_json_response(&value, action);
    }

    let sanitized = sanitize_xml(raw);
    let root = Element::parse(sanitized.as_bytes())?;
    if !root.name.ends_with("Envelope") {
        return Err(UpnpError::Malformed(format!(
            "expected SOAP Envelope, found <{}>",
            root.name
        )));
    }

    let body = find_child_with_suffix(&root, "Body")
        .ok_or_else(|| UpnpError::MissingElement("Body".to_string()))?;
    let response_name = format!("{}Response", action);
    let response = find_child_with_suffix(body, &response_name)
        .ok_or_else(|| UpnpError::MissingElement(response_name))?;

    Ok(element_to_response(response))
}

/// Decodes a pre-structured (JSON) payload into an [`ActionResponse`].
///
/// Accepts either `{"<Action>Response": {...}}` or the bare argument map.
pub fn decode_json_response(value: &Value, action: &str) -> Result<ActionResponse, UpnpError> {
    let object = value
        .as_object()
        .ok_or_else(|| UpnpError::Malformed("JSON response is not an object".to_string()))?;

    let response_name = format!("{}Response", action);
    let inner = object
        .iter()
        .find(|(key, _)| key.ends_with(&response_name))
        .and_then(|(_, v)| v.as_object())
        .unwrap_or(object);

    let values = inner
        .iter()
        .map(|(name, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (name.clone(), text)
        })
        .collect();

    Ok(ActionResponse { values })
}

fn element_to_response(response: &Element) -> ActionResponse {
    let values = response
        .children
        .iter()
        .filter_map(|node| match node {
            XMLNode::Element(elem) => {
                let text = elem
                    .get_text()
                    .map(|t| t.into_owned())
                    .unwrap_or_default();
                Some((elem.name.clone(), text))
            }
            _ => None,
        })
        .collect();

    ActionResponse { values }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
      <CurrentVolume>42</CurrentVolume>
    </u:GetVolumeResponse>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn decodes_clean_xml() {
        let response = decode_action_response(CLEAN, "GetVolume").unwrap();
        assert_eq!(response.require("CurrentVolume").unwrap(), "42");
    }

    #[test]
    fn tolerates_bom_and_leading_junk() {
        let noisy = format!("\u{feff}\r\n-- boot log --{}", CLEAN);
        let response = decode_action_response(&noisy, "GetVolume").unwrap();
        assert_eq!(response.get("CurrentVolume"), Some("42"));
    }

    #[test]
    fn strips_vendor_prefixes() {
        let xml = r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <m:PlayResponse xmlns:m="urn:schemas-upnp-org:service:AVTransport:1"></m:PlayResponse>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;
        let response = decode_action_response(xml, "Play").unwrap();
        assert!(response.values.is_empty());
    }

    #[test]
    fn decodes_json_text() {
        let json = r#"{"GetVolumeResponse": {"CurrentVolume": 42}}"#;
        let response = decode_action_response(json, "GetVolume").unwrap();
        assert_eq!(response.get("CurrentVolume"), Some("42"));
    }

    #[test]
    fn decodes_bare_json_map() {
        let json = r#"{"CurrentVolume": "17"}"#;
        let response = decode_action_response(json, "GetVolume").unwrap();
        assert_eq!(response.get("CurrentVolume"), Some("17"));
    }

    #[test]
    fn preserves_argument_order() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"><s:Body>
          <u:BrowseResponse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
            <Result>didl</Result>
            <NumberReturned>1</NumberReturned>
            <TotalMatches>1</TotalMatches>
          </u:BrowseResponse>
        </s:Body></s:Envelope>"#;
        let response = decode_action_response(xml, "Browse").unwrap();
        let names: Vec<_> = response.values.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["Result", "NumberReturned", "TotalMatches"]);
    }

    #[test]
    fn missing_response_element_is_an_error() {
        let err = decode_action_response(CLEAN, "GetMute").unwrap_err();
        assert!(err.to_string().contains("GetMuteResponse"));
    }
}
