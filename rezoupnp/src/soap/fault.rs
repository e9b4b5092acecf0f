//! SOAP fault construction and parsing.

use xmltree::{Element, EmitterConfig, XMLNode};

use super::decode::sanitize_xml;
use super::{SOAP_ENVELOPE_NS, find_child_with_suffix};

/// Parsed SOAP fault.
#[derive(Debug, Clone)]
pub struct SoapFault {
    pub fault_code: String,
    pub fault_string: String,
    pub upnp_error: Option<UpnpFaultDetail>,
}

/// UPnP-specific error carried in the fault `detail` block.
#[derive(Debug, Clone)]
pub struct UpnpFaultDetail {
    pub error_code: u32,
    pub error_description: String,
}

/// Builds a SOAP fault envelope, with an optional UPnPError detail block.
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error_code: Option<u32>,
    upnp_error_desc: Option<&str>,
) -> Result<String, xmltree::Error> {
    let mut fault = Element::new("s:Fault");

    let mut faultcode_elem = Element::new("faultcode");
    faultcode_elem
        .children
        .push(XMLNode::Text(fault_code.to_string()));
    fault.children.push(XMLNode::Element(faultcode_elem));

    let mut faultstring_elem = Element::new("faultstring");
    faultstring_elem
        .children
        .push(XMLNode::Text(fault_string.to_string()));
    fault.children.push(XMLNode::Element(faultstring_elem));

    if let (Some(code), Some(desc)) = (upnp_error_code, upnp_error_desc) {
        let mut detail = Element::new("detail");

        let mut upnp_error = Element::new("UPnPError");
        upnp_error.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:control-1-0".to_string(),
        );

        let mut error_code_elem = Element::new("errorCode");
        error_code_elem
            .children
            .push(XMLNode::Text(code.to_string()));
        upnp_error.children.push(XMLNode::Element(error_code_elem));

        let mut error_desc_elem = Element::new("errorDescription");
        error_desc_elem
            .children
            .push(XMLNode::Text(desc.to_string()));
        upnp_error.children.push(XMLNode::Element(error_desc_elem));

        detail.children.push(XMLNode::Element(upnp_error));
        fault.children.push(XMLNode::Element(detail));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(fault));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf).expect("emitter produced valid UTF-8"))
}

/// Tries to parse a fault payload out of a raw response body.
///
/// Returns `None` when the body is not a parseable fault; the caller then
/// falls back to its original transport error.
pub fn parse_soap_fault(raw: &str) -> Option<SoapFault> {
    let sanitized = sanitize_xml(raw);
    let root = Element::parse(sanitized.as_bytes()).ok()?;
    let body = find_child_with_suffix(&root, "Body")?;
    let fault = find_child_with_suffix(body, "Fault")?;

    let fault_code = child_text(fault, "faultcode").unwrap_or_default();
    let fault_string = child_text(fault, "faultstring").unwrap_or_default();

    let upnp_error = find_child_with_suffix(fault, "detail")
        .and_then(|detail| find_child_with_suffix(detail, "UPnPError"))
        .and_then(|upnp| {
            let error_code = child_text(upnp, "errorCode")?.trim().parse::<u32>().ok()?;
            let error_description = child_text(upnp, "errorDescription").unwrap_or_default();
            Some(UpnpFaultDetail {
                error_code,
                error_description,
            })
        });

    Some(SoapFault {
        fault_code,
        fault_string,
        upnp_error,
    })
}

fn child_text(parent: &Element, suffix: &str) -> Option<String> {
    find_child_with_suffix(parent, suffix)
        .and_then(|elem| elem.get_text())
        .map(|t| t.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_upnp_fault() {
        let xml = build_soap_fault("s:Client", "UPnPError", Some(401), Some("Invalid Action"))
            .unwrap();

        assert!(xml.contains("<s:Fault>"));
        assert!(xml.contains("<errorCode>401</errorCode>"));
        assert!(xml.contains("<errorDescription>Invalid Action</errorDescription>"));
    }

    #[test]
    fn fault_roundtrips() {
        let xml = build_soap_fault("s:Client", "UPnPError", Some(402), Some("Invalid Args"))
            .unwrap();
        let fault = parse_soap_fault(&xml).unwrap();

        assert_eq!(fault.fault_code, "s:Client");
        let detail = fault.upnp_error.unwrap();
        assert_eq!(detail.error_code, 402);
        assert_eq!(detail.error_description, "Invalid Args");
    }

    #[test]
    fn non_fault_body_yields_none() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
          <s:Body><u:PlayResponse xmlns:u="urn:x"/></s:Body></s:Envelope>"#;
        assert!(parse_soap_fault(xml).is_none());
        assert!(parse_soap_fault("total garbage").is_none());
    }
}
