//! SOAP request and response construction.

use xmltree::{Element, EmitterConfig, XMLNode};

use super::{SOAP_ENCODING_NS, SOAP_ENVELOPE_NS};

fn build_soap_envelope_with_body(body_child: Element) -> Result<String, xmltree::Error> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING_NS.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf).expect("emitter produced valid UTF-8"))
}

/// Builds a SOAP request envelope for a UPnP action.
///
/// Argument order is preserved; values are escaped by the XML emitter.
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let request_name = format!("u:{}", action);
    let mut request_elem = Element::new(&request_name);
    request_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text((*value).to_string()));
        request_elem.children.push(XMLNode::Element(child));
    }

    build_soap_envelope_with_body(request_elem)
}

/// Builds a SOAP response envelope wrapping `<u:{action}Response>`.
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let response_name = format!("u:{}Response", action);
    let mut response_elem = Element::new(&response_name);
    response_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in values {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text((*value).to_string()));
        response_elem.children.push(XMLNode::Element(child));
    }

    build_soap_envelope_with_body(response_elem)
}
