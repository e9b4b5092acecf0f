//! Parsing of incoming SOAP action requests (server side).

use std::collections::HashMap;

use xmltree::Element;

use super::decode::sanitize_xml;
use super::find_child_with_suffix;
use crate::errors::UpnpError;

/// UPnP action extracted from a request envelope.
#[derive(Debug, Clone)]
pub struct SoapAction {
    /// Action name, e.g. "Browse".
    pub name: String,
    /// Arguments of the action.
    pub args: HashMap<String, String>,
}

impl SoapAction {
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(|s| s.as_str())
    }
}

/// Parses a UPnP action out of a SOAP request body.
pub fn parse_soap_action(xml: &str) -> Result<SoapAction, UpnpError> {
    let sanitized = sanitize_xml(xml);
    let root = Element::parse(sanitized.as_bytes())?;

    if !root.name.ends_with("Envelope") {
        return Err(UpnpError::Malformed("missing SOAP Envelope".to_string()));
    }

    let body = find_child_with_suffix(&root, "Body")
        .ok_or_else(|| UpnpError::MissingElement("Body".to_string()))?;

    let action_elem = body
        .children
        .iter()
        .find_map(|n| n.as_element())
        .ok_or_else(|| UpnpError::Malformed("no action in SOAP Body".to_string()))?;

    let mut args = HashMap::new();
    for child in &action_elem.children {
        if let Some(elem) = child.as_element() {
            let value = elem.get_text().unwrap_or_default().to_string();
            args.insert(elem.name.clone(), value);
        }
    }

    Ok(SoapAction {
        name: action_elem.name.clone(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_with_args() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:Browse xmlns:u="urn:schemas-upnp-org:service:ContentDirectory:1">
      <ObjectID>0</ObjectID>
      <BrowseFlag>BrowseDirectChildren</BrowseFlag>
    </u:Browse>
  </s:Body>
</s:Envelope>"#;

        let action = parse_soap_action(xml).unwrap();
        assert_eq!(action.name, "Browse");
        assert_eq!(action.arg("ObjectID"), Some("0"));
        assert_eq!(action.arg("BrowseFlag"), Some("BrowseDirectChildren"));
    }

    #[test]
    fn parses_action_without_args() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
          <s:Body><u:GetSystemUpdateID xmlns:u="urn:x"/></s:Body></s:Envelope>"#;

        let action = parse_soap_action(xml).unwrap();
        assert_eq!(action.name, "GetSystemUpdateID");
        assert!(action.args.is_empty());
    }
}
