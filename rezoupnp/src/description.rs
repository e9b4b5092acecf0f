//! Device description fetching and service extraction.
//!
//! Resolves a device's capability document (XML or pre-structured JSON)
//! into a [`DeviceDescription`]: identity fields, the flattened service
//! list with absolute endpoint URLs, a classification, and the widest
//! declared icon. The contract is all-or-nothing: either a fully populated
//! description comes back, or an error does.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;
use xmltree::Element;

use crate::errors::UpnpError;

/// Recursion bound for the embedded-device walk, so malformed or cyclic
/// trees cannot run away.
pub const MAX_DEVICE_DEPTH: usize = 4;

/// Role of a device as advertised by its description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Server,
    Renderer,
    Both,
    Unknown,
}

/// One service entry, with endpoint URLs resolved against the description
/// document's URL.
#[derive(Debug, Clone)]
pub struct ServiceDescription {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
}

/// Fully resolved device description.
#[derive(Debug, Clone)]
pub struct DeviceDescription {
    pub udn: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub services: Vec<ServiceDescription>,
    pub classification: Classification,
    pub icon_url: Option<String>,
    /// True for the Sonos zone-player family, which gets its own native
    /// control backend.
    pub is_sonos: bool,
}

/// Classifies a device from its advertised type strings plus vendor text.
///
/// Tokens containing "mediaserver" or "contentdirectory" imply server
/// capability; "mediarenderer", "avtransport", "playlist", or the Sonos
/// zone-player marker imply renderer capability.
pub fn classify<S: AsRef<str>>(type_strings: &[S], vendor_text: &str) -> Classification {
    let mut is_server = false;
    let mut is_renderer = false;

    let vendor_lower = vendor_text.to_ascii_lowercase();
    let haystacks = type_strings
        .iter()
        .map(|s| s.as_ref().to_ascii_lowercase())
        .chain(std::iter::once(vendor_lower));

    for text in haystacks {
        if text.contains("mediaserver") || text.contains("contentdirectory") {
            is_server = true;
        }
        if text.contains("mediarenderer")
            || text.contains("avtransport")
            || text.contains("playlist")
            || text.contains("zoneplayer")
        {
            is_renderer = true;
        }
    }

    match (is_server, is_renderer) {
        (true, true) => Classification::Both,
        (true, false) => Classification::Server,
        (false, true) => Classification::Renderer,
        (false, false) => Classification::Unknown,
    }
}

/// Fetches and parses a device description with a bounded timeout.
pub async fn fetch_description(
    location: &str,
    timeout: Duration,
) -> Result<DeviceDescription, UpnpError> {
    debug!("Fetching device description at {}", location);

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(location).send().await?.error_for_status()?;
    let body = response.text().await?;

    parse_description(location, &body)
}

/// Parses an XML or JSON description document.
pub fn parse_description(base_url: &str, body: &str) -> Result<DeviceDescription, UpnpError> {
    let trimmed = body.trim_start_matches('\u{feff}').trim_start();
    let tree = if trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|err| UpnpError::Malformed(format!("invalid JSON description: {err}")))?;
        parse_json_tree(&value)?
    } else {
        parse_xml_tree(trimmed)?
    };

    finish(base_url, tree)
}

#[derive(Debug, Default)]
struct ParsedTree {
    device_types: Vec<String>,
    udn: Option<String>,
    friendly_name: Option<String>,
    manufacturer: Option<String>,
    model_name: Option<String>,
    services: Vec<RawService>,
    /// (width, url) pairs from every iconList.
    icons: Vec<(i64, String)>,
}

#[derive(Debug, Default)]
struct RawService {
    service_type: String,
    service_id: String,
    control_url: String,
    event_sub_url: String,
    scpd_url: String,
}

fn finish(base_url: &str, tree: ParsedTree) -> Result<DeviceDescription, UpnpError> {
    let udn = tree.udn.ok_or(UpnpError::MissingField("UDN"))?;
    let friendly_name = tree
        .friendly_name
        .ok_or(UpnpError::MissingField("friendlyName"))?;
    let manufacturer = tree.manufacturer.unwrap_or_default();
    let model_name = tree.model_name.unwrap_or_default();

    let base = Url::parse(base_url)?;
    let services = tree
        .services
        .into_iter()
        .map(|raw| {
            Ok(ServiceDescription {
                service_type: raw.service_type,
                service_id: raw.service_id,
                control_url: resolve(&base, &raw.control_url)?,
                event_sub_url: resolve(&base, &raw.event_sub_url)?,
                scpd_url: resolve(&base, &raw.scpd_url)?,
            })
        })
        .collect::<Result<Vec<_>, UpnpError>>()?;

    let mut type_strings: Vec<String> = tree.device_types.clone();
    type_strings.extend(services.iter().map(|s| s.service_type.clone()));
    let vendor_text = format!("{} {}", manufacturer, model_name);
    let classification = classify(&type_strings, &vendor_text);

    // Widest declared icon wins.
    let icon_url = tree
        .icons
        .iter()
        .max_by_key(|(width, _)| *width)
        .map(|(_, url)| resolve(&base, url))
        .transpose()?;

    let is_sonos = manufacturer.to_ascii_lowercase().contains("sonos")
        || tree
            .device_types
            .iter()
            .any(|t| t.to_ascii_lowercase().contains("zoneplayer"));

    Ok(DeviceDescription {
        udn,
        friendly_name,
        manufacturer,
        model_name,
        services,
        classification,
        icon_url,
        is_sonos,
    })
}

fn resolve(base: &Url, relative: &str) -> Result<String, UpnpError> {
    if relative.is_empty() {
        return Ok(String::new());
    }
    Ok(base.join(relative)?.to_string())
}

// ---------------------------------------------------------------------------
// XML form
// ---------------------------------------------------------------------------

fn parse_xml_tree(body: &str) -> Result<ParsedTree, UpnpError> {
    let root = Element::parse(body.as_bytes())?;
    let device = root
        .get_child("device")
        .ok_or(UpnpError::MissingField("device"))?;

    let mut tree = ParsedTree::default();
    walk_xml_device(device, 0, &mut tree);
    Ok(tree)
}

fn walk_xml_device(device: &Element, depth: usize, tree: &mut ParsedTree) {
    if depth >= MAX_DEVICE_DEPTH {
        debug!("Device tree deeper than {}, pruning", MAX_DEVICE_DEPTH);
        return;
    }

    if let Some(text) = child_text(device, "deviceType") {
        tree.device_types.push(text);
    }

    // Identity comes from the root device only.
    if depth == 0 {
        tree.udn = child_text(device, "UDN");
        tree.friendly_name = child_text(device, "friendlyName");
        tree.manufacturer = child_text(device, "manufacturer");
        tree.model_name = child_text(device, "modelName");
    }

    if let Some(service_list) = device.get_child("serviceList") {
        for node in &service_list.children {
            let Some(service) = node.as_element().filter(|e| e.name == "service") else {
                continue;
            };
            tree.services.push(RawService {
                service_type: child_text(service, "serviceType").unwrap_or_default(),
                service_id: child_text(service, "serviceId").unwrap_or_default(),
                control_url: child_text(service, "controlURL").unwrap_or_default(),
                event_sub_url: child_text(service, "eventSubURL").unwrap_or_default(),
                scpd_url: child_text(service, "SCPDURL").unwrap_or_default(),
            });
        }
    }

    if let Some(icon_list) = device.get_child("iconList") {
        for node in &icon_list.children {
            let Some(icon) = node.as_element().filter(|e| e.name == "icon") else {
                continue;
            };
            let width = child_text(icon, "width")
                .and_then(|w| w.trim().parse::<i64>().ok())
                .unwrap_or(0);
            if let Some(url) = child_text(icon, "url") {
                tree.icons.push((width, url));
            }
        }
    }

    if let Some(device_list) = device.get_child("deviceList") {
        for node in &device_list.children {
            if let Some(embedded) = node.as_element().filter(|e| e.name == "device") {
                walk_xml_device(embedded, depth + 1, tree);
            }
        }
    }
}

fn child_text(parent: &Element, name: &str) -> Option<String> {
    parent
        .get_child(name)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// JSON form
// ---------------------------------------------------------------------------

fn parse_json_tree(value: &Value) -> Result<ParsedTree, UpnpError> {
    let device = value
        .get("root")
        .unwrap_or(value)
        .get("device")
        .ok_or(UpnpError::MissingField("device"))?;

    let mut tree = ParsedTree::default();
    walk_json_device(device, 0, &mut tree);
    Ok(tree)
}

fn walk_json_device(device: &Value, depth: usize, tree: &mut ParsedTree) {
    if depth >= MAX_DEVICE_DEPTH {
        debug!("JSON device tree deeper than {}, pruning", MAX_DEVICE_DEPTH);
        return;
    }

    if let Some(text) = json_str(device, "deviceType") {
        tree.device_types.push(text);
    }

    if depth == 0 {
        tree.udn = json_str(device, "UDN");
        tree.friendly_name = json_str(device, "friendlyName");
        tree.manufacturer = json_str(device, "manufacturer");
        tree.model_name = json_str(device, "modelName");
    }

    for service in json_list(device.get("serviceList"), "service") {
        tree.services.push(RawService {
            service_type: json_str(service, "serviceType").unwrap_or_default(),
            service_id: json_str(service, "serviceId").unwrap_or_default(),
            control_url: json_str(service, "controlURL").unwrap_or_default(),
            event_sub_url: json_str(service, "eventSubURL").unwrap_or_default(),
            scpd_url: json_str(service, "SCPDURL").unwrap_or_default(),
        });
    }

    for icon in json_list(device.get("iconList"), "icon") {
        let width = icon
            .get("width")
            .and_then(|w| w.as_i64().or_else(|| w.as_str()?.trim().parse().ok()))
            .unwrap_or(0);
        if let Some(url) = json_str(icon, "url") {
            tree.icons.push((width, url));
        }
    }

    for embedded in json_list(device.get("deviceList"), "device") {
        walk_json_device(embedded, depth + 1, tree);
    }
}

/// Navigates `parent[key]`, accepting both a single object and an array.
fn json_list<'a>(parent: Option<&'a Value>, key: &str) -> Vec<&'a Value> {
    match parent.and_then(|p| p.get(key)) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single @ Value::Object(_)) => vec![single],
        _ => Vec::new(),
    }
}

fn json_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)?
        .as_str()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SONOS_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:ZonePlayer:1</deviceType>
    <friendlyName>Living Room</friendlyName>
    <manufacturer>Sonos, Inc.</manufacturer>
    <modelName>Sonos One</modelName>
    <UDN>uuid:RINCON_123</UDN>
    <iconList>
      <icon><width>48</width><height>48</height><url>/img/icon-48.png</url></icon>
      <icon><width>120</width><height>120</height><url>/img/icon-120.png</url></icon>
    </iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ZoneGroupTopology:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ZoneGroupTopology</serviceId>
        <controlURL>/ZoneGroupTopology/Control</controlURL>
        <eventSubURL>/ZoneGroupTopology/Event</eventSubURL>
        <SCPDURL>/xml/ZoneGroupTopology1.xml</SCPDURL>
      </service>
    </serviceList>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
            <controlURL>/MediaRenderer/AVTransport/Control</controlURL>
            <eventSubURL>/MediaRenderer/AVTransport/Event</eventSubURL>
            <SCPDURL>/xml/AVTransport1.xml</SCPDURL>
          </service>
          <service>
            <serviceType>urn:sonos-com:service:Queue:1</serviceType>
            <serviceId>urn:sonos-com:serviceId:Queue</serviceId>
            <controlURL>/MediaRenderer/Queue/Control</controlURL>
            <eventSubURL>/MediaRenderer/Queue/Event</eventSubURL>
            <SCPDURL>/xml/Queue1.xml</SCPDURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

    const BASE: &str = "http://10.0.0.9:1400/xml/device_description.xml";

    #[test]
    fn parses_nested_devices_and_resolves_urls() {
        let desc = parse_description(BASE, SONOS_XML).unwrap();

        assert_eq!(desc.udn, "uuid:RINCON_123");
        assert_eq!(desc.friendly_name, "Living Room");
        assert_eq!(desc.services.len(), 3);
        assert!(desc.is_sonos);
        assert_eq!(desc.classification, Classification::Renderer);

        let avt = desc
            .services
            .iter()
            .find(|s| s.service_type.contains("AVTransport"))
            .unwrap();
        assert_eq!(
            avt.control_url,
            "http://10.0.0.9:1400/MediaRenderer/AVTransport/Control"
        );
    }

    #[test]
    fn widest_icon_wins() {
        let desc = parse_description(BASE, SONOS_XML).unwrap();
        assert_eq!(
            desc.icon_url.as_deref(),
            Some("http://10.0.0.9:1400/img/icon-120.png")
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let first = parse_description(BASE, SONOS_XML).unwrap();
        let second = parse_description(BASE, SONOS_XML).unwrap();

        assert_eq!(first.classification, second.classification);
        let types_a: Vec<_> = first.services.iter().map(|s| &s.service_type).collect();
        let types_b: Vec<_> = second.services.iter().map(|s| &s.service_type).collect();
        assert_eq!(types_a, types_b);
    }

    #[test]
    fn depth_bound_prunes_runaway_trees() {
        let mut inner = "<deviceType>urn:x:device:Leaf:1</deviceType>".to_string();
        for _ in 0..10 {
            inner = format!("<deviceType>urn:x:device:Mid:1</deviceType><deviceList><device>{inner}</device></deviceList>");
        }
        let xml = format!(
            "<root><device><UDN>uuid:deep</UDN><friendlyName>Deep</friendlyName>{inner}</device></root>"
        );

        let desc = parse_description(BASE, &xml).unwrap();
        // The walk stops at MAX_DEVICE_DEPTH, so the leaf never shows up
        // and the parse still terminates.
        assert_eq!(desc.udn, "uuid:deep");
    }

    #[test]
    fn missing_identity_is_an_error() {
        let xml = "<root><device><friendlyName>NoUdn</friendlyName></device></root>";
        assert!(matches!(
            parse_description(BASE, xml).unwrap_err(),
            UpnpError::MissingField("UDN")
        ));
    }

    #[test]
    fn parses_json_description() {
        let json = r#"{
          "root": {
            "device": {
              "deviceType": "urn:schemas-upnp-org:device:MediaServer:1",
              "friendlyName": "NAS",
              "manufacturer": "Acme",
              "modelName": "Shelf",
              "UDN": "uuid:nas-1",
              "serviceList": {
                "service": {
                  "serviceType": "urn:schemas-upnp-org:service:ContentDirectory:1",
                  "serviceId": "urn:upnp-org:serviceId:ContentDirectory",
                  "controlURL": "/cd/control",
                  "eventSubURL": "/cd/event",
                  "SCPDURL": "/cd/scpd.xml"
                }
              }
            }
          }
        }"#;

        let desc = parse_description("http://10.0.0.2:8895/desc.json", json).unwrap();
        assert_eq!(desc.friendly_name, "NAS");
        assert_eq!(desc.classification, Classification::Server);
        assert_eq!(
            desc.services[0].control_url,
            "http://10.0.0.2:8895/cd/control"
        );
        assert!(!desc.is_sonos);
    }

    #[test]
    fn classify_covers_all_roles() {
        assert_eq!(
            classify(&["urn:schemas-upnp-org:device:MediaServer:1"], ""),
            Classification::Server
        );
        assert_eq!(
            classify(&["urn:av-openhome-org:service:Playlist:1"], ""),
            Classification::Renderer
        );
        assert_eq!(
            classify(
                &[
                    "urn:schemas-upnp-org:service:ContentDirectory:1",
                    "urn:schemas-upnp-org:service:AVTransport:1"
                ],
                ""
            ),
            Classification::Both
        );
        assert_eq!(classify(&["urn:x:service:Clock:1"], "Acme"), Classification::Unknown);
        // Vendor text alone can classify.
        assert_eq!(
            classify::<&str>(&[], "Sonos ZonePlayer S12"),
            Classification::Renderer
        );
    }
}
