//! Static documents served by the local device: the description document
//! and the two service capability documents.

use rezodidl::escape_xml;

pub const MEDIA_SERVER_DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:MediaServer:1";
pub const CONTENT_DIRECTORY_SERVICE_TYPE: &str =
    "urn:schemas-upnp-org:service:ContentDirectory:1";
pub const CONNECTION_MANAGER_SERVICE_TYPE: &str =
    "urn:schemas-upnp-org:service:ConnectionManager:1";

pub const SERVER_HEADER: &str = "REZOBridge/0.1 UPnP/1.0";

/// Device description document. Endpoint URLs are relative and resolve
/// against the URL this document is fetched from.
pub fn device_description_xml(udn: &str, friendly_name: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion>
    <major>1</major>
    <minor>0</minor>
  </specVersion>
  <device>
    <deviceType>{device_type}</deviceType>
    <friendlyName>{friendly_name}</friendlyName>
    <manufacturer>REZOBridge</manufacturer>
    <modelName>REZOBridge Media Server</modelName>
    <UDN>{udn}</UDN>
    <serviceList>
      <service>
        <serviceType>{cd_type}</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <controlURL>/control</controlURL>
        <eventSubURL>/events</eventSubURL>
        <SCPDURL>/ContentDirectory.xml</SCPDURL>
      </service>
      <service>
        <serviceType>{cm_type}</serviceType>
        <serviceId>urn:upnp-org:serviceId:ConnectionManager</serviceId>
        <controlURL>/control</controlURL>
        <eventSubURL>/events</eventSubURL>
        <SCPDURL>/ConnectionManager.xml</SCPDURL>
      </service>
    </serviceList>
  </device>
</root>
"#,
        device_type = MEDIA_SERVER_DEVICE_TYPE,
        friendly_name = escape_xml(friendly_name),
        udn = escape_xml(udn),
        cd_type = CONTENT_DIRECTORY_SERVICE_TYPE,
        cm_type = CONNECTION_MANAGER_SERVICE_TYPE,
    )
}

/// Static capability document for the ContentDirectory service.
pub const CONTENT_DIRECTORY_SCPD: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <actionList>
    <action>
      <name>Browse</name>
      <argumentList>
        <argument><name>ObjectID</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_ObjectID</relatedStateVariable></argument>
        <argument><name>BrowseFlag</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_BrowseFlag</relatedStateVariable></argument>
        <argument><name>Filter</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_Filter</relatedStateVariable></argument>
        <argument><name>StartingIndex</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_Index</relatedStateVariable></argument>
        <argument><name>RequestedCount</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_Count</relatedStateVariable></argument>
        <argument><name>SortCriteria</name><direction>in</direction><relatedStateVariable>A_ARG_TYPE_SortCriteria</relatedStateVariable></argument>
        <argument><name>Result</name><direction>out</direction><relatedStateVariable>A_ARG_TYPE_Result</relatedStateVariable></argument>
        <argument><name>NumberReturned</name><direction>out</direction><relatedStateVariable>A_ARG_TYPE_Count</relatedStateVariable></argument>
        <argument><name>TotalMatches</name><direction>out</direction><relatedStateVariable>A_ARG_TYPE_Count</relatedStateVariable></argument>
        <argument><name>UpdateID</name><direction>out</direction><relatedStateVariable>A_ARG_TYPE_UpdateID</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>GetSystemUpdateID</name>
      <argumentList>
        <argument><name>Id</name><direction>out</direction><relatedStateVariable>SystemUpdateID</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>GetSearchCapabilities</name>
      <argumentList>
        <argument><name>SearchCaps</name><direction>out</direction><relatedStateVariable>SearchCapabilities</relatedStateVariable></argument>
      </argumentList>
    </action>
    <action>
      <name>GetSortCapabilities</name>
      <argumentList>
        <argument><name>SortCaps</name><direction>out</direction><relatedStateVariable>SortCapabilities</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_ObjectID</name><dataType>string</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_BrowseFlag</name><dataType>string</dataType>
      <allowedValueList><allowedValue>BrowseMetadata</allowedValue><allowedValue>BrowseDirectChildren</allowedValue></allowedValueList>
    </stateVariable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_Filter</name><dataType>string</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_Index</name><dataType>ui4</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_Count</name><dataType>ui4</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_SortCriteria</name><dataType>string</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_Result</name><dataType>string</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>A_ARG_TYPE_UpdateID</name><dataType>ui4</dataType></stateVariable>
    <stateVariable sendEvents="yes"><name>SystemUpdateID</name><dataType>ui4</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>SearchCapabilities</name><dataType>string</dataType></stateVariable>
    <stateVariable sendEvents="no"><name>SortCapabilities</name><dataType>string</dataType></stateVariable>
  </serviceStateTable>
</scpd>
"#;

/// Static capability document for the ConnectionManager service.
pub const CONNECTION_MANAGER_SCPD: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <actionList>
    <action>
      <name>GetProtocolInfo</name>
      <argumentList>
        <argument><name>Source</name><direction>out</direction><relatedStateVariable>SourceProtocolInfo</relatedStateVariable></argument>
        <argument><name>Sink</name><direction>out</direction><relatedStateVariable>SinkProtocolInfo</relatedStateVariable></argument>
      </argumentList>
    </action>
  </actionList>
  <serviceStateTable>
    <stateVariable sendEvents="yes"><name>SourceProtocolInfo</name><dataType>string</dataType></stateVariable>
    <stateVariable sendEvents="yes"><name>SinkProtocolInfo</name><dataType>string</dataType></stateVariable>
  </serviceStateTable>
</scpd>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_carries_identity_and_both_services() {
        let xml = device_description_xml("uuid:abc", "Shelf & More");

        assert!(xml.contains("<UDN>uuid:abc</UDN>"));
        assert!(xml.contains("Shelf &amp; More"));
        assert!(xml.contains(CONTENT_DIRECTORY_SERVICE_TYPE));
        assert!(xml.contains(CONNECTION_MANAGER_SERVICE_TYPE));

        // The document must be consumable by our own extractor.
        let desc = rezoupnp::parse_description("http://10.0.0.5:8200/device.xml", &xml).unwrap();
        assert_eq!(desc.udn, "uuid:abc");
        assert_eq!(desc.classification, rezoupnp::Classification::Server);
        assert_eq!(
            desc.services[0].control_url,
            "http://10.0.0.5:8200/control"
        );
    }
}
