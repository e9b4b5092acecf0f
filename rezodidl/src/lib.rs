//! # rezodidl - DIDL-Lite documents
//!
//! Serde models and helpers for the DIDL-Lite listing format used by UPnP
//! ContentDirectory and playlist services. Parsing accepts both the
//! namespaced (`dc:title`) and the bare (`title`) element spellings, since
//! real devices emit both.

use serde::{Deserialize, Serialize};

pub const DIDL_NS: &str = "urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/";
pub const DC_NS: &str = "http://purl.org/dc/elements/1.1/";
pub const UPNP_NS: &str = "urn:schemas-upnp-org:metadata-1-0/upnp/";

pub const CLASS_MUSIC_TRACK: &str = "object.item.audioItem.musicTrack";
pub const CLASS_STORAGE_FOLDER: &str = "object.container.storageFolder";

#[derive(Debug, thiserror::Error)]
pub enum DidlError {
    #[error("DIDL-Lite parse error: {0}")]
    Parse(#[from] quick_xml::de::DeError),
    #[error("DIDL-Lite serialize error: {0}")]
    Serialize(#[from] quick_xml::se::SeError),
}

/// Root of a DIDL-Lite document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename = "DIDL-Lite")]
pub struct DIDLLite {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,

    #[serde(rename = "@xmlns:dc", skip_serializing_if = "Option::is_none")]
    pub xmlns_dc: Option<String>,

    #[serde(rename = "@xmlns:upnp", skip_serializing_if = "Option::is_none")]
    pub xmlns_upnp: Option<String>,

    #[serde(rename = "container", default)]
    pub containers: Vec<Container>,

    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

impl DIDLLite {
    /// An empty document carrying the standard namespace declarations.
    pub fn empty() -> Self {
        Self {
            xmlns: DIDL_NS.to_string(),
            xmlns_dc: Some(DC_NS.to_string()),
            xmlns_upnp: Some(UPNP_NS.to_string()),
            containers: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, DidlError> {
        Ok(quick_xml::de::from_str(input)?)
    }

    pub fn to_xml(&self) -> Result<String, DidlError> {
        Ok(quick_xml::se::to_string(self)?)
    }
}

/// Container element (browsable node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@parentID")]
    pub parent_id: String,

    #[serde(rename = "@restricted", skip_serializing_if = "Option::is_none")]
    pub restricted: Option<String>,

    #[serde(rename = "@childCount", skip_serializing_if = "Option::is_none")]
    pub child_count: Option<String>,

    #[serde(rename = "dc:title", alias = "title")]
    pub title: String,

    #[serde(rename = "upnp:class", alias = "class")]
    pub class: String,
}

/// Item element (terminal, playable object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@parentID")]
    pub parent_id: String,

    #[serde(rename = "@restricted", skip_serializing_if = "Option::is_none")]
    pub restricted: Option<String>,

    #[serde(rename = "dc:title", alias = "title")]
    pub title: String,

    #[serde(rename = "upnp:class", alias = "class")]
    pub class: String,

    #[serde(
        rename = "upnp:artist",
        alias = "artist",
        skip_serializing_if = "Option::is_none"
    )]
    pub artist: Option<String>,

    #[serde(
        rename = "dc:creator",
        alias = "creator",
        skip_serializing_if = "Option::is_none"
    )]
    pub creator: Option<String>,

    #[serde(
        rename = "upnp:album",
        alias = "album",
        skip_serializing_if = "Option::is_none"
    )]
    pub album: Option<String>,

    #[serde(
        rename = "upnp:genre",
        alias = "genre",
        skip_serializing_if = "Option::is_none"
    )]
    pub genre: Option<String>,

    #[serde(
        rename = "dc:date",
        alias = "date",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<String>,

    #[serde(
        rename = "upnp:originalTrackNumber",
        alias = "originalTrackNumber",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_track_number: Option<String>,

    #[serde(
        rename = "upnp:originalDiscNumber",
        alias = "originalDiscNumber",
        skip_serializing_if = "Option::is_none"
    )]
    pub original_disc_number: Option<String>,

    /// Item-level duration, seen in pre-structured listings instead of the
    /// `res` attribute.
    #[serde(rename = "duration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(rename = "res", default)]
    pub resources: Vec<Resource>,
}

/// Media resource carried by an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "@protocolInfo")]
    pub protocol_info: String,

    #[serde(rename = "@duration", skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    #[serde(rename = "@size", skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    #[serde(rename = "$text")]
    pub url: String,
}

impl Item {
    /// First resource with a non-empty URL, if any.
    pub fn primary_resource(&self) -> Option<&Resource> {
        self.resources.iter().find(|r| !r.url.trim().is_empty())
    }
}

/// Escapes the five XML special characters.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Fields of a single-item DIDL-Lite fragment.
///
/// This is the minimal listing a renderer needs to enqueue one track:
/// title, artist, album, class, and a resource with protocol info.
#[derive(Debug, Clone, Default)]
pub struct FragmentInput<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub artist: Option<&'a str>,
    pub album: Option<&'a str>,
    pub uri: &'a str,
    pub protocol_info: &'a str,
    pub duration: Option<&'a str>,
}

/// Builds a minimal one-item DIDL-Lite fragment for queue insertion.
pub fn item_fragment(input: &FragmentInput<'_>) -> String {
    let mut didl = format!(
        r#"<DIDL-Lite xmlns="{DIDL_NS}" xmlns:dc="{DC_NS}" xmlns:upnp="{UPNP_NS}">"#
    );
    didl.push_str(&format!(
        r#"<item id="{}" parentID="-1" restricted="true">"#,
        escape_xml(input.id)
    ));
    didl.push_str(&format!("<dc:title>{}</dc:title>", escape_xml(input.title)));
    if let Some(artist) = input.artist {
        didl.push_str(&format!(
            "<upnp:artist>{}</upnp:artist>",
            escape_xml(artist)
        ));
    }
    if let Some(album) = input.album {
        didl.push_str(&format!("<upnp:album>{}</upnp:album>", escape_xml(album)));
    }
    didl.push_str(&format!("<upnp:class>{CLASS_MUSIC_TRACK}</upnp:class>"));

    let protocol_info = if input.protocol_info.is_empty() {
        "http-get:*:audio/*:*"
    } else {
        input.protocol_info
    };
    match input.duration {
        Some(duration) => didl.push_str(&format!(
            r#"<res protocolInfo="{}" duration="{}">{}</res>"#,
            escape_xml(protocol_info),
            escape_xml(duration),
            escape_xml(input.uri)
        )),
        None => didl.push_str(&format!(
            r#"<res protocolInfo="{}">{}</res>"#,
            escape_xml(protocol_info),
            escape_xml(input.uri)
        )),
    }
    didl.push_str("</item></DIDL-Lite>");
    didl
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"
        xmlns:dc="http://purl.org/dc/elements/1.1/"
        xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
      <container id="1$4" parentID="1" restricted="1" childCount="2">
        <dc:title>Albums</dc:title>
        <upnp:class>object.container.storageFolder</upnp:class>
      </container>
      <item id="1$4$1" parentID="1$4" restricted="1">
        <dc:title>Blue Train</dc:title>
        <upnp:artist>John Coltrane</upnp:artist>
        <upnp:album>Blue Train</upnp:album>
        <upnp:originalTrackNumber>1</upnp:originalTrackNumber>
        <res protocolInfo="http-get:*:audio/flac:*" duration="0:10:43">http://10.0.0.2/a.flac</res>
      </item>
    </DIDL-Lite>"#;

    #[test]
    fn parses_containers_and_items() {
        let didl = DIDLLite::parse(SAMPLE).unwrap();
        assert_eq!(didl.containers.len(), 1);
        assert_eq!(didl.items.len(), 1);

        let item = &didl.items[0];
        assert_eq!(item.title, "Blue Train");
        assert_eq!(item.artist.as_deref(), Some("John Coltrane"));
        assert_eq!(item.original_track_number.as_deref(), Some("1"));

        let res = item.primary_resource().unwrap();
        assert_eq!(res.duration.as_deref(), Some("0:10:43"));
        assert_eq!(res.url, "http://10.0.0.2/a.flac");
    }

    #[test]
    fn parses_bare_element_names() {
        let xml = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/">
          <item id="x" parentID="0">
            <title>Plain</title>
            <class>object.item.audioItem.musicTrack</class>
          </item>
        </DIDL-Lite>"#;
        let didl = DIDLLite::parse(xml).unwrap();
        assert_eq!(didl.items[0].title, "Plain");
    }

    #[test]
    fn fragment_escapes_metadata() {
        let fragment = item_fragment(&FragmentInput {
            id: "a&b",
            title: "Tom & Jerry <live>",
            artist: Some("X"),
            album: None,
            uri: "http://host/track?id=1&fmt=flac",
            protocol_info: "",
            duration: Some("00:03:10"),
        });

        assert!(fragment.contains("Tom &amp; Jerry &lt;live&gt;"));
        assert!(fragment.contains("http://host/track?id=1&amp;fmt=flac"));
        assert!(fragment.contains(r#"protocolInfo="http-get:*:audio/*:*""#));
        // The fragment must itself be parseable.
        let parsed = DIDLLite::parse(&fragment).unwrap();
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].title, "Tom & Jerry <live>");
    }

    #[test]
    fn roundtrips_through_serializer() {
        let mut didl = DIDLLite::empty();
        didl.containers.push(Container {
            id: "music".to_string(),
            parent_id: "0".to_string(),
            restricted: Some("1".to_string()),
            child_count: None,
            title: "Music".to_string(),
            class: CLASS_STORAGE_FOLDER.to_string(),
        });

        let xml = didl.to_xml().unwrap();
        let back = DIDLLite::parse(&xml).unwrap();
        assert_eq!(back.containers.len(), 1);
        assert_eq!(back.containers[0].title, "Music");
    }
}
