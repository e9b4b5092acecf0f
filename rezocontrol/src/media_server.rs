//! Remote ContentDirectory browsing.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use tracing::{debug, warn};

use rezodidl::{DIDLLite, Item};

use crate::errors::ControlError;
use crate::model::{BrowseEntry, DeviceRecord, Track, service_markers};
use crate::soap_client::invoke_action;
use crate::time_utils::parse_duration_value;

/// Backend-agnostic browsing contract, also implemented by test stubs.
#[async_trait]
pub trait MediaBrowser {
    /// Lists the direct children of a container.
    async fn browse(&self, container_id: &str) -> Result<Vec<BrowseEntry>, ControlError>;
}

/// Remote UPnP media server, driven through its ContentDirectory service.
#[derive(Debug, Clone)]
pub struct UpnpMediaServer {
    pub friendly_name: String,
    control_url: String,
    service_type: String,
}

impl UpnpMediaServer {
    pub fn from_record(record: &DeviceRecord) -> Result<Self, ControlError> {
        let service = record
            .find_service(service_markers::CONTENT_DIRECTORY)
            .ok_or_else(|| ControlError::UnsupportedDevice(record.display_name().to_string()))?;
        Ok(Self {
            friendly_name: record.display_name().to_string(),
            control_url: service.control_url.clone(),
            service_type: service.service_type.clone(),
        })
    }

    /// Builds a browser directly from endpoint URLs (used for the queue
    /// container renderers expose through their own ContentDirectory).
    pub fn from_endpoints(control_url: String, service_type: String) -> Self {
        Self {
            friendly_name: String::new(),
            control_url,
            service_type,
        }
    }

    async fn browse_with_flag(
        &self,
        object_id: &str,
        browse_flag: &str,
    ) -> Result<Vec<BrowseEntry>, ControlError> {
        let response = invoke_action(
            &self.control_url,
            &self.service_type,
            "Browse",
            &[
                ("ObjectID", object_id),
                ("BrowseFlag", browse_flag),
                ("Filter", "*"),
                ("StartingIndex", "0"),
                ("RequestedCount", "0"),
                ("SortCriteria", ""),
            ],
        )
        .await?;

        let didl_xml = response.require("Result")?;
        didl_to_entries(didl_xml)
    }

    /// Metadata of a single object.
    pub async fn browse_metadata(&self, object_id: &str) -> Result<BrowseEntry, ControlError> {
        let entries = self.browse_with_flag(object_id, "BrowseMetadata").await?;
        entries
            .into_iter()
            .next()
            .ok_or_else(|| ControlError::NotFound(object_id.to_string()))
    }
}

#[async_trait]
impl MediaBrowser for UpnpMediaServer {
    async fn browse(&self, container_id: &str) -> Result<Vec<BrowseEntry>, ControlError> {
        self.browse_with_flag(container_id, "BrowseDirectChildren")
            .await
    }
}

/// Maps a directory listing document onto browse entries.
pub fn didl_to_entries(xml: &str) -> Result<Vec<BrowseEntry>, ControlError> {
    let trimmed = xml.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let didl = DIDLLite::parse(trimmed)
        .map_err(|err| ControlError::Malformed(format!("DIDL-Lite payload: {err}")))?;

    let mut entries = Vec::new();
    for container in didl.containers {
        entries.push(BrowseEntry::Container {
            id: container.id,
            title: container.title,
        });
    }
    for item in didl.items {
        if let Some(track) = track_from_item(&item) {
            entries.push(BrowseEntry::Item(track));
        }
    }
    Ok(entries)
}

/// Converts a DIDL item to a track; items without a playable URI are
/// dropped.
fn track_from_item(item: &Item) -> Option<Track> {
    let resource = item.primary_resource()?;

    // The resource attribute is the authoritative duration; the metadata
    // element is the fallback.
    let duration_secs = resource
        .duration
        .as_deref()
        .and_then(parse_duration_value)
        .or_else(|| item.duration.as_deref().and_then(parse_duration_value));

    Some(Track {
        id: item.id.clone(),
        title: item.title.clone(),
        artist: item.artist.clone().or_else(|| item.creator.clone()),
        album: item.album.clone(),
        uri: resource.url.trim().to_string(),
        duration_secs,
        protocol_info: resource.protocol_info.clone(),
        track_number: item
            .original_track_number
            .as_deref()
            .and_then(|t| t.trim().parse().ok()),
        disc_number: item
            .original_disc_number
            .as_deref()
            .and_then(|t| t.trim().parse().ok()),
    })
}

/// Breadth-first traversal of a container tree, accumulating leaf items.
///
/// A visited set keyed by container id guarantees termination on malformed
/// cyclic trees; a failing branch is logged and skipped without aborting
/// the rest of the walk. Branches are visited strictly one at a time, so a
/// single slow branch slows the whole traversal.
pub async fn browse_recursive(
    browser: &(dyn MediaBrowser + Sync),
    container_id: &str,
) -> Result<Vec<Track>, ControlError> {
    let mut tracks = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    visited.insert(container_id.to_string());
    queue.push_back(container_id.to_string());

    while let Some(current) = queue.pop_front() {
        let entries = match browser.browse(&current).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(container = %current, error = %err, "Browse branch failed; skipping");
                continue;
            }
        };

        for entry in entries {
            match entry {
                BrowseEntry::Item(track) => tracks.push(track),
                BrowseEntry::Container { id, .. } => {
                    if visited.insert(id.clone()) {
                        queue.push_back(id);
                    } else {
                        debug!(container = %id, "Container already visited; cycle ignored");
                    }
                }
            }
        }
    }

    sort_tracks(&mut tracks);
    Ok(tracks)
}

/// Stable sort by album, disc number (missing = 1), track number
/// (missing = 0), then title; text comparisons are case-insensitive.
pub fn sort_tracks(tracks: &mut [Track]) {
    tracks.sort_by(|a, b| {
        let album_a = a.album.as_deref().unwrap_or("").to_lowercase();
        let album_b = b.album.as_deref().unwrap_or("").to_lowercase();
        album_a
            .cmp(&album_b)
            .then_with(|| a.disc_number.unwrap_or(1).cmp(&b.disc_number.unwrap_or(1)))
            .then_with(|| a.track_number.unwrap_or(0).cmp(&b.track_number.unwrap_or(0)))
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn track(album: &str, disc: Option<u32>, number: Option<u32>, title: &str) -> Track {
        Track {
            id: title.to_string(),
            title: title.to_string(),
            artist: None,
            album: Some(album.to_string()),
            uri: format!("http://h/{title}"),
            duration_secs: None,
            protocol_info: "http-get:*:audio/mpeg:*".to_string(),
            track_number: number,
            disc_number: disc,
        }
    }

    /// Scripted browser: container id to entries, with optional failures.
    struct StubBrowser {
        tree: HashMap<String, Vec<BrowseEntry>>,
        failing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaBrowser for StubBrowser {
        async fn browse(&self, container_id: &str) -> Result<Vec<BrowseEntry>, ControlError> {
            self.calls.lock().unwrap().push(container_id.to_string());
            if self.failing.iter().any(|f| f == container_id) {
                return Err(ControlError::Network("unreachable branch".to_string()));
            }
            Ok(self.tree.get(container_id).cloned().unwrap_or_default())
        }
    }

    fn container(id: &str) -> BrowseEntry {
        BrowseEntry::Container {
            id: id.to_string(),
            title: id.to_string(),
        }
    }

    #[tokio::test]
    async fn recursion_terminates_on_cycles() {
        // A lists B, B lists A.
        let mut tree = HashMap::new();
        tree.insert(
            "A".to_string(),
            vec![container("B"), BrowseEntry::Item(track("x", None, Some(1), "one"))],
        );
        tree.insert("B".to_string(), vec![container("A")]);

        let browser = StubBrowser {
            tree,
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        };

        let tracks = browse_recursive(&browser, "A").await.unwrap();
        assert_eq!(tracks.len(), 1);

        // Each container browsed at most once.
        let calls = browser.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn failing_branch_does_not_abort_traversal() {
        let mut tree = HashMap::new();
        tree.insert(
            "root".to_string(),
            vec![container("dead"), container("live")],
        );
        tree.insert(
            "live".to_string(),
            vec![BrowseEntry::Item(track("a", None, Some(1), "ok"))],
        );

        let browser = StubBrowser {
            tree,
            failing: vec!["dead".to_string()],
            calls: Mutex::new(Vec::new()),
        };

        let tracks = browse_recursive(&browser, "root").await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "ok");
    }

    #[test]
    fn sort_follows_album_disc_track_title() {
        let mut tracks = vec![
            track("B", None, Some(2), "Y"),
            track("A", None, Some(1), "X"),
            track("A", None, Some(1), "W"),
        ];
        sort_tracks(&mut tracks);

        let order: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(order, ["W", "X", "Y"]);

        // Case-insensitive album comparison; missing disc is disc 1.
        let mut tracks = vec![
            track("beta", Some(2), Some(1), "late"),
            track("Beta", None, Some(9), "early-disc"),
            track("alpha", None, None, "first"),
        ];
        sort_tracks(&mut tracks);
        let order: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(order, ["first", "early-disc", "late"]);
    }

    #[test]
    fn didl_mapping_prefers_resource_duration() {
        let xml = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"
            xmlns:dc="http://purl.org/dc/elements/1.1/"
            xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
          <item id="i1" parentID="0">
            <dc:title>With res duration</dc:title>
            <upnp:class>object.item.audioItem.musicTrack</upnp:class>
            <duration>999</duration>
            <res protocolInfo="http-get:*:audio/flac:*" duration="0:01:40">http://h/1</res>
          </item>
          <item id="i2" parentID="0">
            <dc:title>Metadata duration only</dc:title>
            <upnp:class>object.item.audioItem.musicTrack</upnp:class>
            <duration>245</duration>
            <res protocolInfo="http-get:*:audio/flac:*">http://h/2</res>
          </item>
        </DIDL-Lite>"#;

        let entries = didl_to_entries(xml).unwrap();
        let tracks: Vec<&Track> = entries
            .iter()
            .filter_map(|e| match e {
                BrowseEntry::Item(t) => Some(t),
                _ => None,
            })
            .collect();

        assert_eq!(tracks[0].duration_secs, Some(100));
        assert_eq!(tracks[1].duration_secs, Some(245));
    }

    #[test]
    fn empty_result_payload_is_empty_listing() {
        assert!(didl_to_entries("").unwrap().is_empty());
        assert!(didl_to_entries("   ").unwrap().is_empty());
    }
}
