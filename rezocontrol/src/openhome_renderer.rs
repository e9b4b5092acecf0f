//! Standard playlist backend, driving the OpenHome Playlist service.
//!
//! Track ids in this domain are server-issued monotonic integers.

use tracing::debug;

use rezodidl::DIDLLite;

use crate::errors::ControlError;
use crate::model::{DeviceRecord, Track, TransportState, TransportStatus};
use crate::openhome_client::{OhPlaylistClient, OhTimeClient, OhTrackEntry, OhVolumeClient};
use crate::rendering_control_client::RenderingControlClient;
use crate::time_utils::parse_duration_value;

#[derive(Debug, Clone)]
pub struct OpenHomeRenderer {
    name: String,
    playlist: OhPlaylistClient,
    volume: Option<OhVolumeClient>,
    rc: Option<RenderingControlClient>,
    time: Option<OhTimeClient>,
}

impl OpenHomeRenderer {
    pub fn from_record(record: &DeviceRecord) -> Result<Self, ControlError> {
        Ok(Self {
            name: record.display_name().to_string(),
            playlist: OhPlaylistClient::from_record(record)?,
            volume: OhVolumeClient::from_record(record),
            rc: RenderingControlClient::from_record(record),
            time: OhTimeClient::from_record(record),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn volume(&self) -> Result<u16, ControlError> {
        if let Some(volume) = &self.volume {
            return volume.volume().await;
        }
        match &self.rc {
            Some(rc) => rc.get_volume().await,
            None => Err(ControlError::UnsupportedDevice(self.name.clone())),
        }
    }

    pub async fn set_volume(&self, value: u16) -> Result<(), ControlError> {
        if let Some(volume) = &self.volume {
            return volume.set_volume(value).await;
        }
        match &self.rc {
            Some(rc) => rc.set_volume(value).await,
            None => Err(ControlError::UnsupportedDevice(self.name.clone())),
        }
    }

    pub async fn mute(&self) -> Result<bool, ControlError> {
        if let Some(volume) = &self.volume {
            return volume.mute().await;
        }
        match &self.rc {
            Some(rc) => rc.get_mute().await,
            None => Err(ControlError::UnsupportedDevice(self.name.clone())),
        }
    }

    pub async fn set_mute(&self, value: bool) -> Result<(), ControlError> {
        if let Some(volume) = &self.volume {
            return volume.set_mute(value).await;
        }
        match &self.rc {
            Some(rc) => rc.set_mute(value).await,
            None => Err(ControlError::UnsupportedDevice(self.name.clone())),
        }
    }

    pub async fn playlist(&self) -> Result<Vec<Track>, ControlError> {
        let ids = self.playlist.id_array().await?;
        debug!(renderer = self.name.as_str(), count = ids.len(), "Reading playlist");

        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            let entry = self.playlist.read(id).await?;
            tracks.push(track_from_entry(entry));
        }
        Ok(tracks)
    }

    pub async fn insert(
        &self,
        after: Option<u32>,
        uri: &str,
        metadata: &str,
    ) -> Result<u32, ControlError> {
        // "After id" passes straight through; 0 inserts at the head.
        self.playlist
            .insert(after.unwrap_or(0), uri, metadata)
            .await
    }

    pub async fn delete(&self, id: u32) -> Result<(), ControlError> {
        self.playlist.delete_id(id).await
    }

    pub async fn clear(&self) -> Result<(), ControlError> {
        self.playlist.delete_all().await
    }

    pub async fn id_array(&self) -> Result<Vec<u32>, ControlError> {
        self.playlist.id_array().await
    }

    pub async fn play(&self) -> Result<(), ControlError> {
        self.playlist.play().await
    }

    pub async fn pause(&self) -> Result<(), ControlError> {
        self.playlist.pause().await
    }

    pub async fn stop(&self) -> Result<(), ControlError> {
        self.playlist.stop().await
    }

    pub async fn next(&self) -> Result<(), ControlError> {
        self.playlist.next().await
    }

    pub async fn previous(&self) -> Result<(), ControlError> {
        self.playlist.previous().await
    }

    pub async fn status(&self) -> Result<TransportStatus, ControlError> {
        let state = self.playlist.transport_state().await?;
        let current_id = self.playlist.current_id().await?;

        let (duration_secs, position_secs) = match &self.time {
            Some(time) => {
                let position = time.time().await?;
                (Some(position.duration_secs), Some(position.elapsed_secs))
            }
            None => (None, None),
        };

        Ok(TransportStatus {
            track_id: (current_id > 0).then(|| current_id.to_string()),
            state: TransportState::from_vocabulary(&state),
            duration_secs,
            position_secs,
        })
    }

    pub async fn seek_id(&self, id: u32) -> Result<(), ControlError> {
        self.playlist.seek_id(id).await?;
        self.playlist.play().await
    }

    pub async fn seek_time(&self, seconds: u32) -> Result<(), ControlError> {
        self.playlist.seek_second_absolute(seconds).await
    }
}

fn track_from_entry(entry: OhTrackEntry) -> Track {
    let metadata = entry
        .metadata_xml
        .trim()
        .is_empty()
        .then(DIDLLite::empty)
        .or_else(|| DIDLLite::parse(&entry.metadata_xml).ok());

    let item = metadata.as_ref().and_then(|didl| didl.items.first());

    // Filename-derived fallback when the metadata is missing or broken.
    let fallback_title = entry
        .uri
        .rsplit('/')
        .next()
        .unwrap_or(&entry.uri)
        .to_string();

    Track {
        id: entry.id.to_string(),
        title: item
            .map(|i| i.title.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or(fallback_title),
        artist: item.and_then(|i| i.artist.clone().or_else(|| i.creator.clone())),
        album: item.and_then(|i| i.album.clone()),
        duration_secs: item
            .and_then(|i| i.primary_resource())
            .and_then(|r| r.duration.as_deref())
            .and_then(parse_duration_value),
        protocol_info: item
            .and_then(|i| i.primary_resource())
            .map(|r| r.protocol_info.clone())
            .unwrap_or_default(),
        uri: entry.uri,
        track_number: None,
        disc_number: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_without_metadata_falls_back_to_filename() {
        let track = track_from_entry(OhTrackEntry {
            id: 12,
            uri: "http://10.0.0.2/music/song.flac".to_string(),
            metadata_xml: String::new(),
        });

        assert_eq!(track.id, "12");
        assert_eq!(track.title, "song.flac");
        assert!(track.artist.is_none());
    }

    #[test]
    fn entry_metadata_is_parsed() {
        let metadata = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"
            xmlns:dc="http://purl.org/dc/elements/1.1/"
            xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
          <item id="t" parentID="0">
            <dc:title>Naima</dc:title>
            <upnp:artist>John Coltrane</upnp:artist>
            <upnp:album>Giant Steps</upnp:album>
            <upnp:class>object.item.audioItem.musicTrack</upnp:class>
            <res protocolInfo="http-get:*:audio/flac:*" duration="0:04:21">http://h/naima.flac</res>
          </item>
        </DIDL-Lite>"#;

        let track = track_from_entry(OhTrackEntry {
            id: 3,
            uri: "http://h/naima.flac".to_string(),
            metadata_xml: metadata.to_string(),
        });

        assert_eq!(track.title, "Naima");
        assert_eq!(track.artist.as_deref(), Some("John Coltrane"));
        assert_eq!(track.duration_secs, Some(261));
    }
}
