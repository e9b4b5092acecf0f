//! Generic transport backend: plain AVTransport control paired with a
//! vendor queue service, for queue-capable devices outside the native
//! vendor family. Seeking addresses tracks by number (TRACK_NR unit).

use crate::avtransport_client::AvTransportClient;
use crate::errors::ControlError;
use crate::media_server::{MediaBrowser, UpnpMediaServer};
use crate::model::{
    BrowseEntry, DeviceRecord, Track, TransportState, TransportStatus, service_markers,
};
use crate::rendering_control_client::RenderingControlClient;
use crate::time_utils::parse_duration_value;

#[derive(Debug, Clone)]
pub struct AvQueueRenderer {
    name: String,
    avt: AvTransportClient,
    rc: Option<RenderingControlClient>,
    queue: Option<UpnpMediaServer>,
}

impl AvQueueRenderer {
    pub fn from_record(record: &DeviceRecord) -> Result<Self, ControlError> {
        let queue = record
            .find_service(service_markers::CONTENT_DIRECTORY)
            .map(|s| UpnpMediaServer::from_endpoints(s.control_url.clone(), s.service_type.clone()));

        Ok(Self {
            name: record.display_name().to_string(),
            avt: AvTransportClient::from_record(record)?,
            rc: RenderingControlClient::from_record(record),
            queue,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn rc(&self) -> Result<&RenderingControlClient, ControlError> {
        self.rc
            .as_ref()
            .ok_or_else(|| ControlError::UnsupportedDevice(self.name.clone()))
    }

    pub async fn volume(&self) -> Result<u16, ControlError> {
        self.rc()?.get_volume().await
    }

    pub async fn set_volume(&self, volume: u16) -> Result<(), ControlError> {
        self.rc()?.set_volume(volume).await
    }

    pub async fn mute(&self) -> Result<bool, ControlError> {
        self.rc()?.get_mute().await
    }

    pub async fn set_mute(&self, mute: bool) -> Result<(), ControlError> {
        self.rc()?.set_mute(mute).await
    }

    pub async fn playlist(&self) -> Result<Vec<Track>, ControlError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| ControlError::UnsupportedDevice(self.name.clone()))?;

        let entries = queue.browse("Q:0").await?;
        let tracks = entries
            .into_iter()
            .filter_map(|entry| match entry {
                BrowseEntry::Item(track) => Some(track),
                BrowseEntry::Container { .. } => None,
            })
            .enumerate()
            .map(|(index, mut track)| {
                track.id = (index + 1).to_string();
                track
            })
            .collect();
        Ok(tracks)
    }

    /// Inserts a track; the "after" position passes through unchanged.
    pub async fn insert(
        &self,
        after: Option<u32>,
        uri: &str,
        metadata: &str,
    ) -> Result<u32, ControlError> {
        self.avt
            .add_uri_to_queue(uri, metadata, after.unwrap_or(0), false)
            .await
    }

    pub async fn delete(&self, position: u32) -> Result<(), ControlError> {
        self.avt.remove_track_from_queue(position).await
    }

    pub async fn clear(&self) -> Result<(), ControlError> {
        self.avt.remove_all_tracks_from_queue().await
    }

    pub async fn id_array(&self) -> Result<Vec<u32>, ControlError> {
        let media = self.avt.get_media_info().await?;
        Ok((1..=media.nr_tracks).collect())
    }

    pub async fn play(&self) -> Result<(), ControlError> {
        self.avt.play().await
    }

    pub async fn pause(&self) -> Result<(), ControlError> {
        self.avt.pause().await
    }

    pub async fn stop(&self) -> Result<(), ControlError> {
        self.avt.stop().await
    }

    pub async fn next(&self) -> Result<(), ControlError> {
        self.avt.next().await
    }

    pub async fn previous(&self) -> Result<(), ControlError> {
        self.avt.previous().await
    }

    pub async fn status(&self) -> Result<TransportStatus, ControlError> {
        let transport = self.avt.get_transport_info().await?;
        let position = self.avt.get_position_info().await?;

        Ok(TransportStatus {
            track_id: (position.track > 0).then(|| position.track.to_string()),
            state: TransportState::from_vocabulary(&transport.current_transport_state),
            duration_secs: position
                .track_duration
                .as_deref()
                .and_then(parse_duration_value),
            position_secs: position.rel_time.as_deref().and_then(parse_duration_value),
        })
    }

    pub async fn seek_id(&self, position: u32) -> Result<(), ControlError> {
        self.avt.seek_track(position).await?;
        self.avt.play().await
    }

    pub async fn seek_time(&self, seconds: u32) -> Result<(), ControlError> {
        self.avt.seek_rel_time(seconds).await
    }
}
