//! Native control backend for the Sonos zone-player family.
//!
//! Queue management rides on the vendor's AVTransport extension actions.
//! Track ids in this domain are 1-based queue positions.

use std::time::Duration;

use tracing::{debug, warn};

use crate::avtransport_client::AvTransportClient;
use crate::errors::ControlError;
use crate::media_server::{MediaBrowser, UpnpMediaServer};
use crate::model::{
    BrowseEntry, DeviceRecord, Track, TransportState, TransportStatus, service_markers,
};
use crate::rendering_control_client::RenderingControlClient;
use crate::time_utils::parse_duration_value;

/// Wait after flushing the queue: the device does not refresh internal
/// state for immediately-subsequent queries otherwise.
pub const FLUSH_SETTLE: Duration = Duration::from_millis(300);

/// Wait between selecting the target index and issuing play, so the
/// previously-playing track does not audibly resume first.
pub const SEEK_SETTLE: Duration = Duration::from_millis(300);

/// Delay before the one retry of a failed index selection.
pub const SEEK_RETRY_DELAY: Duration = Duration::from_millis(250);

/// DIDL id of the device queue container.
const QUEUE_CONTAINER_ID: &str = "Q:0";

#[derive(Debug, Clone)]
pub struct SonosRenderer {
    name: String,
    udn: String,
    avt: AvTransportClient,
    rc: Option<RenderingControlClient>,
    queue: Option<UpnpMediaServer>,
}

impl SonosRenderer {
    pub fn from_record(record: &DeviceRecord) -> Result<Self, ControlError> {
        let avt = AvTransportClient::from_record(record)?;
        let udn = record
            .udn
            .clone()
            .ok_or_else(|| ControlError::UnsupportedDevice(record.display_name().to_string()))?;

        // The queue is exposed as a container of the device's own
        // ContentDirectory.
        let queue = record
            .find_service(service_markers::CONTENT_DIRECTORY)
            .map(|s| UpnpMediaServer::from_endpoints(s.control_url.clone(), s.service_type.clone()));

        Ok(Self {
            name: record.display_name().to_string(),
            udn,
            avt,
            rc: RenderingControlClient::from_record(record),
            queue,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// URI of the device's own queue source.
    fn queue_uri(&self) -> String {
        let bare = self.udn.strip_prefix("uuid:").unwrap_or(&self.udn);
        format!("x-rincon-queue:{}#0", bare)
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

    /// Lists the queue; track ids become 1-based positions.
    pub async fn playlist(&self) -> Result<Vec<Track>, ControlError> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| ControlError::UnsupportedDevice(self.name.clone()))?;

        let entries = queue.browse(QUEUE_CONTAINER_ID).await?;
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

    /// Inserts a track after the given position. A failed high-level
    /// insertion is retried exactly once with metadata omitted before the
    /// failure is surfaced.
    pub async fn insert(
        &self,
        after: Option<u32>,
        uri: &str,
        metadata: &str,
    ) -> Result<u32, ControlError> {
        // "After id X" becomes the 1-based desired position X+1; appending
        // uses the device's 0 sentinel.
        let desired = after.map(|pos| pos + 1).unwrap_or(0);

        match self.avt.add_uri_to_queue(uri, metadata, desired, false).await {
            Ok(position) => Ok(position),
            Err(err) => {
                warn!(
                    renderer = self.name.as_str(),
                    error = %err,
                    "Queue insertion with metadata failed; retrying without metadata"
                );
                self.avt.add_uri_to_queue(uri, "", desired, false).await
            }
        }
    }

    pub async fn delete(&self, position: u32) -> Result<(), ControlError> {
        self.avt.remove_track_from_queue(position).await
    }

    /// Flushes the queue, then settles before returning.
    pub async fn clear(&self) -> Result<(), ControlError> {
        self.avt.remove_all_tracks_from_queue().await?;
        tokio::time::sleep(FLUSH_SETTLE).await;
        Ok(())
    }

    /// Queue positions 1..=N.
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

    /// Selects and plays a queue position.
    ///
    /// The ordering is load-bearing: without the stop and the settle wait,
    /// the previously-playing track audibly resumes before the target
    /// starts. The source switch is skipped when the device is already on
    /// its queue, avoiding an audible glitch from an unnecessary mode
    /// change.
    pub async fn seek_id(&self, position: u32) -> Result<(), ControlError> {
        self.avt.stop().await?;

        let queue_uri = self.queue_uri();
        let on_queue = self
            .avt
            .get_media_info()
            .await?
            .current_uri
            .map(|uri| uri.starts_with("x-rincon-queue:"))
            .unwrap_or(false);
        if !on_queue {
            debug!(renderer = self.name.as_str(), "Switching source to queue");
            self.avt.set_av_transport_uri(&queue_uri, "").await?;
        }

        if let Err(err) = self.avt.seek_track(position).await {
            debug!(
                renderer = self.name.as_str(),
                error = %err,
                "Index selection failed; retrying once"
            );
            tokio::time::sleep(SEEK_RETRY_DELAY).await;
            self.avt.seek_track(position).await?;
        }

        tokio::time::sleep(SEEK_SETTLE).await;
        self.avt.play().await
    }

    pub async fn seek_time(&self, seconds: u32) -> Result<(), ControlError> {
        self.avt.seek_rel_time(seconds).await
    }
}
