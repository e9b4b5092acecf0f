//! Thin client for the AVTransport service, including the vendor queue
//! extension actions carried on the same service by Sonos-family devices.

use crate::errors::ControlError;
use crate::model::{DeviceRecord, service_markers};
use crate::soap_client::{invoke_action, require_u32};
use crate::time_utils::format_hhmmss;

#[derive(Debug, Clone)]
pub struct AvTransportClient {
    pub control_url: String,
    pub service_type: String,
}

/// Result of GetTransportInfo.
#[derive(Debug, Clone)]
pub struct TransportInfo {
    pub current_transport_state: String,
    pub current_transport_status: String,
}

/// Result of GetPositionInfo.
#[derive(Debug, Clone)]
pub struct PositionInfo {
    pub track: u32,
    pub track_duration: Option<String>,
    pub rel_time: Option<String>,
    pub track_uri: Option<String>,
}

/// Result of GetMediaInfo.
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub nr_tracks: u32,
    pub current_uri: Option<String>,
}

impl AvTransportClient {
    pub fn new(control_url: String, service_type: String) -> Self {
        Self {
            control_url,
            service_type,
        }
    }

    pub fn from_record(record: &DeviceRecord) -> Result<Self, ControlError> {
        let service = record
            .find_service(service_markers::AVTRANSPORT)
            .ok_or_else(|| ControlError::UnsupportedDevice(record.display_name().to_string()))?;
        Ok(Self::new(
            service.control_url.clone(),
            service.service_type.clone(),
        ))
    }

    async fn call(
        &self,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<rezoupnp::soap::ActionResponse, ControlError> {
        let mut full_args: Vec<(&str, &str)> = vec![("InstanceID", "0")];
        full_args.extend_from_slice(args);
        invoke_action(&self.control_url, &self.service_type, action, &full_args).await
    }

    pub async fn set_av_transport_uri(&self, uri: &str, metadata: &str) -> Result<(), ControlError> {
        self.call(
            "SetAVTransportURI",
            &[("CurrentURI", uri), ("CurrentURIMetaData", metadata)],
        )
        .await?;
        Ok(())
    }

    pub async fn play(&self) -> Result<(), ControlError> {
        self.call("Play", &[("Speed", "1")]).await?;
        Ok(())
    }

    pub async fn pause(&self) -> Result<(), ControlError> {
        self.call("Pause", &[]).await?;
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), ControlError> {
        self.call("Stop", &[]).await?;
        Ok(())
    }

    pub async fn next(&self) -> Result<(), ControlError> {
        self.call("Next", &[]).await?;
        Ok(())
    }

    pub async fn previous(&self) -> Result<(), ControlError> {
        self.call("Previous", &[]).await?;
        Ok(())
    }

    /// Seeks to a 1-based queue position.
    pub async fn seek_track(&self, position: u32) -> Result<(), ControlError> {
        let target = position.to_string();
        self.call("Seek", &[("Unit", "TRACK_NR"), ("Target", target.as_str())])
            .await?;
        Ok(())
    }

    /// Seeks within the current track.
    pub async fn seek_rel_time(&self, seconds: u32) -> Result<(), ControlError> {
        let target = format_hhmmss(seconds);
        self.call("Seek", &[("Unit", "REL_TIME"), ("Target", target.as_str())])
            .await?;
        Ok(())
    }

    pub async fn get_transport_info(&self) -> Result<TransportInfo, ControlError> {
        let response = self.call("GetTransportInfo", &[]).await?;
        Ok(TransportInfo {
            current_transport_state: response
                .get("CurrentTransportState")
                .unwrap_or_default()
                .to_string(),
            current_transport_status: response
                .get("CurrentTransportStatus")
                .unwrap_or_default()
                .to_string(),
        })
    }

    pub async fn get_position_info(&self) -> Result<PositionInfo, ControlError> {
        let response = self.call("GetPositionInfo", &[]).await?;
        let track = response
            .get("Track")
            .and_then(|t| t.trim().parse::<u32>().ok())
            .unwrap_or(0);
        Ok(PositionInfo {
            track,
            track_duration: response.get("TrackDuration").map(|s| s.to_string()),
            rel_time: response.get("RelTime").map(|s| s.to_string()),
            track_uri: response.get("TrackURI").map(|s| s.to_string()),
        })
    }

    pub async fn get_media_info(&self) -> Result<MediaInfo, ControlError> {
        let response = self.call("GetMediaInfo", &[]).await?;
        let nr_tracks = response
            .get("NrTracks")
            .and_then(|t| t.trim().parse::<u32>().ok())
            .unwrap_or(0);
        Ok(MediaInfo {
            nr_tracks,
            current_uri: response.get("CurrentURI").map(|s| s.to_string()),
        })
    }

    // --- Vendor queue extension ---------------------------------------

    /// Enqueues a URI, returning the 1-based position it landed on.
    /// `desired_first_track` 0 means "append at the end".
    pub async fn add_uri_to_queue(
        &self,
        uri: &str,
        metadata: &str,
        desired_first_track: u32,
        enqueue_as_next: bool,
    ) -> Result<u32, ControlError> {
        let desired = desired_first_track.to_string();
        let as_next = if enqueue_as_next { "1" } else { "0" };
        let response = self
            .call(
                "AddURIToQueue",
                &[
                    ("EnqueuedURI", uri),
                    ("EnqueuedURIMetaData", metadata),
                    ("DesiredFirstTrackNumberEnqueued", desired.as_str()),
                    ("EnqueueAsNext", as_next),
                ],
            )
            .await?;
        require_u32(&response, "FirstTrackNumberEnqueued")
    }

    /// Removes the track at a 1-based queue position.
    pub async fn remove_track_from_queue(&self, position: u32) -> Result<(), ControlError> {
        let object_id = format!("Q:0/{}", position);
        self.call(
            "RemoveTrackFromQueue",
            &[("ObjectID", object_id.as_str()), ("UpdateID", "0")],
        )
        .await?;
        Ok(())
    }

    pub async fn remove_all_tracks_from_queue(&self) -> Result<(), ControlError> {
        self.call("RemoveAllTracksFromQueue", &[]).await?;
        Ok(())
    }
}
