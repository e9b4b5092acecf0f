//! Backend-agnostic renderer facade.
//!
//! `MusicRenderer` wraps the three control-protocol families behind a
//! single operation set. The backend is selected once, at construction,
//! from the device's resolved service list and vendor identity, and stored
//! as a tagged variant; it is never re-evaluated per call.

use rezodidl::{FragmentInput, item_fragment};

use crate::avqueue_renderer::AvQueueRenderer;
use crate::errors::ControlError;
use crate::model::{DeviceRecord, Track, TrackInput, TransportStatus, service_markers};
use crate::openhome_renderer::OpenHomeRenderer;
use crate::sonos_renderer::SonosRenderer;
use crate::time_utils::format_hhmmss;

/// Which control family drives a renderer. Reported for diagnostics and
/// pinned by tests; the selection itself lives in [`MusicRenderer::from_device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NativeVendor,
    StandardPlaylist,
    GenericTransport,
}

#[derive(Debug, Clone)]
pub enum RendererBackend {
    /// Native Sonos control: vendor queue service plus vendor identity.
    NativeVendor(SonosRenderer),
    /// OpenHome Playlist service.
    StandardPlaylist(OpenHomeRenderer),
    /// Plain AVTransport combined with a vendor queue service.
    GenericTransport(AvQueueRenderer),
}

#[derive(Debug, Clone)]
pub struct MusicRenderer {
    name: String,
    backend: RendererBackend,
}

/// Dispatches one facade operation to the selected backend.
macro_rules! dispatch {
    ($self:expr, $renderer:ident => $body:expr) => {
        match &$self.backend {
            RendererBackend::NativeVendor($renderer) => $body,
            RendererBackend::StandardPlaylist($renderer) => $body,
            RendererBackend::GenericTransport($renderer) => $body,
        }
    };
}

impl MusicRenderer {
    /// Selects the backend for a resolved device.
    ///
    /// Precedence is explicit and deterministic:
    /// 1. native vendor control, when a vendor queue service and vendor
    ///    identity are both present;
    /// 2. the standard playlist service;
    /// 3. generic transport control combined with a vendor queue service.
    pub fn from_device(record: &DeviceRecord) -> Result<Self, ControlError> {
        let has_queue = record.find_service(service_markers::VENDOR_QUEUE).is_some();
        let has_playlist = record.find_service(service_markers::OH_PLAYLIST).is_some();
        let has_avtransport = record.find_service(service_markers::AVTRANSPORT).is_some();

        let backend = if has_queue && record.is_sonos {
            RendererBackend::NativeVendor(SonosRenderer::from_record(record)?)
        } else if has_playlist {
            RendererBackend::StandardPlaylist(OpenHomeRenderer::from_record(record)?)
        } else if has_avtransport && has_queue {
            RendererBackend::GenericTransport(AvQueueRenderer::from_record(record)?)
        } else {
            return Err(ControlError::UnsupportedDevice(
                record.display_name().to_string(),
            ));
        };

        Ok(Self {
            name: record.display_name().to_string(),
            backend,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_kind(&self) -> BackendKind {
        match &self.backend {
            RendererBackend::NativeVendor(_) => BackendKind::NativeVendor,
            RendererBackend::StandardPlaylist(_) => BackendKind::StandardPlaylist,
            RendererBackend::GenericTransport(_) => BackendKind::GenericTransport,
        }
    }

    pub async fn volume(&self) -> Result<u16, ControlError> {
        dispatch!(self, r => r.volume().await)
    }

    pub async fn set_volume(&self, volume: u16) -> Result<(), ControlError> {
        dispatch!(self, r => r.set_volume(volume).await)
    }

    pub async fn mute(&self) -> Result<bool, ControlError> {
        dispatch!(self, r => r.mute().await)
    }

    pub async fn set_mute(&self, mute: bool) -> Result<(), ControlError> {
        dispatch!(self, r => r.set_mute(mute).await)
    }

    pub async fn playlist(&self) -> Result<Vec<Track>, ControlError> {
        dispatch!(self, r => r.playlist().await)
    }

    /// Inserts a track after `after_id` (None appends), returning the new
    /// track's id in this backend's domain.
    pub async fn insert_track(
        &self,
        after_id: Option<&str>,
        input: &TrackInput,
    ) -> Result<String, ControlError> {
        let after = after_id.map(|id| parse_backend_id(id)).transpose()?;

        let duration = input.duration_secs.map(format_hhmmss);
        let metadata = item_fragment(&FragmentInput {
            id: "1",
            title: &input.title,
            artist: input.artist.as_deref(),
            album: input.album.as_deref(),
            uri: &input.uri,
            protocol_info: &input.protocol_info,
            duration: duration.as_deref(),
        });

        let new_id = dispatch!(self, r => r.insert(after, &input.uri, &metadata).await)?;
        Ok(new_id.to_string())
    }

    pub async fn delete_track(&self, id: &str) -> Result<(), ControlError> {
        let id = parse_backend_id(id)?;
        dispatch!(self, r => r.delete(id).await)
    }

    pub async fn clear_playlist(&self) -> Result<(), ControlError> {
        dispatch!(self, r => r.clear().await)
    }

    /// Ordered track ids of the current playlist, in this backend's domain.
    pub async fn id_array(&self) -> Result<Vec<String>, ControlError> {
        let ids = dispatch!(self, r => r.id_array().await)?;
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    pub async fn play(&self) -> Result<(), ControlError> {
        dispatch!(self, r => r.play().await)
    }

    pub async fn pause(&self) -> Result<(), ControlError> {
        dispatch!(self, r => r.pause().await)
    }

    pub async fn stop(&self) -> Result<(), ControlError> {
        dispatch!(self, r => r.stop().await)
    }

    pub async fn next(&self) -> Result<(), ControlError> {
        dispatch!(self, r => r.next().await)
    }

    pub async fn previous(&self) -> Result<(), ControlError> {
        dispatch!(self, r => r.previous().await)
    }

    pub async fn current_status(&self) -> Result<TransportStatus, ControlError> {
        dispatch!(self, r => r.status().await)
    }

    pub async fn seek_id(&self, id: &str) -> Result<(), ControlError> {
        let id = parse_backend_id(id)?;
        dispatch!(self, r => r.seek_id(id).await)
    }

    pub async fn seek_time(&self, seconds: u32) -> Result<(), ControlError> {
        dispatch!(self, r => r.seek_time(seconds).await)
    }
}

fn parse_backend_id(id: &str) -> Result<u32, ControlError> {
    id.trim()
        .parse::<u32>()
        .map_err(|_| ControlError::bad_value("track id", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rezoupnp::{Classification, ServiceDescription};

    fn service(service_type: &str) -> ServiceDescription {
        ServiceDescription {
            service_type: service_type.to_string(),
            service_id: format!("urn:x:serviceId:{}", service_type),
            control_url: "http://10.0.0.9:1400/control".to_string(),
            event_sub_url: String::new(),
            scpd_url: String::new(),
        }
    }

    fn record(service_types: &[&str], is_sonos: bool) -> DeviceRecord {
        let mut record = DeviceRecord::provisional("http://10.0.0.9:1400/d.xml");
        record.loading = false;
        record.udn = Some("uuid:rincon_test".to_string());
        record.friendly_name = "Test Device".to_string();
        record.classification = Classification::Renderer;
        record.is_sonos = is_sonos;
        record.services = service_types.iter().map(|t| service(t)).collect();
        record
    }

    const AVT: &str = "urn:schemas-upnp-org:service:AVTransport:1";
    const QUEUE: &str = "urn:sonos-com:service:Queue:1";
    const OH_PLAYLIST: &str = "urn:av-openhome-org:service:Playlist:1";

    #[test]
    fn backend_precedence_native_vendor_first() {
        // Vendor identity + queue + even a playlist service: native wins.
        let record = record(&[AVT, QUEUE, OH_PLAYLIST], true);
        let renderer = MusicRenderer::from_device(&record).unwrap();
        assert_eq!(renderer.backend_kind(), BackendKind::NativeVendor);
    }

    #[test]
    fn backend_precedence_playlist_over_generic() {
        // No vendor identity: the standard playlist service beats the
        // transport+queue pairing.
        let record = record(&[AVT, QUEUE, OH_PLAYLIST], false);
        let renderer = MusicRenderer::from_device(&record).unwrap();
        assert_eq!(renderer.backend_kind(), BackendKind::StandardPlaylist);
    }

    #[test]
    fn backend_precedence_generic_needs_queue() {
        let record = record(&[AVT, QUEUE], false);
        let renderer = MusicRenderer::from_device(&record).unwrap();
        assert_eq!(renderer.backend_kind(), BackendKind::GenericTransport);
    }

    #[test]
    fn vendor_queue_without_identity_is_not_native() {
        let record = record(&[AVT, QUEUE], false);
        let renderer = MusicRenderer::from_device(&record).unwrap();
        assert_ne!(renderer.backend_kind(), BackendKind::NativeVendor);
    }

    #[test]
    fn unmatched_device_is_unsupported() {
        // AVTransport alone (no queue, no playlist) has no backend.
        let rec = record(&[AVT], false);
        assert!(matches!(
            MusicRenderer::from_device(&rec),
            Err(ControlError::UnsupportedDevice(_))
        ));

        let rec = record(&[], false);
        assert!(matches!(
            MusicRenderer::from_device(&rec),
            Err(ControlError::UnsupportedDevice(_))
        ));
    }

    #[test]
    fn track_ids_must_be_numeric_in_every_domain() {
        assert!(parse_backend_id("42").is_ok());
        assert!(matches!(
            parse_backend_id("Q:0/3"),
            Err(ControlError::BadValue(_, _))
        ));
    }
}
