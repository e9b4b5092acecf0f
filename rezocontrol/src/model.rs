//! Shared data model of the control point.

use std::time::{Instant, SystemTime};

use rezoupnp::{Classification, DeviceDescription, ServiceDescription};

/// Lowercase markers used to locate services on a device.
pub mod service_markers {
    pub const AVTRANSPORT: &str = ":service:avtransport:";
    pub const RENDERING_CONTROL: &str = ":service:renderingcontrol:";
    pub const CONTENT_DIRECTORY: &str = ":service:contentdirectory:";
    pub const OH_PLAYLIST: &str = ":service:playlist:";
    pub const OH_VOLUME: &str = "av-openhome-org:service:volume:";
    pub const OH_TIME: &str = "av-openhome-org:service:time:";
    pub const VENDOR_QUEUE: &str = ":service:queue:";
}

/// One discovered device, shared between the location and UDN indexes.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    /// Resolved description URL. Primary identity key.
    pub location: String,
    /// Stable device identifier, known once the description is resolved.
    pub udn: Option<String>,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub services: Vec<ServiceDescription>,
    pub classification: Classification,
    pub icon_url: Option<String>,
    pub last_seen: SystemTime,
    /// True while the description fetch is still in flight.
    pub loading: bool,
    /// User override, preserved across reconciliation.
    pub custom_name: Option<String>,
    pub renderer_disabled: bool,
    pub server_disabled: bool,
    /// Vendor-proprietary control family (Sonos zone players).
    pub is_sonos: bool,
    /// Gate for the background icon re-resolution.
    pub(crate) icon_checked_at: Option<Instant>,
}

impl DeviceRecord {
    /// A provisional record awaiting its description.
    pub fn provisional(location: &str) -> Self {
        Self {
            location: location.to_string(),
            udn: None,
            friendly_name: String::new(),
            manufacturer: String::new(),
            model_name: String::new(),
            services: Vec::new(),
            classification: Classification::Unknown,
            icon_url: None,
            last_seen: SystemTime::now(),
            loading: true,
            custom_name: None,
            renderer_disabled: false,
            server_disabled: false,
            is_sonos: false,
            icon_checked_at: None,
        }
    }

    /// Promotes the record with a resolved description.
    pub fn apply_description(&mut self, desc: DeviceDescription) {
        self.udn = Some(desc.udn.to_ascii_lowercase());
        self.friendly_name = desc.friendly_name;
        self.manufacturer = desc.manufacturer;
        self.model_name = desc.model_name;
        self.services = desc.services;
        self.classification = desc.classification;
        self.icon_url = desc.icon_url;
        self.is_sonos = desc.is_sonos;
        self.loading = false;
        self.last_seen = SystemTime::now();
    }

    /// Name shown to users: the custom override when set.
    pub fn display_name(&self) -> &str {
        self.custom_name.as_deref().unwrap_or(&self.friendly_name)
    }

    /// First service whose type contains `marker` (case-insensitive).
    pub fn find_service(&self, marker: &str) -> Option<&ServiceDescription> {
        self.services
            .iter()
            .find(|s| s.service_type.to_ascii_lowercase().contains(marker))
    }

    pub fn is_renderer(&self) -> bool {
        matches!(
            self.classification,
            Classification::Renderer | Classification::Both
        ) && !self.renderer_disabled
    }

    pub fn is_server(&self) -> bool {
        matches!(
            self.classification,
            Classification::Server | Classification::Both
        ) && !self.server_disabled
    }
}

/// Normalized playback state across all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
    Error,
}

impl TransportState {
    /// Maps a backend vocabulary string onto the fixed state set.
    ///
    /// Transitional vocabularies (TRANSITIONING, Buffering) count as
    /// Playing; anything unknown that is not an explicit error counts as
    /// Stopped.
    pub fn from_vocabulary(raw: &str) -> Self {
        let upper = raw.trim().to_ascii_uppercase();
        match upper.as_str() {
            "PLAYING" | "RECORDING" | "TRANSITIONING" | "BUFFERING" => TransportState::Playing,
            "PAUSED_PLAYBACK" | "PAUSED_RECORDING" | "PAUSED" => TransportState::Paused,
            "STOPPED" | "NO_MEDIA_PRESENT" => TransportState::Stopped,
            _ if upper.contains("ERROR") || upper.contains("FAULT") => TransportState::Error,
            _ => TransportState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Stopped => "Stopped",
            TransportState::Playing => "Playing",
            TransportState::Paused => "Paused",
            TransportState::Error => "Error",
        }
    }
}

/// Normalized transport status.
#[derive(Debug, Clone)]
pub struct TransportStatus {
    /// Backend-scoped track id; never compared across backends.
    pub track_id: Option<String>,
    pub state: TransportState,
    pub duration_secs: Option<u32>,
    pub position_secs: Option<u32>,
}

/// One playable track, as seen while browsing or listing a playlist.
#[derive(Debug, Clone)]
pub struct Track {
    /// Opaque, backend-specific token.
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub uri: String,
    pub duration_secs: Option<u32>,
    pub protocol_info: String,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
}

/// Entry of a browse result.
#[derive(Debug, Clone)]
pub enum BrowseEntry {
    /// Traversable container.
    Container { id: String, title: String },
    /// Terminal item with a playable URI.
    Item(Track),
}

/// Input for queue insertion.
#[derive(Debug, Clone, Default)]
pub struct TrackInput {
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub uri: String,
    pub protocol_info: String,
    pub duration_secs: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_maps_to_fixed_states() {
        assert_eq!(
            TransportState::from_vocabulary("PLAYING"),
            TransportState::Playing
        );
        assert_eq!(
            TransportState::from_vocabulary("Paused"),
            TransportState::Paused
        );
        assert_eq!(
            TransportState::from_vocabulary("NO_MEDIA_PRESENT"),
            TransportState::Stopped
        );
        assert_eq!(
            TransportState::from_vocabulary("ERROR_OCCURRED"),
            TransportState::Error
        );
        // OpenHome vocabulary.
        assert_eq!(
            TransportState::from_vocabulary("Buffering"),
            TransportState::Playing
        );
        // Unknown vendor strings stay in the enum.
        assert_eq!(
            TransportState::from_vocabulary("WOBBLING"),
            TransportState::Stopped
        );
    }

    #[test]
    fn custom_name_overrides_display() {
        let mut record = DeviceRecord::provisional("http://x/desc.xml");
        record.friendly_name = "Factory Name".to_string();
        assert_eq!(record.display_name(), "Factory Name");

        record.custom_name = Some("Kitchen".to_string());
        assert_eq!(record.display_name(), "Kitchen");
    }
}
