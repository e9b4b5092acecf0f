//! Thin clients for the OpenHome Playlist, Volume, and Time services.
//!
//! The Playlist service issues monotonic track ids; the full id sequence
//! travels as a base64 string packing one 32-bit big-endian integer per
//! track, in playlist order.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::errors::ControlError;
use crate::model::{DeviceRecord, service_markers};
use crate::soap_client::{invoke_action, require_u32};

/// Encodes playlist ids as the packed big-endian wire format.
pub fn encode_id_array(ids: &[u32]) -> String {
    let mut bytes = Vec::with_capacity(ids.len() * 4);
    for id in ids {
        bytes.extend_from_slice(&id.to_be_bytes());
    }
    BASE64.encode(bytes)
}

/// Decodes the packed id sequence. An empty string is an empty playlist.
pub fn decode_id_array(text: &str) -> Result<Vec<u32>, ControlError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let bytes = BASE64
        .decode(trimmed)
        .map_err(|err| ControlError::Malformed(format!("invalid IdArray base64: {err}")))?;
    if bytes.len() % 4 != 0 {
        return Err(ControlError::Malformed(format!(
            "IdArray payload length {} is not a multiple of 4",
            bytes.len()
        )));
    }

    let ids = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(ids)
}

#[derive(Debug, Clone)]
pub struct OhPlaylistClient {
    pub control_url: String,
    pub service_type: String,
}

/// One playlist entry as returned by Read.
#[derive(Debug, Clone)]
pub struct OhTrackEntry {
    pub id: u32,
    pub uri: String,
    pub metadata_xml: String,
}

impl OhPlaylistClient {
    pub fn new(control_url: String, service_type: String) -> Self {
        Self {
            control_url,
            service_type,
        }
    }

    pub fn from_record(record: &DeviceRecord) -> Result<Self, ControlError> {
        let service = record
            .find_service(service_markers::OH_PLAYLIST)
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
        invoke_action(&self.control_url, &self.service_type, action, args).await
    }

    /// Inserts a track after `after_id` (0 inserts at the head) and returns
    /// the server-issued id of the new entry.
    pub async fn insert(
        &self,
        after_id: u32,
        uri: &str,
        metadata: &str,
    ) -> Result<u32, ControlError> {
        let after = after_id.to_string();
        let response = self
            .call(
                "Insert",
                &[
                    ("AfterId", after.as_str()),
                    ("Uri", uri),
                    ("Metadata", metadata),
                ],
            )
            .await?;
        require_u32(&response, "NewId")
    }

    pub async fn delete_id(&self, id: u32) -> Result<(), ControlError> {
        let value = id.to_string();
        self.call("DeleteId", &[("Value", value.as_str())]).await?;
        Ok(())
    }

    pub async fn delete_all(&self) -> Result<(), ControlError> {
        self.call("DeleteAll", &[]).await?;
        Ok(())
    }

    pub async fn seek_id(&self, id: u32) -> Result<(), ControlError> {
        let value = id.to_string();
        self.call("SeekId", &[("Value", value.as_str())]).await?;
        Ok(())
    }

    pub async fn seek_second_absolute(&self, second: u32) -> Result<(), ControlError> {
        let value = second.to_string();
        self.call("SeekSecondAbsolute", &[("Value", value.as_str())])
            .await?;
        Ok(())
    }

    pub async fn play(&self) -> Result<(), ControlError> {
        self.call("Play", &[]).await?;
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

    /// Raw transport vocabulary ("Playing", "Paused", "Stopped",
    /// "Buffering").
    pub async fn transport_state(&self) -> Result<String, ControlError> {
        let response = self.call("TransportState", &[]).await?;
        Ok(response.require("Value")?.to_string())
    }

    /// Id of the current track, 0 when the playlist is empty.
    pub async fn current_id(&self) -> Result<u32, ControlError> {
        let response = self.call("Id", &[]).await?;
        require_u32(&response, "Value")
    }

    /// Ordered ids of the whole playlist.
    pub async fn id_array(&self) -> Result<Vec<u32>, ControlError> {
        let response = self.call("IdArray", &[]).await?;
        // A missing array element is how some renderers report "empty".
        let Some(text) = response.get("Array").or_else(|| response.get("Token")) else {
            return Ok(Vec::new());
        };
        decode_id_array(text)
    }

    /// Reads uri and metadata for one track id.
    pub async fn read(&self, id: u32) -> Result<OhTrackEntry, ControlError> {
        let value = id.to_string();
        let response = self.call("Read", &[("Id", value.as_str())]).await?;
        Ok(OhTrackEntry {
            id,
            uri: response.get("Uri").unwrap_or_default().to_string(),
            metadata_xml: response.get("Metadata").unwrap_or_default().to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OhVolumeClient {
    pub control_url: String,
    pub service_type: String,
}

impl OhVolumeClient {
    pub fn from_record(record: &DeviceRecord) -> Option<Self> {
        record.find_service(service_markers::OH_VOLUME).map(|s| Self {
            control_url: s.control_url.clone(),
            service_type: s.service_type.clone(),
        })
    }

    pub async fn volume(&self) -> Result<u16, ControlError> {
        let response =
            invoke_action(&self.control_url, &self.service_type, "Volume", &[]).await?;
        let value = require_u32(&response, "Value")?;
        Ok(value.min(u16::MAX as u32) as u16)
    }

    pub async fn set_volume(&self, volume: u16) -> Result<(), ControlError> {
        let value = volume.to_string();
        invoke_action(
            &self.control_url,
            &self.service_type,
            "SetVolume",
            &[("Value", value.as_str())],
        )
        .await?;
        Ok(())
    }

    pub async fn mute(&self) -> Result<bool, ControlError> {
        let response = invoke_action(&self.control_url, &self.service_type, "Mute", &[]).await?;
        let raw = response.require("Value")?;
        Ok(matches!(raw.trim(), "1" | "true" | "True" | "TRUE"))
    }

    pub async fn set_mute(&self, mute: bool) -> Result<(), ControlError> {
        let value = if mute { "1" } else { "0" };
        invoke_action(
            &self.control_url,
            &self.service_type,
            "SetMute",
            &[("Value", value)],
        )
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct OhTimeClient {
    pub control_url: String,
    pub service_type: String,
}

/// Result of the Time action, in raw seconds.
#[derive(Debug, Clone)]
pub struct OhTimePosition {
    pub duration_secs: u32,
    pub elapsed_secs: u32,
}

impl OhTimeClient {
    pub fn from_record(record: &DeviceRecord) -> Option<Self> {
        record.find_service(service_markers::OH_TIME).map(|s| Self {
            control_url: s.control_url.clone(),
            service_type: s.service_type.clone(),
        })
    }

    pub async fn time(&self) -> Result<OhTimePosition, ControlError> {
        let response = invoke_action(&self.control_url, &self.service_type, "Time", &[]).await?;
        Ok(OhTimePosition {
            duration_secs: response
                .get("Duration")
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(0),
            elapsed_secs: response
                .get("Seconds")
                .and_then(|t| t.trim().parse().ok())
                .unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_array_roundtrips() {
        for count in [0usize, 1, 100] {
            let ids: Vec<u32> = (0..count as u32).map(|i| i * 7 + 1).collect();
            let encoded = encode_id_array(&ids);
            let decoded = decode_id_array(&encoded).unwrap();
            assert_eq!(decoded, ids, "roundtrip failed for {} ids", count);
        }
    }

    #[test]
    fn id_array_is_big_endian() {
        let encoded = encode_id_array(&[1]);
        let bytes = BASE64.decode(encoded).unwrap();
        assert_eq!(bytes, vec![0, 0, 0, 1]);
    }

    #[test]
    fn empty_string_decodes_to_empty_playlist() {
        assert!(decode_id_array("").unwrap().is_empty());
        assert!(decode_id_array("  ").unwrap().is_empty());
    }

    #[test]
    fn truncated_id_array_is_rejected() {
        let encoded = BASE64.encode([0u8, 0, 1]);
        assert!(matches!(
            decode_id_array(&encoded),
            Err(ControlError::Malformed(_))
        ));
    }
}
