//! Thin client for the RenderingControl service (volume and mute).

use crate::errors::ControlError;
use crate::model::{DeviceRecord, service_markers};
use crate::soap_client::{invoke_action, require_u32};

#[derive(Debug, Clone)]
pub struct RenderingControlClient {
    pub control_url: String,
    pub service_type: String,
}

impl RenderingControlClient {
    pub fn new(control_url: String, service_type: String) -> Self {
        Self {
            control_url,
            service_type,
        }
    }

    pub fn from_record(record: &DeviceRecord) -> Option<Self> {
        record
            .find_service(service_markers::RENDERING_CONTROL)
            .map(|service| Self::new(service.control_url.clone(), service.service_type.clone()))
    }

    async fn call(
        &self,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<rezoupnp::soap::ActionResponse, ControlError> {
        let mut full_args: Vec<(&str, &str)> = vec![("InstanceID", "0"), ("Channel", "Master")];
        full_args.extend_from_slice(args);
        invoke_action(&self.control_url, &self.service_type, action, &full_args).await
    }

    pub async fn get_volume(&self) -> Result<u16, ControlError> {
        let response = self.call("GetVolume", &[]).await?;
        let volume = require_u32(&response, "CurrentVolume")?;
        Ok(volume.min(u16::MAX as u32) as u16)
    }

    pub async fn set_volume(&self, volume: u16) -> Result<(), ControlError> {
        let desired = volume.to_string();
        self.call("SetVolume", &[("DesiredVolume", desired.as_str())])
            .await?;
        Ok(())
    }

    pub async fn get_mute(&self) -> Result<bool, ControlError> {
        let response = self.call("GetMute", &[]).await?;
        let raw = response.require("CurrentMute")?;
        Ok(matches!(raw.trim(), "1" | "true" | "True" | "TRUE"))
    }

    pub async fn set_mute(&self, mute: bool) -> Result<(), ControlError> {
        let desired = if mute { "1" } else { "0" };
        self.call("SetMute", &[("DesiredMute", desired)]).await?;
        Ok(())
    }
}
