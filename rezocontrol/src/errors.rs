use thiserror::Error;

use rezoupnp::UpnpError;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("No compatible control backend for device '{0}'")]
    UnsupportedDevice(String),

    #[error("{action} returned UPnP error {code}: {description}")]
    Fault {
        action: String,
        code: u32,
        description: String,
    },

    #[error("Unknown device: {0}")]
    NotFound(String),

    #[error("Invalid time format: {0}")]
    InvalidTime(String),

    #[error("Invalid {0} value: {1}")]
    BadValue(String, String),
}

impl ControlError {
    pub fn bad_value(name: &str, value: &str) -> Self {
        ControlError::BadValue(name.to_string(), value.to_string())
    }
}

impl From<UpnpError> for ControlError {
    fn from(err: UpnpError) -> Self {
        match err {
            UpnpError::Http(e) => ControlError::Network(e.to_string()),
            UpnpError::Io(e) => ControlError::Network(e.to_string()),
            other => ControlError::Malformed(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ControlError {
    fn from(err: reqwest::Error) -> Self {
        ControlError::Network(err.to_string())
    }
}
