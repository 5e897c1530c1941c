//! Transport error types

use thiserror::Error;

/// Errors that can occur while talking to a device
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("Write rejected for {target}: {reason}")]
    WriteRejected { target: String, reason: String },

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// True when the device is gone and the operation can only succeed after
    /// a reconnect.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Timeout | Self::DeviceNotFound(_)
        )
    }
}
