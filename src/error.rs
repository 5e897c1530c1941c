//! Engine error types

use keyloom_transport::TransportError;
use thiserror::Error;

/// Errors from configuration-editing operations
#[derive(Error, Debug)]
pub enum EditorError {
    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Address outside the matrix or otherwise unresolvable
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Value type does not fit the target
    #[error("Value of kind {kind} not valid for {target}")]
    ValueMismatch { target: String, kind: &'static str },

    /// Value rejected before reaching the device
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Assignment requested with no cell selected
    #[error("No key selected")]
    NoSelection,

    /// A write for this setting is still outstanding
    #[error("Setting '{0}' already has a write in flight")]
    SettingBusy(String),

    /// Setting name not present in the bridge registry
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// Reconciliation choice given while none was pending
    #[error("No reconciliation choice is pending")]
    NotAwaitingChoice,
}
