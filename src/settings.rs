//! Hardware setting bridge: per-setting async get/set outside the keymap.
//!
//! Settings like pointer DPI or the auto-mouse timeout are read and written
//! individually rather than through the keymap commit path. The bridge is a
//! registry from setting name to a small `get`/`set` accessor; adding a
//! setting means adding one entry. It keeps no cache — optimistic UI update
//! and rollback to the last known-good value are the caller's job.
//!
//! Writes to one setting are serialized: a `set` issued while another `set`
//! for the same setting is outstanding is rejected synchronously, never
//! queued. Writes to different settings may run concurrently.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use keyloom_transport::Transport;

use crate::error::EditorError;

/// Async accessor pair for one scalar hardware setting.
#[async_trait]
pub trait SettingAccess: Send + Sync {
    /// Read the current device-reported value.
    async fn get(&self, link: &dyn Transport) -> Result<i32, EditorError>;

    /// Write a new value to the device.
    async fn set(&self, link: &dyn Transport, value: i32) -> Result<(), EditorError>;
}

/// Range-validated scalar setting backed by the transport's setting channel.
pub struct ScalarSetting {
    name: String,
    min: i32,
    max: i32,
}

impl ScalarSetting {
    pub fn new(name: impl Into<String>, min: i32, max: i32) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }
}

#[async_trait]
impl SettingAccess for ScalarSetting {
    async fn get(&self, link: &dyn Transport) -> Result<i32, EditorError> {
        Ok(link.read_setting(&self.name).await?)
    }

    async fn set(&self, link: &dyn Transport, value: i32) -> Result<(), EditorError> {
        if value < self.min || value > self.max {
            return Err(EditorError::InvalidValue(format!(
                "{} must be {}..={}, got {}",
                self.name, self.min, self.max, value
            )));
        }
        Ok(link.write_setting(&self.name, value).await?)
    }
}

/// Registry from setting name to its accessor, with per-setting write
/// fencing.
#[derive(Default)]
pub struct SettingBridge {
    handlers: BTreeMap<String, Box<dyn SettingAccess>>,
    in_flight: Mutex<HashSet<String>>,
}

impl SettingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the settings common across supported boards.
    pub fn with_defaults() -> Self {
        let mut bridge = Self::new();
        for (name, min, max) in [
            ("pointer_dpi", 100, 25_600),
            ("scroll_invert", 0, 1),
            ("drag_scroll", 0, 1),
            ("auto_mouse_timeout", 0, 60_000),
            ("debounce", 0, 50),
        ] {
            bridge.register(name, Box::new(ScalarSetting::new(name, min, max)));
        }
        bridge
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Box<dyn SettingAccess>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Read one setting from the device.
    pub async fn get(&self, link: &dyn Transport, name: &str) -> Result<i32, EditorError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| EditorError::UnknownSetting(name.to_string()))?;
        handler.get(link).await
    }

    /// Write one setting to the device.
    ///
    /// Rejected synchronously with `SettingBusy` if a write for the same
    /// setting is still outstanding.
    pub async fn set(&self, link: &dyn Transport, name: &str, value: i32) -> Result<(), EditorError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| EditorError::UnknownSetting(name.to_string()))?;

        if !self.in_flight.lock().insert(name.to_string()) {
            warn!("Rejected concurrent write for setting '{name}'");
            return Err(EditorError::SettingBusy(name.to_string()));
        }
        let _clear = InFlightClear {
            set: &self.in_flight,
            name,
        };

        debug!("Writing setting '{name}' = {value}");
        handler.set(link, value).await
    }
}

/// Clears the in-flight mark on every exit path, including cancellation.
struct InFlightClear<'a> {
    set: &'a Mutex<HashSet<String>>,
    name: &'a str,
}

impl Drop for InFlightClear<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(self.name);
    }
}
