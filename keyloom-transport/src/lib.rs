//! Device interface abstraction for the keyloom configurator engine
//!
//! This crate defines the narrow surface the engine talks to a keyboard
//! through: a wholesale configuration read, per-target writes for keymap
//! cells and layer cosmetics, and per-setting scalar access. Concrete HID
//! backends (wired, dongle, Bluetooth) implement [`Transport`] elsewhere;
//! the [`LoopbackTransport`] in-memory backend ships here for tests and
//! offline development.

pub mod error;
pub mod loopback;
pub mod types;

pub use error::TransportError;
pub use loopback::{LoopbackTransport, WriteOp};
pub use types::{
    Combo, DeviceInfo, DeviceSnapshot, KeyOverride, Keycode, LayerConfig, LinkEvent, MacroSlot,
    MacroStep, RgbColor, TapDance,
};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The device interface trait — all backends implement this
///
/// Each write addresses exactly one configurable unit so callers can commit,
/// retry and roll back at single-target granularity.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read the complete configuration currently flashed on the device.
    async fn read_state(&self) -> Result<DeviceSnapshot, TransportError>;

    /// Write one keymap cell.
    async fn write_key(
        &self,
        layer: u8,
        row: u8,
        col: u8,
        keycode: Keycode,
    ) -> Result<(), TransportError>;

    /// Write a layer's display name.
    async fn write_layer_name(&self, layer: u8, name: &str) -> Result<(), TransportError>;

    /// Write a layer's accent color.
    async fn write_layer_color(&self, layer: u8, color: RgbColor) -> Result<(), TransportError>;

    /// Read one scalar hardware setting.
    async fn read_setting(&self, name: &str) -> Result<i32, TransportError>;

    /// Write one scalar hardware setting.
    async fn write_setting(&self, name: &str, value: i32) -> Result<(), TransportError>;

    /// Get device information
    fn device_info(&self) -> &DeviceInfo;

    /// Check if the device is still reachable
    async fn is_connected(&self) -> bool;

    /// Close the connection gracefully
    async fn close(&self) -> Result<(), TransportError>;

    /// Subscribe to link lifecycle events via broadcast channel
    ///
    /// Returns None if the backend cannot observe hot-plug.
    fn subscribe_events(&self) -> Option<broadcast::Receiver<LinkEvent>> {
        None
    }
}

/// Type alias for a shared boxed transport
pub type BoxedTransport = Arc<dyn Transport>;
