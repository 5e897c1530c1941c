//! Common types shared by the engine and transport backends

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A firmware keycode as stored in the keymap matrix.
///
/// The low byte of a plain key is its HID usage id; higher ranges encode
/// layer switches, macro references and other firmware actions. Transports
/// and the change engine treat the value as opaque — only the display
/// catalog interprets it, and only for labels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Keycode(pub u16);

impl Keycode {
    /// No-op key (empty matrix slot).
    pub const NONE: Keycode = Keycode(0x0000);

    /// Transparent key — falls through to the layer below.
    pub const TRANSPARENT: Keycode = Keycode(0x0001);

    /// Check whether this slot is unbound.
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// RGB color used for per-layer cosmetics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One step of a stored macro: a key transition plus the delay before the
/// next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroStep {
    pub keycode: Keycode,
    pub is_down: bool,
    pub delay_ms: u16,
}

/// A macro slot on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroSlot {
    pub index: u8,
    pub steps: Vec<MacroStep>,
}

/// A chord of up to four keys producing a different output key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combo {
    pub index: u8,
    /// Trigger keys; unused positions hold `Keycode::NONE`.
    pub keys: [Keycode; 4],
    pub output: Keycode,
}

/// Tap-dance slot: different actions for tap, hold, double-tap and tap-hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapDance {
    pub index: u8,
    pub on_tap: Keycode,
    pub on_hold: Keycode,
    pub on_double_tap: Keycode,
    pub on_tap_hold: Keycode,
    pub tapping_term_ms: u16,
}

/// Key override: replaces `trigger` with `replacement` when the given
/// modifiers are held, on the layers in `layer_mask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOverride {
    pub index: u8,
    pub trigger_mods: u8,
    pub trigger: Keycode,
    pub replacement: Keycode,
    pub layer_mask: u16,
    pub enabled: bool,
}

/// Keymap and cosmetics for one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    pub color: RgbColor,
    /// Keycodes indexed `[row][col]`.
    pub keys: Vec<Vec<Keycode>>,
}

/// Complete snapshot of everything configurable on the device.
///
/// This is the shape a wholesale device read returns and the shape the
/// engine keeps as its baseline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub layers: Vec<LayerConfig>,
    pub macros: Vec<MacroSlot>,
    pub combos: Vec<Combo>,
    pub tap_dances: Vec<TapDance>,
    pub overrides: Vec<KeyOverride>,
    /// Scalar hardware settings outside the keymap matrix, by name.
    pub settings: BTreeMap<String, i32>,
}

impl DeviceSnapshot {
    /// Build an all-unbound snapshot with the given matrix dimensions.
    pub fn blank(layers: u8, rows: u8, cols: u8) -> Self {
        let layers = (0..layers)
            .map(|i| LayerConfig {
                name: format!("Layer {i}"),
                color: RgbColor::default(),
                keys: vec![vec![Keycode::NONE; cols as usize]; rows as usize],
            })
            .collect();

        Self {
            layers,
            ..Self::default()
        }
    }

    pub fn layer_count(&self) -> u8 {
        self.layers.len() as u8
    }

    pub fn rows(&self) -> u8 {
        self.layers.first().map(|l| l.keys.len() as u8).unwrap_or(0)
    }

    pub fn cols(&self) -> u8 {
        self.layers
            .first()
            .and_then(|l| l.keys.first())
            .map(|r| r.len() as u8)
            .unwrap_or(0)
    }
}

/// Device identification information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Product name if available
    pub product_name: Option<String>,
    /// Serial number if available
    pub serial: Option<String>,
    /// Matrix rows
    pub rows: u8,
    /// Matrix columns
    pub cols: u8,
    /// Number of layers the firmware stores
    pub layers: u8,
}

/// Link lifecycle events for hot-plug driven hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
}
