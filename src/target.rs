//! Addressing of editable configuration units.
//!
//! A [`Target`] names exactly one editable unit of device configuration;
//! it is the key under which pending edits collapse.

use std::fmt;

use keyloom_transport::{Keycode, RgbColor};
use serde::{Deserialize, Serialize};

/// Per-layer cosmetic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LayerField {
    Name,
    Color,
}

/// A keymap matrix cell position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeySlot {
    pub layer: u8,
    pub row: u8,
    pub col: u8,
}

impl KeySlot {
    pub const fn new(layer: u8, row: u8, col: u8) -> Self {
        Self { layer, row, col }
    }
}

impl fmt::Display for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer {} ({}, {})", self.layer, self.row, self.col)
    }
}

/// Address of one editable unit of device configuration.
///
/// Two edits to the same target collapse into a single pending change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Target {
    /// One keymap matrix cell.
    Key(KeySlot),
    /// A layer's display name or accent color.
    LayerMeta { layer: u8, field: LayerField },
    /// A scalar hardware setting outside the matrix.
    Setting(String),
}

impl Target {
    pub const fn key(layer: u8, row: u8, col: u8) -> Self {
        Self::Key(KeySlot::new(layer, row, col))
    }

    pub fn setting(name: impl Into<String>) -> Self {
        Self::Setting(name.into())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(slot) => write!(f, "key at {slot}"),
            Self::LayerMeta {
                layer,
                field: LayerField::Name,
            } => write!(f, "layer {layer} name"),
            Self::LayerMeta {
                layer,
                field: LayerField::Color,
            } => write!(f, "layer {layer} color"),
            Self::Setting(name) => write!(f, "setting '{name}'"),
        }
    }
}

/// A value as stored in the baseline or carried by a pending change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigValue {
    Key(Keycode),
    Text(String),
    Color(RgbColor),
    Scalar(i32),
}

impl ConfigValue {
    /// Short kind tag for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Key(_) => "keycode",
            Self::Text(_) => "text",
            Self::Color(_) => "color",
            Self::Scalar(_) => "scalar",
        }
    }
}

impl From<Keycode> for ConfigValue {
    fn from(kc: Keycode) -> Self {
        Self::Key(kc)
    }
}

impl From<RgbColor> for ConfigValue {
    fn from(color: RgbColor) -> Self {
        Self::Color(color)
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}
