//! Last-confirmed device configuration.
//!
//! The baseline changes only through a successful device read or a
//! successful per-target commit; UI interaction never touches it directly.

use keyloom_transport::DeviceSnapshot;

use crate::error::EditorError;
use crate::target::{ConfigValue, LayerField, Target};

/// The configuration last confirmed to match the physical device.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    snapshot: DeviceSnapshot,
}

impl Baseline {
    pub fn new(snapshot: DeviceSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    pub fn layer_count(&self) -> u8 {
        self.snapshot.layer_count()
    }

    pub fn rows(&self) -> u8 {
        self.snapshot.rows()
    }

    pub fn cols(&self) -> u8 {
        self.snapshot.cols()
    }

    /// Look up the baseline value for a target.
    ///
    /// Fails with `InvalidTarget` for positions outside the matrix, layers
    /// the device does not have, or settings it does not report.
    pub fn value_of(&self, target: &Target) -> Result<ConfigValue, EditorError> {
        match target {
            Target::Key(slot) => self
                .snapshot
                .layers
                .get(slot.layer as usize)
                .and_then(|l| l.keys.get(slot.row as usize))
                .and_then(|r| r.get(slot.col as usize))
                .map(|kc| ConfigValue::Key(*kc))
                .ok_or_else(|| EditorError::InvalidTarget(target.to_string())),
            Target::LayerMeta { layer, field } => self
                .snapshot
                .layers
                .get(*layer as usize)
                .map(|l| match field {
                    LayerField::Name => ConfigValue::Text(l.name.clone()),
                    LayerField::Color => ConfigValue::Color(l.color),
                })
                .ok_or_else(|| EditorError::InvalidTarget(target.to_string())),
            Target::Setting(name) => self
                .snapshot
                .settings
                .get(name)
                .map(|v| ConfigValue::Scalar(*v))
                .ok_or_else(|| EditorError::InvalidTarget(target.to_string())),
        }
    }

    /// Whether the target addresses something this device has.
    pub fn contains(&self, target: &Target) -> bool {
        self.value_of(target).is_ok()
    }

    /// Apply a committed value. Called by the queue after a successful
    /// device write; the target/value pairing was validated at propose time.
    pub(crate) fn apply(&mut self, target: &Target, value: &ConfigValue) {
        match (target, value) {
            (Target::Key(slot), ConfigValue::Key(kc)) => {
                if let Some(cell) = self
                    .snapshot
                    .layers
                    .get_mut(slot.layer as usize)
                    .and_then(|l| l.keys.get_mut(slot.row as usize))
                    .and_then(|r| r.get_mut(slot.col as usize))
                {
                    *cell = *kc;
                }
            }
            (
                Target::LayerMeta {
                    layer,
                    field: LayerField::Name,
                },
                ConfigValue::Text(name),
            ) => {
                if let Some(l) = self.snapshot.layers.get_mut(*layer as usize) {
                    l.name = name.clone();
                }
            }
            (
                Target::LayerMeta {
                    layer,
                    field: LayerField::Color,
                },
                ConfigValue::Color(color),
            ) => {
                if let Some(l) = self.snapshot.layers.get_mut(*layer as usize) {
                    l.color = *color;
                }
            }
            (Target::Setting(name), ConfigValue::Scalar(v)) => {
                if self.snapshot.settings.contains_key(name) {
                    self.snapshot.settings.insert(name.clone(), *v);
                }
            }
            _ => {}
        }
    }

    /// Replace the whole snapshot. Only the queue's reload/rebase paths call
    /// this.
    pub(crate) fn replace(&mut self, snapshot: DeviceSnapshot) {
        self.snapshot = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyloom_transport::Keycode;

    #[test]
    fn out_of_bounds_key_is_invalid() {
        let baseline = Baseline::new(DeviceSnapshot::blank(2, 4, 6));
        assert!(baseline.value_of(&Target::key(0, 3, 5)).is_ok());
        assert!(baseline.value_of(&Target::key(0, 4, 0)).is_err());
        assert!(baseline.value_of(&Target::key(2, 0, 0)).is_err());
    }

    #[test]
    fn apply_updates_only_valid_cells() {
        let mut baseline = Baseline::new(DeviceSnapshot::blank(1, 2, 2));
        baseline.apply(&Target::key(0, 1, 0), &ConfigValue::Key(Keycode(0x04)));
        assert_eq!(
            baseline.value_of(&Target::key(0, 1, 0)).unwrap(),
            ConfigValue::Key(Keycode(0x04))
        );
    }

    #[test]
    fn unknown_setting_is_invalid() {
        let baseline = Baseline::new(DeviceSnapshot::blank(1, 1, 1));
        assert!(baseline.value_of(&Target::setting("pointer_dpi")).is_err());
    }
}
