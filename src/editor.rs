//! Key-binding coordination: selection, assignment, swaps.
//!
//! `KeymapEditor` is the single mutation funnel for one device's
//! configuration session. It owns the pending-change queue (which owns the
//! baseline) plus the transient cell selection, so every invariant is
//! enforced in one place regardless of which UI surface the edit came from.

use tracing::debug;

use keyloom_transport::{DeviceSnapshot, Keycode, RgbColor, Transport};

use crate::baseline::Baseline;
use crate::error::EditorError;
use crate::queue::{ChangeQueue, CommitReport};
use crate::target::{ConfigValue, KeySlot, LayerField, Target};

/// Editing session over one device configuration.
#[derive(Debug, Default)]
pub struct KeymapEditor {
    queue: ChangeQueue,
    selection: Option<KeySlot>,
}

impl KeymapEditor {
    /// Start a session from the configuration last read off the device.
    pub fn new(snapshot: DeviceSnapshot) -> Self {
        Self {
            queue: ChangeQueue::new(Baseline::new(snapshot)),
            selection: None,
        }
    }

    pub fn queue(&self) -> &ChangeQueue {
        &self.queue
    }

    pub fn baseline(&self) -> &Baseline {
        self.queue.baseline()
    }

    /// The cell currently highlighted for a palette assignment.
    pub fn selection(&self) -> Option<KeySlot> {
        self.selection
    }

    /// Highlight a matrix cell for a subsequent palette assignment.
    /// Reselecting the current cell is a no-op.
    pub fn select_key(&mut self, layer: u8, row: u8, col: u8) -> Result<(), EditorError> {
        let slot = KeySlot::new(layer, row, col);
        if self.selection == Some(slot) {
            return Ok(());
        }
        self.queue.baseline().value_of(&Target::Key(slot))?;
        self.selection = Some(slot);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Assign a keycode to the selected cell; clears the selection.
    pub fn assign_keycode(&mut self, keycode: Keycode) -> Result<(), EditorError> {
        let slot = self.selection.ok_or(EditorError::NoSelection)?;
        self.queue
            .propose(Target::Key(slot), ConfigValue::Key(keycode))?;
        self.selection = None;
        Ok(())
    }

    /// Assign a keycode to an explicit cell (palette drop).
    pub fn assign_to(&mut self, slot: KeySlot, keycode: Keycode) -> Result<(), EditorError> {
        self.queue
            .propose(Target::Key(slot), ConfigValue::Key(keycode))?;
        self.selection = None;
        Ok(())
    }

    /// Swap the effective keycodes of two cells as one atomic unit.
    ///
    /// Swapping a cell with itself, or two cells already holding the same
    /// effective value, is a silent no-op.
    pub fn swap_keys(&mut self, a: KeySlot, b: KeySlot) -> Result<(), EditorError> {
        if a == b {
            return Ok(());
        }
        let ta = Target::Key(a);
        let tb = Target::Key(b);
        let va = self.queue.effective_value(&ta)?;
        let vb = self.queue.effective_value(&tb)?;
        if va == vb {
            return Ok(());
        }
        debug!("Swap proposed between {a} and {b}");
        self.queue.propose_pair((tb, va), (ta, vb))
    }

    /// Stage a layer rename.
    pub fn rename_layer(&mut self, layer: u8, name: impl Into<String>) -> Result<(), EditorError> {
        self.queue.propose(
            Target::LayerMeta {
                layer,
                field: LayerField::Name,
            },
            ConfigValue::Text(name.into()),
        )
    }

    /// Stage a layer accent-color change.
    pub fn set_layer_color(&mut self, layer: u8, color: RgbColor) -> Result<(), EditorError> {
        self.queue.propose(
            Target::LayerMeta {
                layer,
                field: LayerField::Color,
            },
            ConfigValue::Color(color),
        )
    }

    /// Stage a hardware-setting change for the next commit.
    pub fn stage_setting(&mut self, name: impl Into<String>, value: i32) -> Result<(), EditorError> {
        self.queue
            .propose(Target::Setting(name.into()), ConfigValue::Scalar(value))
    }

    /// Record an arbitrary edit.
    pub fn propose(&mut self, target: Target, value: ConfigValue) -> Result<(), EditorError> {
        self.queue.propose(target, value)
    }

    pub fn effective_value(&self, target: &Target) -> Result<ConfigValue, EditorError> {
        self.queue.effective_value(target)
    }

    /// Effective keycode for a matrix cell.
    pub fn effective_keycode(&self, slot: KeySlot) -> Result<Keycode, EditorError> {
        match self.queue.effective_value(&Target::Key(slot))? {
            ConfigValue::Key(kc) => Ok(kc),
            other => Err(EditorError::ValueMismatch {
                target: Target::Key(slot).to_string(),
                kind: other.kind(),
            }),
        }
    }

    pub fn is_dirty(&self, target: &Target) -> bool {
        self.queue.is_dirty(target)
    }

    pub fn is_dirty_globally(&self) -> bool {
        self.queue.is_dirty_globally()
    }

    /// Drop every pending edit and keep editing against the old baseline.
    pub fn discard_all(&mut self) {
        self.queue.discard_all();
    }

    /// Adopt a fresh device snapshot, dropping every pending edit.
    pub fn reload_from_device(&mut self, snapshot: DeviceSnapshot) {
        self.queue.reload_from_device(snapshot);
        self.selection = None;
    }

    /// Re-anchor pending edits onto a fresh device snapshot.
    pub(crate) fn rebase(&mut self, snapshot: DeviceSnapshot) {
        self.queue.rebase(snapshot);
    }

    /// Write every pending edit to the device.
    pub async fn commit(&mut self, link: &dyn Transport) -> CommitReport {
        self.queue.commit(link).await
    }
}
