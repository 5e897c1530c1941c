//! Drag session management for key rebinding gestures.
//!
//! One pointer gesture moves through `Idle → Pressed → Dragging` and ends in
//! a drop, a cancellation, or a plain click (press released before the
//! movement threshold). While a drag is live the session holds the payload,
//! the cursor position for overlay rendering, and the hovered drop cell; a
//! process-wide pointer grab is held as an RAII guard so it is released on
//! every exit path, including forced teardown.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use keyloom_transport::Keycode;

use crate::editor::KeymapEditor;
use crate::error::EditorError;
use crate::target::KeySlot;

/// Pointer travel (device-independent pixels, either axis) before a press
/// becomes a drag.
pub const DRAG_THRESHOLD_DIP: f32 = 5.0;

/// What a drag payload represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragContent {
    Key,
    Macro,
    Layer,
    Combo,
    TapDance,
    Override,
}

/// Payload for one drag gesture.
#[derive(Debug, Clone)]
pub struct DragItem {
    pub keycode: Keycode,
    pub label: String,
    pub content: DragContent,
    /// Rendering size of the dragged ghost, in DIP.
    pub width: f32,
    pub height: f32,
    /// Set when the drag started on a bound matrix cell; the drop then
    /// becomes a swap instead of an assignment.
    pub origin: Option<KeySlot>,
}

/// Process-wide pointer grab installed while a drag is live.
///
/// `grab` is called once on entering the drag and `ungrab` exactly once on
/// every exit path.
pub trait PointerCapture: Send + Sync {
    fn grab(&self);
    fn ungrab(&self);
}

struct CaptureGuard(Arc<dyn PointerCapture>);

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.0.ungrab();
    }
}

impl fmt::Debug for CaptureGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CaptureGuard")
    }
}

/// Result of finishing a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// Threshold never crossed — a plain click, no mutation.
    Click,
    /// Payload assigned to the drop cell.
    Assigned,
    /// Origin and drop cell swapped.
    Swapped,
    /// Released outside any droppable cell, or dropped back on the origin.
    Cancelled,
    /// No live gesture, or the drop was already consumed.
    Ignored,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Pressed {
        origin_pos: (f32, f32),
        source: DragItem,
    },
    Dragging {
        item: DragItem,
        pos: (f32, f32),
        hover: Option<KeySlot>,
        consumed: bool,
        _capture: Option<CaptureGuard>,
    },
}

/// Tracks one pointer-driven drag gesture and applies its outcome.
pub struct DragSession {
    phase: Phase,
    capture: Option<Arc<dyn PointerCapture>>,
}

impl Default for DragSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DragSession {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            capture: None,
        }
    }

    /// Session that installs the given pointer grab while dragging.
    pub fn with_capture(capture: Arc<dyn PointerCapture>) -> Self {
        Self {
            phase: Phase::Idle,
            capture: Some(capture),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging { .. })
    }

    /// The live payload. `None` until the movement threshold is crossed.
    pub fn dragged_item(&self) -> Option<&DragItem> {
        match &self.phase {
            Phase::Dragging { item, .. } => Some(item),
            _ => None,
        }
    }

    /// Live cursor position for overlay rendering.
    pub fn position(&self) -> Option<(f32, f32)> {
        match &self.phase {
            Phase::Dragging { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    /// The drop cell currently hovered, if any.
    pub fn hover(&self) -> Option<KeySlot> {
        match &self.phase {
            Phase::Dragging { hover, .. } => *hover,
            _ => None,
        }
    }

    /// Primary-button press on a draggable source. No payload is live yet;
    /// releasing before the threshold is a click.
    pub fn press(&mut self, x: f32, y: f32, source: DragItem) {
        if !matches!(self.phase, Phase::Idle) {
            // a stray press tears down whatever gesture was left behind
            self.cancel();
        }
        self.phase = Phase::Pressed {
            origin_pos: (x, y),
            source,
        };
    }

    /// Pointer motion. Crossing the threshold starts the drag and installs
    /// the pointer grab.
    pub fn motion(&mut self, x: f32, y: f32) {
        match &mut self.phase {
            Phase::Idle => {}
            Phase::Pressed { origin_pos, source } => {
                let crossed = (x - origin_pos.0).abs() > DRAG_THRESHOLD_DIP
                    || (y - origin_pos.1).abs() > DRAG_THRESHOLD_DIP;
                if crossed {
                    let item = source.clone();
                    let capture = self.capture.as_ref().map(|c| {
                        c.grab();
                        CaptureGuard(Arc::clone(c))
                    });
                    debug!("Drag started for {}", item.label);
                    self.phase = Phase::Dragging {
                        item,
                        pos: (x, y),
                        hover: None,
                        consumed: false,
                        _capture: capture,
                    };
                }
            }
            Phase::Dragging { pos, .. } => {
                *pos = (x, y);
            }
        }
    }

    /// Pointer entered a droppable cell. The cell is provisionally selected
    /// for visual feedback; an invalid cell is simply not hoverable.
    pub fn hover_enter(&mut self, editor: &mut KeymapEditor, slot: KeySlot) {
        if let Phase::Dragging { hover, .. } = &mut self.phase {
            *hover = Some(slot);
            let _ = editor.select_key(slot.layer, slot.row, slot.col);
        }
    }

    /// Pointer left the cell it was over. No queue mutation.
    pub fn hover_leave(&mut self) {
        if let Phase::Dragging { hover, .. } = &mut self.phase {
            *hover = None;
        }
    }

    /// Mark the live drop as consumed so a later pointer-up for the same
    /// gesture tears down without re-applying the effect.
    pub fn mark_drop_consumed(&mut self) {
        if let Phase::Dragging { consumed, .. } = &mut self.phase {
            *consumed = true;
        }
    }

    /// Apply the payload to a cell without ending the gesture. Drop-target
    /// handlers that fire before the global pointer-up use this; the
    /// following `release` then only tears down.
    pub fn drop_on(
        &mut self,
        editor: &mut KeymapEditor,
        slot: KeySlot,
    ) -> Result<DropOutcome, EditorError> {
        let Phase::Dragging { item, consumed, .. } = &mut self.phase else {
            return Ok(DropOutcome::Ignored);
        };
        if *consumed {
            return Ok(DropOutcome::Ignored);
        }
        let item = item.clone();
        let outcome = apply_drop(editor, &item, slot)?;
        self.mark_drop_consumed();
        Ok(outcome)
    }

    /// Pointer released. Finishes the gesture: a click if the threshold was
    /// never crossed, an assign/swap over a droppable cell, a cancellation
    /// otherwise. The pointer grab is released in every case.
    pub fn release(
        &mut self,
        editor: &mut KeymapEditor,
        over: Option<KeySlot>,
    ) -> Result<DropOutcome, EditorError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Idle => Ok(DropOutcome::Ignored),
            Phase::Pressed { .. } => Ok(DropOutcome::Click),
            Phase::Dragging { item, consumed, .. } => {
                if consumed {
                    return Ok(DropOutcome::Ignored);
                }
                match over {
                    Some(slot) => apply_drop(editor, &item, slot),
                    None => {
                        debug!("Drag cancelled for {}", item.label);
                        Ok(DropOutcome::Cancelled)
                    }
                }
            }
        }
    }

    /// External cancellation (window blur, device loss). Discards the
    /// payload without touching the queue.
    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }
}

fn apply_drop(
    editor: &mut KeymapEditor,
    item: &DragItem,
    slot: KeySlot,
) -> Result<DropOutcome, EditorError> {
    match item.origin {
        Some(origin) if origin != slot => {
            editor.swap_keys(origin, slot)?;
            Ok(DropOutcome::Swapped)
        }
        Some(_) => Ok(DropOutcome::Cancelled),
        None => {
            editor.assign_to(slot, item.keycode)?;
            Ok(DropOutcome::Assigned)
        }
    }
}
