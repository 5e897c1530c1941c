//! Pending-change tracking and hardware-sync engine for programmable
//! keyboard configurators
//!
//! keyloom sits between a configurator UI and a keyboard's configuration
//! interface. It records every edit as an addressable, collapsible change
//! against the last-known device baseline, reconciles local edits with the
//! live device whenever a connection is (re)established, and drives the
//! assign/swap semantics of drag-and-drop key rebinding.
//!
//! ```text
//! [configurator UI]
//!        |                     gestures, palette clicks, user choices
//! [KeymapEditor] [DragSession] [Reconciler] [SettingBridge]
//!        |                     propose / effective values / commit
//! [ChangeQueue over Baseline]
//!        |                     snapshot reads, per-target writes
//! [Transport]                  ← keyloom-transport (HID backends elsewhere)
//! ```
//!
//! The engine is single-writer: all queue mutation happens synchronously on
//! the caller's thread, and only device I/O suspends. The keyboard may be
//! unplugged at any moment; pending edits survive disconnects and are
//! reconciled on the next connect.

pub mod baseline;
pub mod catalog;
pub mod drag;
pub mod editor;
pub mod error;
pub mod queue;
pub mod reconcile;
pub mod settings;
pub mod target;

pub use baseline::Baseline;
pub use catalog::{BasicCatalog, KeycodeCatalog};
pub use drag::{
    DragContent, DragItem, DragSession, DropOutcome, PointerCapture, DRAG_THRESHOLD_DIP,
};
pub use editor::KeymapEditor;
pub use error::EditorError;
pub use queue::{
    reduce, ChangeQueue, CommitError, CommitFailure, CommitReport, PendingChange, Reduction,
};
pub use reconcile::{ConnectOutcome, LinkState, Reconciler};
pub use settings::{ScalarSetting, SettingAccess, SettingBridge};
pub use target::{ConfigValue, KeySlot, LayerField, Target};

// Re-export the device interface surface consumers wire the engine to.
pub use keyloom_transport::{
    BoxedTransport, DeviceInfo, DeviceSnapshot, Keycode, LayerConfig, LinkEvent,
    LoopbackTransport, RgbColor, Transport, TransportError,
};
