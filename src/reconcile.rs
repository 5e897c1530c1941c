//! Connection reconciliation between local edits and the live device.
//!
//! The keyboard may appear, disappear and reappear at any time with a
//! configuration that no longer matches what the user has been editing. On
//! every (re)connection the device is read into a candidate snapshot; if
//! local edits exist the user chooses between pushing them to the keyboard
//! and adopting the keyboard's state. Pending edits survive disconnects, so
//! work done while unplugged is reconciled on the next connect.

use tracing::{debug, warn};

use keyloom_transport::{DeviceSnapshot, Transport};

use crate::editor::KeymapEditor;
use crate::error::EditorError;
use crate::queue::{CommitError, CommitReport};

/// Connection/reconciliation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Reading,
    Clean,
    NeedsReconciliation,
    Syncing,
}

/// Result of handling a (re)connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// No local edits — the device state was adopted as the new baseline.
    Adopted,
    /// Local edits exist; the user must choose commit or reload.
    ChoiceRequired { pending_edits: usize },
}

/// Drives reconciliation each time the device (re)connects.
#[derive(Debug, Default)]
pub struct Reconciler {
    state: LinkState,
    candidate: Option<DeviceSnapshot>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether a commit-or-reload choice is outstanding.
    pub fn awaiting_choice(&self) -> bool {
        self.state == LinkState::NeedsReconciliation
    }

    /// Handle a fresh connection: read the device and either adopt its state
    /// directly or ask the user to reconcile.
    ///
    /// A failed read leaves baseline and queue untouched and returns the
    /// link to `Disconnected` for a retry on the next connect.
    pub async fn on_connected(
        &mut self,
        link: &dyn Transport,
        editor: &mut KeymapEditor,
    ) -> Result<ConnectOutcome, EditorError> {
        self.state = LinkState::Reading;
        let snapshot = match link.read_state().await {
            Ok(s) => s,
            Err(e) => {
                warn!("Device read failed during reconciliation: {e}");
                self.state = LinkState::Disconnected;
                return Err(e.into());
            }
        };

        if editor.is_dirty_globally() {
            let pending_edits = editor.queue().len();
            debug!("{pending_edits} local edits diverge from device, awaiting choice");
            self.candidate = Some(snapshot);
            self.state = LinkState::NeedsReconciliation;
            Ok(ConnectOutcome::ChoiceRequired { pending_edits })
        } else {
            editor.reload_from_device(snapshot);
            self.state = LinkState::Clean;
            Ok(ConnectOutcome::Adopted)
        }
    }

    /// The user chose to push local edits to the keyboard.
    ///
    /// The candidate snapshot becomes the baseline first, then the queue is
    /// committed against it. Per-target write failures leave those entries
    /// dirty for a later explicit commit; losing the device mid-sync returns
    /// to `Disconnected`.
    pub async fn resolve_with_commit(
        &mut self,
        link: &dyn Transport,
        editor: &mut KeymapEditor,
    ) -> Result<CommitReport, EditorError> {
        let candidate = self.take_candidate()?;
        self.state = LinkState::Syncing;
        editor.rebase(candidate);

        let report = editor.commit(link).await;
        let lost_device = report.failed.iter().any(
            |f| matches!(&f.error, CommitError::Write(e) if e.is_disconnect()),
        );
        self.state = if lost_device {
            LinkState::Disconnected
        } else {
            LinkState::Clean
        };
        Ok(report)
    }

    /// The user chose to drop local edits and adopt the keyboard's layout.
    pub fn resolve_with_reload(&mut self, editor: &mut KeymapEditor) -> Result<(), EditorError> {
        let candidate = self.take_candidate()?;
        editor.reload_from_device(candidate);
        self.state = LinkState::Clean;
        Ok(())
    }

    fn take_candidate(&mut self) -> Result<DeviceSnapshot, EditorError> {
        if self.state != LinkState::NeedsReconciliation {
            return Err(EditorError::NotAwaitingChoice);
        }
        self.candidate.take().ok_or(EditorError::NotAwaitingChoice)
    }

    /// Device unplugged. Pending edits survive for the next reconnect.
    pub fn on_disconnected(&mut self) {
        if self.state != LinkState::Disconnected {
            debug!("Link lost");
        }
        self.state = LinkState::Disconnected;
        self.candidate = None;
    }
}
