//! End-to-end configurator flows over the loopback transport.
//!
//! These mirror a real editing session: edit while connected or unplugged,
//! reconcile on reconnect, commit with injected hardware faults. They cover
//! the interaction between the editor, the drag session, the reconciler and
//! the device rather than any one piece in isolation.

use keyloom::{
    ConnectOutcome, DeviceSnapshot, DragContent, DragItem, DragSession, DropOutcome, KeySlot,
    KeymapEditor, Keycode, LinkState, LoopbackTransport, Reconciler, SettingBridge, Target,
    Transport,
};
use keyloom_transport::WriteOp;

const KC_A: Keycode = Keycode(0x04);
const KC_B: Keycode = Keycode(0x05);
const KC_C: Keycode = Keycode(0x06);

/// 2 layers, 2 rows, 3 columns, a few bound keys and a DPI setting.
fn seeded_snapshot() -> DeviceSnapshot {
    let mut snapshot = DeviceSnapshot::blank(2, 2, 3);
    snapshot.layers[0].keys[0][0] = KC_A;
    snapshot.layers[0].keys[0][1] = KC_B;
    snapshot.layers[0].keys[1][2] = KC_A;
    snapshot.settings.insert("pointer_dpi".into(), 800);
    snapshot
}

fn session() -> (KeymapEditor, LoopbackTransport) {
    let snapshot = seeded_snapshot();
    let editor = KeymapEditor::new(snapshot.clone());
    (editor, LoopbackTransport::new(snapshot))
}

fn palette_item(keycode: Keycode) -> DragItem {
    DragItem {
        keycode,
        label: format!("{keycode}"),
        content: DragContent::Key,
        width: 52.0,
        height: 52.0,
        origin: None,
    }
}

/// Edit a key, reconnect, choose "revert back to the keyboard's layout".
#[tokio::test]
async fn assign_then_reload_restores_device_state() {
    let (mut editor, dev) = session();
    let mut rec = Reconciler::new();
    let target = Target::key(0, 1, 2);

    editor.select_key(0, 1, 2).unwrap();
    editor.assign_keycode(KC_B).unwrap();
    assert_eq!(editor.effective_value(&target).unwrap(), KC_B.into());
    assert!(editor.is_dirty(&target));

    let outcome = rec.on_connected(&dev, &mut editor).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::ChoiceRequired { pending_edits: 1 });

    rec.resolve_with_reload(&mut editor).unwrap();
    assert_eq!(editor.effective_value(&target).unwrap(), KC_A.into());
    assert!(!editor.is_dirty(&target));
    assert!(dev.write_log().is_empty());
}

/// Edit while unplugged against a device that was reflashed elsewhere, then
/// choose "update keyboard with new changes".
#[tokio::test]
async fn offline_edits_commit_onto_a_divergent_device() {
    let (mut editor, dev) = session();
    let mut rec = Reconciler::new();

    // edits made while the keyboard is away
    editor.select_key(0, 1, 2).unwrap();
    editor.assign_keycode(KC_B).unwrap();
    editor.select_key(0, 0, 0).unwrap();
    editor.assign_keycode(KC_C).unwrap();

    // meanwhile the device picked up one of the same values on its own
    let mut flashed = seeded_snapshot();
    flashed.layers[0].keys[1][2] = KC_B;
    dev.flash(flashed);

    let outcome = rec.on_connected(&dev, &mut editor).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::ChoiceRequired { pending_edits: 2 });

    let report = rec.resolve_with_commit(&dev, &mut editor).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(rec.state(), LinkState::Clean);
    assert!(!editor.is_dirty_globally());

    // the edit the device already satisfied was pruned, never sent
    assert_eq!(
        dev.write_log(),
        vec![WriteOp::Key {
            layer: 0,
            row: 0,
            col: 0,
            keycode: KC_C,
        }]
    );
    assert_eq!(dev.snapshot().layers[0].keys[1][2], KC_B);
    assert_eq!(dev.snapshot().layers[0].keys[0][0], KC_C);
}

/// A swap whose second write fails must leave the device un-swapped and both
/// halves pending; the retry completes it.
#[tokio::test]
async fn swap_survives_a_half_failed_commit() {
    let (mut editor, dev) = session();
    let a = KeySlot::new(0, 0, 0); // KC_A
    let b = KeySlot::new(0, 0, 1); // KC_B

    editor.swap_keys(a, b).unwrap();
    dev.fail_key_writes(0, 0, 0, 1);

    let report = editor.commit(&dev).await;
    assert_eq!(report.failed.len(), 2);
    assert!(editor.is_dirty(&Target::Key(a)));
    assert!(editor.is_dirty(&Target::Key(b)));

    // no half-applied swap on the hardware
    let snap = dev.snapshot();
    assert_eq!(snap.layers[0].keys[0][0], KC_A);
    assert_eq!(snap.layers[0].keys[0][1], KC_B);

    let report = editor.commit(&dev).await;
    assert!(report.is_clean());
    let snap = dev.snapshot();
    assert_eq!(snap.layers[0].keys[0][0], KC_B);
    assert_eq!(snap.layers[0].keys[0][1], KC_A);
}

/// 3 px of travel is a click; 10 px is a drag, and its drop applies exactly
/// once even if the pointer-up signal repeats.
#[tokio::test]
async fn drag_threshold_and_idempotent_drop() {
    let (mut editor, _dev) = session();
    let mut drag = DragSession::new();
    let slot = KeySlot::new(0, 1, 0);

    drag.press(100.0, 100.0, palette_item(KC_C));
    drag.motion(103.0, 100.0);
    assert_eq!(
        drag.release(&mut editor, Some(slot)).unwrap(),
        DropOutcome::Click
    );
    assert!(!editor.is_dirty_globally());

    drag.press(100.0, 100.0, palette_item(KC_C));
    drag.motion(110.0, 100.0);
    assert_eq!(
        drag.release(&mut editor, Some(slot)).unwrap(),
        DropOutcome::Assigned
    );
    assert_eq!(
        drag.release(&mut editor, Some(slot)).unwrap(),
        DropOutcome::Ignored
    );
    assert_eq!(editor.queue().len(), 1);
    assert_eq!(editor.effective_keycode(slot).unwrap(), KC_C);
}

/// A drag that started on a bound cell swaps on drop, and committing the
/// swap writes both halves.
#[tokio::test]
async fn drag_swap_commits_both_halves() {
    let (mut editor, dev) = session();
    let mut drag = DragSession::new();
    let a = KeySlot::new(0, 0, 0);
    let b = KeySlot::new(0, 0, 1);

    let item = DragItem {
        origin: Some(a),
        ..palette_item(KC_A)
    };
    drag.press(0.0, 0.0, item);
    drag.motion(0.0, 20.0);
    drag.hover_enter(&mut editor, b);
    assert_eq!(drag.hover(), Some(b));
    assert_eq!(
        drag.release(&mut editor, Some(b)).unwrap(),
        DropOutcome::Swapped
    );

    let report = editor.commit(&dev).await;
    assert!(report.is_clean());
    assert_eq!(report.committed.len(), 2);
    let snap = dev.snapshot();
    assert_eq!(snap.layers[0].keys[0][0], KC_B);
    assert_eq!(snap.layers[0].keys[0][1], KC_A);
}

/// Disconnect between edit and reconnect: the queue survives, the stale
/// reconciliation choice does not.
#[tokio::test]
async fn edits_survive_a_disconnect_cycle() {
    let (mut editor, dev) = session();
    let mut rec = Reconciler::new();

    rec.on_connected(&dev, &mut editor).await.unwrap();
    assert_eq!(rec.state(), LinkState::Clean);

    editor.select_key(0, 1, 2).unwrap();
    editor.assign_keycode(KC_B).unwrap();

    dev.set_connected(false);
    rec.on_disconnected();
    assert_eq!(rec.state(), LinkState::Disconnected);
    assert!(editor.is_dirty_globally());

    dev.set_connected(true);
    let outcome = rec.on_connected(&dev, &mut editor).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::ChoiceRequired { pending_edits: 1 });

    let report = rec.resolve_with_commit(&dev, &mut editor).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(dev.snapshot().layers[0].keys[1][2], KC_B);
}

/// Hardware settings ride the same queue as keymap edits.
#[tokio::test]
async fn staged_setting_commits_with_the_keymap() {
    let (mut editor, dev) = session();

    editor.stage_setting("pointer_dpi", 1600).unwrap();
    editor.select_key(0, 1, 0).unwrap();
    editor.assign_keycode(KC_C).unwrap();

    let report = editor.commit(&dev).await;
    assert!(report.is_clean());
    assert_eq!(dev.snapshot().settings["pointer_dpi"], 1600);
    assert_eq!(dev.snapshot().layers[0].keys[1][0], KC_C);
}

/// The bridge writes settings immediately, outside the queue, and reports
/// device values without caching.
#[tokio::test]
async fn bridge_and_queue_paths_agree_on_the_device() {
    let (mut editor, dev) = session();
    let bridge = SettingBridge::with_defaults();

    bridge.set(&dev, "pointer_dpi", 3200).await.unwrap();
    assert_eq!(bridge.get(&dev, "pointer_dpi").await.unwrap(), 3200);

    // the editor's baseline is stale until the next reload
    assert_eq!(
        editor.effective_value(&Target::setting("pointer_dpi")).unwrap(),
        800.into()
    );
    editor.reload_from_device(dev.read_state().await.unwrap());
    assert_eq!(
        editor.effective_value(&Target::setting("pointer_dpi")).unwrap(),
        3200.into()
    );
}
