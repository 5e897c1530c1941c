//! Pending-change queue over the baseline.
//!
//! Every user edit becomes a [`PendingChange`] keyed by its [`Target`]; the
//! effective value of any target is the pending value if one exists, else
//! the baseline value. Edits collapse: re-proposing the effective value does
//! nothing, and an edit that returns a target to its baseline value drops
//! the entry instead of keeping a no-op around.
//!
//! ```text
//! [KeymapEditor / DragSession]
//!        |  propose / effective_value
//! [ChangeQueue]  ── commit ──► per-target writes, baseline updated on success
//!        |
//! [Baseline]     ── reload/rebase ──◄ wholesale device snapshot
//! ```

use std::collections::{hash_map, HashMap, HashSet};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, warn};

use keyloom_transport::{DeviceSnapshot, Transport, TransportError};

use crate::baseline::Baseline;
use crate::error::EditorError;
use crate::target::{ConfigValue, LayerField, Target};

/// One pending edit against the baseline.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub target: Target,
    /// Effective value before this edit: the baseline value at creation, or
    /// the pending value this edit superseded.
    pub previous: ConfigValue,
    pub new_value: ConfigValue,
    pub created_at: Instant,
    /// Proposal-order sequence number, stable across value updates.
    seq: u64,
    /// Shared by the two halves of a swap; committed as one unit.
    group: Option<u64>,
}

impl PendingChange {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether this change is half of a swap pair.
    pub fn is_paired(&self) -> bool {
        self.group.is_some()
    }
}

/// Collapse decision for a proposal on one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    /// Value already effective — store nothing, keep what is there.
    Unchanged,
    /// Edit round-tripped back to the baseline — drop the entry.
    Collapse,
    /// Keep or replace the entry with this value.
    Store(ConfigValue),
}

/// Pure collapsing rule for `propose`.
///
/// `baseline` is the confirmed device value for the target, `prior` the
/// pending change currently queued for it (if any).
pub fn reduce(
    baseline: &ConfigValue,
    prior: Option<&PendingChange>,
    new_value: ConfigValue,
) -> Reduction {
    let effective = prior.map(|p| &p.new_value).unwrap_or(baseline);
    if new_value == *effective {
        Reduction::Unchanged
    } else if new_value == *baseline {
        Reduction::Collapse
    } else {
        Reduction::Store(new_value)
    }
}

/// Why one target failed to commit.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error(transparent)]
    Write(TransportError),

    /// The paired write failed; this half was skipped or rolled back.
    #[error("skipped or rolled back because the paired write failed")]
    PairAborted,
}

/// Per-target failure from a commit attempt.
#[derive(Debug)]
pub struct CommitFailure {
    pub target: Target,
    pub error: CommitError,
}

/// Outcome of a `commit` attempt. Failed targets stay pending and dirty.
#[derive(Debug, Default)]
pub struct CommitReport {
    pub committed: Vec<Target>,
    pub failed: Vec<CommitFailure>,
}

impl CommitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ordered, deduplicated set of pending edits over a baseline.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    baseline: Baseline,
    pending: HashMap<Target, PendingChange>,
    next_seq: u64,
    next_group: u64,
}

impl ChangeQueue {
    pub fn new(baseline: Baseline) -> Self {
        Self {
            baseline,
            pending: HashMap::new(),
            next_seq: 0,
            next_group: 0,
        }
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_dirty(&self, target: &Target) -> bool {
        self.pending.contains_key(target)
    }

    pub fn is_dirty_globally(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Effective value for a target: pending if present (one hash lookup),
    /// else baseline.
    pub fn effective_value(&self, target: &Target) -> Result<ConfigValue, EditorError> {
        if let Some(p) = self.pending.get(target) {
            return Ok(p.new_value.clone());
        }
        self.baseline.value_of(target)
    }

    /// Record an edit. The target must address something the device has and
    /// the value kind must match what the target stores.
    pub fn propose(&mut self, target: Target, new_value: ConfigValue) -> Result<(), EditorError> {
        self.propose_grouped(target, new_value, None)
    }

    fn propose_grouped(
        &mut self,
        target: Target,
        new_value: ConfigValue,
        group: Option<u64>,
    ) -> Result<(), EditorError> {
        let baseline = self.baseline.value_of(&target)?;
        if baseline.kind() != new_value.kind() {
            return Err(EditorError::ValueMismatch {
                target: target.to_string(),
                kind: new_value.kind(),
            });
        }

        match reduce(&baseline, self.pending.get(&target), new_value) {
            Reduction::Unchanged => {}
            Reduction::Collapse => {
                if self.pending.remove(&target).is_some() {
                    debug!("Edit for {target} returned to baseline, entry dropped");
                }
            }
            Reduction::Store(value) => match self.pending.entry(target) {
                hash_map::Entry::Occupied(mut o) => {
                    let p = o.get_mut();
                    p.previous = p.new_value.clone();
                    p.new_value = value;
                    // a later edit supersedes any swap pairing
                    p.group = group;
                }
                hash_map::Entry::Vacant(v) => {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    let target = v.key().clone();
                    debug!("Pending change #{seq} recorded for {target}");
                    v.insert(PendingChange {
                        target,
                        previous: baseline,
                        new_value: value,
                        created_at: Instant::now(),
                        seq,
                        group,
                    });
                }
            },
        }
        Ok(())
    }

    /// Propose two writes as one atomic unit (a swap). A half that collapses
    /// back to the baseline simply leaves the other half as a lone write.
    pub(crate) fn propose_pair(
        &mut self,
        first: (Target, ConfigValue),
        second: (Target, ConfigValue),
    ) -> Result<(), EditorError> {
        // validate both halves before queueing either
        self.baseline.value_of(&first.0)?;
        self.baseline.value_of(&second.0)?;

        let gid = self.next_group;
        self.next_group += 1;
        self.propose_grouped(first.0, first.1, Some(gid))?;
        self.propose_grouped(second.0, second.1, Some(gid))?;
        Ok(())
    }

    /// Pending changes in proposal order.
    pub fn changes(&self) -> Vec<&PendingChange> {
        let mut list: Vec<&PendingChange> = self.pending.values().collect();
        list.sort_by_key(|p| p.seq);
        list
    }

    /// Drop every pending edit, keeping the baseline.
    pub fn discard_all(&mut self) {
        if !self.pending.is_empty() {
            debug!("Discarding {} pending changes", self.pending.len());
        }
        self.pending.clear();
    }

    /// Replace the baseline wholesale and drop every pending edit.
    pub fn reload_from_device(&mut self, snapshot: DeviceSnapshot) {
        self.baseline.replace(snapshot);
        self.pending.clear();
    }

    /// Re-anchor pending edits onto a fresh snapshot: entries the new
    /// baseline already satisfies are pruned, entries that no longer address
    /// the device are dropped, and `previous` values are refreshed so a swap
    /// rollback writes what the device actually holds.
    pub fn rebase(&mut self, snapshot: DeviceSnapshot) {
        self.baseline.replace(snapshot);
        let baseline = &self.baseline;
        self.pending.retain(|target, p| match baseline.value_of(target) {
            Ok(bv) if bv == p.new_value => {
                debug!("Fresh baseline already satisfies edit for {target}, pruned");
                false
            }
            Ok(bv) => {
                p.previous = bv;
                true
            }
            Err(_) => {
                warn!("Edit for {target} no longer addresses the device, dropped");
                false
            }
        });
    }

    /// Attempt to write every pending edit to the device.
    ///
    /// Each target succeeds or fails on its own; a failed target's entry is
    /// retained for a later explicit retry. Swap pairs are the exception:
    /// they complete together or not at all, rolling back a half-applied
    /// first write. An empty queue returns immediately without touching the
    /// transport.
    pub async fn commit(&mut self, link: &dyn Transport) -> CommitReport {
        let mut report = CommitReport::default();
        if self.pending.is_empty() {
            return report;
        }

        let mut order: Vec<(u64, Target)> = self
            .pending
            .values()
            .map(|p| (p.seq, p.target.clone()))
            .collect();
        order.sort_by_key(|(seq, _)| *seq);

        let mut attempted_groups: HashSet<u64> = HashSet::new();

        for (_, target) in order {
            let Some(entry) = self.pending.get(&target).cloned() else {
                // already handled as a pair partner
                continue;
            };

            match self.baseline.value_of(&target) {
                Ok(bv) if bv == entry.new_value => {
                    debug!("Entry for {target} matches baseline at commit time, pruned");
                    self.pending.remove(&target);
                    continue;
                }
                Ok(_) => {}
                Err(_) => {
                    warn!("Entry for {target} no longer addresses the device, dropped");
                    self.pending.remove(&target);
                    continue;
                }
            }

            match entry.group {
                Some(gid) => {
                    if !attempted_groups.insert(gid) {
                        continue;
                    }
                    let partner = self
                        .pending
                        .values()
                        .find(|p| p.group == Some(gid) && p.target != target)
                        .map(|p| p.target.clone());
                    match partner {
                        Some(partner) => {
                            self.commit_pair(link, &target, &partner, &mut report).await
                        }
                        None => self.commit_single(link, &target, &mut report).await,
                    }
                }
                None => self.commit_single(link, &target, &mut report).await,
            }
        }

        report
    }

    async fn commit_single(
        &mut self,
        link: &dyn Transport,
        target: &Target,
        report: &mut CommitReport,
    ) {
        let Some(entry) = self.pending.get(target) else {
            return;
        };
        let value = entry.new_value.clone();

        match write_target(link, target, &value).await {
            Ok(()) => {
                self.baseline.apply(target, &value);
                self.pending.remove(target);
                report.committed.push(target.clone());
                debug!("Committed {target}");
            }
            Err(e) => {
                warn!("Commit failed for {target}, change retained: {e}");
                report.failed.push(CommitFailure {
                    target: target.clone(),
                    error: CommitError::Write(e),
                });
            }
        }
    }

    async fn commit_pair(
        &mut self,
        link: &dyn Transport,
        first: &Target,
        second: &Target,
        report: &mut CommitReport,
    ) {
        let (Some(fe), Some(se)) = (self.pending.get(first), self.pending.get(second)) else {
            return;
        };
        let first_value = fe.new_value.clone();
        let second_value = se.new_value.clone();

        if let Err(e) = write_target(link, first, &first_value).await {
            warn!("Swap write failed for {first}, pair retained: {e}");
            report.failed.push(CommitFailure {
                target: first.clone(),
                error: CommitError::Write(e),
            });
            report.failed.push(CommitFailure {
                target: second.clone(),
                error: CommitError::PairAborted,
            });
            return;
        }

        match write_target(link, second, &second_value).await {
            Ok(()) => {
                self.baseline.apply(first, &first_value);
                self.baseline.apply(second, &second_value);
                self.pending.remove(first);
                self.pending.remove(second);
                report.committed.push(first.clone());
                report.committed.push(second.clone());
                debug!("Swap committed between {first} and {second}");
            }
            Err(e) => {
                // the device now holds the first half; put its old value back
                if let Ok(old) = self.baseline.value_of(first) {
                    if let Err(re) = write_target(link, first, &old).await {
                        warn!(
                            "Swap rollback failed for {first}, device diverges until the next commit: {re}"
                        );
                    }
                }
                warn!("Swap write failed for {second}, pair rolled back: {e}");
                report.failed.push(CommitFailure {
                    target: second.clone(),
                    error: CommitError::Write(e),
                });
                report.failed.push(CommitFailure {
                    target: first.clone(),
                    error: CommitError::PairAborted,
                });
            }
        }
    }
}

/// Dispatch one target write onto the narrow transport interface.
async fn write_target(
    link: &dyn Transport,
    target: &Target,
    value: &ConfigValue,
) -> Result<(), TransportError> {
    match (target, value) {
        (Target::Key(slot), ConfigValue::Key(kc)) => {
            link.write_key(slot.layer, slot.row, slot.col, *kc).await
        }
        (
            Target::LayerMeta {
                layer,
                field: LayerField::Name,
            },
            ConfigValue::Text(name),
        ) => link.write_layer_name(*layer, name).await,
        (
            Target::LayerMeta {
                layer,
                field: LayerField::Color,
            },
            ConfigValue::Color(color),
        ) => link.write_layer_color(*layer, *color).await,
        (Target::Setting(name), ConfigValue::Scalar(v)) => link.write_setting(name, *v).await,
        _ => Err(TransportError::Internal(format!(
            "value kind mismatch for {target}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyloom_transport::{Keycode, LoopbackTransport};

    const KC_A: Keycode = Keycode(0x04);
    const KC_B: Keycode = Keycode(0x05);
    const KC_C: Keycode = Keycode(0x06);

    fn seeded_queue() -> ChangeQueue {
        let mut snapshot = DeviceSnapshot::blank(2, 2, 3);
        snapshot.layers[0].keys[0][0] = KC_A;
        snapshot.layers[0].keys[0][1] = KC_B;
        snapshot.settings.insert("pointer_dpi".into(), 800);
        ChangeQueue::new(Baseline::new(snapshot))
    }

    fn device_for(queue: &ChangeQueue) -> LoopbackTransport {
        LoopbackTransport::new(queue.baseline().snapshot().clone())
    }

    #[test]
    fn reduce_keeps_effective_value_untouched() {
        let baseline = ConfigValue::Key(KC_A);
        assert_eq!(
            reduce(&baseline, None, ConfigValue::Key(KC_A)),
            Reduction::Unchanged
        );
    }

    #[test]
    fn reduce_collapses_round_trips() {
        let baseline = ConfigValue::Key(KC_A);
        let prior = PendingChange {
            target: Target::key(0, 0, 0),
            previous: baseline.clone(),
            new_value: ConfigValue::Key(KC_B),
            created_at: Instant::now(),
            seq: 0,
            group: None,
        };
        assert_eq!(
            reduce(&baseline, Some(&prior), ConfigValue::Key(KC_A)),
            Reduction::Collapse
        );
        assert_eq!(
            reduce(&baseline, Some(&prior), ConfigValue::Key(KC_C)),
            Reduction::Store(ConfigValue::Key(KC_C))
        );
    }

    #[test]
    fn proposing_effective_value_is_a_noop() {
        let mut queue = seeded_queue();
        let t = Target::key(0, 0, 0);
        queue.propose(t.clone(), KC_A.into()).unwrap();
        assert!(!queue.is_dirty_globally());
        assert_eq!(queue.effective_value(&t).unwrap(), ConfigValue::Key(KC_A));
    }

    #[test]
    fn second_proposal_collapses_to_one_entry() {
        let mut queue = seeded_queue();
        let t = Target::key(0, 0, 0);
        queue.propose(t.clone(), KC_B.into()).unwrap();
        queue.propose(t.clone(), KC_C.into()).unwrap();
        assert_eq!(queue.len(), 1);
        let change = &queue.changes()[0];
        assert_eq!(change.new_value, ConfigValue::Key(KC_C));
        assert_eq!(change.previous, ConfigValue::Key(KC_B));
    }

    #[test]
    fn returning_to_baseline_drops_the_entry() {
        let mut queue = seeded_queue();
        let t = Target::key(0, 0, 0);
        queue.propose(t.clone(), KC_B.into()).unwrap();
        assert!(queue.is_dirty(&t));
        queue.propose(t.clone(), KC_A.into()).unwrap();
        assert!(!queue.is_dirty(&t));
        assert!(queue.is_empty());
    }

    #[test]
    fn out_of_bounds_proposal_is_rejected() {
        let mut queue = seeded_queue();
        let err = queue.propose(Target::key(5, 0, 0), KC_B.into()).unwrap_err();
        assert!(matches!(err, EditorError::InvalidTarget(_)));
        assert!(queue.is_empty());
    }

    #[test]
    fn value_kind_must_match_target() {
        let mut queue = seeded_queue();
        let err = queue
            .propose(Target::key(0, 0, 0), ConfigValue::Scalar(3))
            .unwrap_err();
        assert!(matches!(err, EditorError::ValueMismatch { .. }));
    }

    #[test]
    fn changes_keep_proposal_order() {
        let mut queue = seeded_queue();
        queue.propose(Target::key(0, 1, 2), KC_C.into()).unwrap();
        queue.propose(Target::key(0, 0, 0), KC_B.into()).unwrap();
        queue.propose(Target::setting("pointer_dpi"), 1600.into()).unwrap();
        let order: Vec<Target> = queue.changes().iter().map(|p| p.target.clone()).collect();
        assert_eq!(
            order,
            vec![
                Target::key(0, 1, 2),
                Target::key(0, 0, 0),
                Target::setting("pointer_dpi"),
            ]
        );
    }

    #[tokio::test]
    async fn commit_on_empty_queue_never_touches_the_device() {
        let mut queue = seeded_queue();
        let dev = device_for(&queue);
        let report = queue.commit(&dev).await;
        assert!(report.is_clean());
        assert!(report.committed.is_empty());
        assert!(dev.write_log().is_empty());
    }

    #[tokio::test]
    async fn successful_commit_clears_the_queue_and_updates_baseline() {
        let mut queue = seeded_queue();
        let dev = device_for(&queue);
        let t = Target::key(0, 0, 0);
        queue.propose(t.clone(), KC_C.into()).unwrap();
        queue.propose(Target::setting("pointer_dpi"), 1600.into()).unwrap();

        let report = queue.commit(&dev).await;
        assert!(report.is_clean());
        assert_eq!(report.committed.len(), 2);
        assert!(!queue.is_dirty_globally());
        assert_eq!(
            queue.baseline().value_of(&t).unwrap(),
            ConfigValue::Key(KC_C)
        );
        assert_eq!(queue.effective_value(&t).unwrap(), ConfigValue::Key(KC_C));
        assert_eq!(dev.snapshot().settings["pointer_dpi"], 1600);
    }

    #[tokio::test]
    async fn failed_target_is_retained_others_proceed() {
        let mut queue = seeded_queue();
        let dev = device_for(&queue);
        dev.fail_key_writes(0, 0, 0, 1);

        let failing = Target::key(0, 0, 0);
        let passing = Target::key(0, 1, 2);
        queue.propose(failing.clone(), KC_C.into()).unwrap();
        queue.propose(passing.clone(), KC_B.into()).unwrap();

        let report = queue.commit(&dev).await;
        assert_eq!(report.committed, vec![passing]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].target, failing);
        assert!(queue.is_dirty(&failing));

        // explicit retry succeeds once the fault clears
        let report = queue.commit(&dev).await;
        assert!(report.is_clean());
        assert!(!queue.is_dirty_globally());
    }

    #[tokio::test]
    async fn swap_pair_rolls_back_on_half_failure() {
        let mut queue = seeded_queue();
        let dev = device_for(&queue);
        let a = Target::key(0, 0, 0); // KC_A
        let b = Target::key(0, 0, 1); // KC_B
        queue
            .propose_pair((b.clone(), KC_A.into()), (a.clone(), KC_B.into()))
            .unwrap();

        // first half (b) goes through, second half (a) fails
        dev.fail_key_writes(0, 0, 0, 1);
        let report = queue.commit(&dev).await;

        assert_eq!(report.failed.len(), 2);
        assert!(queue.is_dirty(&a));
        assert!(queue.is_dirty(&b));
        // device was rolled back to the pre-swap state
        let snap = dev.snapshot();
        assert_eq!(snap.layers[0].keys[0][0], KC_A);
        assert_eq!(snap.layers[0].keys[0][1], KC_B);

        // retry completes the swap
        let report = queue.commit(&dev).await;
        assert!(report.is_clean());
        let snap = dev.snapshot();
        assert_eq!(snap.layers[0].keys[0][0], KC_B);
        assert_eq!(snap.layers[0].keys[0][1], KC_A);
    }

    #[tokio::test]
    async fn lone_swap_half_commits_alone() {
        let mut queue = seeded_queue();
        let dev = device_for(&queue);
        let a = Target::key(0, 0, 0); // KC_A
        let b = Target::key(0, 0, 1); // KC_B

        // swap, then hand-edit one half back to its baseline value: the
        // remaining grouped entry commits as a plain write
        queue
            .propose_pair((b.clone(), KC_A.into()), (a.clone(), KC_B.into()))
            .unwrap();
        queue.propose(a.clone(), KC_A.into()).unwrap();
        assert_eq!(queue.len(), 1);

        let report = queue.commit(&dev).await;
        assert!(report.is_clean());
        assert_eq!(report.committed, vec![b]);
        assert_eq!(dev.snapshot().layers[0].keys[0][1], KC_A);
    }

    #[test]
    fn rebase_prunes_satisfied_entries_and_refreshes_previous() {
        let mut queue = seeded_queue();
        let satisfied = Target::key(0, 0, 0);
        let open = Target::key(0, 0, 1);
        queue.propose(satisfied.clone(), KC_C.into()).unwrap();
        queue.propose(open.clone(), KC_C.into()).unwrap();

        // fresh device state already has KC_C at (0,0,0) and KC_A at (0,0,1)
        let mut fresh = DeviceSnapshot::blank(2, 2, 3);
        fresh.layers[0].keys[0][0] = KC_C;
        fresh.layers[0].keys[0][1] = KC_A;
        fresh.settings.insert("pointer_dpi".into(), 800);
        queue.rebase(fresh);

        assert!(!queue.is_dirty(&satisfied));
        assert!(queue.is_dirty(&open));
        let change = &queue.changes()[0];
        assert_eq!(change.previous, ConfigValue::Key(KC_A));
    }

    #[test]
    fn reload_replaces_baseline_and_clears_queue() {
        let mut queue = seeded_queue();
        let t = Target::key(0, 0, 0);
        queue.propose(t.clone(), KC_C.into()).unwrap();

        let mut fresh = DeviceSnapshot::blank(2, 2, 3);
        fresh.layers[0].keys[0][0] = KC_B;
        queue.reload_from_device(fresh);

        assert!(!queue.is_dirty_globally());
        assert_eq!(queue.effective_value(&t).unwrap(), ConfigValue::Key(KC_B));
    }
}
