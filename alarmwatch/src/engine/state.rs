//! Bookkeeping the engine carries from one tick to the next.
//!
//! # Per-alarm lifecycle
//!
//! ```text
//!            seen              alarm_delay elapsed
//!  Unseen ────────► PendingAlarm ──────────────────► Alerted
//!                      │                            ▲     │
//!                      │ gone                reappears│     │ gone
//!                      ▼                            │     ▼
//!                   (removed)                    PendingClear
//!                                                       │
//!                                   clear_delay elapsed │
//!                                                       ▼
//!                                                   (removed)
//! ```
//!
//! Suppression is not a stored state: it is evaluated fresh each tick and
//! only freezes whatever timer the alarm already has.

use std::collections::{BTreeMap, BTreeSet};

use tokio::time::Instant;

use crate::types::AlarmId;

/// Where a single alarm identifier sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmPhase {
    /// Not tracked by any timer and never alerted.
    Unseen,

    /// Active, counting toward the alarm delay.
    PendingAlarm,

    /// ALERT sent, alarm still present.
    Alerted,

    /// ALERT sent, alarm gone, counting toward the clear delay.
    PendingClear,
}

/// Timers and sets owned by [`AlarmEngine`](super::AlarmEngine).
///
/// All instants are monotonic; wall-clock time never enters interval
/// arithmetic. Ordered collections keep log output and CLEAR ordering
/// stable between runs.
#[derive(Debug, Default)]
pub struct EngineState {
    /// Identifiers present in the previous snapshot, suppressed ones
    /// included.
    pub(super) active_ids: BTreeSet<AlarmId>,

    /// Start of the debounce-before-alert timer.
    pub(super) pending_alarm: BTreeMap<AlarmId, Instant>,

    /// Alerted and not yet cleared. Still holds identifiers that are
    /// waiting in `pending_clear`.
    pub(super) alerted_ids: BTreeSet<AlarmId>,

    /// Start of the debounce-before-clear timer.
    pub(super) pending_clear: BTreeMap<AlarmId, Instant>,
}

impl EngineState {
    pub fn active_ids(&self) -> &BTreeSet<AlarmId> {
        &self.active_ids
    }

    pub fn pending_alarm_ids(&self) -> impl Iterator<Item = &AlarmId> {
        self.pending_alarm.keys()
    }

    pub fn alerted_ids(&self) -> &BTreeSet<AlarmId> {
        &self.alerted_ids
    }

    pub fn pending_clear_ids(&self) -> impl Iterator<Item = &AlarmId> {
        self.pending_clear.keys()
    }

    pub fn phase(&self, id: &AlarmId) -> AlarmPhase {
        if self.pending_clear.contains_key(id) {
            AlarmPhase::PendingClear
        } else if self.alerted_ids.contains(id) {
            AlarmPhase::Alerted
        } else if self.pending_alarm.contains_key(id) {
            AlarmPhase::PendingAlarm
        } else {
            AlarmPhase::Unseen
        }
    }

    /// True when no identifier is both waiting to alert and already
    /// alerted, and every clear timer belongs to an alerted identifier.
    pub fn is_consistent(&self) -> bool {
        let disjoint = self
            .pending_alarm
            .keys()
            .all(|id| !self.alerted_ids.contains(id));
        let clears_alerted = self
            .pending_clear
            .keys()
            .all(|id| self.alerted_ids.contains(id));
        disjoint && clears_alerted
    }
}
