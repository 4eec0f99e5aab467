//! Per-tick reconciliation of an alarm snapshot against engine state.
//!
//! Each call to [`AlarmEngine::reconcile`] runs five passes over the
//! snapshot:
//!
//! 1. Collect correlation keys that carry a suppressing code.
//! 2. Start or advance alarm timers for every unsuppressed record.
//! 3. Start clear timers for alerted alarms that vanished.
//! 4. Cancel clear timers for alarms that came back; fire expired ones.
//! 5. Commit the snapshot as the new active set.
//!
//! Timers are only ever started or deleted, never restarted. An alarm that
//! is suppressed keeps its timer frozen until the suppressor goes away.

use std::collections::{BTreeSet, HashSet};
use std::mem;

use time::OffsetDateTime;
use tokio::time::Instant;

use super::config::EngineConfig;
use super::notification::{AlertNotice, ClearNotice, Notification};
use super::state::EngineState;
use crate::tracing::prelude::*;
use crate::types::{AlarmId, AlarmRecord, CorrelationKey, format_ids};

pub struct AlarmEngine {
    config: EngineConfig,
    state: EngineState,
    /// Debug notes gathered during the last reconciliations, drained by
    /// the caller.
    notes: Vec<String>,
}

impl AlarmEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: EngineState::default(),
            notes: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// Take the debug notes collected since the last call.
    pub fn take_notes(&mut self) -> Vec<String> {
        mem::take(&mut self.notes)
    }

    /// Reconcile one snapshot and return the notifications to send.
    ///
    /// `now` drives every timer; `wall_now` is only stamped into CLEAR
    /// messages. ALERTs come first, then CLEARs, each group ordered by
    /// alarm id whatever the snapshot order. State transitions are
    /// committed before returning, so a
    /// failed delivery must not be reported back.
    pub fn reconcile(
        &mut self,
        snapshot: &[AlarmRecord],
        now: Instant,
        wall_now: OffsetDateTime,
    ) -> Vec<Notification> {
        let Self {
            config,
            state,
            notes,
        } = self;
        let mut notifications = Vec::new();

        let dominant = dominant_keys(config, snapshot);
        let mut current_ids = BTreeSet::new();

        for record in snapshot {
            current_ids.insert(record.id.clone());

            if is_suppressed(config, record, &dominant) {
                notes.push(format!("Suppress {} alarm_id={}", record.code, record.id));
                continue;
            }

            let id = &record.id;
            if !state.active_ids.contains(id)
                && !state.pending_alarm.contains_key(id)
                && !state.alerted_ids.contains(id)
            {
                state.pending_alarm.insert(id.clone(), now);
                info!(alarm_id = %id, code = %record.code, "Alarm detected, starting alarm timer");
            }

            let Some(&since) = state.pending_alarm.get(id) else {
                continue;
            };

            let elapsed = now.saturating_duration_since(since);
            notes.push(format!(
                "Alarm {id} active | alarm_timer={}s",
                elapsed.as_secs()
            ));

            if elapsed >= config.alarm_delay {
                state.pending_alarm.remove(id);
                state.alerted_ids.insert(id.clone());
                info!(
                    alarm_id = %id,
                    code = %record.code,
                    site = %record.site,
                    elapsed_s = elapsed.as_secs(),
                    "Alarm persisted past delay, raising ALERT"
                );
                notifications.push(Notification::Alert(AlertNotice::from(record)));
            }
        }

        // An alarm that vanished before alerting loses its timer; a later
        // reappearance is a new episode.
        state.pending_alarm.retain(|id, _| {
            let present = current_ids.contains(id);
            if !present {
                notes.push(format!("Drop alarm timer for alarm_id={id}"));
            }
            present
        });

        notifications.sort_by(|a, b| a.id().cmp(b.id()));

        let cleared: Vec<&AlarmId> = state.active_ids.difference(&current_ids).collect();
        notes.push(format!("Detected cleared alarms: {}", format_ids(cleared.iter().copied())));

        for id in cleared {
            if !state.alerted_ids.contains(id) {
                notes.push(format!("Skip CLEAR for alarm_id={id}"));
                continue;
            }
            if !state.pending_clear.contains_key(id) {
                state.pending_clear.insert(id.clone(), now);
                info!(alarm_id = %id, "Alarm cleared, starting clear timer");
            }
        }

        let mut expired = Vec::new();
        state.pending_clear.retain(|id, since| {
            if current_ids.contains(id) {
                notes.push(format!("Alarm {id} returned, cancel clear timer"));
                return false;
            }

            let elapsed = now.saturating_duration_since(*since);
            notes.push(format!(
                "Alarm {id} cleared | clear_timer={}s",
                elapsed.as_secs()
            ));

            if elapsed >= config.clear_delay {
                expired.push(id.clone());
                false
            } else {
                true
            }
        });

        for id in expired {
            state.alerted_ids.remove(&id);
            info!(alarm_id = %id, "Alarm stayed clear past delay, sending CLEAR");
            notifications.push(Notification::Clear(ClearNotice {
                id,
                cleared_at: wall_now,
            }));
        }

        state.active_ids = current_ids;
        notes.push(format!(
            "Updating active_alarm_ids -> {}",
            format_ids(state.active_ids.iter())
        ));

        debug_assert!(state.is_consistent());
        notifications
    }
}

/// (suppressing code, correlation key) pairs present in the snapshot.
fn dominant_keys<'a>(
    config: &EngineConfig,
    snapshot: &'a [AlarmRecord],
) -> HashSet<(&'a str, CorrelationKey<'a>)> {
    snapshot
        .iter()
        .filter(|record| {
            config
                .suppression
                .iter()
                .any(|rule| rule.suppressor == record.code)
        })
        .map(|record| (record.code.as_str(), record.correlation_key()))
        .collect()
}

fn is_suppressed<'a>(
    config: &'a EngineConfig,
    record: &'a AlarmRecord,
    dominant: &HashSet<(&'a str, CorrelationKey<'a>)>,
) -> bool {
    let key = record.correlation_key();
    config
        .suppression
        .iter()
        .filter(|rule| rule.suppressed == record.code)
        .any(|rule| dominant.contains(&(rule.suppressor.as_str(), key)))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;

    use super::*;
    use crate::engine::{AlarmPhase, SuppressionRule};
    use crate::types::{LOCAL_FAULT, REM_SF};

    const WALL: OffsetDateTime = datetime!(2026-10-19 09:00:00 UTC);

    fn record(id: &str, code: &str, source: &str) -> AlarmRecord {
        AlarmRecord {
            id: AlarmId::new(id),
            site: "A".into(),
            device_type: "D".into(),
            source: source.into(),
            code: code.into(),
            severity: "major".into(),
            description: format!("{code} on {source}"),
            first_seen: None,
            device_time: None,
        }
    }

    fn engine() -> AlarmEngine {
        AlarmEngine::new(EngineConfig {
            alarm_delay: Duration::from_secs(30),
            clear_delay: Duration::from_secs(10),
            suppression: vec![SuppressionRule::new(LOCAL_FAULT, REM_SF)],
        })
    }

    /// Drives an engine through ticks at fixed offsets from one origin.
    struct Clock {
        origin: Instant,
    }

    impl Clock {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
            }
        }

        fn at(&self, secs: u64) -> Instant {
            self.origin + Duration::from_secs(secs)
        }
    }

    fn alerts(notifications: &[Notification]) -> Vec<&str> {
        notifications
            .iter()
            .filter(|n| matches!(n, Notification::Alert(_)))
            .map(|n| n.id().as_str())
            .collect()
    }

    fn clears(notifications: &[Notification]) -> Vec<&str> {
        notifications
            .iter()
            .filter(|n| matches!(n, Notification::Clear(_)))
            .map(|n| n.id().as_str())
            .collect()
    }

    #[test]
    fn empty_snapshots_never_notify() {
        let mut engine = engine();
        let clock = Clock::new();
        for t in (0..=100).step_by(10) {
            assert!(engine.reconcile(&[], clock.at(t), WALL).is_empty());
        }
        assert!(engine.state().active_ids().is_empty());
    }

    #[test]
    fn alert_fires_once_delay_is_reached() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("X", LOCAL_FAULT, "S")];

        for t in [0, 10, 20] {
            assert!(engine.reconcile(&snapshot, clock.at(t), WALL).is_empty(), "t={t}");
        }

        let fired = engine.reconcile(&snapshot, clock.at(30), WALL);
        assert_eq!(alerts(&fired), vec!["X"]);
        assert_eq!(engine.state().phase(&AlarmId::from("X")), AlarmPhase::Alerted);

        let later = engine.reconcile(&snapshot, clock.at(40), WALL);
        assert!(later.is_empty());
    }

    #[test]
    fn alert_carries_record_details() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("X", LOCAL_FAULT, "S")];

        engine.reconcile(&snapshot, clock.at(0), WALL);
        let fired = engine.reconcile(&snapshot, clock.at(30), WALL);

        let Notification::Alert(alert) = &fired[0] else {
            panic!("expected an alert, got {fired:?}");
        };
        assert_eq!(alert.code, LOCAL_FAULT);
        assert_eq!(alert.site, "A");
        assert_eq!(alert.device_type, "D");
        assert_eq!(alert.source, "S");
        assert_eq!(alert.description, "LOCAL_FAULT on S");
    }

    #[test]
    fn zero_delay_alerts_on_first_sighting() {
        let mut engine = AlarmEngine::new(EngineConfig {
            alarm_delay: Duration::ZERO,
            ..EngineConfig::default()
        });
        let fired = engine.reconcile(&[record("X", LOCAL_FAULT, "S")], Instant::now(), WALL);
        assert_eq!(alerts(&fired), vec!["X"]);
    }

    #[test]
    fn short_lived_alarm_never_alerts() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("X", LOCAL_FAULT, "S")];

        engine.reconcile(&snapshot, clock.at(0), WALL);
        engine.reconcile(&snapshot, clock.at(20), WALL);
        for t in [30, 40, 50, 60] {
            assert!(engine.reconcile(&[], clock.at(t), WALL).is_empty(), "t={t}");
        }
        assert_eq!(engine.state().phase(&AlarmId::from("X")), AlarmPhase::Unseen);
    }

    #[test]
    fn flapping_alarm_restarts_its_timer() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("X", LOCAL_FAULT, "S")];

        engine.reconcile(&snapshot, clock.at(0), WALL);
        engine.reconcile(&snapshot, clock.at(20), WALL);
        engine.reconcile(&[], clock.at(30), WALL);

        // Back after a gap: a new 30s window starts at t=40.
        assert!(engine.reconcile(&snapshot, clock.at(40), WALL).is_empty());
        assert!(engine.reconcile(&snapshot, clock.at(60), WALL).is_empty());
        assert_eq!(alerts(&engine.reconcile(&snapshot, clock.at(70), WALL)), vec!["X"]);
    }

    #[test]
    fn clear_fires_after_clear_delay() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("X", LOCAL_FAULT, "S")];

        for t in [0, 10, 20, 30] {
            engine.reconcile(&snapshot, clock.at(t), WALL);
        }

        assert!(engine.reconcile(&[], clock.at(40), WALL).is_empty());
        assert_eq!(
            engine.state().phase(&AlarmId::from("X")),
            AlarmPhase::PendingClear
        );

        let fired = engine.reconcile(&[], clock.at(50), WALL);
        assert_eq!(clears(&fired), vec!["X"]);
        let Notification::Clear(clear) = &fired[0] else {
            panic!("expected a clear, got {fired:?}");
        };
        assert_eq!(clear.cleared_at, WALL);
        assert_eq!(engine.state().phase(&AlarmId::from("X")), AlarmPhase::Unseen);
        assert!(engine.state().alerted_ids().is_empty());
    }

    #[test]
    fn reappearance_cancels_clear() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("X", LOCAL_FAULT, "S")];

        for t in [0, 10, 20, 30] {
            engine.reconcile(&snapshot, clock.at(t), WALL);
        }
        engine.reconcile(&[], clock.at(40), WALL);

        assert!(engine.reconcile(&snapshot, clock.at(50), WALL).is_empty());
        assert_eq!(engine.state().pending_clear_ids().count(), 0);
        assert_eq!(engine.state().pending_alarm_ids().count(), 0);
        assert!(engine.state().alerted_ids().contains(&AlarmId::from("X")));

        // Staying present never re-alerts or clears.
        for t in [60, 70, 80, 90, 100] {
            assert!(engine.reconcile(&snapshot, clock.at(t), WALL).is_empty(), "t={t}");
        }
    }

    #[test]
    fn never_alerted_alarm_produces_no_clear() {
        let mut engine = engine();
        let clock = Clock::new();

        engine.reconcile(&[record("X", LOCAL_FAULT, "S")], clock.at(0), WALL);
        for t in [10, 20, 30, 40] {
            assert!(engine.reconcile(&[], clock.at(t), WALL).is_empty());
        }
        assert_eq!(engine.state().pending_clear_ids().count(), 0);
    }

    #[test]
    fn realerts_after_full_clear_cycle() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("X", LOCAL_FAULT, "S")];

        engine.reconcile(&snapshot, clock.at(0), WALL);
        engine.reconcile(&snapshot, clock.at(30), WALL);
        engine.reconcile(&[], clock.at(40), WALL);
        assert_eq!(clears(&engine.reconcile(&[], clock.at(50), WALL)), vec!["X"]);

        engine.reconcile(&snapshot, clock.at(60), WALL);
        assert_eq!(alerts(&engine.reconcile(&snapshot, clock.at(90), WALL)), vec!["X"]);
    }

    #[test]
    fn correlated_remote_failure_is_suppressed() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("L", LOCAL_FAULT, "S"), record("R", REM_SF, "S")];

        let mut alerted = Vec::new();
        for t in (0..=100).step_by(10) {
            let fired = engine.reconcile(&snapshot, clock.at(t), WALL);
            alerted.extend(alerts(&fired).into_iter().map(String::from));
        }

        assert_eq!(alerted, vec!["L".to_string()]);
        assert_eq!(engine.state().phase(&AlarmId::from("R")), AlarmPhase::Unseen);
        // Suppressed alarms still count as present.
        assert!(engine.state().active_ids().contains(&AlarmId::from("R")));
    }

    #[test]
    fn remote_failure_on_other_port_is_not_suppressed() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("L", LOCAL_FAULT, "S1"), record("R", REM_SF, "S2")];

        engine.reconcile(&snapshot, clock.at(0), WALL);
        let mut fired = alerts(&engine.reconcile(&snapshot, clock.at(30), WALL))
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        fired.sort();
        assert_eq!(fired, vec!["L".to_string(), "R".to_string()]);
    }

    #[test]
    fn suppression_freezes_running_timer() {
        let mut engine = engine();
        let clock = Clock::new();
        let remote = record("R", REM_SF, "S");
        let local = record("L", LOCAL_FAULT, "S");

        // R starts its timer alone, then L shows up and hides it.
        engine.reconcile(&[remote.clone()], clock.at(0), WALL);
        for t in [10, 20, 30, 40] {
            let fired = engine.reconcile(&[remote.clone(), local.clone()], clock.at(t), WALL);
            assert!(!alerts(&fired).contains(&"R"), "t={t}");
        }
        assert_eq!(
            engine.state().phase(&AlarmId::from("R")),
            AlarmPhase::PendingAlarm
        );

        // L goes away; R resumes from its original start and is overdue.
        let fired = engine.reconcile(&[remote], clock.at(50), WALL);
        assert_eq!(alerts(&fired), vec!["R"]);
    }

    #[test]
    fn remote_failure_suppressed_from_the_start_gets_no_timer() {
        let mut engine = engine();
        let clock = Clock::new();
        let remote = record("R", REM_SF, "S");
        let local = record("L", LOCAL_FAULT, "S");

        engine.reconcile(&[remote.clone(), local], clock.at(0), WALL);
        for t in [10, 20, 30, 40, 50] {
            assert!(engine.reconcile(&[remote.clone()], clock.at(t), WALL).is_empty());
        }
        assert_eq!(engine.state().phase(&AlarmId::from("R")), AlarmPhase::Unseen);
    }

    #[test]
    fn notifications_are_ordered_by_id_regardless_of_snapshot_order() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [
            record("c", LOCAL_FAULT, "3"),
            record("a", LOCAL_FAULT, "1"),
            record("b", LOCAL_FAULT, "2"),
        ];

        engine.reconcile(&snapshot, clock.at(0), WALL);
        let alerts = engine.reconcile(&snapshot, clock.at(30), WALL);
        let ids: Vec<&str> = alerts.iter().map(|n| n.id().as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(alerts.iter().all(|n| n.kind() == "ALERT"));

        let late = [record("z", LOCAL_FAULT, "9")];
        engine.reconcile(&late, clock.at(31), WALL);
        let mixed = engine.reconcile(&late, clock.at(61), WALL);
        let order: Vec<(&str, &str)> = mixed.iter().map(|n| (n.kind(), n.id().as_str())).collect();
        assert_eq!(
            order,
            [("ALERT", "z"), ("CLEAR", "a"), ("CLEAR", "b"), ("CLEAR", "c")]
        );
    }

    #[test]
    fn reconcile_is_idempotent_for_repeated_tick() {
        let mut engine = engine();
        let clock = Clock::new();
        let snapshot = [record("X", LOCAL_FAULT, "S"), record("Y", LOCAL_FAULT, "T")];

        engine.reconcile(&snapshot, clock.at(0), WALL);
        assert_eq!(engine.reconcile(&snapshot, clock.at(30), WALL).len(), 2);
        assert!(engine.reconcile(&snapshot, clock.at(30), WALL).is_empty());

        engine.reconcile(&[], clock.at(40), WALL);
        assert_eq!(engine.reconcile(&[], clock.at(50), WALL).len(), 2);
        assert!(engine.reconcile(&[], clock.at(50), WALL).is_empty());
    }

    #[test]
    fn custom_rule_replaces_default() {
        let mut engine = AlarmEngine::new(EngineConfig {
            suppression: vec![SuppressionRule::new("LOS", "LOF")],
            ..EngineConfig::default()
        });
        let clock = Clock::new();
        let snapshot = [
            record("1", "LOS", "S"),
            record("2", "LOF", "S"),
            record("3", LOCAL_FAULT, "S"),
            record("4", REM_SF, "S"),
        ];

        engine.reconcile(&snapshot, clock.at(0), WALL);
        let mut fired = alerts(&engine.reconcile(&snapshot, clock.at(30), WALL))
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        fired.sort();
        assert_eq!(fired, vec!["1".to_string(), "3".to_string(), "4".to_string()]);
    }

    #[test]
    fn notes_describe_the_tick_and_drain() {
        let mut engine = engine();
        let snapshot = [record("L", LOCAL_FAULT, "S"), record("R", REM_SF, "S")];

        engine.reconcile(&snapshot, Instant::now(), WALL);
        let notes = engine.take_notes();
        assert!(notes.contains(&"Suppress REM_SF alarm_id=R".to_string()));
        assert!(notes.contains(&"Alarm L active | alarm_timer=0s".to_string()));
        assert!(notes.contains(&"Updating active_alarm_ids -> [L, R]".to_string()));
        assert!(engine.take_notes().is_empty());
    }
}
