//! The polling loop.
//!
//! Every tick the monitor pulls a snapshot, reconciles it, and delivers
//! whatever the engine decided to emit. Failures inside a tick are logged
//! and the loop carries on; the monitor favours staying up over reporting
//! every error upward.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::engine::{AlarmEngine, Notification};
use crate::notify::{Notifier, NotifyError};
use crate::source::{SnapshotSource, SourceError};
use crate::tracing::DebugBatch;
use crate::tracing::prelude::*;
use crate::types::format_ids;

/// What happened during one tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// Snapshot reconciled and notifications attempted.
    Reconciled {
        rows: usize,
        sent: usize,
        failed: usize,
    },

    /// Snapshot could not be fetched. Engine state was not touched.
    FetchFailed(SourceError),
}

pub struct Monitor<S, N> {
    engine: AlarmEngine,
    source: S,
    notifier: N,
    recipient: String,
    poll_interval: Duration,
    notify_timeout: Duration,
    debug: DebugBatch,
}

impl<S, N> Monitor<S, N>
where
    S: SnapshotSource,
    N: Notifier,
{
    pub fn new(config: &MonitorConfig, source: S, notifier: N) -> Self {
        Self {
            engine: AlarmEngine::new(config.engine.clone()),
            source,
            notifier,
            recipient: config.recipient.clone(),
            poll_interval: config.poll_interval,
            notify_timeout: config.notify_timeout,
            debug: DebugBatch::new(config.debug, config.debug_interval),
        }
    }

    pub fn engine(&self) -> &AlarmEngine {
        &self.engine
    }

    /// Poll until `cancellation` fires. The tick in progress always runs
    /// to completion.
    pub async fn run(mut self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval_s = self.poll_interval.as_secs(),
            "Alarm monitor running"
        );

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                    self.debug.flush_due(Instant::now());
                }
            }
        }

        self.debug.flush(Instant::now());
        info!("Alarm monitor stopped");
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let now = Instant::now();
        let wall_now = wall_clock_now();

        self.note_state(wall_now);

        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Snapshot fetch failed, skipping tick");
                return TickOutcome::FetchFailed(e);
            }
        };
        self.debug.push(format!("SQL returned {} row(s)", snapshot.len()));

        let notifications = self.engine.reconcile(&snapshot, now, wall_now);
        self.debug.extend(self.engine.take_notes());

        let mut sent = 0;
        let mut failed = 0;
        for notification in &notifications {
            let delivery = Self::deliver(
                &self.notifier,
                &self.recipient,
                self.notify_timeout,
                notification,
            )
            .await;
            match delivery {
                Ok(()) => {
                    info!(
                        kind = notification.kind(),
                        alarm_id = %notification.id(),
                        "Notification sent"
                    );
                    sent += 1;
                }
                Err(e) => {
                    error!(
                        kind = notification.kind(),
                        alarm_id = %notification.id(),
                        error = %e,
                        "Notification failed, not retrying"
                    );
                    failed += 1;
                }
            }
        }

        TickOutcome::Reconciled {
            rows: snapshot.len(),
            sent,
            failed,
        }
    }

    /// One bounded send attempt. A timeout counts as a failed delivery.
    async fn deliver(
        notifier: &N,
        recipient: &str,
        timeout: Duration,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let text = notification.to_string();
        info!(
            kind = notification.kind(),
            alarm_id = %notification.id(),
            length = text.len(),
            "Notification send attempt"
        );

        match tokio::time::timeout(timeout, notifier.send(recipient, &text)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::TimedOut(timeout)),
        }
    }

    fn note_state(&mut self, wall_now: OffsetDateTime) {
        let state = self.engine.state();
        let lines = [
            format!("Poll tick @ {wall_now}"),
            format!(
                "Previous active_alarm_ids: {}",
                format_ids(state.active_ids().iter())
            ),
            format!(
                "Pending alarm timers: {}",
                format_ids(state.pending_alarm_ids())
            ),
            format!(
                "Pending clear timers: {}",
                format_ids(state.pending_clear_ids())
            ),
            format!("Alerted alarms: {}", format_ids(state.alerted_ids().iter())),
        ];
        self.debug.extend(lines);
    }
}

fn wall_clock_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
