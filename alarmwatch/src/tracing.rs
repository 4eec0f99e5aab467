//! Logging setup and helpers.
//!
//! Modules pull the usual macros in with `use crate::tracing::prelude::*`.
//! Under systemd the daemon logs to the journal; otherwise it writes
//! timestamped lines to stdout. `RUST_LOG` selects the level; without it
//! the crate logs at `info`, or `debug` when tick details are enabled.

use std::time::Duration;

use tokio::time::Instant;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub mod prelude {
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(debug: bool) -> &'static str {
    if debug { "info,alarmwatch=debug" } else { "info" }
}

/// Install the global subscriber.
///
/// Picks the journald layer when `JOURNAL_STREAM` is set (systemd sets
/// it for services), falling back to stdout if the journal socket is
/// unavailable. `debug` opens the filter for this crate's batched tick
/// details unless `RUST_LOG` says otherwise.
pub fn init_journald_or_stdout(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    if std::env::var_os("JOURNAL_STREAM").is_some() {
        match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(journald)
                    .init();
                return;
            }
            Err(e) => eprintln!("journald unavailable ({e}), logging to stdout"),
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_timer(fmt::time::LocalTime::rfc_3339())
                .with_target(false),
        )
        .init();
}

/// Debug lines held back and emitted in batches.
///
/// Polling produces a handful of detail lines every tick. Batching keeps
/// steady-state logs readable: lines accumulate until at least `interval`
/// has passed since the previous flush.
#[derive(Debug)]
pub struct DebugBatch {
    enabled: bool,
    interval: Duration,
    lines: Vec<String>,
    last_flush: Option<Instant>,
}

impl DebugBatch {
    pub fn new(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            lines: Vec::new(),
            last_flush: None,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.enabled {
            self.lines.push(line.into());
        }
    }

    pub fn extend(&mut self, lines: impl IntoIterator<Item = String>) {
        if self.enabled {
            self.lines.extend(lines);
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Flush if the interval has elapsed since the last flush. Returns
    /// the number of lines written.
    pub fn flush_due(&mut self, now: Instant) -> usize {
        let due = self
            .last_flush
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due { self.flush(now) } else { 0 }
    }

    /// Flush whatever is buffered, regardless of the interval.
    pub fn flush(&mut self, now: Instant) -> usize {
        if self.lines.is_empty() {
            return 0;
        }

        let count = self.lines.len();
        debug!(lines = count, "Tick details");
        for line in self.lines.drain(..) {
            debug!("{line}");
        }
        self.last_flush = Some(now);
        count
    }
}
