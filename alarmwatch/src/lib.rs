//! Debounced alarm notifications for network operations centres.
//!
//! A [`monitor::Monitor`] polls a [`source::SnapshotSource`] for the set of
//! currently active alarms, hands each snapshot to the
//! [`engine::AlarmEngine`], and delivers the resulting ALERT and CLEAR
//! messages through a [`notify::Notifier`].

pub mod config;
pub mod engine;
pub mod monitor;
pub mod notify;
pub mod source;
pub mod tracing;
pub mod types;
