//! Core domain types shared across the monitor.

mod alarm;

pub use alarm::{AlarmId, AlarmRecord, CorrelationKey, LOCAL_FAULT, REM_SF, format_ids};
