//! Outbound ALERT and CLEAR messages.

use std::fmt;

use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::types::{AlarmId, AlarmRecord};

/// A message the engine decided to emit this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Alert(AlertNotice),
    Clear(ClearNotice),
}

impl Notification {
    pub fn id(&self) -> &AlarmId {
        match self {
            Notification::Alert(alert) => &alert.id,
            Notification::Clear(clear) => &clear.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Alert(_) => "ALERT",
            Notification::Clear(_) => "CLEAR",
        }
    }
}

/// Everything an operator needs to find the faulty port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertNotice {
    pub id: AlarmId,
    pub code: String,
    pub site: String,
    pub device_type: String,
    pub source: String,
    pub severity: String,
    pub first_seen: Option<PrimitiveDateTime>,
    pub device_time: Option<PrimitiveDateTime>,
    pub description: String,
}

impl From<&AlarmRecord> for AlertNotice {
    fn from(record: &AlarmRecord) -> Self {
        Self {
            id: record.id.clone(),
            code: record.code.clone(),
            site: record.site.clone(),
            device_type: record.device_type.clone(),
            source: record.source.clone(),
            severity: record.severity.clone(),
            first_seen: record.first_seen,
            device_time: record.device_time,
            description: record.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearNotice {
    pub id: AlarmId,
    pub cleared_at: OffsetDateTime,
}

fn write_timestamp(
    f: &mut fmt::Formatter<'_>,
    timestamp: Option<PrimitiveDateTime>,
) -> fmt::Result {
    match timestamp {
        Some(ts) => {
            let text = ts
                .format(format_description!(
                    "[year]-[month]-[day] [hour]:[minute]:[second]"
                ))
                .map_err(|_| fmt::Error)?;
            f.write_str(&text)
        }
        None => f.write_str("-"),
    }
}

impl fmt::Display for AlertNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🚨 {} ALARM 🚨", self.code)?;
        writeln!(f)?;
        writeln!(f, "Site       : {}", self.site)?;
        writeln!(f, "Device     : {}", self.device_type)?;
        writeln!(f, "Source     : {}", self.source)?;
        writeln!(f, "Severity   : {}", self.severity)?;
        writeln!(f, "Alarm ID   : {}", self.id)?;
        f.write_str("First Seen : ")?;
        write_timestamp(f, self.first_seen)?;
        f.write_str("\nDevice Time: ")?;
        write_timestamp(f, self.device_time)?;
        writeln!(f)?;
        writeln!(f)?;
        f.write_str(&self.description)
    }
}

impl fmt::Display for ClearNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cleared_at = PrimitiveDateTime::new(self.cleared_at.date(), self.cleared_at.time());
        writeln!(f, "✅ ALARM CLEARED ✅")?;
        writeln!(f)?;
        writeln!(f, "Alarm ID    : {}", self.id)?;
        f.write_str("Cleared Time: ")?;
        write_timestamp(f, Some(cleared_at))
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Alert(alert) => fmt::Display::fmt(alert, f),
            Notification::Clear(clear) => fmt::Display::fmt(clear, f),
        }
    }
}
