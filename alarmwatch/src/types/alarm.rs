//! Alarm records as reported by the snapshot source.

use std::fmt;

use time::PrimitiveDateTime;

/// Alarm code for a local fault on a port. Highest priority watched code.
pub const LOCAL_FAULT: &str = "LOCAL_FAULT";

/// Alarm code for a remote signal failure. Usually a side effect of a
/// `LOCAL_FAULT` on the same port.
pub const REM_SF: &str = "REM_SF";

/// Opaque identifier of one underlying fault instance.
///
/// The data source may use integers or strings; the monitor never looks
/// inside, so the text form is all we keep.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlarmId(String);

impl AlarmId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AlarmId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AlarmId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Render identifiers as `[a, b, c]` for log output.
pub fn format_ids<'a>(ids: impl Iterator<Item = &'a AlarmId>) -> String {
    let joined = ids.map(AlarmId::as_str).collect::<Vec<_>>().join(", ");
    format!("[{joined}]")
}

/// Physical context shared by related alarms: (site, device type, source).
///
/// Two alarms with the same key come from the same port on the same
/// device, so a high-priority alarm can stand in for a low-priority one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey<'a> {
    pub site: &'a str,
    pub device_type: &'a str,
    pub source: &'a str,
}

/// One currently active alarm, as seen in a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRecord {
    pub id: AlarmId,
    pub site: String,
    pub device_type: String,
    pub source: String,
    pub code: String,
    pub severity: String,
    pub description: String,
    /// When the data source first recorded the alarm. Display only.
    pub first_seen: Option<PrimitiveDateTime>,
    /// Timestamp reported by the device itself. Display only.
    pub device_time: Option<PrimitiveDateTime>,
}

impl AlarmRecord {
    pub fn correlation_key(&self) -> CorrelationKey<'_> {
        CorrelationKey {
            site: &self.site,
            device_type: &self.device_type,
            source: &self.source,
        }
    }
}
