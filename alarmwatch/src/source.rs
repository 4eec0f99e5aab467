//! Snapshot sources: where the set of currently active alarms comes from.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::types::{AlarmId, AlarmRecord};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to connect to alarm database: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Active alarm query failed: {0}")]
    Query(#[source] sqlx::Error),
}

/// Supplies the complete set of active alarms on demand.
///
/// Implementations are read-only; a failed fetch must leave nothing
/// half-done, since the monitor simply skips that tick.
#[async_trait]
pub trait SnapshotSource: Send {
    async fn fetch(&mut self) -> Result<Vec<AlarmRecord>, SourceError>;
}

/// Identifier and severity are cast to text so the monitor stays agnostic
/// of their column types; timestamps are normalised to `timestamp`.
const ACTIVE_ALARMS_QUERY: &str = r#"
    SELECT alarm_id::text AS alarm_id,
           COALESCE(site, '') AS site,
           COALESCE(device_type, '') AS device_type,
           COALESCE(source, '') AS source,
           alarm_code,
           COALESCE(severity::text, '') AS severity,
           COALESCE(description, '') AS description,
           first_seen::timestamp AS first_seen,
           device_time::timestamp AS device_time
    FROM active_alarms
    WHERE alarm_code = ANY($1)
    ORDER BY alarm_id
"#;

#[derive(Debug, sqlx::FromRow)]
struct ActiveAlarmRow {
    alarm_id: String,
    site: String,
    device_type: String,
    source: String,
    alarm_code: String,
    severity: String,
    description: String,
    first_seen: Option<PrimitiveDateTime>,
    device_time: Option<PrimitiveDateTime>,
}

impl From<ActiveAlarmRow> for AlarmRecord {
    fn from(row: ActiveAlarmRow) -> Self {
        Self {
            id: AlarmId::from(row.alarm_id),
            site: row.site,
            device_type: row.device_type,
            source: row.source,
            code: row.alarm_code,
            severity: row.severity,
            description: row.description,
            first_seen: row.first_seen,
            device_time: row.device_time,
        }
    }
}

/// Reads the `active_alarms` table maintained by the SNMP trap collector.
pub struct PgSnapshotSource {
    pool: PgPool,
    watched_codes: Vec<String>,
}

impl PgSnapshotSource {
    /// Connect eagerly so an unreachable database is reported at startup.
    pub async fn connect(
        database_url: &str,
        watched_codes: Vec<String>,
    ) -> Result<Self, SourceError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(SourceError::Connect)?;

        Ok(Self {
            pool,
            watched_codes,
        })
    }

    /// Handle for closing the pool on shutdown.
    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

#[async_trait]
impl SnapshotSource for PgSnapshotSource {
    async fn fetch(&mut self) -> Result<Vec<AlarmRecord>, SourceError> {
        let rows: Vec<ActiveAlarmRow> = sqlx::query_as(ACTIVE_ALARMS_QUERY)
            .bind(self.watched_codes.as_slice())
            .fetch_all(&self.pool)
            .await
            .map_err(SourceError::Query)?;

        Ok(rows.into_iter().map(AlarmRecord::from).collect())
    }
}
