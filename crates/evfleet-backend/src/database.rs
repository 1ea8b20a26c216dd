//! SQLite-backed station store

use crate::error::{BackendError, BackendResult};
use crate::store::{EventKind, EventLogEntry, StationRecord, StationStore, UNKNOWN};
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use evfleet_types::StationStatus;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
    /// Maximum connection pool size
    pub max_connections: u32,
    /// Drop all stations and events on startup
    pub reset_on_start: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://evfleet.db".to_string(),
            max_connections: 4,
            reset_on_start: true,
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            reset_on_start: false,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

// Fixed-width UTC text sorts the same as the instants it encodes, so
// staleness can be decided by comparing strings inside SQLite.
fn db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(cp_id: &str, raw: Option<String>) -> BackendResult<Option<DateTime<Utc>>> {
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|e| BackendError::CorruptRecord {
                cp_id: cp_id.to_string(),
                message: format!("bad timestamp {:?}: {}", raw, e),
            })
    })
    .transpose()
}

#[derive(sqlx::FromRow)]
struct StationRow {
    cp_id: String,
    vendor: String,
    model: String,
    status: String,
    last_seen: Option<String>,
    busy: bool,
    last_heartbeat: Option<String>,
}

impl TryFrom<StationRow> for StationRecord {
    type Error = BackendError;

    fn try_from(row: StationRow) -> BackendResult<Self> {
        let last_seen = parse_time(&row.cp_id, row.last_seen)?;
        let last_heartbeat = parse_time(&row.cp_id, row.last_heartbeat)?;
        Ok(StationRecord {
            status: StationStatus::parse(&row.status),
            cp_id: row.cp_id,
            vendor: row.vendor,
            model: row.model,
            last_seen,
            busy: row.busy,
            last_heartbeat,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    kind: String,
    cp_id: String,
    message: String,
    timestamp: String,
}

impl TryFrom<EventRow> for EventLogEntry {
    type Error = BackendError;

    fn try_from(row: EventRow) -> BackendResult<Self> {
        let kind = EventKind::parse(&row.kind).ok_or_else(|| BackendError::CorruptRecord {
            cp_id: row.cp_id.clone(),
            message: format!("unknown event kind {}", row.kind),
        })?;
        let timestamp = parse_time(&row.cp_id, Some(row.timestamp))?.unwrap_or_default();
        Ok(EventLogEntry {
            kind,
            cp_id: row.cp_id,
            message: row.message,
            timestamp,
        })
    }
}

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS charge_points (
        cp_id TEXT PRIMARY KEY,
        vendor TEXT NOT NULL,
        model TEXT NOT NULL,
        status TEXT NOT NULL,
        last_seen TEXT,
        busy INTEGER NOT NULL DEFAULT 0,
        last_heartbeat TEXT
    )",
    "CREATE TABLE IF NOT EXISTS event_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        cp_id TEXT NOT NULL,
        message TEXT NOT NULL,
        timestamp TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS event_log_timestamp ON event_log (timestamp)",
];

/// Station store persisted in SQLite
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database and create the schema
    pub async fn connect(config: &DatabaseConfig) -> BackendResult<Self> {
        info!("Opening station database: {}", config.url);

        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        // every connection to :memory: is its own database
        let max_connections = if config.is_in_memory() {
            1
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            config.max_connections.max(1)
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        if config.reset_on_start {
            store.reset().await?;
        }
        Ok(store)
    }

    /// Fresh private in-memory database
    pub async fn in_memory() -> BackendResult<Self> {
        Self::connect(&DatabaseConfig::in_memory()).await
    }

    pub async fn migrate(&self) -> BackendResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Delete every station and event
    pub async fn reset(&self) -> BackendResult<()> {
        info!("Clearing station database");
        sqlx::query("DELETE FROM event_log")
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM charge_points")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn log<'e, E>(executor: E, entry: &EventLogEntry) -> BackendResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        sqlx::query("INSERT INTO event_log (kind, cp_id, message, timestamp) VALUES (?, ?, ?, ?)")
            .bind(entry.kind.as_str())
            .bind(&entry.cp_id)
            .bind(&entry.message)
            .bind(db_time(entry.timestamp))
            .execute(executor)
            .await?;
        Ok(())
    }

    async fn fetch_station<'e, E>(executor: E, cp_id: &str) -> BackendResult<Option<StationRecord>>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let row: Option<StationRow> = sqlx::query_as(
            "SELECT cp_id, vendor, model, status, last_seen, busy, last_heartbeat
             FROM charge_points WHERE cp_id = ?",
        )
        .bind(cp_id)
        .fetch_optional(executor)
        .await?;
        row.map(StationRecord::try_from).transpose()
    }
}

#[async_trait]
impl StationStore for SqliteStore {
    async fn record_boot(
        &self,
        cp_id: &str,
        vendor: &str,
        model: &str,
        now: DateTime<Utc>,
    ) -> BackendResult<StationRecord> {
        let record = StationRecord::booted(cp_id, vendor, model, now);
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO charge_points (cp_id, vendor, model, status, last_seen, busy, last_heartbeat)
             VALUES (?, ?, ?, ?, ?, 0, NULL)
             ON CONFLICT(cp_id) DO UPDATE SET
                vendor = excluded.vendor,
                model = excluded.model,
                status = excluded.status,
                last_seen = excluded.last_seen,
                busy = 0,
                last_heartbeat = NULL",
        )
        .bind(cp_id)
        .bind(vendor)
        .bind(model)
        .bind(record.status.as_str())
        .bind(db_time(now))
        .execute(&mut *tx)
        .await?;
        Self::log(&mut *tx, &EventLogEntry::boot(cp_id, vendor, model, now)).await?;
        tx.commit().await?;
        Ok(record)
    }

    async fn record_heartbeat(&self, cp_id: &str, now: DateTime<Utc>) -> BackendResult<bool> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE charge_points SET last_heartbeat = ?, last_seen = ? WHERE cp_id = ?",
        )
        .bind(db_time(now))
        .bind(db_time(now))
        .bind(cp_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        Self::log(&mut *tx, &EventLogEntry::heartbeat(cp_id, now)).await?;
        tx.commit().await?;
        Ok(updated > 0)
    }

    async fn record_status(
        &self,
        cp_id: &str,
        status: StationStatus,
        now: DateTime<Utc>,
    ) -> BackendResult<StationRecord> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO charge_points (cp_id, vendor, model, status, last_seen, busy, last_heartbeat)
             VALUES (?, ?, ?, ?, ?, ?, NULL)
             ON CONFLICT(cp_id) DO UPDATE SET
                status = excluded.status,
                busy = excluded.busy,
                last_seen = excluded.last_seen",
        )
        .bind(cp_id)
        .bind(UNKNOWN)
        .bind(UNKNOWN)
        .bind(status.as_str())
        .bind(db_time(now))
        .bind(status.is_busy())
        .execute(&mut *tx)
        .await?;
        Self::log(&mut *tx, &EventLogEntry::status(cp_id, status, now)).await?;
        let record = Self::fetch_station(&mut *tx, cp_id).await?;
        tx.commit().await?;

        record.ok_or_else(|| BackendError::CorruptRecord {
            cp_id: cp_id.to_string(),
            message: "row missing after upsert".to_string(),
        })
    }

    async fn station(&self, cp_id: &str) -> BackendResult<Option<StationRecord>> {
        Self::fetch_station(&self.pool, cp_id).await
    }

    async fn station_ids(&self) -> BackendResult<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as("SELECT cp_id FROM charge_points ORDER BY cp_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn events(&self, limit: Option<usize>) -> BackendResult<Vec<EventLogEntry>> {
        // LIMIT -1 means no limit in SQLite
        let limit = limit.map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT kind, cp_id, message, timestamp FROM event_log
             ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EventLogEntry::try_from).collect()
    }

    async fn refresh_if_stale(
        &self,
        cp_id: &str,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> BackendResult<bool> {
        let cutoff = db_time(now - threshold);
        let mut tx = self.pool.begin().await?;
        let refreshed = sqlx::query(
            "UPDATE charge_points SET last_heartbeat = ?
             WHERE cp_id = ? AND busy = 0
               AND (last_heartbeat IS NULL OR last_heartbeat <= ?)",
        )
        .bind(db_time(now))
        .bind(cp_id)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if refreshed {
            Self::log(&mut *tx, &EventLogEntry::heartbeat(cp_id, now)).await?;
            debug!("Synthesized heartbeat row for {}", cp_id);
        }
        tx.commit().await?;
        Ok(refreshed)
    }

    async fn insert_station(&self, record: StationRecord) -> BackendResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO charge_points
                (cp_id, vendor, model, status, last_seen, busy, last_heartbeat)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.cp_id)
        .bind(&record.vendor)
        .bind(&record.model)
        .bind(record.status.as_str())
        .bind(record.last_seen.map(db_time))
        .bind(record.busy)
        .bind(record.last_heartbeat.map(db_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_db_time_sorts_like_instants() {
        let early = db_time(at(9));
        let late = db_time(at(10));
        assert!(early < late);
        assert_eq!(early.len(), late.len());
        assert_eq!(parse_time("x", Some(late)).unwrap(), Some(at(10)));
    }

    #[tokio::test]
    async fn test_boot_status_heartbeat_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();

        store
            .record_boot("EVC_1", "MyVendor", "MyModel", at(0))
            .await
            .unwrap();
        let record = store
            .record_status("EVC_1", StationStatus::Charging, at(1))
            .await
            .unwrap();
        assert_eq!(record.vendor, "MyVendor");
        assert!(record.busy);
        assert_eq!(record.last_seen, Some(at(1)));

        assert!(store.record_heartbeat("EVC_1", at(2)).await.unwrap());
        assert!(!store.record_heartbeat("ghost", at(2)).await.unwrap());

        let record = store.station("EVC_1").await.unwrap().unwrap();
        assert_eq!(record.last_heartbeat, Some(at(2)));

        // boot again resets
        let record = store
            .record_boot("EVC_1", "MyVendor", "MyModel", at(3))
            .await
            .unwrap();
        assert_eq!(store.station("EVC_1").await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_status_for_unknown_station_creates_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        let record = store
            .record_status("EVC_9", StationStatus::SuspendedEV, at(0))
            .await
            .unwrap();
        assert_eq!(record.vendor, UNKNOWN);
        assert!(!record.busy);
        assert_eq!(store.station_ids().await.unwrap(), vec!["EVC_9"]);
    }

    #[tokio::test]
    async fn test_refresh_if_stale_is_conditional() {
        let store = SqliteStore::in_memory().await.unwrap();
        let threshold = Duration::seconds(60);

        store.record_boot("idle", "V", "M", at(0)).await.unwrap();
        store
            .insert_station(StationRecord {
                busy: true,
                status: StationStatus::Charging,
                last_heartbeat: Some(at(0)),
                ..StationRecord::booted("busy", "V", "M", at(0))
            })
            .await
            .unwrap();

        assert!(store.refresh_if_stale("idle", at(10), threshold).await.unwrap());
        assert!(!store.refresh_if_stale("idle", at(20), threshold).await.unwrap());
        assert!(store.refresh_if_stale("idle", at(70), threshold).await.unwrap());
        assert!(!store.refresh_if_stale("busy", at(1000), threshold).await.unwrap());

        let idle = store.station("idle").await.unwrap().unwrap();
        assert_eq!(idle.last_heartbeat, Some(at(70)));
        let busy = store.station("busy").await.unwrap().unwrap();
        assert_eq!(busy.last_heartbeat, Some(at(0)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_synthesizes_one_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteStore::connect(&DatabaseConfig {
                url: format!("sqlite://{}", dir.path().join("race.db").display()),
                max_connections: 4,
                reset_on_start: false,
            })
            .await
            .unwrap(),
        );
        store.record_boot("EVC_1", "V", "M", at(0)).await.unwrap();

        let now = at(120);
        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .refresh_if_stale("EVC_1", now, Duration::seconds(60))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut refreshed = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                refreshed += 1;
            }
        }
        assert_eq!(refreshed, 1);

        let heartbeats = store
            .events(None)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == EventKind::Heartbeat)
            .count();
        assert_eq!(heartbeats, 1);
        let record = store.station("EVC_1").await.unwrap().unwrap();
        assert_eq!(record.last_heartbeat, Some(now));
    }

    #[tokio::test]
    async fn test_events_newest_first_with_limit() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.record_boot("EVC_1", "V", "M", at(0)).await.unwrap();
        store.record_heartbeat("EVC_1", at(5)).await.unwrap();
        store
            .record_status("EVC_1", StationStatus::Available, at(2))
            .await
            .unwrap();

        let events = store.events(None).await.unwrap();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::Heartbeat,
                EventKind::StatusNotification,
                EventKind::BootNotification
            ]
        );
        assert_eq!(events[1].message, "Status: Available");
        assert_eq!(store.events(Some(2)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_database_reset_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("stations.db").display()),
            max_connections: 2,
            reset_on_start: false,
        };

        let store = SqliteStore::connect(&config).await.unwrap();
        store.record_boot("EVC_1", "V", "M", at(0)).await.unwrap();
        store.close().await;

        let store = SqliteStore::connect(&config).await.unwrap();
        assert_eq!(store.station_ids().await.unwrap(), vec!["EVC_1"]);
        store.close().await;

        let store = SqliteStore::connect(&DatabaseConfig {
            reset_on_start: true,
            ..config
        })
        .await
        .unwrap();
        assert!(store.station_ids().await.unwrap().is_empty());
    }
}
