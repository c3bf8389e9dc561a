//! SQLite-backed local state.
//!
//! Provides persistent storage for:
//! - The persisted session, one revision-counted row
//! - Small host values such as the last-seen instant (key-value store)
//! - Recorded incidents, one per session and escalation cycle
//! - Durable alarms, one row per slot

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::data_dir;
use crate::clock::Timestamp;
use crate::collaborators::{AlarmPayload, AlarmSlot, DurableAlarm, Incident, IncidentStore};
use crate::error::{CollaboratorError, CoreError, DatabaseError};
use crate::switch::Session;

const SESSION_KEY: &str = "session";
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRow {
    pub id: i64,
    pub session_id: String,
    pub cycle: u64,
    pub at: DateTime<Utc>,
}

/// SQLite database for local state.
///
/// Cloning shares the connection, so one handle can back the incident store,
/// the durable alarm and the session key-value store at the same time.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database at `<data_dir>/deadswitch.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("deadswitch.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        // Several CLI processes may share the file.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and throwaway runs).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session (
                id        INTEGER PRIMARY KEY CHECK (id = 1),
                revision  INTEGER NOT NULL,
                body      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS incidents (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL,
                cycle       INTEGER NOT NULL,
                at          TEXT NOT NULL,
                UNIQUE(session_id, cycle)
            );

            CREATE TABLE IF NOT EXISTS alarms (
                slot     TEXT PRIMARY KEY,
                fire_at  TEXT NOT NULL,
                payload  TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_incidents_at ON incidents(at);",
        )?;
        Ok(())
    }

    // ── Key-value store ──────────────────────────────────────────────

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // ── Session ──────────────────────────────────────────────────────

    /// The persisted session, if any, carrying its stored revision.
    ///
    /// # Errors
    /// Returns `DatabaseError::Corrupt` if the stored JSON cannot be decoded.
    pub fn load_session(&self) -> Result<Option<Session>, DatabaseError> {
        let row: Option<(u64, String)> = self
            .conn()
            .query_row("SELECT revision, body FROM session WHERE id = 1", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let Some((revision, json)) = row else {
            return Ok(None);
        };
        let mut session: Session =
            serde_json::from_str(&json).map_err(|e| DatabaseError::Corrupt {
                key: SESSION_KEY.into(),
                message: e.to_string(),
            })?;
        session.revision = revision;
        Ok(Some(session))
    }

    /// Revision of the stored session; 0 when none was ever saved.
    pub fn session_revision(&self) -> Result<u64, DatabaseError> {
        let revision = self
            .conn()
            .query_row("SELECT revision FROM session WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(revision.unwrap_or(0))
    }

    /// Compare-and-swap save. Writes only if the stored revision still
    /// equals `session.revision()`, and returns the new revision.
    ///
    /// # Errors
    /// Returns `DatabaseError::Conflict` when another writer got there first.
    pub fn save_session(&self, session: &Session) -> Result<u64, DatabaseError> {
        let json = serde_json::to_string(session).map_err(|e| DatabaseError::Corrupt {
            key: SESSION_KEY.into(),
            message: e.to_string(),
        })?;

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let found: u64 = tx
            .query_row("SELECT revision FROM session WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(0);
        let expected = session.revision();
        if found != expected {
            return Err(DatabaseError::Conflict { expected, found });
        }
        let next = expected + 1;
        tx.execute(
            "INSERT OR REPLACE INTO session (id, revision, body) VALUES (1, ?1, ?2)",
            params![next, json],
        )?;
        tx.commit()?;
        debug!(revision = next, "session saved");
        Ok(next)
    }

    // ── Incidents ────────────────────────────────────────────────────

    /// Insert unless the (session, cycle) pair already exists.
    /// Returns whether a new row was written.
    pub fn insert_incident(&self, incident: &Incident) -> Result<bool, DatabaseError> {
        let changed = self.conn().execute(
            "INSERT OR IGNORE INTO incidents (session_id, cycle, at) VALUES (?1, ?2, ?3)",
            params![
                incident.session_id.to_string(),
                incident.cycle,
                incident.at.to_rfc3339(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Most recent first.
    pub fn incidents(&self, limit: usize) -> Result<Vec<IncidentRow>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, cycle, at FROM incidents ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let at: String = row.get(3)?;
            Ok(IncidentRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                cycle: row.get(2)?,
                at: DateTime::parse_from_rfc3339(&at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn incident_count(&self, session_id: Uuid) -> Result<u64, DatabaseError> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM incidents WHERE session_id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Durable alarms ───────────────────────────────────────────────

    /// Every scheduled alarm, earliest first.
    pub fn scheduled_alarms(&self) -> Result<Vec<(AlarmSlot, Timestamp, AlarmPayload)>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT slot, fire_at, payload FROM alarms")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut alarms = Vec::new();
        for row in rows {
            let (slot, fire_at, payload) = row?;
            let corrupt = |message: String| DatabaseError::Corrupt {
                key: format!("alarm:{slot}"),
                message,
            };
            let parsed_slot =
                AlarmSlot::from_id(&slot).ok_or_else(|| corrupt("unknown slot".into()))?;
            let fire_at = DateTime::parse_from_rfc3339(&fire_at)
                .map_err(|e| corrupt(e.to_string()))?
                .with_timezone(&Utc);
            let payload: AlarmPayload =
                serde_json::from_str(&payload).map_err(|e| corrupt(e.to_string()))?;
            alarms.push((parsed_slot, fire_at, payload));
        }
        alarms.sort_by_key(|(_, fire_at, _)| *fire_at);
        Ok(alarms)
    }

    /// Remove and return alarms whose fire time has passed.
    pub fn due_alarms(&self, now: Timestamp) -> Result<Vec<AlarmPayload>, DatabaseError> {
        let due: Vec<_> = self
            .scheduled_alarms()?
            .into_iter()
            .filter(|(_, fire_at, _)| *fire_at <= now)
            .collect();
        for (slot, _, _) in &due {
            self.delete_alarm(*slot)?;
        }
        Ok(due.into_iter().map(|(_, _, payload)| payload).collect())
    }

    fn delete_alarm(&self, slot: AlarmSlot) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM alarms WHERE slot = ?1", params![slot.id()])?;
        Ok(())
    }
}

impl IncidentStore for Database {
    fn claim(&self, incident: &Incident) -> Result<bool, CollaboratorError> {
        Ok(self.insert_incident(incident)?)
    }

    fn record_incident(&self, incident: &Incident) -> Result<(), CollaboratorError> {
        let inserted = self.insert_incident(incident)?;
        if !inserted {
            debug!(cycle = incident.cycle, "incident already recorded");
        }
        Ok(())
    }
}

impl DurableAlarm for Database {
    fn schedule(
        &self,
        slot: AlarmSlot,
        fire_at: Timestamp,
        payload: &AlarmPayload,
    ) -> Result<(), CollaboratorError> {
        let payload = serde_json::to_string(payload)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        self.conn().execute(
            "INSERT OR REPLACE INTO alarms (slot, fire_at, payload) VALUES (?1, ?2, ?3)",
            params![slot.id(), fire_at.to_rfc3339(), payload],
        )?;
        Ok(())
    }

    fn cancel(&self, slot: AlarmSlot) -> Result<(), CollaboratorError> {
        Ok(self.delete_alarm(slot)?)
    }
}
