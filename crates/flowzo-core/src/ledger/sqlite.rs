//! SQLite-backed ledger.
//!
//! Timestamps are stored as fixed-width RFC 3339 text so that lexical
//! order matches chronological order.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};

use super::{migrations, EventRecord, FlowContext, Ledger, SessionRecord};
use crate::error::{LedgerError, Result};
use crate::session::SessionState;
use crate::storage::Config;

const SESSION_COLUMNS: &str =
    "id, session_id, start_time, end_time, duration_seconds, state, created_at, updated_at";

/// SQLite ledger. One connection, serialized behind a mutex.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteLedger {
    /// Open the ledger the config points at, `None` when persistence is
    /// disabled. An empty `ledger.path` means `<data_dir>/ledger.db`.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created or the
    /// database cannot be opened or migrated.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        match config.ledger_path()? {
            Some(path) => Ok(Some(Self::open(path)?)),
            None => Ok(None),
        }
    }

    /// Open (or create) the ledger at `path`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| LedgerError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        migrations::migrate(&conn)?;
        tracing::debug!(path = %path.display(), "opened ledger");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path),
        })
    }

    /// Open an in-memory ledger.
    pub fn open_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        migrations::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// File backing this ledger, `None` for in-memory ledgers.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    fn find_session(
        conn: &Connection,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, LedgerError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE session_id = ?1");
        let raw = conn
            .query_row(&sql, params![session_id], RawSession::from_row)
            .optional()?;
        raw.map(RawSession::into_record).transpose()
    }
}

impl Ledger for SqliteLedger {
    fn create_session_record(
        &self,
        session_id: &str,
        start_time: DateTime<Utc>,
        duration_seconds: i64,
        state: &str,
    ) -> Result<SessionRecord, LedgerError> {
        let conn = self.conn()?;
        let now = stored_now();
        let inserted = conn.execute(
            "INSERT INTO sessions (session_id, start_time, end_time, duration_seconds, state, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?5)",
            params![
                session_id,
                format_ts(start_time),
                duration_seconds,
                state,
                format_ts(now),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(LedgerError::DuplicateSession(session_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(SessionRecord {
            id: conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            start_time,
            end_time: None,
            duration_seconds,
            state: state.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    fn update_session_record(
        &self,
        session_id: &str,
        end_time: Option<DateTime<Utc>>,
        state: Option<&str>,
    ) -> Result<Option<SessionRecord>, LedgerError> {
        let conn = self.conn()?;
        let Some(mut record) = Self::find_session(&conn, session_id)? else {
            return Ok(None);
        };

        if let Some(end) = end_time {
            record.end_time = Some(end);
        }
        if let Some(state) = state {
            record.state = state.to_string();
        }
        record.updated_at = stored_now();

        conn.execute(
            "UPDATE sessions SET end_time = ?1, state = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                record.end_time.map(format_ts),
                record.state,
                format_ts(record.updated_at),
                record.id,
            ],
        )?;
        Ok(Some(record))
    }

    fn log_session_event(
        &self,
        session_id: &str,
        timestamp: f64,
        event_type: &str,
        state: SessionState,
        data: &Map<String, Value>,
    ) -> Result<EventRecord, LedgerError> {
        let data = serde_json::to_string(data)?;
        let created_at = stored_now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO session_events (session_id, timestamp, event_type, state, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session_id,
                timestamp,
                event_type,
                state.as_str(),
                data,
                format_ts(created_at),
            ],
        )?;
        Ok(EventRecord {
            id: conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            timestamp,
            event_type: event_type.to_string(),
            state: state.to_string(),
            data,
            created_at,
        })
    }

    fn log_flow_context(
        &self,
        session_id: &str,
        context_type: &str,
        timestamp: f64,
        data: &Value,
    ) -> Result<FlowContext, LedgerError> {
        let data = serde_json::to_string(data)?;
        let created_at = stored_now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO flow_contexts (session_id, context_type, timestamp, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                context_type,
                timestamp,
                data,
                format_ts(created_at)
            ],
        )?;
        Ok(FlowContext {
            id: conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            context_type: context_type.to_string(),
            timestamp,
            data,
            created_at,
        })
    }

    fn get_session_events(&self, session_id: &str) -> Result<Vec<EventRecord>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, timestamp, event_type, state, data, created_at
             FROM session_events
             WHERE session_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, session_id, timestamp, event_type, state, data, created_at) = row?;
            events.push(EventRecord {
                id,
                session_id,
                timestamp,
                event_type,
                state,
                data,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(events)
    }

    fn get_flow_contexts(&self, session_id: &str) -> Result<Vec<FlowContext>, LedgerError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, context_type, timestamp, data, created_at
             FROM flow_contexts
             WHERE session_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut contexts = Vec::new();
        for row in rows {
            let (id, session_id, context_type, timestamp, data, created_at) = row?;
            contexts.push(FlowContext {
                id,
                session_id,
                context_type,
                timestamp,
                data,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(contexts)
    }

    fn get_recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, LedgerError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC, id DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], RawSession::from_row)?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_record()?);
        }
        Ok(sessions)
    }

    fn get_session_record(&self, session_id: &str) -> Result<Option<SessionRecord>, LedgerError> {
        let conn = self.conn()?;
        Self::find_session(&conn, session_id)
    }
}

/// Session row as read from SQLite, before timestamp parsing.
struct RawSession {
    id: i64,
    session_id: String,
    start_time: String,
    end_time: Option<String>,
    duration_seconds: i64,
    state: String,
    created_at: String,
    updated_at: String,
}

impl RawSession {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            duration_seconds: row.get(4)?,
            state: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<SessionRecord, LedgerError> {
        Ok(SessionRecord {
            id: self.id,
            session_id: self.session_id,
            start_time: parse_ts(&self.start_time)?,
            end_time: self.end_time.as_deref().map(parse_ts).transpose()?,
            duration_seconds: self.duration_seconds,
            state: self.state,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

/// Current time at the precision the ledger stores.
fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| LedgerError::Timestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{RECORD_COMPLETED, RECORD_PRIMING};
    use serde_json::json;

    #[test]
    fn create_and_get_record() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let start = Utc::now();
        let record = ledger
            .create_session_record("s1", start, 1500, "active")
            .unwrap();
        assert_eq!(record.session_id, "s1");
        assert_eq!(record.duration_seconds, 1500);
        assert_eq!(record.state, "active");
        assert!(record.end_time.is_none());

        let fetched = ledger.get_session_record("s1").unwrap().unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(format_ts(fetched.start_time), format_ts(start));
    }

    #[test]
    fn duplicate_create_keeps_original_row() {
        let ledger = SqliteLedger::open_memory().unwrap();
        ledger
            .create_session_record("dup", Utc::now(), 60, RECORD_PRIMING)
            .unwrap();
        let err = ledger
            .create_session_record("dup", Utc::now(), 999, "active")
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateSession(ref id) if id == "dup"));

        let kept = ledger.get_session_record("dup").unwrap().unwrap();
        assert_eq!(kept.duration_seconds, 60);
        assert_eq!(kept.state, RECORD_PRIMING);
    }

    #[test]
    fn update_sets_end_time_and_state() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let created = ledger
            .create_session_record("s1", Utc::now(), 60, RECORD_PRIMING)
            .unwrap();
        let end = Utc::now();
        let updated = ledger
            .update_session_record("s1", Some(end), Some(RECORD_COMPLETED))
            .unwrap()
            .unwrap();
        assert_eq!(updated.state, RECORD_COMPLETED);
        assert!(updated.updated_at >= created.updated_at);

        let fetched = ledger.get_session_record("s1").unwrap().unwrap();
        assert_eq!(fetched.state, RECORD_COMPLETED);
        assert!(fetched.end_time.is_some());
    }

    #[test]
    fn update_without_fields_keeps_values() {
        let ledger = SqliteLedger::open_memory().unwrap();
        ledger
            .create_session_record("s1", Utc::now(), 60, RECORD_PRIMING)
            .unwrap();
        let updated = ledger.update_session_record("s1", None, None).unwrap().unwrap();
        assert_eq!(updated.state, RECORD_PRIMING);
        assert!(updated.end_time.is_none());
    }

    #[test]
    fn update_unknown_session_is_none() {
        let ledger = SqliteLedger::open_memory().unwrap();
        assert!(ledger
            .update_session_record("missing", Some(Utc::now()), Some(RECORD_COMPLETED))
            .unwrap()
            .is_none());
    }

    #[test]
    fn events_come_back_in_insertion_order() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let mut data = Map::new();
        data.insert("duration".into(), json!(1500));
        ledger
            .log_session_event("s1", 1_234_567_890.0, "session_started", SessionState::Priming, &data)
            .unwrap();
        let mut data = Map::new();
        data.insert("from_state".into(), json!("priming"));
        data.insert("to_state".into(), json!("active"));
        ledger
            .log_session_event("s1", 1_234_567_890.0, "state_transition", SessionState::Active, &data)
            .unwrap();
        ledger
            .log_session_event("other", 1.0, "session_started", SessionState::Priming, &Map::new())
            .unwrap();

        let events = ledger.get_session_events("s1").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "session_started");
        assert_eq!(events[0].state, "priming");
        assert_eq!(events[1].event_type, "state_transition");
        assert_eq!(events[1].data_value().unwrap()["to_state"], "active");
    }

    #[test]
    fn flow_context_round_trips() {
        let ledger = SqliteLedger::open_memory().unwrap();
        let context = ledger
            .log_flow_context(
                "s1",
                "keystroke",
                1_234_567_890.0,
                &json!({"key": "ctrl+s", "file": "main.rs"}),
            )
            .unwrap();
        assert_eq!(context.context_type, "keystroke");
        assert!(context.data.contains("\"key\":\"ctrl+s\""));

        let stored = ledger.get_flow_contexts("s1").unwrap();
        assert_eq!(stored, vec![context]);
    }

    #[test]
    fn recent_sessions_newest_first() {
        let ledger = SqliteLedger::open_memory().unwrap();
        for i in 0..5 {
            ledger
                .create_session_record(&format!("session_{i}"), Utc::now(), 1500, "idle")
                .unwrap();
        }
        let recent = ledger.get_recent_sessions(3).unwrap();
        let ids: Vec<_> = recent.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["session_4", "session_3", "session_2"]);
    }

    #[test]
    fn from_config_honors_path_and_enabled() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.db");
        let mut config = Config::default();
        config.ledger.path = path.to_string_lossy().into_owned();

        let ledger = SqliteLedger::from_config(&config).unwrap().unwrap();
        assert_eq!(ledger.path(), Some(path.as_path()));
        assert!(path.exists());

        config.ledger.enabled = false;
        assert!(SqliteLedger::from_config(&config).unwrap().is_none());
        assert!(SqliteLedger::open_memory().unwrap().path().is_none());
    }
}
