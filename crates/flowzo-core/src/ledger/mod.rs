//! Durable sink for session records, events and flow context.
//!
//! The engine only talks to the [`Ledger`] trait. [`NullLedger`] is the
//! default wiring when nothing should be persisted; [`SqliteLedger`] is the
//! on-disk implementation.

mod migrations;
mod sqlite;

pub use sqlite::SqliteLedger;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LedgerError;
use crate::session::SessionState;

/// Lifecycle label written when a run starts.
pub const RECORD_PRIMING: &str = "priming";
/// Lifecycle label written when a run finishes all phases.
pub const RECORD_COMPLETED: &str = "completed";
/// Lifecycle label written when a run is aborted.
pub const RECORD_ABORTED: &str = "aborted";

/// One row per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted session event. `data` is kept as the raw JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub session_id: String,
    pub timestamp: f64,
    pub event_type: String,
    pub state: String,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn data_value(&self) -> Result<Value, LedgerError> {
        Ok(serde_json::from_str(&self.data)?)
    }
}

/// Auxiliary timestamped blob captured during a session
/// (keystrokes, IDE state, window focus, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowContext {
    pub id: i64,
    pub session_id: String,
    pub context_type: String,
    pub timestamp: f64,
    pub data: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence contract consumed by the session engine.
///
/// Each call is its own unit of work; callers never span transactions
/// across calls.
pub trait Ledger: Send + Sync {
    /// Insert a new session row. Fails with
    /// [`LedgerError::DuplicateSession`] if `session_id` already exists.
    fn create_session_record(
        &self,
        session_id: &str,
        start_time: DateTime<Utc>,
        duration_seconds: i64,
        state: &str,
    ) -> Result<SessionRecord, LedgerError>;

    /// Partial update. Returns `None` if the session is unknown.
    fn update_session_record(
        &self,
        session_id: &str,
        end_time: Option<DateTime<Utc>>,
        state: Option<&str>,
    ) -> Result<Option<SessionRecord>, LedgerError>;

    fn log_session_event(
        &self,
        session_id: &str,
        timestamp: f64,
        event_type: &str,
        state: SessionState,
        data: &Map<String, Value>,
    ) -> Result<EventRecord, LedgerError>;

    fn log_flow_context(
        &self,
        session_id: &str,
        context_type: &str,
        timestamp: f64,
        data: &Value,
    ) -> Result<FlowContext, LedgerError>;

    /// All events of a session in insertion order.
    fn get_session_events(&self, session_id: &str) -> Result<Vec<EventRecord>, LedgerError>;

    /// All context blobs of a session in insertion order.
    fn get_flow_contexts(&self, session_id: &str) -> Result<Vec<FlowContext>, LedgerError>;

    /// Most recently created sessions, newest first.
    fn get_recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>, LedgerError>;

    fn get_session_record(&self, session_id: &str) -> Result<Option<SessionRecord>, LedgerError>;
}

/// Ledger that stores nothing. Writes succeed and return unsaved
/// records; reads are always empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLedger;

impl Ledger for NullLedger {
    fn create_session_record(
        &self,
        session_id: &str,
        start_time: DateTime<Utc>,
        duration_seconds: i64,
        state: &str,
    ) -> Result<SessionRecord, LedgerError> {
        let now = Utc::now();
        Ok(SessionRecord {
            id: 0,
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
        _session_id: &str,
        _end_time: Option<DateTime<Utc>>,
        _state: Option<&str>,
    ) -> Result<Option<SessionRecord>, LedgerError> {
        Ok(None)
    }

    fn log_session_event(
        &self,
        session_id: &str,
        timestamp: f64,
        event_type: &str,
        state: SessionState,
        data: &Map<String, Value>,
    ) -> Result<EventRecord, LedgerError> {
        Ok(EventRecord {
            id: 0,
            session_id: session_id.to_string(),
            timestamp,
            event_type: event_type.to_string(),
            state: state.to_string(),
            data: serde_json::to_string(data)?,
            created_at: Utc::now(),
        })
    }

    fn log_flow_context(
        &self,
        session_id: &str,
        context_type: &str,
        timestamp: f64,
        data: &Value,
    ) -> Result<FlowContext, LedgerError> {
        Ok(FlowContext {
            id: 0,
            session_id: session_id.to_string(),
            context_type: context_type.to_string(),
            timestamp,
            data: serde_json::to_string(data)?,
            created_at: Utc::now(),
        })
    }

    fn get_session_events(&self, _session_id: &str) -> Result<Vec<EventRecord>, LedgerError> {
        Ok(Vec::new())
    }

    fn get_flow_contexts(&self, _session_id: &str) -> Result<Vec<FlowContext>, LedgerError> {
        Ok(Vec::new())
    }

    fn get_recent_sessions(&self, _limit: usize) -> Result<Vec<SessionRecord>, LedgerError> {
        Ok(Vec::new())
    }

    fn get_session_record(&self, _session_id: &str) -> Result<Option<SessionRecord>, LedgerError> {
        Ok(None)
    }
}
