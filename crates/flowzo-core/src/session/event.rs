//! Session events.
//!
//! Every state change and run milestone produces a [`SessionEvent`]. The
//! export form keeps `event_type` as a free string and `data` as a JSON
//! object so existing consumers of the event stream keep working; use
//! [`SessionEvent::payload`] for a typed view of the known tags.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::state::SessionState;

/// One entry of the engine's append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Seconds since the Unix epoch at emission time.
    pub timestamp: f64,
    pub session_id: String,
    /// State of the engine when the event was emitted.
    pub state: SessionState,
    pub event_type: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl SessionEvent {
    pub fn new(
        timestamp: f64,
        session_id: impl Into<String>,
        state: SessionState,
        payload: &EventPayload,
    ) -> Self {
        Self {
            timestamp,
            session_id: session_id.into(),
            state,
            event_type: payload.event_type().to_string(),
            data: payload.to_data(),
        }
    }

    /// Typed view of this event, `None` for tags this build does not know.
    pub fn payload(&self) -> Option<EventPayload> {
        serde_json::from_value(json!({
            "event_type": self.event_type,
            "data": self.data,
        }))
        .ok()
    }
}

/// Known event tags and their data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    StateTransition {
        from_state: SessionState,
        to_state: SessionState,
    },
    SessionStarted {
        duration: f64,
        priming_duration: f64,
    },
    FocusPhaseStarted {
        remaining_seconds: f64,
    },
    CooldownStarted {
        cooldown_duration: u64,
    },
    SessionCompleted {
        total_duration: f64,
    },
    SessionAborted {
        aborted_from_state: SessionState,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::StateTransition { .. } => "state_transition",
            EventPayload::SessionStarted { .. } => "session_started",
            EventPayload::FocusPhaseStarted { .. } => "focus_phase_started",
            EventPayload::CooldownStarted { .. } => "cooldown_started",
            EventPayload::SessionCompleted { .. } => "session_completed",
            EventPayload::SessionAborted { .. } => "session_aborted",
        }
    }

    pub fn to_data(&self) -> Map<String, Value> {
        let value = match self {
            EventPayload::StateTransition {
                from_state,
                to_state,
            } => json!({ "from_state": from_state, "to_state": to_state }),
            EventPayload::SessionStarted {
                duration,
                priming_duration,
            } => json!({ "duration": duration, "priming_duration": priming_duration }),
            EventPayload::FocusPhaseStarted { remaining_seconds } => {
                json!({ "remaining_seconds": remaining_seconds })
            }
            EventPayload::CooldownStarted { cooldown_duration } => {
                json!({ "cooldown_duration": cooldown_duration })
            }
            EventPayload::SessionCompleted { total_duration } => {
                json!({ "total_duration": total_duration })
            }
            EventPayload::SessionAborted { aborted_from_state } => {
                json!({ "aborted_from_state": aborted_from_state })
            }
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }
}
