//! Session engine implementation.
//!
//! The engine walks a run through its phases with cooperative tokio
//! sleeps, so a status-polling task can read it while a run is waiting.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Priming -> Active -> Cooldown -> Idle
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! let engine = SessionEngine::new(None);
//! let runner = engine.clone();
//! let run = tokio::spawn(async move {
//!     runner.run_session(Duration::from_secs(1500), Duration::from_secs(5)).await
//! });
//! // Meanwhile:
//! let status = engine.get_status();
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::event::{EventPayload, SessionEvent};
use super::state::SessionState;
use crate::error::{LedgerError, SessionError};
use crate::ledger::{FlowContext, Ledger, NullLedger, RECORD_ABORTED, RECORD_COMPLETED, RECORD_PRIMING};

/// Length of the cooldown phase. Not configurable.
pub const COOLDOWN_SECS: u64 = 3;

/// How a call to [`SessionEngine::run_session`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Completed,
    Aborted,
}

/// Point-in-time view of the engine for progress displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub state: SessionState,
    pub elapsed_seconds: f64,
    pub remaining_seconds: f64,
    pub total_duration: f64,
}

/// Focus session state machine.
///
/// Cloning is cheap and every clone observes the same session. The event
/// log is append-only for the lifetime of the engine.
#[derive(Clone)]
pub struct SessionEngine {
    shared: Arc<Shared>,
}

struct Shared {
    session_id: String,
    ledger: Arc<dyn Ledger>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    start_time: Option<DateTime<Utc>>,
    /// Monotonic twin of `start_time`, used for elapsed computations.
    started_at: Option<Instant>,
    duration: Duration,
    events: Vec<SessionEvent>,
    /// Cancelled by `abort_session` to wake the in-flight run.
    run_token: Option<CancellationToken>,
    /// The current run inserted its own ledger row and may close it.
    owns_record: bool,
}

impl Default for SessionEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("session_id", &self.shared.session_id)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionEngine {
    /// Engine without persistence. `session_id` defaults to
    /// `session_<unix seconds>`.
    pub fn new(session_id: Option<String>) -> Self {
        Self::with_ledger(session_id, Arc::new(NullLedger))
    }

    /// Engine that forwards records and events to `ledger`.
    pub fn with_ledger(session_id: Option<String>, ledger: Arc<dyn Ledger>) -> Self {
        let session_id =
            session_id.unwrap_or_else(|| format!("session_{}", Utc::now().timestamp()));
        Self {
            shared: Arc::new(Shared {
                session_id,
                ledger,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.shared.lock().start_time
    }

    pub fn event_count(&self) -> usize {
        self.shared.lock().events.len()
    }

    pub fn get_status(&self) -> SessionStatus {
        let inner = self.shared.lock();
        let elapsed = inner
            .started_at
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let total = inner.duration.as_secs_f64();
        let remaining = if inner.duration.is_zero() {
            0.0
        } else {
            (total - elapsed).max(0.0)
        };
        SessionStatus {
            session_id: self.shared.session_id.clone(),
            state: inner.state,
            elapsed_seconds: elapsed,
            remaining_seconds: remaining,
            total_duration: total,
        }
    }

    /// Snapshot of the full event log in emission order.
    pub fn export_events(&self) -> Vec<SessionEvent> {
        self.shared.lock().events.clone()
    }

    /// The event log as a pretty-printed JSON array.
    pub fn export_events_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.export_events())
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Run priming, focus and cooldown back to back.
    ///
    /// Returns [`RunOutcome::Aborted`] if [`abort_session`](Self::abort_session)
    /// is called while the run is waiting; no further events are emitted
    /// for that run.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] if the engine is not idle.
    pub async fn run_session(
        &self,
        duration: Duration,
        priming_duration: Duration,
    ) -> Result<RunOutcome, SessionError> {
        let token = self.shared.begin_run(duration, priming_duration)?;
        tracing::info!(
            session_id = %self.shared.session_id,
            duration_secs = duration.as_secs_f64(),
            priming_secs = priming_duration.as_secs_f64(),
            "session started"
        );

        if !suspend(&token, priming_duration).await
            || !self.shared.enter_phase(
                &token,
                EventPayload::FocusPhaseStarted {
                    remaining_seconds: duration.as_secs_f64(),
                },
            )
        {
            return Ok(RunOutcome::Aborted);
        }

        if !suspend(&token, duration).await
            || !self.shared.enter_phase(
                &token,
                EventPayload::CooldownStarted {
                    cooldown_duration: COOLDOWN_SECS,
                },
            )
        {
            return Ok(RunOutcome::Aborted);
        }

        if !suspend(&token, Duration::from_secs(COOLDOWN_SECS)).await
            || !self.shared.complete_run(&token)
        {
            return Ok(RunOutcome::Aborted);
        }

        tracing::info!(session_id = %self.shared.session_id, "session completed");
        Ok(RunOutcome::Completed)
    }

    /// Record an abort and return to `Idle`, waking the in-flight run.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] if the engine is already idle.
    pub fn abort_session(&self) -> Result<SessionEvent, SessionError> {
        let mut inner = self.shared.lock();
        if inner.state == SessionState::Idle {
            return Err(SessionError::InvalidState {
                state: inner.state,
                reason: "no active session to abort",
            });
        }

        let from = inner.state;
        let event = self.shared.emit(
            &mut inner,
            EventPayload::SessionAborted {
                aborted_from_state: from,
            },
        );
        inner.state = SessionState::Idle;

        if let Some(token) = inner.run_token.take() {
            token.cancel();
            if std::mem::take(&mut inner.owns_record) {
                self.shared.close_record(RECORD_ABORTED);
            }
        }
        tracing::info!(session_id = %self.shared.session_id, from = %from, "session aborted");
        Ok(event)
    }

    /// Attach an auxiliary context blob to this session in the ledger.
    pub fn capture_context(
        &self,
        context_type: &str,
        data: &Value,
    ) -> Result<FlowContext, LedgerError> {
        self.shared
            .ledger
            .log_flow_context(&self.shared.session_id, context_type, epoch_secs(), data)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_run(
        &self,
        duration: Duration,
        priming_duration: Duration,
    ) -> Result<CancellationToken, SessionError> {
        let mut inner = self.lock();
        if inner.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                state: inner.state,
                reason: "cannot start session from non-idle state",
            });
        }

        let start_time = Utc::now();
        inner.start_time = Some(start_time);
        inner.started_at = Some(Instant::now());
        inner.duration = duration;
        let token = CancellationToken::new();
        inner.run_token = Some(token.clone());

        inner.owns_record = match self.ledger.create_session_record(
            &self.session_id,
            start_time,
            duration.as_secs() as i64,
            RECORD_PRIMING,
        ) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "ledger: session record not created");
                false
            }
        };

        self.transition(&mut inner, SessionState::Priming);
        self.emit(
            &mut inner,
            EventPayload::SessionStarted {
                duration: duration.as_secs_f64(),
                priming_duration: priming_duration.as_secs_f64(),
            },
        );
        Ok(token)
    }

    /// Advance to the next phase and emit its milestone. Returns false if
    /// the run was aborted in the meantime.
    fn enter_phase(&self, token: &CancellationToken, payload: EventPayload) -> bool {
        let mut inner = self.lock();
        if token.is_cancelled() {
            return false;
        }
        let to = inner.state.next();
        self.transition(&mut inner, to);
        self.emit(&mut inner, payload);
        true
    }

    fn complete_run(&self, token: &CancellationToken) -> bool {
        let mut inner = self.lock();
        if token.is_cancelled() {
            return false;
        }
        let total = inner
            .started_at
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let to = inner.state.next();
        self.transition(&mut inner, to);
        self.emit(
            &mut inner,
            EventPayload::SessionCompleted {
                total_duration: total,
            },
        );
        inner.run_token = None;
        if std::mem::take(&mut inner.owns_record) {
            self.close_record(RECORD_COMPLETED);
        }
        true
    }

    fn close_record(&self, state: &str) {
        match self
            .ledger
            .update_session_record(&self.session_id, Some(Utc::now()), Some(state))
        {
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "ledger: session record not updated");
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: SessionState) -> SessionEvent {
        let from = inner.state;
        inner.state = to;
        self.emit(
            inner,
            EventPayload::StateTransition {
                from_state: from,
                to_state: to,
            },
        )
    }

    /// Append to the in-memory log, then forward to the ledger. The
    /// in-memory log is authoritative; ledger failures are only logged.
    fn emit(&self, inner: &mut Inner, payload: EventPayload) -> SessionEvent {
        let event = SessionEvent::new(epoch_secs(), &self.session_id, inner.state, &payload);
        inner.events.push(event.clone());
        tracing::debug!(
            session_id = %self.session_id,
            event_type = %event.event_type,
            state = %event.state,
            "event emitted"
        );

        if let Err(e) = self.ledger.log_session_event(
            &self.session_id,
            event.timestamp,
            &event.event_type,
            event.state,
            &event.data,
        ) {
            tracing::warn!(
                session_id = %self.session_id,
                event_type = %event.event_type,
                error = %e,
                "ledger: event not persisted"
            );
        }
        event
    }
}

/// Sleep for `wait` unless the run is aborted first. Returns true if the
/// full wait elapsed.
async fn suspend(token: &CancellationToken, wait: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

fn epoch_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
