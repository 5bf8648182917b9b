//! # FlowZo Core Library
//!
//! Core logic for FlowZo, a focus-session tool. A session walks a short
//! priming phase, a focus phase and a fixed cooldown, recording every step
//! as a structured event. The CLI binary is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Session Engine**: async state machine driven by tokio timers, with
//!   an ordered in-memory event log and preemptive abort
//! - **Ledger**: persistence contract for session records, events and flow
//!   contexts, with a SQLite implementation
//! - **Storage**: TOML-based configuration and data directory resolution
//! - **Integrations**: read-only lookups of the next assigned issue on
//!   GitHub and Linear
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: the session state machine
//! - [`Ledger`]: trait for persisting sessions
//! - [`SqliteLedger`]: on-disk ledger
//! - [`Config`]: application configuration management

pub mod error;
pub mod integrations;
pub mod ledger;
pub mod session;
pub mod storage;

pub use error::{ConfigError, CoreError, IntegrationError, LedgerError, SessionError};
pub use ledger::{EventRecord, FlowContext, Ledger, NullLedger, SessionRecord, SqliteLedger};
pub use session::{EventPayload, RunOutcome, SessionEngine, SessionEvent, SessionState, SessionStatus};
pub use storage::{data_dir, Config};
