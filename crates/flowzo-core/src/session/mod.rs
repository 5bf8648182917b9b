mod engine;
mod event;
mod state;

pub use engine::{RunOutcome, SessionEngine, SessionStatus, COOLDOWN_SECS};
pub use event::{EventPayload, SessionEvent};
pub use state::SessionState;
