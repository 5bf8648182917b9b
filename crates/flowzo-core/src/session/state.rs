use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of a focus session.
///
/// The only legal cycle is `Idle -> Priming -> Active -> Cooldown -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Priming,
    Active,
    Cooldown,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Priming => "priming",
            SessionState::Active => "active",
            SessionState::Cooldown => "cooldown",
        }
    }

    /// The state a completed phase hands over to.
    pub fn next(self) -> SessionState {
        match self {
            SessionState::Idle => SessionState::Priming,
            SessionState::Priming => SessionState::Active,
            SessionState::Active => SessionState::Cooldown,
            SessionState::Cooldown => SessionState::Idle,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
