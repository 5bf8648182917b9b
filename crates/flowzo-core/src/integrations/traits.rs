use serde::{Deserialize, Serialize};

use crate::error::IntegrationError;

/// Every issue tracker client implements this trait.
/// Credentials live in the OS keyring, looked up by `credential_key()`.
pub trait Integration: Send + Sync {
    /// Unique identifier (e.g. "github", "linear").
    fn name(&self) -> &'static str;

    /// Human-readable display name.
    fn display_name(&self) -> &'static str;

    /// Keyring entry holding this service's credential.
    fn credential_key(&self) -> &'static str;

    /// Whether a credential is available.
    fn is_authenticated(&self) -> bool;

    /// Persist a user-provided credential and use it from now on.
    fn set_credentials(&mut self, secret: &str) -> Result<(), IntegrationError>;

    /// Remove stored credentials.
    fn disconnect(&mut self) -> Result<(), IntegrationError>;
}

/// Tracker-agnostic summary of the next thing to work on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextTask {
    pub source: String,
    /// Human key, e.g. `owner/repo#12` or `ENG-42`.
    pub key: String,
    pub title: String,
    pub url: String,
}
