//! Read-only issue tracker clients used to suggest what to focus on next.
//!
//! These are independent of the session engine: nothing here reads or
//! writes session state.

pub mod github;
pub mod linear;
pub mod traits;

pub use github::{GitHubClient, GitHubIssue, GitHubUser};
pub use linear::{LinearClient, LinearIssue, LinearViewer};
pub use traits::{Integration, NextTask};

/// Thin wrapper around the OS keyring for credential storage.
pub mod keyring_store {
    use crate::error::IntegrationError;

    const SERVICE: &str = "flowzo";

    pub fn get(key: &str) -> Result<Option<String>, IntegrationError> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<(), IntegrationError> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn delete(key: &str) -> Result<(), IntegrationError> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
