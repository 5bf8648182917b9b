mod config;

pub use config::{Config, IntegrationsConfig, LedgerConfig, SessionConfig};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/flowzo[-dev]/` based on FLOWZO_ENV.
///
/// Set FLOWZO_ENV=dev to use the development data directory, or
/// FLOWZO_DATA_DIR to point somewhere else entirely.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FLOWZO_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("FLOWZO_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("flowzo-dev")
            } else {
                base_dir.join("flowzo")
            }
        }
    };

    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::DataDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
