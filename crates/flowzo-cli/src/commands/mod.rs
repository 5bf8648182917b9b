pub mod auth;
pub mod config;
pub mod events;
pub mod history;
pub mod next;
pub mod start;

use std::path::PathBuf;

use flowzo_core::{Config, SqliteLedger};

/// Open the ledger at `db`, or wherever the config points. Errors when
/// persistence is disabled and no explicit path was given.
pub(crate) fn open_ledger(db: Option<PathBuf>) -> Result<SqliteLedger, Box<dyn std::error::Error>> {
    if let Some(path) = db {
        return Ok(SqliteLedger::open(path)?);
    }
    SqliteLedger::from_config(&Config::load_or_default())?
        .ok_or_else(|| "ledger is disabled (set ledger.enabled = true or pass --db)".into())
}
