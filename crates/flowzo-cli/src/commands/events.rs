use std::path::PathBuf;

use clap::Args;
use flowzo_core::Ledger;

use super::open_ledger;

#[derive(Args)]
pub struct EventsArgs {
    /// Session identifier
    session_id: String,
    /// Output as JSON
    #[arg(long)]
    json: bool,
    /// Ledger database file
    #[arg(long)]
    db: Option<PathBuf>,
}

pub fn run(args: EventsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = open_ledger(args.db)?;
    if ledger.get_session_record(&args.session_id)?.is_none() {
        return Err(format!("unknown session: {}", args.session_id).into());
    }
    let events = ledger.get_session_events(&args.session_id)?;

    if args.json {
        let rows = events
            .iter()
            .map(|e| {
                Ok(serde_json::json!({
                    "timestamp": e.timestamp,
                    "session_id": e.session_id,
                    "event_type": e.event_type,
                    "state": e.state,
                    "data": e.data_value()?,
                }))
            })
            .collect::<Result<Vec<_>, flowzo_core::LedgerError>>()?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for e in &events {
        println!("{:>18.6}  {:<9} {:<22} {}", e.timestamp, e.state, e.event_type, e.data);
    }
    Ok(())
}
