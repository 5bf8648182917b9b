use std::path::PathBuf;

use clap::Args;
use flowzo_core::{Ledger, SessionRecord};

use super::open_ledger;

#[derive(Args)]
pub struct HistoryArgs {
    /// Number of sessions to show
    #[arg(short, long, default_value = "10")]
    limit: usize,
    /// Output as JSON
    #[arg(long)]
    json: bool,
    /// Ledger database file
    #[arg(long)]
    db: Option<PathBuf>,
}

fn describe(record: &SessionRecord) -> String {
    let started = record.start_time.format("%Y-%m-%d %H:%M:%S");
    let ran = record
        .end_time
        .map(|end| format!("{}s", (end - record.start_time).num_seconds()))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<24} {:<10} {}  planned {}s, ran {}",
        record.session_id, record.state, started, record.duration_seconds, ran
    )
}

pub fn run(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = open_ledger(args.db)?;
    let sessions = ledger.get_recent_sessions(args.limit)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions recorded yet.");
    }
    for record in &sessions {
        println!("{}", describe(record));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn describe_shows_run_length() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let record = SessionRecord {
            id: 1,
            session_id: "session_1".into(),
            start_time: start,
            end_time: Some(start + chrono::Duration::seconds(1508)),
            duration_seconds: 1500,
            state: "completed".into(),
            created_at: start,
            updated_at: start,
        };
        let line = describe(&record);
        assert!(line.contains("2026-03-01 09:00:00"));
        assert!(line.contains("planned 1500s, ran 1508s"));

        let open = SessionRecord { end_time: None, ..record };
        assert!(describe(&open).ends_with("ran -"));
    }
}
