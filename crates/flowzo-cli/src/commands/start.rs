use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use flowzo_core::{
    Config, Ledger, NullLedger, RunOutcome, SessionEngine, SessionState, SessionStatus, SqliteLedger,
};
use indicatif::{ProgressBar, ProgressStyle};

const REFRESH: Duration = Duration::from_millis(100);

#[derive(Args)]
pub struct StartArgs {
    /// Focus phase length in seconds (default: session.duration_secs)
    #[arg(short, long)]
    duration: Option<u64>,
    /// Priming phase length in seconds (default: session.priming_secs)
    #[arg(long)]
    priming: Option<f64>,
    /// Session identifier (default: session_<unix seconds>)
    #[arg(long)]
    session_id: Option<String>,
    /// Print the event log as JSON instead of showing progress
    #[arg(long)]
    json: bool,
    /// Do not persist anything
    #[arg(long, conflicts_with = "db")]
    no_ledger: bool,
    /// Ledger database file
    #[arg(long)]
    db: Option<PathBuf>,
}

/// The ledger to write to, `None` for no persistence.
fn select_ledger(args: &StartArgs, config: &Config) -> Result<Option<SqliteLedger>, Box<dyn std::error::Error>> {
    if args.no_ledger {
        return Ok(None);
    }
    match &args.db {
        Some(path) => Ok(Some(SqliteLedger::open(path)?)),
        None => Ok(SqliteLedger::from_config(config)?),
    }
}

fn spinner(json: bool) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    if json {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    bar.enable_steady_tick(REFRESH);
    Ok(bar)
}

/// `remaining_seconds` counts from run start, so the focus countdown is
/// shifted by the priming phase.
fn status_line(status: &SessionStatus, priming: Duration) -> String {
    match status.state {
        SessionState::Idle => String::new(),
        SessionState::Priming => "Entering flow...".to_string(),
        SessionState::Active => {
            let focus_left = (status.total_duration + priming.as_secs_f64()
                - status.elapsed_seconds)
                .clamp(0.0, status.total_duration);
            let secs = focus_left.ceil() as u64;
            format!("Focus  {:02}:{:02} remaining", secs / 60, secs % 60)
        }
        SessionState::Cooldown => "Cooling down...".to_string(),
    }
}

pub async fn run(args: StartArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let duration = Duration::from_secs(args.duration.unwrap_or(config.session.duration_secs));
    let priming = Duration::try_from_secs_f64(args.priming.unwrap_or(config.session.priming_secs))?;

    let ledger = select_ledger(&args, &config)?;
    let ledger_path = ledger
        .as_ref()
        .and_then(|l| l.path().map(|p| p.display().to_string()));
    let ledger: Arc<dyn Ledger> = match ledger {
        Some(ledger) => Arc::new(ledger),
        None => Arc::new(NullLedger),
    };
    let engine = SessionEngine::with_ledger(args.session_id.clone(), ledger);
    let bar = spinner(args.json)?;

    let runner = engine.clone();
    let mut run = tokio::spawn(async move { runner.run_session(duration, priming).await });
    let mut ticker = tokio::time::interval(REFRESH);
    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            joined = &mut run => break joined??,
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                signal?;
                if let Err(e) = engine.abort_session() {
                    tracing::warn!(error = %e, "interrupt arrived outside a run");
                }
            }
            _ = ticker.tick() => bar.set_message(status_line(&engine.get_status(), priming)),
        }
    };

    match outcome {
        RunOutcome::Completed => bar.finish_with_message("Session complete!"),
        RunOutcome::Aborted => bar.abandon_with_message("Session aborted"),
    }

    if args.json {
        println!("{}", engine.export_events_json()?);
    } else {
        println!(
            "{}: {} events recorded",
            engine.session_id(),
            engine.event_count()
        );
        if let Some(path) = ledger_path {
            println!("ledger: {path}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(state: SessionState, elapsed: f64) -> SessionStatus {
        SessionStatus {
            session_id: "s".into(),
            state,
            elapsed_seconds: elapsed,
            remaining_seconds: (1500.0 - elapsed).max(0.0),
            total_duration: 1500.0,
        }
    }

    #[test]
    fn status_line_formats_each_phase() {
        let priming = Duration::from_secs(5);
        assert_eq!(
            status_line(&status(SessionState::Priming, 1.0), priming),
            "Entering flow..."
        );
        assert_eq!(
            status_line(&status(SessionState::Cooldown, 1506.0), priming),
            "Cooling down..."
        );
        assert!(status_line(&status(SessionState::Idle, 0.0), priming).is_empty());
    }

    #[test]
    fn focus_countdown_excludes_priming() {
        let priming = Duration::from_secs(5);
        assert_eq!(
            status_line(&status(SessionState::Active, 5.0), priming),
            "Focus  25:00 remaining"
        );
        // 750.8s into the run is 745.8s into focus.
        assert_eq!(
            status_line(&status(SessionState::Active, 750.8), priming),
            "Focus  12:35 remaining"
        );
        // The session-wide remaining hits zero here while focus still has 5s.
        assert_eq!(
            status_line(&status(SessionState::Active, 1500.0), priming),
            "Focus  00:05 remaining"
        );
    }
}
