mod display;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use legistrack_core::{Subject, TrackerState, parse_timestamp};
use legistrack_sync::{AnalysisBackend, RealtimeNotifier, RemoteConfig, RestBackend};
use legistrack_tracker::{RequestOutcome, StatusTracker, TrackerConfig, TrackerGuard};

#[derive(Parser)]
#[command(name = "legistrack", version, about = "Bill analysis status from the command line")]
struct Cli {
    #[command(flatten)]
    remote: RemoteArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RemoteArgs {
    /// Hosted project URL
    #[arg(long, env = "LEGISTRACK_URL")]
    url: String,

    /// Public API key
    #[arg(long, env = "LEGISTRACK_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Signed-in user's access token, required by the trigger endpoint
    #[arg(long, env = "LEGISTRACK_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long, env = "LEGISTRACK_TABLE", default_value = "bill_analyses")]
    table: String,

    #[arg(long, env = "LEGISTRACK_SUBJECT_COLUMN", default_value = "bill_id")]
    subject_column: String,

    #[arg(long, env = "LEGISTRACK_TRIGGER_FUNCTION", default_value = "analyze-bill")]
    trigger_function: String,
}

impl RemoteArgs {
    fn into_config(self) -> RemoteConfig {
        let mut config = RemoteConfig::new(self.url, self.api_key);
        config.access_token = self.token;
        config.table = self.table;
        config.subject_column = self.subject_column;
        config.trigger_function = self.trigger_function;
        config
    }
}

#[derive(Args)]
struct TimingArgs {
    /// Seconds to wait for a notification before polling
    #[arg(long, default_value_t = 75)]
    fallback_delay: u64,

    /// Seconds between polls
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// Seconds to keep polling before giving up
    #[arg(long, default_value_t = 45)]
    poll_window: u64,
}

impl From<TimingArgs> for TrackerConfig {
    fn from(args: TimingArgs) -> Self {
        Self {
            fallback_delay: Duration::from_secs(args.fallback_delay),
            poll_interval: Duration::from_secs(args.poll_interval),
            poll_window: Duration::from_secs(args.poll_window),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the latest analysis for a bill
    Latest {
        bill_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Show the analysis status for a bill
    Status {
        bill_id: String,
        /// Date of the bill's last activity (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        last_activity: Option<DateTime<Utc>>,
        #[arg(long)]
        json: bool,
    },
    /// Request an analysis and wait for it to land
    Analyze {
        bill_id: String,
        /// Date of the bill's last activity (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        last_activity: Option<DateTime<Utc>>,
        #[command(flatten)]
        timing: TimingArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("legistrack v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let remote = Remote::new(cli.remote.into_config());

    match cli.command {
        Command::Latest { bill_id, json } => latest(remote.backend.as_ref(), &bill_id, json).await,
        Command::Status {
            bill_id,
            last_activity,
            json,
        } => status(&remote, Subject::new(bill_id, last_activity), json).await,
        Command::Analyze {
            bill_id,
            last_activity,
            timing,
        } => analyze(&remote, Subject::new(bill_id, last_activity), timing.into()).await,
    }
}

async fn latest(backend: &dyn AnalysisBackend, bill_id: &str, json: bool) -> anyhow::Result<()> {
    let record = backend
        .fetch_latest(bill_id)
        .await
        .with_context(|| format!("fetching latest analysis for {bill_id}"))?;
    match (record, json) {
        (Some(record), true) => println!("{}", serde_json::to_string_pretty(&record)?),
        (Some(record), false) => display::print_analysis_card(&record),
        (None, true) => println!("null"),
        (None, false) => println!("No analysis for {bill_id} yet."),
    }
    Ok(())
}

/// Store client and insert feed for one hosted project.
struct Remote {
    backend: Arc<dyn AnalysisBackend>,
    notifier: RealtimeNotifier,
}

impl Remote {
    fn new(config: RemoteConfig) -> Self {
        Self {
            notifier: RealtimeNotifier::new(config.clone()),
            backend: Arc::new(RestBackend::new(config)),
        }
    }

    async fn mount(&self, subject: Subject, config: TrackerConfig) -> TrackerGuard {
        StatusTracker::initialize(subject, Arc::clone(&self.backend), &self.notifier, config).await
    }
}

async fn status(remote: &Remote, subject: Subject, json: bool) -> anyhow::Result<()> {
    let guard = remote.mount(subject, TrackerConfig::default()).await;
    let view = guard.tracker().view();
    guard.teardown();

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        display::print_view(&view);
    }
    Ok(())
}

async fn analyze(remote: &Remote, subject: Subject, config: TrackerConfig) -> anyhow::Result<()> {
    let bill_id = subject.id.clone();
    let guard = remote.mount(subject, config).await;
    let tracker = guard.tracker().clone();
    let mut changes = tracker.watch();
    display::print_view(&changes.borrow_and_update());

    match tracker.request_analysis().await {
        RequestOutcome::Ignored => {
            println!("{}", ignored_message(&bill_id, tracker.view().state));
            guard.teardown();
            return Ok(());
        }
        RequestOutcome::Rejected(message) => {
            guard.teardown();
            anyhow::bail!("analysis request for {bill_id} rejected: {message}");
        }
        RequestOutcome::Current | RequestOutcome::Queued => {}
    }

    let mut view = changes.borrow_and_update().clone();
    display::print_view(&view);
    while view.state == TrackerState::Running {
        tokio::select! {
            changed = changes.changed() => {
                changed.context("tracker closed")?;
                view = changes.borrow_and_update().clone();
                display::print_view(&view);
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Interrupted; the analysis keeps running on the server.");
                break;
            }
        }
    }
    guard.teardown();

    if view.state == TrackerState::Error {
        anyhow::bail!(
            "{}",
            view.error.unwrap_or_else(|| "analysis failed".to_string())
        );
    }
    Ok(())
}

/// Why a request was suppressed, judged from the state that suppressed it.
fn ignored_message(bill_id: &str, state: TrackerState) -> String {
    match state {
        TrackerState::Current => format!("Analysis for {bill_id} is already current."),
        TrackerState::Running => format!("Analysis for {bill_id} is already running."),
        _ => format!("Tracker for {bill_id} is no longer active."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_message_follows_state() {
        assert_eq!(
            ignored_message("hr-1", TrackerState::Current),
            "Analysis for hr-1 is already current."
        );
        assert_eq!(
            ignored_message("hr-1", TrackerState::Running),
            "Analysis for hr-1 is already running."
        );
        assert_eq!(
            ignored_message("hr-1", TrackerState::Stale),
            "Tracker for hr-1 is no longer active."
        );
    }

    #[test]
    fn timing_args_build_tracker_config() {
        let config = TrackerConfig::from(TimingArgs {
            fallback_delay: 5,
            poll_interval: 0,
            poll_window: 10,
        });
        assert_eq!(config.fallback_delay, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::ZERO);
        assert_eq!(config.deadline(), Duration::from_secs(15));
    }
}
