//! pattern-worker: runs the pattern detector over a JSON commit-history
//! fixture.
//!
//! - `detect` runs one real-time detection over the given (or all) commits
//! - `batch` runs range-based batch processing for the fixture's project
//! - `watch` starts the drain service and buffers commit ids read from stdin

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use pulse_compute::{PatternDetector, PatternService};
use pulse_core::config::load_dotenv;
use pulse_core::{DetectionConfig, DetectionResult};
use pulse_store::{Fixture, MemoryStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Mine co-change, rhythm, ownership and churn patterns from commit history.
#[derive(Parser, Debug)]
#[command(name = "pattern-worker", version, about)]
struct Cli {
    /// JSON fixture with the project's commits and file changes.
    #[arg(long, env = "PATTERN_FIXTURE")]
    fixture: PathBuf,

    /// Session id to bind when the fixture does not name one.
    #[arg(long, default_value = "cli")]
    session: String,

    /// Pretty-print JSON output.
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one detection for the given commit ids (all fixture commits if none).
    Detect {
        #[arg(value_name = "COMMIT")]
        commits: Vec<String>,
    },
    /// Batch-process every commit authored within the range.
    Batch {
        /// Inclusive lower bound (RFC 3339).
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Inclusive upper bound (RFC 3339).
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
    /// Buffer commit ids from stdin (one per line) and drain them periodically.
    Watch,
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

fn report(result: &DetectionResult) {
    if result.success {
        info!(
            patterns = result.pattern_count(),
            alerts = result.alert_count,
            ms = result.execution_time_ms,
            "detection succeeded"
        );
    } else {
        for e in &result.errors {
            warn!(error = %e, "detection error");
        }
    }
}

async fn watch(service: PatternService, pretty: bool) -> anyhow::Result<()> {
    let detector = Arc::clone(service.detector());
    let mut events = detector.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Err(e) = print_json(event.result.as_ref(), pretty) {
                warn!(error = %e, "failed to print result");
            }
        }
    });

    service.start().await;
    info!("reading commit ids from stdin, Ctrl-C or EOF to stop");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(id) if !id.trim().is_empty() => {
                        detector.buffer_commits([id.trim().to_string()])
                    }
                    Some(_) => {}
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    service.stop().await;
    // Dropping the last sender ends the printer once queued events are out.
    drop(service);
    drop(detector);
    if let Err(e) = printer.await {
        warn!(error = %e, "printer task failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let config = DetectionConfig::from_env();
    config.validate().context("invalid detection config")?;
    config.log_summary();

    let fixture = Fixture::load(&cli.fixture)
        .with_context(|| format!("failed to load fixture {}", cli.fixture.display()))?;
    let store = Arc::new(MemoryStore::new());
    fixture.populate(&store).await;
    if fixture.session.is_none() {
        store.set_active_session(&cli.session, &fixture.project).await;
    }

    let detector = Arc::new(PatternDetector::with_backend(config, store.clone()));

    match cli.command {
        Command::Detect { commits } => {
            let ids = if commits.is_empty() {
                fixture.commits.iter().map(|c| c.id.clone()).collect()
            } else {
                commits
            };
            let result = detector.detect_for_commits(&ids).await;
            report(&result);
            print_json(&result, cli.pretty)?;
        }
        Command::Batch { since, until } => {
            let result = detector.batch_process(&fixture.project, since, until).await;
            report(&result);
            print_json(&result, cli.pretty)?;
        }
        Command::Watch => {
            let service = PatternService::new(detector, store);
            watch(service, cli.pretty).await?;
        }
    }

    Ok(())
}
