//! DriveWatch Monitor - shared folder change notifier.
//!
//! This binary runs one monitoring pass over a captured folder scrape and
//! posts change notifications to a chat webhook. It is meant to be started by
//! a scheduler; each invocation is a single run.
//!
//! # Commands
//!
//! - `drivewatch-monitor run`: Diff the latest capture against the snapshot and notify
//! - `drivewatch-monitor inspect`: Summarize the stored snapshot
//! - `drivewatch-monitor parse-time <TEXT>`: Try the relative-time parser
//!
//! # Environment Variables
//!
//! See the [`drivewatch_monitor::config`] module for available configuration options.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDateTime};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use drivewatch_monitor::config::Config;
use drivewatch_monitor::differ::DiffStrategy;
use drivewatch_monitor::monitor::{run_once, RunReport};
use drivewatch_monitor::notifier::{DryRunNotifier, TeamsNotifier};
use drivewatch_monitor::scrape::CaptureScraper;
use drivewatch_monitor::store::SnapshotStore;
use drivewatch_monitor::timeparse::{parse_relative_time, rule_names};

/// Environment variable naming the config file.
const CONFIG_ENV_VAR: &str = "DRIVEWATCH_CONFIG";

/// Format accepted by `--now`.
const NOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// DriveWatch Monitor - shared folder change notifier.
///
/// Compares the latest scrape of a shared document folder with the previous
/// run and tells the rest of the team who changed what.
#[derive(Parser, Debug)]
#[command(name = "drivewatch-monitor")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    DRIVEWATCH_CONFIG                TOML config file (overridden by --config)
    DRIVEWATCH_WEBHOOK_URL           Chat webhook URL (unset: log only)
    DRIVEWATCH_SOURCE_ID             Monitor identifier (default: hostname)
    DRIVEWATCH_SNAPSHOT_PATH         Snapshot file (default: <data dir>/drivewatch/snapshot.json)
    DRIVEWATCH_STRATEGY              activity | listing (default: activity)
    DRIVEWATCH_FOLDER_URL            Link appended to messages
    DRIVEWATCH_TITLE                 Message title
    DRIVEWATCH_REQUEST_TIMEOUT_SECS  Webhook timeout (default: 30)
    DRIVEWATCH_CONTAINERS            Comma-separated container allow-list

EXAMPLES:
    # Check the activity feed captured by the scrape job
    drivewatch-monitor run --activity-file /var/lib/drivewatch/activity.txt

    # Compare folder listings without posting anything
    drivewatch-monitor run --config drivewatch.toml --listing-file listing.json --dry-run

    # See how a timestamp is interpreted
    drivewatch-monitor parse-time '昨天 下午 1:48'
")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Run one monitoring pass.
    ///
    /// Reads the capture for the configured strategy, notifies about changes
    /// since the last run, and replaces the stored snapshot.
    Run {
        /// TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Log messages instead of posting them.
        #[arg(long)]
        dry_run: bool,

        /// JSON folder listing capture (listing strategy).
        #[arg(long)]
        listing_file: Option<PathBuf>,

        /// Activity panel text capture (activity strategy).
        #[arg(long)]
        activity_file: Option<PathBuf>,
    },

    /// Summarize the stored snapshot.
    Inspect {
        /// TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Parse a relative timestamp and print the result.
    ParseTime {
        /// Timestamp text as shown by the document store.
        text: String,

        /// Reference time (YYYY-MM-DDTHH:MM:SS). Defaults to the local time.
        #[arg(long)]
        now: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.json);

    match cli.command {
        Command::Run {
            config,
            dry_run,
            listing_file,
            activity_file,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            let scraper = CaptureScraper {
                listing_path: listing_file,
                activity_path: activity_file,
            };
            let report = runtime.block_on(run_monitor(config, scraper, dry_run))?;

            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            }
            Ok(())
        }
        Command::Inspect { config } => run_inspect(config),
        Command::ParseTime { text, now } => run_parse_time(&text, now.as_deref()),
    }
}

/// Runs one monitoring pass with the configured notifier.
async fn run_monitor(config_path: Option<PathBuf>, scraper: CaptureScraper, dry_run: bool) -> Result<RunReport> {
    let config = load_config(config_path)?;
    let now = Local::now().naive_local();

    info!(
        source_id = %config.source_id,
        strategy = %config.strategy,
        snapshot = %config.snapshot_path.display(),
        recipients = config.recipients.recipients.len(),
        "Configuration loaded"
    );

    let report = match (&config.webhook_url, dry_run) {
        (Some(url), false) => {
            let notifier = webhook_notifier(url, &config).context("Failed to create webhook client")?;
            run_once(&config, scraper, &notifier, now).await
        }
        (webhook, _) => {
            if webhook.is_none() && !dry_run {
                warn!("No webhook configured, notifications will only be logged");
            }
            run_once(&config, scraper, &DryRunNotifier, now).await
        }
    }
    .context("Monitor run failed")?;

    if report.failed > 0 {
        warn!(failed = report.failed, "Some notifications were not delivered");
    }

    Ok(report)
}

/// Prints a summary of the stored snapshot.
fn run_inspect(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = SnapshotStore::new(config.snapshot_path.clone());

    println!("Snapshot: {}", store.path().display());
    println!("Strategy: {}", config.strategy);

    match config.strategy {
        DiffStrategy::Listing => match store.load_listing() {
            Some(snapshot) => {
                println!("Containers: {}", snapshot.containers.len());
                for (name, entry) in &snapshot.containers {
                    let items = entry.items().map_or(0, |items| items.len());
                    println!("  {name}: {items} items");
                }
            }
            None => println!("No usable listing; the next run records a baseline."),
        },
        DiffStrategy::Activity => {
            let state = store.load_activity();
            match state.last_check {
                Some(last_check) => println!("Last check: {}", last_check.format(NOW_FORMAT)),
                None => println!("Last check: never; the next run records a baseline."),
            }
            println!("Activities: {}", state.activities.len());
            for record in &state.activities {
                println!(
                    "  {} {} {} ({})",
                    record.modifier,
                    record.action.label(),
                    record.file_name,
                    record.time_str
                );
            }
        }
    }

    Ok(())
}

/// Prints how the relative-time parser reads `text`.
fn run_parse_time(text: &str, now: Option<&str>) -> Result<()> {
    let now = match now {
        Some(raw) => NaiveDateTime::parse_from_str(raw, NOW_FORMAT)
            .with_context(|| format!("Invalid --now value '{raw}', expected {NOW_FORMAT}"))?,
        None => Local::now().naive_local(),
    };

    match parse_relative_time(text, now) {
        Some(parsed) => {
            println!("{}", parsed.format(NOW_FORMAT));
            Ok(())
        }
        None => bail!(
            "Could not parse '{text}'. Recognized forms, in order: {}",
            rule_names().join(", ")
        ),
    }
}

/// Loads configuration from `--config`, then `DRIVEWATCH_CONFIG`, then the
/// environment alone.
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let config_path = config_path.or_else(|| env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));
    resolve_config(config_path.as_deref()).context("Failed to load configuration")
}

fn resolve_config(path: Option<&Path>) -> drivewatch_monitor::Result<Config> {
    Ok(Config::load(path)?)
}

/// Builds the webhook client with the configured timeout.
fn webhook_notifier(url: &str, config: &Config) -> drivewatch_monitor::Result<TeamsNotifier> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    Ok(TeamsNotifier::new(url.to_string(), timeout)?)
}

/// Initializes the tracing subscriber.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
