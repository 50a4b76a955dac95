//! One monitor run, end to end.
//!
//! [`run_once`] performs a single pass:
//!
//! ```text
//! scrape ─► diff against stored snapshot ─► route ─► dispatch ─► save snapshot
//! ```
//!
//! The scraper is consumed and dropped as soon as scraping ends, so any browser
//! session it holds is released on every exit path. A structural scrape
//! failure sends an operator notice and returns before the snapshot is
//! touched. Otherwise the snapshot is overwritten at the end of the run,
//! whether or not any notification went out.
//!
//! At most one run may use a given snapshot file at a time.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::differ::{diff_activity, diff_listing, DiffStrategy};
use crate::error::Result;
use crate::extractor;
use crate::notifier::{dispatch, DispatchReport, Notifier};
use crate::router::Router;
use crate::scrape::{RawListing, ScrapeError, Scraper};
use crate::store::SnapshotStore;
use crate::types::{ActivityState, ChangeEvent, ListingSnapshot, NotificationMessage};

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub strategy: DiffStrategy,
    /// Change events detected.
    pub events: usize,
    /// Messages delivered.
    pub sent: usize,
    /// Messages the transport rejected.
    pub failed: usize,
    /// True when there was no previous state to compare against.
    pub baseline: bool,
}

/// What a scrape pass produced.
enum Scraped {
    Listing(RawListing),
    Activity(String),
}

/// State to persist at the end of a successful run.
enum Commit {
    Listing(ListingSnapshot),
    Activity(ActivityState),
}

/// Runs one monitoring pass.
///
/// `now` is the check time: it anchors relative timestamps, appears in message
/// headers, and becomes the next activity watermark.
///
/// # Errors
///
/// Returns `MonitorError::Scrape` when the scraper fails (login, navigation or
/// capture); the snapshot is left untouched. Returns `MonitorError::Store`
/// when the new snapshot cannot be written. Notification failures are reported in the
/// [`RunReport`], not as errors.
pub async fn run_once<S, N>(
    config: &Config,
    scraper: S,
    notifier: &N,
    now: NaiveDateTime,
) -> Result<RunReport>
where
    S: Scraper,
    N: Notifier,
{
    let strategy = config.strategy;
    info!(%strategy, source_id = %config.source_id, "Starting monitor run");

    let scraped = match scrape(scraper, strategy) {
        Ok(scraped) => scraped,
        Err(e) => {
            error!(error = %e, "Scrape failed, keeping previous snapshot");
            report_failure(config, notifier, &e).await;
            return Err(e.into());
        }
    };

    let store = SnapshotStore::new(config.snapshot_path.clone());

    let (events, baseline, commit): (Vec<ChangeEvent>, bool, Commit) = match scraped {
        Scraped::Listing(raw) => {
            let current = config.listing_filter().apply(&raw);
            let previous = store.load_listing();
            let events = diff_listing(previous.as_ref(), &current);
            (events, previous.is_none(), Commit::Listing(current))
        }
        Scraped::Activity(panel) => {
            let records = extractor::extract(&panel);
            let watermark = store.load_activity().last_check;
            let events = diff_activity(&records, watermark, now);
            let state = ActivityState {
                last_check: Some(now),
                activities: records,
            };
            (events, watermark.is_none(), Commit::Activity(state))
        }
    };

    let router = Router::new(
        config.recipients.clone(),
        config.title.clone(),
        config.folder_url.clone(),
    );
    let messages = router.route(&events, now);
    let DispatchReport { sent, failed } = dispatch(notifier, &messages).await;

    match &commit {
        Commit::Listing(snapshot) => store.save_listing(snapshot)?,
        Commit::Activity(state) => store.save_activity(state)?,
    }

    let report = RunReport {
        strategy,
        events: events.len(),
        sent,
        failed,
        baseline,
    };

    info!(
        events = report.events,
        messages = messages.len(),
        sent = report.sent,
        failed = report.failed,
        baseline = report.baseline,
        "Monitor run complete"
    );

    Ok(report)
}

/// Takes ownership of the scraper so it is released when scraping ends.
fn scrape<S: Scraper>(mut scraper: S, strategy: DiffStrategy) -> std::result::Result<Scraped, ScrapeError> {
    match strategy {
        DiffStrategy::Listing => scraper.scrape_listing().map(Scraped::Listing),
        DiffStrategy::Activity => scraper.scrape_activity().map(Scraped::Activity),
    }
}

/// Operator notice for a failed run. Best-effort, no mentions.
async fn report_failure<N: Notifier>(config: &Config, notifier: &N, err: &ScrapeError) {
    let message = NotificationMessage {
        actor: None,
        body: format!("❌ Monitor error on {}: {}", config.source_id, err),
        mentions: Vec::new(),
    };
    dispatch(notifier, std::slice::from_ref(&message)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use crate::notifier::NotifyError;
    use crate::scrape::RawRow;
    use crate::types::Mention;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct FixedScraper {
        listing: Option<RawListing>,
        panel: Option<String>,
    }

    impl Scraper for FixedScraper {
        fn scrape_listing(&mut self) -> std::result::Result<RawListing, ScrapeError> {
            self.listing
                .clone()
                .ok_or_else(|| ScrapeError::Navigation("listing never loaded".to_string()))
        }

        fn scrape_activity(&mut self) -> std::result::Result<String, ScrapeError> {
            self.panel
                .clone()
                .ok_or_else(|| ScrapeError::Login("bad credentials".to_string()))
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
    }

    impl Notifier for Recorder {
        async fn notify(&self, message: &str, _mentions: &[Mention]) -> std::result::Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn config(dir: &tempfile::TempDir, strategy: DiffStrategy) -> Config {
        let file = FileConfig {
            snapshot_path: Some(dir.path().join("snapshot.json")),
            strategy: Some(strategy),
            source_id: Some("runner-1".to_string()),
            ..FileConfig::default()
        };
        Config::resolve(file, |_| None).unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 12, 20)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_listing_baseline_then_change() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, DiffStrategy::Listing);
        let notifier = Recorder::default();

        let listing = |date: &str| RawListing {
            containers: vec!["A".to_string()],
            rows: vec![RawRow {
                container: "A".to_string(),
                name: "f.xlsx".to_string(),
                modified: date.to_string(),
                modified_by: "Y".to_string(),
            }],
            ..RawListing::default()
        };

        let first = FixedScraper {
            listing: Some(listing("2024/01/01")),
            panel: None,
        };
        let report = run_once(&config, first, &notifier, now()).await.unwrap();
        assert!(report.baseline);
        assert_eq!(report.events, 0);
        assert!(notifier.sent.lock().unwrap().is_empty());

        let second = FixedScraper {
            listing: Some(listing("2024/01/02")),
            panel: None,
        };
        let report = run_once(&config, second, &notifier, now()).await.unwrap();
        assert!(!report.baseline);
        assert_eq!(report.events, 1);
        assert_eq!(report.sent, 1);
        assert!(notifier.sent.lock().unwrap()[0].contains("✏️ modified: [A] f.xlsx"));
    }

    #[tokio::test]
    async fn test_scrape_failure_keeps_snapshot_and_alerts_operator() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir, DiffStrategy::Activity);
        std::fs::write(&config.snapshot_path, r#"{"last_check":"2024-12-19T10:00:00","activities":[]}"#).unwrap();
        let notifier = Recorder::default();

        let scraper = FixedScraper {
            listing: None,
            panel: None,
        };
        let err = run_once(&config, scraper, &notifier, now()).await.unwrap_err();
        assert!(matches!(err, crate::error::MonitorError::Scrape(_)));

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], "❌ Monitor error on runner-1: login failed: bad credentials");

        let stored = std::fs::read_to_string(&config.snapshot_path).unwrap();
        assert!(stored.contains("2024-12-19T10:00:00"));
    }
}
