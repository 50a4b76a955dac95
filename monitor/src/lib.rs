//! DriveWatch Monitor - change detection for a shared document folder.
//!
//! This crate decides, on each scheduled run, what changed in a monitored
//! document folder since the last run and who should be told about it.
//!
//! # Overview
//!
//! A run scrapes the folder (through a [`scrape::Scraper`]), compares the
//! result with the snapshot saved by the previous run, groups the changes by
//! the person who made them, and posts one chat message per group. Each message
//! mentions the team roster minus the person who made the change. The snapshot
//! is then replaced so the next run starts from the new state.
//!
//! Two change sources are supported:
//!
//! - **Activity feed** (default): the folder's activity panel text is parsed
//!   into records, and records newer than the last check are reported.
//! - **Listing**: per-container item dates are compared with the stored
//!   listing.
//!
//! The first run only records a baseline and sends nothing.
//!
//! # Modules
//!
//! - [`types`]: Snapshot, change and notification types
//! - [`timeparse`]: Relative timestamp parsing ("3 hours ago", "昨天 下午 1:48")
//! - [`extractor`]: Activity panel text to records
//! - [`differ`]: Listing and activity-feed change detection
//! - [`router`]: Change events to chat messages with mentions
//! - [`store`]: Snapshot persistence
//! - [`notifier`]: Chat webhook transport
//! - [`scrape`]: Scraper interface and listing filtering
//! - [`monitor`]: One end-to-end run
//! - [`config`]: Configuration from a TOML file and environment variables
//! - [`error`]: Error types for monitor operations

pub mod config;
pub mod differ;
pub mod error;
pub mod extractor;
pub mod monitor;
pub mod notifier;
pub mod router;
pub mod scrape;
pub mod store;
pub mod timeparse;
pub mod types;

pub use config::{Config, ConfigError};
pub use differ::{diff_activity, diff_listing, DiffStrategy};
pub use error::{MonitorError, Result};
pub use monitor::{run_once, RunReport};
pub use notifier::{dispatch, DispatchReport, DryRunNotifier, Notifier, NotifyError, TeamsNotifier};
pub use router::Router;
pub use scrape::{CaptureScraper, ListingFilter, RawListing, RawRow, ScrapeError, Scraper};
pub use store::{SnapshotStore, StoreError};
pub use timeparse::parse_relative_time;
pub use types::{
    ActivityRecord, ActivityState, ChangeAction, ChangeEvent, ItemRecord, ItemValue, ListingSnapshot,
    Mention, NotificationMessage, Recipient, RecipientPolicy,
};
