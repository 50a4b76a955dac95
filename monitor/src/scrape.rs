//! Scraper interface.
//!
//! The document store has no API; a browser-automation collaborator logs in
//! and reads the folder listing or the activity panel. This crate only
//! consumes what it produces:
//!
//! - a [`RawListing`]: discovered containers plus one [`RawRow`] per item, or
//! - the activity panel as one block of text (see [`crate::extractor`]).
//!
//! "Nothing found" is an empty result, never an error. A [`ScrapeError`] means
//! the run could not see the store at all (login or navigation failed).
//!
//! [`CaptureScraper`] reads a capture written by an external automation job,
//! which is how the binary is wired.

use std::fs;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::{ItemRecord, ListingSnapshot};

/// Structural scrape failures. Any of these aborts the run.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// Identity-provider login failed.
    #[error("login failed: {0}")]
    Login(String),

    /// The container listing or activity panel never loaded.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// A capture file could not be read.
    #[error("failed to read capture {path}: {source}")]
    Capture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A capture file is not a valid listing.
    #[error("malformed listing capture {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One scraped item row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub container: String,
    pub name: String,
    #[serde(default)]
    pub modified: String,
    #[serde(default)]
    pub modified_by: String,
}

/// A full listing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    /// Containers seen, including ones with no rows.
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<RawRow>,
    /// Container-level modified dates, when the listing shows them.
    #[serde(default)]
    pub container_modified: IndexMap<String, String>,
}

/// Rules for turning raw rows into a [`ListingSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    /// Containers to keep. Empty keeps all.
    pub allow_list: Vec<String>,
    /// Column-header texts that scrape as rows and must be dropped.
    pub header_labels: Vec<String>,
}

impl ListingFilter {
    fn allows(&self, container: &str) -> bool {
        self.allow_list.is_empty() || self.allow_list.iter().any(|c| c == container)
    }

    fn is_header(&self, name: &str) -> bool {
        self.header_labels.iter().any(|label| label == name)
    }

    /// Builds a snapshot, skipping rows that cannot be items.
    #[must_use]
    pub fn apply(&self, raw: &RawListing) -> ListingSnapshot {
        let mut snapshot = ListingSnapshot::new();

        for container in raw.containers.iter().map(|c| c.trim()) {
            if !container.is_empty() && self.allows(container) {
                snapshot.touch_container(container);
            }
        }

        for (container, date) in &raw.container_modified {
            let (container, date) = (container.trim(), date.trim());
            if !container.is_empty() && !date.is_empty() && self.allows(container) {
                snapshot.set_container_modified(container, date);
            }
        }

        for row in &raw.rows {
            let container = row.container.trim();
            let name = row.name.trim();

            if container.is_empty() || name.is_empty() || self.is_header(name) {
                debug!(container, name, "Skipping non-item row");
                continue;
            }
            if !self.allows(container) {
                continue;
            }

            snapshot.insert(
                container,
                name,
                ItemRecord::new(row.modified.trim(), row.modified_by.trim()),
            );
        }

        snapshot
    }
}

/// Source of scraped data.
///
/// Implementations own any browser session; dropping the scraper releases it.
pub trait Scraper {
    /// Reads the container listing.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError` only when the listing could not be reached.
    fn scrape_listing(&mut self) -> Result<RawListing, ScrapeError>;

    /// Reads the activity panel text.
    ///
    /// # Errors
    ///
    /// Returns `ScrapeError` only when the panel could not be reached.
    fn scrape_activity(&mut self) -> Result<String, ScrapeError>;
}

/// Reads captures written by an external automation job.
#[derive(Debug, Clone, Default)]
pub struct CaptureScraper {
    /// JSON [`RawListing`] capture.
    pub listing_path: Option<PathBuf>,
    /// Plain-text activity panel capture.
    pub activity_path: Option<PathBuf>,
}

impl CaptureScraper {
    fn read(path: Option<&PathBuf>, what: &str) -> Result<(PathBuf, String), ScrapeError> {
        let path = path
            .ok_or_else(|| ScrapeError::Navigation(format!("no {what} capture configured")))?
            .clone();
        let contents = fs::read_to_string(&path).map_err(|source| ScrapeError::Capture {
            path: path.clone(),
            source,
        })?;
        Ok((path, contents))
    }
}

impl Scraper for CaptureScraper {
    fn scrape_listing(&mut self) -> Result<RawListing, ScrapeError> {
        let (path, contents) = Self::read(self.listing_path.as_ref(), "listing")?;
        serde_json::from_str(&contents).map_err(|source| ScrapeError::Malformed { path, source })
    }

    fn scrape_activity(&mut self) -> Result<String, ScrapeError> {
        let (_, contents) = Self::read(self.activity_path.as_ref(), "activity")?;
        Ok(contents)
    }
}
