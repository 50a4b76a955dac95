//! Snapshot persistence between runs.
//!
//! One JSON file holds the state a run leaves for the next one, in either the
//! listing form or the activity form (see [`crate::types`]).
//!
//! # Design
//!
//! - **Loading never fails.** A missing, unreadable or malformed file is an
//!   empty baseline. The next run then reports nothing and writes a fresh file.
//! - **Saving is atomic.** The file is written to a sibling `.tmp` path,
//!   flushed, then renamed over the old one, so a crash mid-write leaves the
//!   previous baseline intact.
//!
//! Only one process may use a given snapshot file at a time; runs are expected
//! to be serialized by whatever schedules them.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{ActivityState, ListingSnapshot};

/// Errors that can occur while writing a snapshot.
#[derive(Error, Debug)]
pub enum StoreError {
    /// File system I/O error.
    #[error("snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reads and writes the snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the previous listing generation.
    ///
    /// Returns `None` when there is no usable previous generation: the file is
    /// missing, malformed, or holds no containers.
    #[must_use]
    pub fn load_listing(&self) -> Option<ListingSnapshot> {
        let snapshot: ListingSnapshot = self.load()?;
        if snapshot.is_empty() {
            debug!(path = %self.path.display(), "Stored listing is empty");
            return None;
        }
        Some(snapshot)
    }

    /// Loads the activity watermark and last feed. Defaults when unusable.
    #[must_use]
    pub fn load_activity(&self) -> ActivityState {
        self.load().unwrap_or_default()
    }

    /// Replaces the stored listing.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file cannot be serialized or written.
    pub fn save_listing(&self, snapshot: &ListingSnapshot) -> Result<(), StoreError> {
        self.save(snapshot)
    }

    /// Replaces the stored activity state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file cannot be serialized or written.
    pub fn save_activity(&self, state: &ActivityState) -> Result<(), StoreError> {
        self.save(state)
    }

    fn load<T: DeserializeOwned>(&self) -> Option<T> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No snapshot yet, starting from baseline");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read snapshot, starting from baseline");
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed snapshot, starting from baseline");
                None
            }
        }
    }

    fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let tmp_path = self.tmp_path();
        {
            let file = File::create(&tmp_path).map_err(io_err(&tmp_path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n").map_err(io_err(&tmp_path))?;
            let file = writer
                .into_inner()
                .map_err(|e| StoreError::Io {
                    path: tmp_path.clone(),
                    source: e.into_error(),
                })?;
            file.sync_all().map_err(io_err(&tmp_path))?;
        }

        fs::rename(&tmp_path, &self.path).map_err(io_err(&self.path))?;

        debug!(path = %self.path.display(), "Snapshot saved");
        Ok(())
    }

    /// Sibling path the next save writes to before renaming.
    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}
