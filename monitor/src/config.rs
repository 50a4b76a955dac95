//! Configuration module for DriveWatch Monitor.
//!
//! Configuration is resolved once into an explicit [`Config`] that is handed to
//! the run. Sources, highest precedence first:
//!
//! 1. The TOML config file, when one is given.
//! 2. Environment variables, for any field the file leaves unset.
//! 3. Built-in defaults.
//!
//! # Settings
//!
//! | File key | Environment Variable | Default | Description |
//! |----------|----------------------|---------|-------------|
//! | `webhook_url` | `DRIVEWATCH_WEBHOOK_URL` | - | Chat webhook; unset means dry-run logging |
//! | `source_id` | `DRIVEWATCH_SOURCE_ID` | hostname | Name used in operator error messages |
//! | `snapshot_path` | `DRIVEWATCH_SNAPSHOT_PATH` | `<data dir>/drivewatch/snapshot.json` | Snapshot file |
//! | `strategy` | `DRIVEWATCH_STRATEGY` | `activity` | `activity` or `listing` |
//! | `folder_url` | `DRIVEWATCH_FOLDER_URL` | - | Link appended to change messages |
//! | `title` | `DRIVEWATCH_TITLE` | `File update notification` | Message header |
//! | `request_timeout_secs` | `DRIVEWATCH_REQUEST_TIMEOUT_SECS` | 30 | Webhook timeout |
//! | `containers` | `DRIVEWATCH_CONTAINERS` | (all) | Comma-separated container allow-list |
//! | `header_labels` | - | `Name`, `名稱` | Column-header texts to drop from listings |
//! | `recipients` | - | (none) | Notification roster |
//!
//! # Example
//!
//! ```toml
//! webhook_url = "https://example.webhook.office.com/webhookb2/..."
//! strategy = "activity"
//! containers = ["CCBP", "CCMX"]
//!
//! [[recipients]]
//! display_name = "Joy"
//! chat_id = "joy@example.com"
//! source_name = "Joy Lu"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::differ::DiffStrategy;
use crate::scrape::ListingFilter;
use crate::types::{Recipient, RecipientPolicy};

/// Default notification title.
const DEFAULT_TITLE: &str = "File update notification";

/// Default webhook timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Snapshot location relative to the platform data directory.
const DEFAULT_SNAPSHOT_DIR: &str = "drivewatch";
const DEFAULT_SNAPSHOT_FILE: &str = "snapshot.json";

/// Listing column headers that scrape as rows.
const DEFAULT_HEADER_LABELS: &[&str] = &["Name", "名稱"];

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine the data directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Config file contents. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub webhook_url: Option<String>,
    pub source_id: Option<String>,
    pub snapshot_path: Option<PathBuf>,
    pub strategy: Option<DiffStrategy>,
    pub folder_url: Option<String>,
    pub title: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub containers: Option<Vec<String>>,
    pub header_labels: Option<Vec<String>>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

impl FileConfig {
    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Configuration for one DriveWatch run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat webhook URL. `None` logs messages instead of sending them.
    pub webhook_url: Option<String>,

    /// Name of this monitor instance, used in operator error messages.
    pub source_id: String,

    /// Snapshot file location.
    pub snapshot_path: PathBuf,

    /// Differ strategy.
    pub strategy: DiffStrategy,

    /// Link to the monitored folder, appended to change messages.
    pub folder_url: Option<String>,

    /// Notification header title.
    pub title: String,

    /// Webhook request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Container allow-list. Empty allows every container.
    pub containers: Vec<String>,

    /// Column-header labels to drop from listings.
    pub header_labels: Vec<String>,

    /// Notification roster.
    pub recipients: RecipientPolicy,
}

impl Config {
    /// Loads configuration from an optional file with environment fallback.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or parsed, a value is
    /// invalid, or the default snapshot location cannot be determined.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| env::var(key).ok())
    }

    /// Loads configuration from environment variables only.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Merges file values over values from `lookup`, then defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for invalid values.
    pub fn resolve<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let webhook_url = file.webhook_url.or_else(|| non_empty("DRIVEWATCH_WEBHOOK_URL"));

        let source_id = file
            .source_id
            .or_else(|| non_empty("DRIVEWATCH_SOURCE_ID"))
            .unwrap_or_else(get_hostname);

        let snapshot_path = match file
            .snapshot_path
            .or_else(|| non_empty("DRIVEWATCH_SNAPSHOT_PATH").map(PathBuf::from))
        {
            Some(path) => path,
            None => default_snapshot_path()?,
        };

        let strategy = match file.strategy {
            Some(strategy) => strategy,
            None => match non_empty("DRIVEWATCH_STRATEGY") {
                Some(val) => val.parse().map_err(|message| ConfigError::InvalidValue {
                    key: "DRIVEWATCH_STRATEGY".to_string(),
                    message,
                })?,
                None => DiffStrategy::default(),
            },
        };

        let folder_url = file.folder_url.or_else(|| non_empty("DRIVEWATCH_FOLDER_URL"));

        let title = file
            .title
            .or_else(|| non_empty("DRIVEWATCH_TITLE"))
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let request_timeout_secs = match file.request_timeout_secs {
            Some(secs) => secs,
            None => match non_empty("DRIVEWATCH_REQUEST_TIMEOUT_SECS") {
                Some(val) => val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: "DRIVEWATCH_REQUEST_TIMEOUT_SECS".to_string(),
                    message: format!("expected positive integer, got '{val}'"),
                })?,
                None => DEFAULT_REQUEST_TIMEOUT_SECS,
            },
        };
        if request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        let containers = file
            .containers
            .or_else(|| non_empty("DRIVEWATCH_CONTAINERS").map(|val| split_list(&val)))
            .unwrap_or_default();

        let header_labels = file
            .header_labels
            .unwrap_or_else(|| DEFAULT_HEADER_LABELS.iter().map(|s| s.to_string()).collect());

        for recipient in &file.recipients {
            if recipient.source_name.trim().is_empty() || recipient.chat_id.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "recipients".to_string(),
                    message: format!(
                        "recipient '{}' needs both chat_id and source_name",
                        recipient.display_name
                    ),
                });
            }
        }

        Ok(Self {
            webhook_url,
            source_id,
            snapshot_path,
            strategy,
            folder_url,
            title,
            request_timeout_secs,
            containers,
            header_labels,
            recipients: RecipientPolicy::new(file.recipients),
        })
    }

    /// Row filter derived from the allow-list and header labels.
    #[must_use]
    pub fn listing_filter(&self) -> ListingFilter {
        ListingFilter {
            allow_list: self.containers.clone(),
            header_labels: self.header_labels.clone(),
        }
    }
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn default_snapshot_path() -> Result<PathBuf, ConfigError> {
    let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(base_dirs
        .data_dir()
        .join(DEFAULT_SNAPSHOT_DIR)
        .join(DEFAULT_SNAPSHOT_FILE))
}

/// Gets the system hostname, falling back to "unknown" if it cannot be determined.
fn get_hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown".to_string())
}
