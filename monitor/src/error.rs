//! Error types for the DriveWatch Monitor.
//!
//! Each concern owns its error enum ([`ConfigError`], [`ScrapeError`],
//! [`NotifyError`], [`StoreError`]); [`MonitorError`] wraps them for the run
//! as a whole.
//!
//! Not every failure reaches a `MonitorError`. Unparseable rows and times are
//! skipped where they occur, a failed notification is counted in the run
//! report, and an unusable snapshot loads as an empty baseline.

use thiserror::Error;

use crate::config::ConfigError;
use crate::notifier::NotifyError;
use crate::scrape::ScrapeError;
use crate::store::StoreError;

/// Errors that can end a monitor run.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The document store could not be read at all.
    #[error("scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    /// The chat transport could not be set up.
    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    /// The snapshot could not be written.
    #[error("snapshot error: {0}")]
    Store(#[from] StoreError),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "DRIVEWATCH_REQUEST_TIMEOUT_SECS".to_string(),
            message: "expected positive integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for DRIVEWATCH_REQUEST_TIMEOUT_SECS: expected positive integer"
        );
    }

    #[test]
    fn test_config_error_no_home_directory_display() {
        let err = ConfigError::NoHomeDirectory;
        assert_eq!(err.to_string(), "failed to determine home directory");
    }

    #[test]
    fn test_monitor_error_config_display() {
        let err = MonitorError::Config(ConfigError::InvalidValue {
            key: "DRIVEWATCH_STRATEGY".to_string(),
            message: "expected 'listing' or 'activity', got 'weekly'".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "configuration error: invalid value for DRIVEWATCH_STRATEGY: expected 'listing' or 'activity', got 'weekly'"
        );
    }

    #[test]
    fn test_monitor_error_scrape_display() {
        let err: MonitorError = ScrapeError::Login("identity provider timed out".to_string()).into();
        assert!(matches!(err, MonitorError::Scrape(_)));
        assert_eq!(err.to_string(), "scrape error: login failed: identity provider timed out");
    }

    #[test]
    fn test_monitor_error_notify_display() {
        let err: MonitorError = NotifyError::Rejected {
            status: 400,
            message: "Bad payload".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "notification error: webhook rejected message: 400 - Bad payload"
        );
    }

    #[test]
    fn test_monitor_error_store_display() {
        let err: MonitorError = StoreError::Io {
            path: "/readonly/snapshot.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        }
        .into();
        assert!(matches!(err, MonitorError::Store(_)));
        assert!(err.to_string().starts_with("snapshot error: snapshot I/O error at /readonly/snapshot.json"));
    }

    #[test]
    fn test_monitor_error_from_config_load() {
        let missing = std::path::Path::new("/nonexistent/drivewatch.toml");
        let err: MonitorError = crate::config::Config::load(Some(missing)).unwrap_err().into();
        assert!(matches!(err, MonitorError::Config(ConfigError::ReadFile { .. })));
        assert!(err.to_string().starts_with("configuration error: failed to read config file"));
    }

    #[test]
    fn test_monitor_error_from_webhook_setup() {
        let err: MonitorError = crate::notifier::TeamsNotifier::new(
            "not a url".to_string(),
            std::time::Duration::from_secs(5),
        )
        .unwrap_err()
        .into();
        assert!(matches!(err, MonitorError::Notify(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MonitorError>();
    }
}
