//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. Request handling never reads process-wide environment variables,
//! which keeps behaviour consistent across worker threads and test harnesses.

use crate::constants::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DATABASE_PATH};
use crate::{ClinicError, ClinicResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    busy_timeout: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ClinicError::InvalidInput` if the database path is empty or the busy timeout is
    /// zero (a zero timeout turns every lock wait into an immediate failure).
    pub fn new(database_path: PathBuf, busy_timeout: Duration) -> ClinicResult<Self> {
        if database_path.as_os_str().is_empty() {
            return Err(ClinicError::InvalidInput(
                "database path cannot be empty".into(),
            ));
        }
        if busy_timeout.is_zero() {
            return Err(ClinicError::InvalidInput(
                "busy timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            database_path,
            busy_timeout,
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// Upper bound on a single wait for the store's write lock.
    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }
}

/// Resolve the database path from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_DATABASE_PATH`].
pub fn database_path_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
}

/// Parse the busy timeout (milliseconds) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default of
/// [`DEFAULT_BUSY_TIMEOUT_MS`] milliseconds.
pub fn busy_timeout_from_env_value(value: Option<String>) -> ClinicResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let millis = match value {
        Some(v) => v.parse::<u64>().map_err(|_| {
            ClinicError::InvalidInput(format!("busy timeout '{v}' is not a number of milliseconds"))
        })?,
        None => DEFAULT_BUSY_TIMEOUT_MS,
    };

    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_defaults_when_blank() {
        assert_eq!(
            database_path_from_env_value(None),
            PathBuf::from(DEFAULT_DATABASE_PATH)
        );
        assert_eq!(
            database_path_from_env_value(Some("   ".into())),
            PathBuf::from(DEFAULT_DATABASE_PATH)
        );
        assert_eq!(
            database_path_from_env_value(Some(" /var/lib/clinic.db ".into())),
            PathBuf::from("/var/lib/clinic.db")
        );
    }

    #[test]
    fn test_busy_timeout_parses_millis() {
        assert_eq!(
            busy_timeout_from_env_value(None).expect("default should parse"),
            Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS)
        );
        assert_eq!(
            busy_timeout_from_env_value(Some("250".into())).expect("should parse"),
            Duration::from_millis(250)
        );
        assert!(busy_timeout_from_env_value(Some("soon".into())).is_err());
    }

    #[test]
    fn test_new_rejects_zero_timeout_and_empty_path() {
        assert!(CoreConfig::new(PathBuf::from("clinic.db"), Duration::ZERO).is_err());
        assert!(CoreConfig::new(PathBuf::new(), Duration::from_secs(1)).is_err());
        let cfg = CoreConfig::new(PathBuf::from("clinic.db"), Duration::from_secs(1))
            .expect("CoreConfig::new should succeed");
        assert_eq!(cfg.database_path(), Path::new("clinic.db"));
    }
}
