//! Run-to-run state
//!
//! Everything the archiver remembers between runs lives in four flat files:
//! two newline-delimited URL lists (completed titles and episodes) and two JSON
//! documents (series check history and download failures). The files are meant
//! to be human readable and are always replaced atomically.

mod error_store;
mod json_store;
mod seen_set;
mod series_state;

pub use error_store::{ErrorEntry, ErrorStore};
pub use seen_set::SeenSet;
pub use series_state::{SeriesStateStore, StaleSeries};

use chrono::{DateTime, Local, NaiveDateTime};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing state files
#[derive(Debug, Error)]
pub enum StateError {
    /// Failed to read a state file
    #[error("Failed to read state file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a state file
    #[error("Failed to write state file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to serialize state for writing
    #[error("Failed to serialize state: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Format of timestamps written to the state files
///
/// Local time without offset and with microseconds, e.g.
/// `2024-05-01T12:30:00.123456`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Current local time formatted for the state files
pub(crate) fn now_timestamp() -> String {
    Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a timestamp read from a state file
///
/// Accepts the format written by `now_timestamp` (with or without fractional
/// seconds) and RFC 3339, which is converted to local time.
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_timestamp_round_trips() {
        let stamp = now_timestamp();
        assert!(parse_timestamp(&stamp).is_some());
        // Microsecond precision, no offset
        assert_eq!(stamp.len(), "2024-05-01T12:30:00.123456".len());
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2024-05-01T12:30:00").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00.5").is_some());
        assert!(parse_timestamp("2024-05-01T12:30:00+02:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
