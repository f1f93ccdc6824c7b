//! Persistent download failure accounting.

use super::json_store::JsonStore;
use super::{StateError, now_timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A URL becomes permanent once its failure count exceeds this value
const PERMANENT_AFTER_FAILURES: u32 = 2;

/// Failure history of one downloadable URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Number of failed download calls
    #[serde(default)]
    pub fail_count: u32,
    /// Set once `fail_count` exceeds the threshold; the URL is skipped from then on
    #[serde(default)]
    pub permanent: bool,
    /// Description of the latest failure
    #[serde(default)]
    pub last_error: String,
    /// Timestamp of the latest failure
    #[serde(default)]
    pub last_failure: String,
}

/// Failure counters keyed by URL, persisted after every change
pub struct ErrorStore {
    store: JsonStore<BTreeMap<String, ErrorEntry>>,
    entries: BTreeMap<String, ErrorEntry>,
    /// Changes stay in memory, the file is never written
    detached: bool,
}

impl ErrorStore {
    /// Loads the store from `path`; missing or broken files start empty
    pub fn load(path: &Path) -> Self {
        let store = JsonStore::open(path);
        let entries = store.load();
        Self {
            store,
            entries,
            detached: false,
        }
    }

    /// Loads the store from `path` without ever writing back to it
    ///
    /// Used by dry runs, which must leave the recorded failures untouched.
    pub fn load_detached(path: &Path) -> Self {
        Self {
            detached: true,
            ..Self::load(path)
        }
    }

    /// Whether the URL has failed often enough to be skipped for good
    pub fn is_permanent(&self, url: &str) -> bool {
        self.entries.get(url).is_some_and(|entry| entry.permanent)
    }

    /// Returns the failure history of a URL
    pub fn get(&self, url: &str) -> Option<&ErrorEntry> {
        self.entries.get(url)
    }

    /// Number of URLs with recorded failures
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Records one failed download call for `url`
    ///
    /// Returns the updated entry. The third and every later failure flag the
    /// URL as permanent.
    pub fn record_error(
        &mut self,
        url: &str,
        program: &str,
        exit_code: i32,
    ) -> Result<ErrorEntry, StateError> {
        let entry = self.entries.entry(url.to_string()).or_default();

        entry.fail_count += 1;
        entry.last_error = format!("{} exited with code {}", program, exit_code);
        entry.last_failure = now_timestamp();
        if entry.fail_count > PERMANENT_AFTER_FAILURES {
            entry.permanent = true;
        }

        let updated = entry.clone();
        self.save()?;

        Ok(updated)
    }

    /// Forgets all failures of `url` after a successful download
    ///
    /// Returns whether an entry existed. The file is only rewritten if
    /// something changed.
    pub fn clear(&mut self, url: &str) -> Result<bool, StateError> {
        if self.entries.remove(url).is_none() {
            return Ok(false);
        }

        self.save()?;
        Ok(true)
    }

    fn save(&self) -> Result<(), StateError> {
        if self.detached {
            return Ok(());
        }
        self.store.save(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_third_failure_is_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.json");
        let mut errors = ErrorStore::load(&path);

        let first = errors.record_error("https://a", "svtplay-dl", 1).unwrap();
        assert_eq!(first.fail_count, 1);
        assert!(!first.permanent);

        errors.record_error("https://a", "svtplay-dl", 1).unwrap();
        assert!(!errors.is_permanent("https://a"));

        let third = errors.record_error("https://a", "svtplay-dl", 2).unwrap();
        assert_eq!(third.fail_count, 3);
        assert!(third.permanent);
        assert_eq!(third.last_error, "svtplay-dl exited with code 2");
        assert!(errors.is_permanent("https://a"));

        // Every mutation is persisted
        let reloaded = ErrorStore::load(&path);
        assert!(reloaded.is_permanent("https://a"));
        assert_eq!(reloaded.get("https://a").unwrap().fail_count, 3);
    }

    #[test]
    fn test_clear_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.json");
        let mut errors = ErrorStore::load(&path);

        errors.record_error("https://a", "svtplay-dl", 1).unwrap();
        errors.record_error("https://b", "svtplay-dl", 1).unwrap();

        assert!(errors.clear("https://a").unwrap());
        assert!(!errors.clear("https://a").unwrap());
        assert!(errors.get("https://a").is_none());

        let reloaded = ErrorStore::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.get("https://b").is_some());
    }

    #[test]
    fn test_detached_store_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.json");
        let original = r#"{"https://a": {"fail_count": 2}}"#;
        std::fs::write(&path, original).unwrap();

        let mut errors = ErrorStore::load_detached(&path);
        assert!(errors.clear("https://a").unwrap());
        errors.record_error("https://b", "svtplay-dl", 1).unwrap();

        assert!(errors.get("https://a").is_none());
        assert_eq!(errors.get("https://b").unwrap().fail_count, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_loads_entries_with_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.json");
        std::fs::write(
            &path,
            r#"{"https://a": {"fail_count": 5, "permanent": true}, "https://b": {}}"#,
        )
        .unwrap();

        let errors = ErrorStore::load(&path);
        assert!(errors.is_permanent("https://a"));
        assert!(!errors.is_permanent("https://b"));
        assert_eq!(errors.get("https://b").unwrap().fail_count, 0);
    }
}
