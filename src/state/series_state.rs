//! Series check history and stale series detection.

use super::json_store::JsonStore;
use super::{StateError, now_timestamp, parse_timestamp};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Checks without new episodes before a series can be reported as stale
const STALE_MIN_CHECKS: u32 = 2;

/// Age assumed for series that never had (or have an unreadable) new episode date
const UNKNOWN_AGE_DAYS: i64 = 9999;

/// Check history of one series
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesStateEntry {
    /// Display name of the series
    #[serde(default)]
    pub name: String,
    /// Consecutive runs without a new episode
    #[serde(default)]
    pub check_count: u32,
    /// When a run last found a new episode
    #[serde(default)]
    pub last_new_episode_date: Option<String>,
}

/// A series that looks finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleSeries {
    pub url: String,
    pub name: String,
    /// Days since the last new episode
    pub days: i64,
    pub check_count: u32,
}

/// Series check history keyed by series URL, persisted after every change
pub struct SeriesStateStore {
    store: JsonStore<BTreeMap<String, SeriesStateEntry>>,
    entries: BTreeMap<String, SeriesStateEntry>,
}

impl SeriesStateStore {
    /// Loads the store from `path`; missing or broken files start empty
    pub fn load(path: &Path) -> Self {
        let store = JsonStore::open(path);
        let entries = store.load();
        Self { store, entries }
    }

    /// Returns the history of a series
    pub fn get(&self, url: &str) -> Option<&SeriesStateEntry> {
        self.entries.get(url)
    }

    /// Records the outcome of checking a series
    ///
    /// Finding a new episode resets the check counter and stamps the date;
    /// otherwise the counter grows by one.
    pub fn update(&mut self, url: &str, found_new: bool, name: &str) -> Result<(), StateError> {
        let entry = self.entries.entry(url.to_string()).or_default();

        if !name.is_empty() {
            entry.name = name.to_string();
        } else if entry.name.is_empty() {
            entry.name = url.to_string();
        }

        if found_new {
            entry.check_count = 0;
            entry.last_new_episode_date = Some(now_timestamp());
        } else {
            entry.check_count += 1;
        }

        self.store.save(&self.entries)
    }

    /// Lists series without new episodes for at least `stale_days` days
    pub fn find_stale(&self, stale_days: i64) -> Vec<StaleSeries> {
        self.find_stale_at(Local::now().naive_local(), stale_days)
    }

    /// Like `find_stale`, measured from `now`
    pub fn find_stale_at(&self, now: NaiveDateTime, stale_days: i64) -> Vec<StaleSeries> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.check_count >= STALE_MIN_CHECKS)
            .filter_map(|(url, entry)| {
                let days = entry
                    .last_new_episode_date
                    .as_deref()
                    .and_then(parse_timestamp)
                    .map_or(UNKNOWN_AGE_DAYS, |date| (now - date).num_days());

                (days >= stale_days).then(|| StaleSeries {
                    url: url.clone(),
                    name: if entry.name.is_empty() {
                        url.clone()
                    } else {
                        entry.name.clone()
                    },
                    days,
                    check_count: entry.check_count,
                })
            })
            .collect()
    }
}
