//! Completion markers stored as a newline-delimited URL list.

use super::StateError;
use crate::temp::write_atomic;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Set of URLs that have been fully handled
///
/// The whole file is read once at startup; new members are appended to the
/// file immediately.
#[derive(Debug)]
pub struct SeenSet {
    path: PathBuf,
    urls: HashSet<String>,
}

impl SeenSet {
    /// Loads every non-blank, trimmed line of `path`
    ///
    /// A missing file is an empty set.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let urls = match fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
            Err(e) => {
                return Err(StateError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            urls,
        })
    }

    /// Whether the URL has been marked complete
    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Number of URLs in the set
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Records a URL in memory only, leaving the file untouched
    ///
    /// Used by dry runs so a title is not processed twice within one run.
    pub fn insert(&mut self, url: &str) -> bool {
        self.urls.insert(url.to_string())
    }

    /// Marks a URL complete by appending it to the file
    ///
    /// Duplicates are not filtered here; callers check `contains` first.
    pub fn append(&mut self, url: &str) -> Result<(), StateError> {
        let write_failed = |e: std::io::Error| StateError::WriteFailed {
            path: self.path.clone(),
            source: e,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_failed)?;
        writeln!(file, "{}", url).map_err(write_failed)?;

        self.urls.insert(url.to_string());
        Ok(())
    }

    /// Removes every line equal to `url` from the file
    ///
    /// Returns whether anything was removed. The file is rewritten atomically.
    pub fn remove(&mut self, url: &str) -> Result<bool, StateError> {
        self.urls.remove(url);

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(StateError::ReadFailed {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let total = content.split_inclusive('\n').count();
        let kept: Vec<&str> = content
            .split_inclusive('\n')
            .filter(|line| line.trim() != url)
            .collect();

        if kept.len() == total {
            return Ok(false);
        }

        write_atomic(&self.path, kept.concat().as_bytes()).map_err(|e| {
            StateError::WriteFailed {
                path: self.path.clone(),
                source: e,
            }
        })?;

        Ok(true)
    }
}
