//! JSON document storage
//!
//! A thin typed wrapper around one JSON file. Reading is forgiving (a missing
//! or broken file is an empty store), writing is atomic.

use super::StateError;
use crate::temp::write_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// A JSON file holding one serializable document
pub(crate) struct JsonStore<T> {
    /// Location of the document
    path: PathBuf,
    /// Phantom data for the generic type
    _phantom: PhantomData<T>,
}

impl<T> JsonStore<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    /// Creates a store for the document at `path`
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            _phantom: PhantomData,
        }
    }

    /// Loads the document
    ///
    /// A missing file, an unreadable file and malformed JSON all yield the
    /// default (empty) document. The latter two are logged as warnings.
    pub fn load(&self) -> T {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state file unreadable, starting empty");
                return T::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "state file malformed, starting empty");
            T::default()
        })
    }

    /// Writes the document, replacing the previous file atomically
    pub fn save(&self, data: &T) -> Result<(), StateError> {
        let content = serde_json::to_string_pretty(data)?;

        write_atomic(&self.path, content.as_bytes()).map_err(|e| StateError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })
    }
}
