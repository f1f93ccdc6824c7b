//! Temporary file management module
//!
//! This module provides RAII-based temporary sibling files. A sibling lives in
//! the same directory as its final destination, so persisting it is a single
//! atomic rename. If the guard is dropped without being persisted, the
//! partially written file is removed.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Guard for temporary resources that automatically cleans up on drop
#[derive(Debug)]
pub(crate) enum TempGuard {
    /// Temporary file that will be deleted when dropped
    File(PathBuf),
    /// The file was renamed onto its destination, nothing left to clean up
    Persisted,
}

impl TempGuard {
    /// Get the path to the temporary resource
    ///
    /// Returns an empty path once the guard has been persisted.
    pub(crate) fn path(&self) -> &Path {
        match self {
            TempGuard::File(path) => path,
            TempGuard::Persisted => Path::new(""),
        }
    }

    /// Atomically moves the temporary file onto `destination`
    ///
    /// On failure the temporary file is removed and the rename error returned.
    pub(crate) fn persist(mut self, destination: &Path) -> io::Result<()> {
        if let TempGuard::File(path) = &self {
            // On error the guard is dropped unchanged and removes the file
            fs::rename(path, destination)?;
        }
        self = TempGuard::Persisted;
        Ok(())
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if let TempGuard::File(path) = self {
            // Silently ignore errors during cleanup
            let _ = fs::remove_file(path);
        }
    }
}

/// Creates a temporary file next to `destination`
///
/// The file name is derived from the destination's file name plus a ULID
/// (monotonic, sortable unique identifier), e.g.
/// `.errors.json.01HV...tmp`. The returned `File` is opened for writing.
///
/// # Examples
///
/// ```ignore
/// let (guard, mut file) = create_sibling_temp(Path::new("state/errors.json"))?;
/// file.write_all(b"{}")?;
/// guard.persist(Path::new("state/errors.json"))?;
/// ```
pub(crate) fn create_sibling_temp(destination: &Path) -> io::Result<(TempGuard, File)> {
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "temp".to_string());

    let ulid = ulid::Ulid::new();
    let temp_name = format!(".{}.{}.tmp", file_name, ulid);

    let path = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(temp_name),
        _ => PathBuf::from(temp_name),
    };

    let file = File::create(&path)?;

    Ok((TempGuard::File(path), file))
}

/// Writes `contents` to `destination` through a temporary sibling file
///
/// Readers observe either the previous contents or the new contents, never a
/// partially written file.
pub(crate) fn write_atomic(destination: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;

    let (guard, mut file) = create_sibling_temp(destination)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    guard.persist(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_temp_lives_next_to_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("state.json");

        let (guard, _file) = create_sibling_temp(&destination).unwrap();
        assert!(guard.path().exists());
        assert_eq!(guard.path().parent(), Some(dir.path()));

        let filename = guard.path().file_name().unwrap().to_str().unwrap();
        assert!(filename.starts_with(".state.json."));
        assert!(filename.ends_with(".tmp"));
    }

    #[test]
    fn test_temp_file_cleanup_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let (guard, _file) = create_sibling_temp(&dir.path().join("poster.jpg")).unwrap();
            guard.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[test]
    fn test_persist_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("seen.txt");
        fs::write(&destination, "old").unwrap();

        write_atomic(&destination, b"new").unwrap();

        assert_eq!(fs::read_to_string(&destination).unwrap(), "new");
        // Only the destination remains, no stray temp files
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_persist_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let (guard, _file) = create_sibling_temp(&dir.path().join("errors.json")).unwrap();
        let temp_path = guard.path().to_path_buf();

        let result = guard.persist(&dir.path().join("missing").join("errors.json"));

        assert!(result.is_err());
        assert!(!temp_path.exists());
    }
}
