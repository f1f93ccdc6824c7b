//! Media download module
//!
//! The actual download is delegated to an external command-line tool. This
//! module defines the seam to that tool and the retry policy wrapped around
//! it, which feeds the persistent error store.

mod svtplay_dl;

pub use svtplay_dl::SvtplayDl;

use crate::ProgressEvent;
use crate::cancellation::CancellationToken;
use crate::state::{ErrorEntry, ErrorStore, StateError};
use std::path::Path;
use thiserror::Error;

/// Exit code reported when the downloader executable cannot be found
pub const EXIT_CODE_NOT_FOUND: i32 = 127;

/// Errors that abort a download attempt instead of merely failing it
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The downloader process could not be started
    #[error("Failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    /// Waiting for the downloader process failed
    #[error("Failed to wait for {program}: {source}")]
    WaitFailed {
        program: String,
        source: std::io::Error,
    },

    /// A forced quit killed the running download
    #[error("Download of {url} was interrupted")]
    Interrupted { url: String },

    /// The error store could not be updated
    #[error(transparent)]
    State(#[from] StateError),
}

/// Trait for tools that download one media URL into a folder
pub trait MediaDownloader {
    /// Name of the executable, used in messages and error records
    fn program(&self) -> &str;

    /// The argument list passed to the tool
    fn arguments(&self, url: &str, output_dir: &Path) -> Vec<String> {
        vec![
            "-S".to_string(),
            "-o".to_string(),
            output_dir.display().to_string(),
            url.to_string(),
        ]
    }

    /// Human readable command line for progress output
    fn command_line(&self, url: &str, output_dir: &Path) -> String {
        std::iter::once(self.program().to_string())
            .chain(self.arguments(url, output_dir))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs one download attempt and returns the tool's exit code
    ///
    /// Zero means success. Implementations must abort with
    /// `DownloadError::Interrupted` when `cancel` is forced.
    fn run(
        &self,
        url: &str,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<i32, DownloadError>;
}

/// Result of a download with retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// One of the attempts succeeded
    Success,
    /// The URL is flagged permanent, no attempt was made
    SkippedPermanent,
    /// Both attempts failed; carries the updated error record
    Failed(ErrorEntry),
}

/// Downloads `url` with one immediate retry
///
/// Success clears any recorded failures for the URL. Two failed attempts
/// count as a single failure in the error store, so a URL turns permanent
/// after three failed calls of this function.
pub fn download_with_retry<F>(
    downloader: &dyn MediaDownloader,
    errors: &mut ErrorStore,
    url: &str,
    output_dir: &Path,
    cancel: &CancellationToken,
    progress_callback: &mut F,
) -> Result<DownloadOutcome, DownloadError>
where
    F: FnMut(ProgressEvent),
{
    if errors.is_permanent(url) {
        progress_callback(ProgressEvent::PermanentErrorSkip {
            url: url.to_string(),
        });
        return Ok(DownloadOutcome::SkippedPermanent);
    }

    let mut exit_code = 0;

    for attempt in 0..2 {
        if attempt > 0 {
            progress_callback(ProgressEvent::RetryingDownload {
                url: url.to_string(),
            });
        }

        progress_callback(ProgressEvent::RunningDownloader {
            command_line: downloader.command_line(url, output_dir),
        });

        exit_code = downloader.run(url, output_dir, cancel)?;
        if exit_code == 0 {
            errors.clear(url)?;
            return Ok(DownloadOutcome::Success);
        }
    }

    let entry = errors.record_error(url, downloader.program(), exit_code)?;

    progress_callback(ProgressEvent::DownloadFailed {
        url: url.to_string(),
        fail_count: entry.fail_count,
        permanent: entry.permanent,
    });

    Ok(DownloadOutcome::Failed(entry))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted downloader used by unit tests across the crate

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Downloader that replays scripted exit codes and records every call
    ///
    /// Once the script is exhausted every attempt succeeds.
    #[derive(Default)]
    pub(crate) struct ScriptedDownloader {
        exit_codes: RefCell<VecDeque<i32>>,
        pub(crate) calls: RefCell<Vec<(String, std::path::PathBuf)>>,
    }

    impl ScriptedDownloader {
        pub(crate) fn with_exit_codes(codes: &[i32]) -> Self {
            Self {
                exit_codes: RefCell::new(codes.iter().copied().collect()),
                calls: RefCell::default(),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        pub(crate) fn called_urls(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|(url, _)| url.clone()).collect()
        }
    }

    impl MediaDownloader for ScriptedDownloader {
        fn program(&self) -> &str {
            "svtplay-dl"
        }

        fn run(
            &self,
            url: &str,
            output_dir: &Path,
            _cancel: &CancellationToken,
        ) -> Result<i32, DownloadError> {
            self.calls
                .borrow_mut()
                .push((url.to_string(), output_dir.to_path_buf()));
            Ok(self.exit_codes.borrow_mut().pop_front().unwrap_or(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedDownloader;
    use super::*;

    fn retry(
        downloader: &ScriptedDownloader,
        errors: &mut ErrorStore,
        url: &str,
    ) -> DownloadOutcome {
        download_with_retry(
            downloader,
            errors,
            url,
            Path::new("out"),
            &CancellationToken::new(),
            &mut |_| {},
        )
        .unwrap()
    }

    #[test]
    fn test_default_command_line() {
        let downloader = ScriptedDownloader::default();
        assert_eq!(
            downloader.command_line("https://www.svtplay.se/video/1", Path::new("Downloads/Film")),
            "svtplay-dl -S -o Downloads/Film https://www.svtplay.se/video/1"
        );
    }

    #[test]
    fn test_retry_succeeds_on_second_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let mut errors = ErrorStore::load(&dir.path().join("errors.json"));
        let downloader = ScriptedDownloader::with_exit_codes(&[1, 0]);

        assert_eq!(retry(&downloader, &mut errors, "https://a"), DownloadOutcome::Success);
        assert_eq!(downloader.call_count(), 2);
        assert!(errors.get("https://a").is_none());
    }

    #[test]
    fn test_two_failures_record_one_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut errors = ErrorStore::load(&dir.path().join("errors.json"));
        let downloader = ScriptedDownloader::with_exit_codes(&[1, 3]);

        let outcome = retry(&downloader, &mut errors, "https://a");

        let DownloadOutcome::Failed(entry) = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(entry.fail_count, 1);
        assert_eq!(entry.last_error, "svtplay-dl exited with code 3");
        assert_eq!(downloader.call_count(), 2);
    }

    #[test]
    fn test_three_failed_calls_escalate_to_permanent() {
        let dir = tempfile::tempdir().unwrap();
        let mut errors = ErrorStore::load(&dir.path().join("errors.json"));
        let downloader = ScriptedDownloader::with_exit_codes(&[1; 6]);

        for _ in 0..2 {
            assert!(matches!(
                retry(&downloader, &mut errors, "https://a"),
                DownloadOutcome::Failed(ErrorEntry { permanent: false, .. })
            ));
        }
        assert!(matches!(
            retry(&downloader, &mut errors, "https://a"),
            DownloadOutcome::Failed(ErrorEntry { permanent: true, fail_count: 3, .. })
        ));
        assert_eq!(downloader.call_count(), 6);

        // A fourth call does not launch the downloader at all
        assert_eq!(
            retry(&downloader, &mut errors, "https://a"),
            DownloadOutcome::SkippedPermanent
        );
        assert_eq!(downloader.call_count(), 6);
    }

    #[test]
    fn test_dry_run_keeps_recorded_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.json");
        let original = r#"{"https://a": {"fail_count": 2}}"#;
        std::fs::write(&path, original).unwrap();
        let mut errors = ErrorStore::load_detached(&path);

        let outcome = download_with_retry(
            &SvtplayDl::new("svtplay-dl", true),
            &mut errors,
            "https://a",
            Path::new("out"),
            &CancellationToken::new(),
            &mut |_| {},
        )
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::Success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_success_after_failures_clears_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors.json");
        let mut errors = ErrorStore::load(&path);
        let downloader = ScriptedDownloader::with_exit_codes(&[1, 1]);

        retry(&downloader, &mut errors, "https://a");
        assert_eq!(errors.get("https://a").unwrap().fail_count, 1);

        assert_eq!(retry(&downloader, &mut errors, "https://a"), DownloadOutcome::Success);
        assert!(errors.get("https://a").is_none());
        assert!(ErrorStore::load(&path).get("https://a").is_none());
    }
}
