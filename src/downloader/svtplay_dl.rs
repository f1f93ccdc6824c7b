//! svtplay-dl based downloader
//!
//! Runs the external `svtplay-dl` executable (or a compatible replacement)
//! as a child process.

use super::{DownloadError, EXIT_CODE_NOT_FOUND, MediaDownloader};
use crate::cancellation::CancellationToken;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

/// How often a running child is checked for completion or a forced quit
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default executable name
pub const DEFAULT_PROGRAM: &str = "svtplay-dl";

/// Downloader invoking `svtplay-dl -S -o <dir> <url>`
pub struct SvtplayDl {
    /// Executable to run
    program: String,
    /// Only report what would run
    dry_run: bool,
}

impl SvtplayDl {
    /// Creates a downloader running `program`
    pub fn new(program: impl Into<String>, dry_run: bool) -> Self {
        Self {
            program: program.into(),
            dry_run,
        }
    }

    /// Builds the command for one download
    ///
    /// On Unix the child gets its own process group, so a Ctrl+C in the
    /// terminal reaches only the archiver and the running download can finish.
    fn command(&self, url: &str, output_dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(self.arguments(url, output_dir));

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        command
    }
}

impl Default for SvtplayDl {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, false)
    }
}

impl MediaDownloader for SvtplayDl {
    fn program(&self) -> &str {
        &self.program
    }

    fn run(
        &self,
        url: &str,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<i32, DownloadError> {
        if self.dry_run {
            return Ok(0);
        }

        // Mark the child as running before it exists, so a forced quit arriving
        // during spawn is left to the poll loop below.
        let _running = cancel.track_child();

        tracing::debug!(command = %self.command_line(url, output_dir), "spawning downloader");

        let mut child = match self.command(url, output_dir).spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::error!(program = %self.program, "downloader not found in PATH");
                return Ok(EXIT_CODE_NOT_FOUND);
            }
            Err(e) => {
                return Err(DownloadError::SpawnFailed {
                    program: self.program.clone(),
                    source: e,
                });
            }
        };

        let wait_failed = |e: std::io::Error| DownloadError::WaitFailed {
            program: self.program.clone(),
            source: e,
        };

        loop {
            if cancel.is_forced() {
                tracing::warn!(url, "killing downloader after forced quit");
                let _ = child.kill();
                let _ = child.wait();
                return Err(DownloadError::Interrupted {
                    url: url.to_string(),
                });
            }

            if let Some(status) = child.try_wait().map_err(wait_failed)? {
                // Killed by a signal: no exit code, still a failure
                return Ok(status.code().unwrap_or(-1));
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_never_spawns() {
        let downloader = SvtplayDl::new("definitely-not-an-installed-program", true);
        let code = downloader
            .run("https://a", Path::new("out"), &CancellationToken::new())
            .unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn test_missing_program_reports_127() {
        let downloader = SvtplayDl::new("definitely-not-an-installed-program", false);
        let code = downloader
            .run("https://a", Path::new("out"), &CancellationToken::new())
            .unwrap();
        assert_eq!(code, EXIT_CODE_NOT_FOUND);
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_is_reported() {
        // `false` ignores its arguments and exits with 1
        let failing = SvtplayDl::new("false", false);
        let code = failing
            .run("https://a", Path::new("out"), &CancellationToken::new())
            .unwrap();
        assert_eq!(code, 1);

        let succeeding = SvtplayDl::new("true", false);
        let code = succeeding
            .run("https://a", Path::new("out"), &CancellationToken::new())
            .unwrap();
        assert_eq!(code, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_forced_quit_kills_running_download() {
        let cancel = CancellationToken::new();
        cancel.interrupt();
        cancel.interrupt();

        let result = SvtplayDl::new("sleep", false).run("https://a", Path::new("out"), &cancel);

        assert!(matches!(result, Err(DownloadError::Interrupted { url }) if url == "https://a"));
        assert!(!cancel.is_child_running());
    }
}
