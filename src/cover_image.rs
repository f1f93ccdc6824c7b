//! Cover image download
//!
//! Fetches the poster shown by media servers next to the downloaded files.
//! A missing poster never stops an archive run, so callers treat every error
//! from this module as a warning.

use crate::page_fetcher::{FetchError, PageSource};
use crate::temp::create_sibling_temp;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the poster inside a title folder
pub const POSTER_FILE_NAME: &str = "poster.jpg";

/// Errors that can occur while fetching a cover image
#[derive(Debug, Error)]
pub enum CoverImageError {
    /// The image could not be requested
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Reading the response or writing the file failed
    #[error("Failed to write cover image {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The server answered with something that is clearly not an image
    #[error("Response from {url} is not an image (detected {mime_type})")]
    NotAnImage { url: String, mime_type: String },

    /// The server answered with an empty body
    #[error("Response from {url} was empty")]
    EmptyBody { url: String },
}

/// Result of a successful cover fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverOutcome {
    /// The destination already existed, nothing was fetched
    AlreadyPresent,
    /// The image was downloaded
    Downloaded { bytes: u64 },
}

/// Downloads `url` to `destination` unless the destination already exists
///
/// The body is streamed in 8KB chunks into a temporary sibling file which is
/// renamed onto the destination once complete. On any failure the partial
/// file is removed.
pub fn fetch_cover(
    source: &dyn PageSource,
    url: &str,
    destination: &Path,
) -> Result<CoverOutcome, CoverImageError> {
    if destination.exists() {
        return Ok(CoverOutcome::AlreadyPresent);
    }

    let write_failed = |e: std::io::Error| CoverImageError::WriteFailed {
        path: destination.to_path_buf(),
        source: e,
    };

    let mut response = source.open_stream(url)?;
    let (guard, mut file) = create_sibling_temp(destination).map_err(write_failed)?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0; 8192]; // 8KB buffer

    loop {
        let bytes_read = response.read(&mut buffer).map_err(write_failed)?;

        if bytes_read == 0 {
            break; // EOF
        }

        if downloaded == 0 {
            check_image_signature(url, &buffer[..bytes_read])?;
        }

        file.write_all(&buffer[..bytes_read]).map_err(write_failed)?;
        downloaded += bytes_read as u64;
    }

    if downloaded == 0 {
        return Err(CoverImageError::EmptyBody {
            url: url.to_string(),
        });
    }

    file.flush().map_err(write_failed)?;
    drop(file);

    guard.persist(destination).map_err(write_failed)?;

    Ok(CoverOutcome::Downloaded { bytes: downloaded })
}

/// Rejects bodies whose magic bytes identify a non-image type
///
/// Unknown signatures are accepted; only positively identified other types
/// (typically an HTML error page) are refused.
fn check_image_signature(url: &str, head: &[u8]) -> Result<(), CoverImageError> {
    match infer::get(head) {
        Some(kind) if kind.matcher_type() != infer::MatcherType::Image => {
            Err(CoverImageError::NotAnImage {
                url: url.to_string(),
                mime_type: kind.mime_type().to_string(),
            })
        }
        _ => Ok(()),
    }
}
