//! Category Archiver - Incrementally archive an SVT Play category
//!
//! This library crawls a category listing, discovers its movies and series
//! episodes, hands every new one to an external downloader and remembers what
//! was done, so repeated runs only fetch what is new.

mod cancellation;
mod catalog;
mod cover_image;
mod downloader;
mod file_operations;
mod page_fetcher;
mod state;
mod temp;

use catalog::{CatalogItem, DetailPage, category_entries, category_name, extract_page_json};
use cover_image::{CoverOutcome, POSTER_FILE_NAME, fetch_cover};
use downloader::{DownloadOutcome, download_with_retry};
use state::{ErrorStore, SeenSet, SeriesStateStore};

// Re-export the public surface used by the binary
pub use cancellation::{CancellationToken, Interrupt, install_signal_handler};
pub use catalog::{CatalogError, ItemKind};
pub use cover_image::CoverImageError;
pub use downloader::{DownloadError, MediaDownloader, SvtplayDl};
pub use file_operations::{format_title_folder, sanitize_filename, title_folder_path};
pub use page_fetcher::{FetchError, HttpPageSource, PageSource};
pub use state::{StaleSeries, StateError};

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Category crawled when no URL is given
pub const DEFAULT_CATEGORY_URL: &str = "https://www.svtplay.se/kategori/filmer?tab=all";

/// Settings of one archive run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Category listing to crawl
    pub category_url: String,
    /// Root folder for downloads
    pub output_dir: PathBuf,
    /// Completed movie and series URLs
    pub seen_file: PathBuf,
    /// Downloaded episode URLs
    pub seen_episodes_file: PathBuf,
    /// Series check history
    pub series_state_file: PathBuf,
    /// Download failure counters
    pub errors_file: PathBuf,
    /// Pause between downloads
    pub sleep: Duration,
    /// Days without new episodes before a series is reported as stale
    pub stale_days: i64,
    /// Stop after this many successful downloads (0 = no limit)
    pub max_downloads: usize,
    /// Report what would happen without downloading or writing state
    pub dry_run: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            category_url: DEFAULT_CATEGORY_URL.to_string(),
            output_dir: PathBuf::from("Downloads"),
            seen_file: PathBuf::from("seen_urls.txt"),
            seen_episodes_file: PathBuf::from("seen_episodes.txt"),
            series_state_file: PathBuf::from("series_state.json"),
            errors_file: PathBuf::from("errors.json"),
            sleep: Duration::from_secs(1),
            stale_days: 365,
            max_downloads: 0,
            dry_run: false,
        }
    }
}

/// Progress event emitted during an archive run
///
/// These events allow library users to track progress and provide feedback
/// while the run is going.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Requesting the category listing
    FetchingCategory { url: String },

    /// Category listing parsed
    CategoryLoaded { name: String, item_count: usize },

    /// A listing entry could not be interpreted
    MalformedItem { index: usize, reason: String },

    /// Starting on a listing entry
    ProcessingItem {
        index: usize,
        total: usize,
        kind: ItemKind,
        name_hint: String,
    },

    /// The title is already marked complete
    SkippedSeen { url: String },

    /// Requesting a detail page
    FetchingDetail { url: String },

    /// The detail page could not be fetched
    DetailFetchFailed { url: String, error: String },

    /// Target folder of the title
    FolderPrepared { path: PathBuf },

    /// The target folder could not be created
    FolderFailed { path: PathBuf, error: String },

    /// Fetching the cover image
    DownloadingPoster { path: PathBuf },

    /// Dry run: the poster would be downloaded
    PosterDryRun { path: PathBuf },

    /// Poster saved
    PosterSaved { bytes: u64 },

    /// Poster could not be downloaded (not fatal)
    PosterFailed { error: String },

    /// Episode discovery result for a series
    EpisodesFound {
        total: usize,
        new: usize,
        permanently_failed: usize,
    },

    /// Starting on a new episode
    ProcessingEpisode {
        index: usize,
        total: usize,
        url: String,
    },

    /// URL skipped because it failed too often
    PermanentErrorSkip { url: String },

    /// About to run the external downloader
    RunningDownloader { command_line: String },

    /// First attempt failed, trying once more
    RetryingDownload { url: String },

    /// Both attempts failed
    DownloadFailed {
        url: String,
        fail_count: u32,
        permanent: bool,
    },

    /// The downloader could not be run at all
    DownloadAborted { url: String, error: String },

    /// Pausing before the next download
    Waiting { duration: Duration },

    /// Leaving the loop because a stop was requested
    StopRequested,

    /// Leaving the loop because the download limit was reached
    DownloadLimitReached { limit: usize },
}

/// Counters and findings of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub movies_downloaded: usize,
    pub episodes_downloaded: usize,
    pub series_checked: usize,
    pub skipped_seen: usize,
    pub skipped_permanent: usize,
    pub errors: usize,
    /// Whether the run ended because of an interrupt
    pub interrupted: bool,
    /// Series that look finished and are not yet marked complete
    pub stale_series: Vec<StaleSeries>,
}

impl RunSummary {
    /// Movies plus episodes downloaded
    pub fn total_downloads(&self) -> usize {
        self.movies_downloaded + self.episodes_downloaded
    }
}

/// Top-level error type for archiver operations
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// The category page could not be fetched
    #[error("Failed to fetch category page: {0}")]
    CategoryFetch(#[source] FetchError),

    /// The category page has no embedded catalog data
    #[error("Could not extract JSON data from category page")]
    UnrecognizedCategoryPage,

    /// The category page lists nothing
    #[error("No items found. The page structure may have changed.")]
    EmptyCategory,

    /// Error reading or writing state files
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Download aborted the run
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),
}

/// Marks a movie or series URL as complete
///
/// Returns `false` if it already was. Touches only the seen file.
pub fn mark_complete(seen_file: &Path, url: &str) -> Result<bool, ArchiverError> {
    let mut seen = SeenSet::load(seen_file)?;
    if seen.contains(url) {
        return Ok(false);
    }
    seen.append(url)?;
    Ok(true)
}

/// Removes a URL from the seen file so it is checked again
///
/// Returns `false` if the URL was not in the file.
pub fn unmark_complete(seen_file: &Path, url: &str) -> Result<bool, ArchiverError> {
    let mut seen = SeenSet::load(seen_file)?;
    Ok(seen.remove(url)?)
}

/// Archives every movie and episode of a category
///
/// Fetches the category listing, then processes one title at a time: the
/// detail page is fetched, a `<output>/<category>/<title> (<year>)` folder is
/// prepared together with its poster, and every URL not seen before is handed
/// to `downloader`. All state files are updated as the run progresses, so an
/// interrupted run loses at most the download in flight.
///
/// Progress events are emitted through the provided callback, allowing library
/// users to track progress, display status, or remain silent.
///
/// # Arguments
///
/// * `config` - Paths, pacing and limits of the run
/// * `source` - Where pages and images are fetched from
/// * `downloader` - The external tool that downloads one URL
/// * `cancel` - Checked before every title, episode and pause
/// * `progress_callback` - Closure called with progress events
///
/// # Errors
///
/// Fails if the category page cannot be fetched or understood, if a state
/// file cannot be written, or if a forced quit interrupts a download. Problems
/// with single titles are counted in the summary instead.
///
/// # Examples
///
/// ```no_run
/// use category_archiver::{archive_category, CancellationToken, HttpPageSource, RunConfig, SvtplayDl};
///
/// let source = HttpPageSource::new().unwrap();
/// let summary = archive_category(
///     &RunConfig::default(),
///     &source,
///     &SvtplayDl::default(),
///     &CancellationToken::new(),
///     |event| println!("{:?}", event),
/// )
/// .unwrap();
/// println!("Downloaded {} file(s)", summary.total_downloads());
/// ```
pub fn archive_category<F>(
    config: &RunConfig,
    source: &dyn PageSource,
    downloader: &dyn MediaDownloader,
    cancel: &CancellationToken,
    mut progress_callback: F,
) -> Result<RunSummary, ArchiverError>
where
    F: FnMut(ProgressEvent),
{
    let seen = SeenSet::load(&config.seen_file)?;
    let seen_episodes = SeenSet::load(&config.seen_episodes_file)?;
    let series_state = SeriesStateStore::load(&config.series_state_file);
    let errors = if config.dry_run {
        ErrorStore::load_detached(&config.errors_file)
    } else {
        ErrorStore::load(&config.errors_file)
    };
    tracing::debug!(
        seen = seen.len(),
        seen_episodes = seen_episodes.len(),
        errors = errors.len(),
        "state loaded"
    );

    progress_callback(ProgressEvent::FetchingCategory {
        url: config.category_url.clone(),
    });

    let html = source
        .fetch_page(&config.category_url)
        .map_err(ArchiverError::CategoryFetch)?;
    let page = extract_page_json(&html).ok_or(ArchiverError::UnrecognizedCategoryPage)?;

    let category = category_name(&page, &config.category_url);
    let entries = category_entries(&page);

    progress_callback(ProgressEvent::CategoryLoaded {
        name: category.clone(),
        item_count: entries.len(),
    });

    if entries.is_empty() {
        return Err(ArchiverError::EmptyCategory);
    }

    let mut run = ArchiveRun {
        config,
        source,
        downloader,
        cancel,
        seen,
        seen_episodes,
        series_state,
        errors,
        summary: RunSummary::default(),
        progress_callback,
    };

    for (index, entry) in entries.iter().enumerate() {
        if run.cancel.is_stop_requested() {
            (run.progress_callback)(ProgressEvent::StopRequested);
            break;
        }
        if run.download_limit_reached() {
            (run.progress_callback)(ProgressEvent::DownloadLimitReached {
                limit: config.max_downloads,
            });
            break;
        }

        let item = match CatalogItem::from_entry(entry) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping malformed catalog entry");
                (run.progress_callback)(ProgressEvent::MalformedItem {
                    index,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        (run.progress_callback)(ProgressEvent::ProcessingItem {
            index,
            total: entries.len(),
            kind: item.kind,
            name_hint: item.name_hint.clone(),
        });

        if run.seen.contains(&item.url) {
            (run.progress_callback)(ProgressEvent::SkippedSeen { url: item.url });
            run.summary.skipped_seen += 1;
            continue;
        }

        if run.process_item(&item, &category)? && index + 1 < entries.len() {
            run.pause();
        }
    }

    let mut summary = run.summary;
    summary.interrupted = cancel.is_stop_requested();
    summary.stale_series = run
        .series_state
        .find_stale(config.stale_days)
        .into_iter()
        .filter(|stale| !run.seen.contains(&stale.url))
        .collect();

    Ok(summary)
}

/// Mutable state of one archive run
struct ArchiveRun<'a, F> {
    config: &'a RunConfig,
    source: &'a dyn PageSource,
    downloader: &'a dyn MediaDownloader,
    cancel: &'a CancellationToken,
    seen: SeenSet,
    seen_episodes: SeenSet,
    series_state: SeriesStateStore,
    errors: ErrorStore,
    summary: RunSummary,
    progress_callback: F,
}

impl<F> ArchiveRun<'_, F>
where
    F: FnMut(ProgressEvent),
{
    fn download_limit_reached(&self) -> bool {
        self.config.max_downloads > 0 && self.summary.total_downloads() >= self.config.max_downloads
    }

    /// Sleeps between downloads unless a stop is pending
    fn pause(&mut self) {
        if self.config.sleep.is_zero() || self.cancel.is_stop_requested() {
            return;
        }
        (self.progress_callback)(ProgressEvent::Waiting {
            duration: self.config.sleep,
        });
        thread::sleep(self.config.sleep);
    }

    /// Processes one title that is not yet complete
    ///
    /// Returns whether a download was attempted, which is what the pause
    /// between titles is for.
    fn process_item(&mut self, item: &CatalogItem, category: &str) -> Result<bool, ArchiverError> {
        (self.progress_callback)(ProgressEvent::FetchingDetail {
            url: item.url.clone(),
        });

        let html = match self.source.fetch_page(&item.url) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!(url = %item.url, error = %e, "detail page fetch failed");
                (self.progress_callback)(ProgressEvent::DetailFetchFailed {
                    url: item.url.clone(),
                    error: e.to_string(),
                });
                self.summary.errors += 1;
                return Ok(false);
            }
        };

        let detail = DetailPage::parse(&html);
        let title = detail
            .metadata
            .title
            .clone()
            .unwrap_or_else(|| item.name_hint.clone());

        let folder = title_folder_path(
            &self.config.output_dir,
            category,
            &title,
            detail.metadata.year.as_deref(),
        );

        if !self.config.dry_run {
            if let Err(e) = fs::create_dir_all(&folder) {
                tracing::error!(path = %folder.display(), error = %e, "cannot create title folder");
                (self.progress_callback)(ProgressEvent::FolderFailed {
                    path: folder,
                    error: e.to_string(),
                });
                self.summary.errors += 1;
                return Ok(false);
            }
        }
        (self.progress_callback)(ProgressEvent::FolderPrepared {
            path: folder.clone(),
        });

        if let Some(image_url) = &detail.metadata.image_url {
            self.fetch_poster(image_url, &folder);
        }

        match item.kind {
            ItemKind::Movie => self.process_movie(item, &folder),
            ItemKind::Series => {
                self.process_series(item, &title, &detail.episodes, &folder)?;
                Ok(true)
            }
        }
    }

    /// Downloads the poster if it is missing; failures are only reported
    fn fetch_poster(&mut self, image_url: &str, folder: &Path) {
        let poster = folder.join(POSTER_FILE_NAME);
        if poster.exists() {
            return;
        }

        if self.config.dry_run {
            (self.progress_callback)(ProgressEvent::PosterDryRun { path: poster });
            return;
        }

        (self.progress_callback)(ProgressEvent::DownloadingPoster {
            path: poster.clone(),
        });

        match fetch_cover(self.source, image_url, &poster) {
            Ok(CoverOutcome::Downloaded { bytes }) => {
                (self.progress_callback)(ProgressEvent::PosterSaved { bytes });
            }
            Ok(CoverOutcome::AlreadyPresent) => {}
            Err(e) => {
                tracing::warn!(url = image_url, error = %e, "poster download failed");
                (self.progress_callback)(ProgressEvent::PosterFailed {
                    error: e.to_string(),
                });
            }
        }
    }

    fn process_movie(&mut self, item: &CatalogItem, folder: &Path) -> Result<bool, ArchiverError> {
        if self.errors.is_permanent(&item.url) {
            (self.progress_callback)(ProgressEvent::PermanentErrorSkip {
                url: item.url.clone(),
            });
            self.summary.skipped_permanent += 1;
            return Ok(false);
        }

        if self.download(&item.url, folder)? {
            if self.config.dry_run {
                self.seen.insert(&item.url);
            } else {
                self.seen.append(&item.url)?;
            }
            self.summary.movies_downloaded += 1;
        } else {
            self.summary.errors += 1;
        }

        Ok(true)
    }

    fn process_series(
        &mut self,
        item: &CatalogItem,
        title: &str,
        episodes: &[String],
        folder: &Path,
    ) -> Result<(), ArchiverError> {
        self.summary.series_checked += 1;

        let permanently_failed = episodes
            .iter()
            .filter(|url| self.errors.is_permanent(url))
            .count();
        let new_episodes: Vec<&String> = episodes
            .iter()
            .filter(|url| !self.seen_episodes.contains(url) && !self.errors.is_permanent(url))
            .collect();

        self.summary.skipped_permanent += permanently_failed;
        (self.progress_callback)(ProgressEvent::EpisodesFound {
            total: episodes.len(),
            new: new_episodes.len(),
            permanently_failed,
        });

        let mut found_new = false;

        for (index, url) in new_episodes.iter().enumerate() {
            if self.cancel.is_stop_requested() || self.download_limit_reached() {
                break;
            }

            (self.progress_callback)(ProgressEvent::ProcessingEpisode {
                index,
                total: new_episodes.len(),
                url: url.to_string(),
            });

            if self.download(url, folder)? {
                if self.config.dry_run {
                    self.seen_episodes.insert(url);
                } else {
                    self.seen_episodes.append(url)?;
                }
                self.summary.episodes_downloaded += 1;
                found_new = true;
            } else {
                self.summary.errors += 1;
            }

            if index + 1 < new_episodes.len() {
                self.pause();
            }
        }

        if !self.config.dry_run {
            self.series_state.update(&item.url, found_new, title)?;
        }

        Ok(())
    }

    /// Runs the downloader with retry; returns whether it succeeded
    ///
    /// Failures of a single URL are absorbed here. Only a forced quit or a
    /// state file that cannot be written abort the run.
    fn download(&mut self, url: &str, folder: &Path) -> Result<bool, ArchiverError> {
        let outcome = download_with_retry(
            self.downloader,
            &mut self.errors,
            url,
            folder,
            self.cancel,
            &mut self.progress_callback,
        );

        match outcome {
            Ok(DownloadOutcome::Success) => Ok(true),
            Ok(DownloadOutcome::SkippedPermanent | DownloadOutcome::Failed(_)) => Ok(false),
            Err(e @ (DownloadError::Interrupted { .. } | DownloadError::State(_))) => Err(e.into()),
            Err(e) => {
                tracing::error!(url, error = %e, "downloader could not be run");
                (self.progress_callback)(ProgressEvent::DownloadAborted {
                    url: url.to_string(),
                    error: e.to_string(),
                });
                Ok(false)
            }
        }
    }
}
