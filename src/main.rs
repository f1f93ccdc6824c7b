use category_archiver::{
    CancellationToken, HttpPageSource, ProgressEvent, RunConfig, RunSummary, SvtplayDl,
    archive_category, install_signal_handler, mark_complete, unmark_complete,
};
use clap::Parser;
use humansize::{DECIMAL, format_size};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const RULE_WIDTH: usize = 60;

/// Download all movies and series from an SVT Play category using svtplay-dl
#[derive(Parser, Debug)]
#[command(name = "category_archiver", version, long_about = None)]
struct Cli {
    /// Category URL to crawl
    #[arg(long, default_value = category_archiver::DEFAULT_CATEGORY_URL)]
    url: String,

    /// Root output directory
    #[arg(long, default_value = "Downloads")]
    output_dir: PathBuf,

    /// File tracking completed movies and series
    #[arg(long, default_value = "seen_urls.txt")]
    seen_file: PathBuf,

    /// File tracking downloaded episodes
    #[arg(long, default_value = "seen_episodes.txt")]
    seen_episodes_file: PathBuf,

    /// File tracking series check history
    #[arg(long, default_value = "series_state.json")]
    series_state_file: PathBuf,

    /// File tracking download failures
    #[arg(long, default_value = "errors.json")]
    errors_file: PathBuf,

    /// Seconds to sleep between downloads
    #[arg(long, default_value_t = 1.0, value_parser = parse_seconds)]
    sleep: f64,

    /// Days without new episodes before a series is reported as stale
    #[arg(long, default_value_t = 365)]
    stale_days: i64,

    /// Stop after this many downloads (0 = unlimited)
    #[arg(long = "max-dl", default_value_t = 0)]
    max_dl: usize,

    /// Show what would be downloaded without downloading
    #[arg(long)]
    dry_run: bool,

    /// Mark a series or movie URL as complete and exit
    #[arg(long, value_name = "URL", conflicts_with = "unmark_complete")]
    mark_complete: Option<String>,

    /// Remove a URL from the seen file so it is re-checked, and exit
    #[arg(long, value_name = "URL")]
    unmark_complete: Option<String>,

    /// Downloader executable to run
    #[arg(long, default_value = "svtplay-dl")]
    downloader: String,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_seconds(raw: &str) -> Result<f64, String> {
    let seconds: f64 = raw.parse().map_err(|_| format!("not a number: {}", raw))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err("must be zero or a positive number of seconds".to_string());
    }
    Ok(seconds)
}

impl Cli {
    fn run_config(&self) -> RunConfig {
        RunConfig {
            category_url: self.url.clone(),
            output_dir: self.output_dir.clone(),
            seen_file: self.seen_file.clone(),
            seen_episodes_file: self.seen_episodes_file.clone(),
            series_state_file: self.series_state_file.clone(),
            errors_file: self.errors_file.clone(),
            sleep: Duration::from_secs_f64(self.sleep),
            stale_days: self.stale_days,
            max_downloads: self.max_dl,
            dry_run: self.dry_run,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("category_archiver={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::FetchingCategory { url } => {
            println!("Fetching category page: {}", url);
        }
        ProgressEvent::CategoryLoaded { name, item_count } => {
            println!("Category: {}", name);
            println!("Found {} items in category listing.", item_count);
        }
        ProgressEvent::MalformedItem { index, reason } => {
            println!("\n  WARNING: Skipping malformed item #{}: {}", index, reason);
        }
        ProgressEvent::ProcessingItem {
            index,
            total,
            kind,
            name_hint,
        } => {
            println!("\n[{}/{}] {}: {}", index + 1, total, kind.label(), name_hint);
        }
        ProgressEvent::SkippedSeen { .. } => {
            println!("  Skipped (in seen file)");
        }
        ProgressEvent::FetchingDetail { url } => {
            println!("  Fetching: {}", url);
        }
        ProgressEvent::DetailFetchFailed { error, .. } => {
            eprintln!("  ERROR fetching detail page: {}", error);
        }
        ProgressEvent::FolderPrepared { path } => {
            println!("  -> {}", path.display());
        }
        ProgressEvent::FolderFailed { path, error } => {
            eprintln!("  ERROR creating {}: {}", path.display(), error);
        }
        ProgressEvent::DownloadingPoster { .. } => {
            println!("  Downloading poster...");
        }
        ProgressEvent::PosterDryRun { path } => {
            println!("  Downloading poster...");
            println!("  >> (dry-run) download poster -> {}", path.display());
        }
        ProgressEvent::PosterSaved { bytes } => {
            println!("  Poster saved ({})", format_size(bytes, DECIMAL));
        }
        ProgressEvent::PosterFailed { error } => {
            eprintln!("  WARNING: Image download failed: {}", error);
        }
        ProgressEvent::EpisodesFound {
            total,
            new,
            permanently_failed,
        } => {
            if permanently_failed > 0 {
                println!(
                    "  Episodes: {} total, {} new, {} permanently failed",
                    total, new, permanently_failed
                );
            } else {
                println!("  Episodes: {} total, {} new", total, new);
            }
        }
        ProgressEvent::ProcessingEpisode { index, total, url } => {
            println!("  Episode [{}/{}]: {}", index + 1, total, url);
        }
        ProgressEvent::PermanentErrorSkip { url } => {
            println!("  SKIP (permanent error): {} - see errors file", url);
        }
        ProgressEvent::RunningDownloader { command_line } => {
            println!("  >> {}", command_line);
        }
        ProgressEvent::RetryingDownload { url } => {
            println!("  Retrying {} ...", url);
        }
        ProgressEvent::DownloadFailed {
            url,
            fail_count,
            permanent,
        } => {
            if permanent {
                eprintln!(
                    "  PERMANENT ERROR: {} (failed {} times total)",
                    url, fail_count
                );
            } else {
                eprintln!(
                    "  ERROR: {} (will retry next run, {} failures total)",
                    url, fail_count
                );
            }
        }
        ProgressEvent::DownloadAborted { url, error } => {
            eprintln!("  ERROR: {}: {}", url, error);
        }
        ProgressEvent::Waiting { .. } => {}
        ProgressEvent::StopRequested => {
            println!("\nStopping as requested.");
        }
        ProgressEvent::DownloadLimitReached { limit } => {
            println!("\nReached --max-dl={}. Stopping.", limit);
        }
    }
}

fn print_rule() {
    println!("{}", "=".repeat(RULE_WIDTH));
}

fn print_report(summary: &RunSummary) {
    if !summary.stale_series.is_empty() {
        let program = std::env::args()
            .next()
            .unwrap_or_else(|| "category_archiver".to_string());

        println!();
        print_rule();
        println!("STALE SERIES - consider marking as complete:");
        print_rule();
        for stale in &summary.stale_series {
            println!(
                "\n  \"{}\" - no new episodes for {} days (checked {} times)",
                stale.name, stale.days, stale.check_count
            );
            println!("    {} --mark-complete {}", program, stale.url);
        }
    }

    println!();
    print_rule();
    println!("SUMMARY");
    print_rule();
    println!("  Movies downloaded:       {}", summary.movies_downloaded);
    println!("  Episodes downloaded:     {}", summary.episodes_downloaded);
    println!("  Series checked:          {}", summary.series_checked);
    println!("  Skipped (already seen):  {}", summary.skipped_seen);
    println!("  Skipped (perm. error):   {}", summary.skipped_permanent);
    println!("  Errors this run:         {}", summary.errors);
    if summary.interrupted {
        println!("  (Run was interrupted by user)");
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(url) = &cli.mark_complete {
        match mark_complete(&cli.seen_file, url) {
            Ok(true) => println!("Marked as complete: {}", url),
            Ok(false) => println!("Already marked as complete: {}", url),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if let Some(url) = &cli.unmark_complete {
        match unmark_complete(&cli.seen_file, url) {
            Ok(true) => println!("Unmarked (will be re-checked): {}", url),
            Ok(false) => println!("Not found in seen file: {}", url),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    let cancel = CancellationToken::new();
    if let Err(e) = install_signal_handler(cancel.clone()) {
        eprintln!("Error: Failed to install signal handler: {}", e);
        process::exit(1);
    }

    let source = match HttpPageSource::new() {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let downloader = SvtplayDl::new(cli.downloader.clone(), cli.dry_run);
    let config = cli.run_config();

    match archive_category(&config, &source, &downloader, &cancel, handle_progress_event) {
        Ok(summary) => print_report(&summary),
        Err(e) => {
            eprintln!("\nError: {}", e);
            process::exit(1);
        }
    }
}
