//! Data structures and lookups for the SVT Play catalog.
//!
//! Category and detail pages embed their server-rendered state as one large
//! JSON blob. This module extracts that blob and walks it to recover the
//! listing, per-title metadata and the episodes of a series.
mod cover_markup;
mod embedded_data;
mod navigator;

pub use embedded_data::extract_page_json;
pub use navigator::{category_entries, category_name};

use serde_json::Value;
use thiserror::Error;

/// Base URL that relative catalog paths are resolved against
pub const SITE_BASE_URL: &str = "https://www.svtplay.se";

/// Base of the static image service used for cover art
pub const STATIC_IMAGE_BASE_URL: &str = "https://www.svtstatic.se/image/original/default";

/// Errors that can occur while interpreting catalog data
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A listing entry lacks the fields needed to process it
    #[error("Malformed catalog entry: missing {0}")]
    MalformedItem(&'static str),

    /// A relative path could not be resolved against the site base URL
    #[error("Invalid catalog path {path:?}: {source}")]
    InvalidPath {
        path: String,
        source: url::ParseError,
    },
}

/// Whether a catalog entry is a single movie or a series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Movie,
    Series,
}

impl ItemKind {
    /// Human readable label used in progress output
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Movie => "Movie",
            ItemKind::Series => "Series",
        }
    }
}

/// A movie or series stub found on a category page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// Absolute URL of the title's detail page
    pub url: String,
    /// Movie or series
    pub kind: ItemKind,
    /// Last path segment of the URL, used when the detail page has no title
    pub name_hint: String,
}

impl CatalogItem {
    /// Builds a catalog item from one raw `selection.items` entry
    pub fn from_entry(entry: &Value) -> Result<Self, CatalogError> {
        let item = entry
            .get("item")
            .ok_or(CatalogError::MalformedItem("item"))?;

        let path = item
            .get("urls")
            .and_then(|urls| urls.get("svtplay"))
            .and_then(Value::as_str)
            .ok_or(CatalogError::MalformedItem("item.urls.svtplay"))?;

        let url = resolve_site_url(path)?;

        let kind = if item.get("__typename").and_then(Value::as_str) == Some("Single") {
            ItemKind::Movie
        } else {
            ItemKind::Series
        };

        let name_hint = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            url,
            kind,
            name_hint,
        })
    }
}

/// Metadata resolved from a detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailMetadata {
    /// Canonical title of the movie or series
    pub title: Option<String>,
    /// Production year
    pub year: Option<String>,
    /// Cover image URL
    pub image_url: Option<String>,
}

/// Everything the orchestrator needs from one detail page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailPage {
    /// Title, year and cover image
    pub metadata: DetailMetadata,
    /// Playable URLs in first-seen order, without duplicates
    ///
    /// For a movie this is the movie's own URL.
    pub episodes: Vec<String>,
}

impl DetailPage {
    /// Parses a detail page's HTML
    ///
    /// An unrecognized page structure yields empty metadata and no episodes.
    pub fn parse(html: &str) -> Self {
        let details = extract_page_json(html).and_then(|page| navigator::find_details(&page));

        let Some(details) = details else {
            return Self::default();
        };

        let mut metadata = navigator::metadata_from_details(&details);
        if metadata.image_url.is_none() {
            metadata.image_url = cover_markup::image_from_markup(html);
        }

        Self {
            metadata,
            episodes: navigator::discover_episodes(&details),
        }
    }
}

/// Resolves a (usually relative) catalog path against the site base URL
pub fn resolve_site_url(path: &str) -> Result<String, CatalogError> {
    url::Url::parse(SITE_BASE_URL)
        .and_then(|base| base.join(path))
        .map(String::from)
        .map_err(|e| CatalogError::InvalidPath {
            path: path.to_string(),
            source: e,
        })
}
