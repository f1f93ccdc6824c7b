//! Page fetching module
//!
//! This module issues the HTTP requests for category pages, detail pages and
//! cover images. Requests carry a browser-like header set so the site serves
//! the same server-rendered markup a regular visitor gets.

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

/// User agent sent with every request
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

const BROWSER_ACCEPT_LANGUAGE: &str = "sv-SE,sv;q=0.9,en-US;q=0.8,en;q=0.7";

/// Timeout for HTML page requests
const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for streamed image downloads
const STREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors that can occur while fetching remote resources
#[derive(Debug, Error)]
pub enum FetchError {
    /// Failed to build the HTTP client
    #[error("Failed to initialize HTTP client: {0}")]
    ClientSetup(reqwest::Error),

    /// The request could not be completed
    #[error("Request to {url} failed: {source}")]
    RequestFailed { url: String, source: reqwest::Error },

    /// The server answered with a non-success status
    #[error("HTTP {status} while fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// The response body could not be read or decoded
    #[error("Failed to read response body from {url}: {source}")]
    BodyFailed { url: String, source: reqwest::Error },
}

/// Source of remote pages and binary streams
///
/// The orchestrator only talks to the network through this trait, which keeps
/// the crawl logic independent of the HTTP client in use.
pub trait PageSource {
    /// Fetches a page and returns its decoded text
    ///
    /// The response's declared charset is honored, falling back to UTF-8 with
    /// replacement characters for invalid sequences.
    fn fetch_page(&self, url: &str) -> Result<String, FetchError>;

    /// Opens a binary stream for the given URL (used for cover images)
    fn open_stream(&self, url: &str) -> Result<Box<dyn Read>, FetchError>;
}

/// `PageSource` backed by a blocking reqwest client
pub struct HttpPageSource {
    page_client: reqwest::blocking::Client,
    stream_client: reqwest::blocking::Client,
}

impl HttpPageSource {
    /// Creates a new HTTP page source with browser-like default headers
    pub fn new() -> Result<Self, FetchError> {
        let mut page_headers = HeaderMap::new();
        page_headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        page_headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        page_headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
        );

        let page_client = reqwest::blocking::Client::builder()
            .default_headers(page_headers)
            .timeout(PAGE_TIMEOUT)
            .build()
            .map_err(FetchError::ClientSetup)?;

        // Image requests only identify themselves, like a browser's <img> fetch
        let stream_client = reqwest::blocking::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(STREAM_TIMEOUT)
            .build()
            .map_err(FetchError::ClientSetup)?;

        Ok(Self {
            page_client,
            stream_client,
        })
    }

    /// Sends a GET request and ensures a success status
    fn get(
        client: &reqwest::blocking::Client,
        url: &str,
    ) -> Result<reqwest::blocking::Response, FetchError> {
        tracing::debug!(url, "GET");

        let response = client
            .get(url)
            .send()
            .map_err(|e| FetchError::RequestFailed {
                url: url.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(response)
    }
}

impl PageSource for HttpPageSource {
    fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let response = Self::get(&self.page_client, url)?;

        response.text().map_err(|e| FetchError::BodyFailed {
            url: url.to_string(),
            source: e,
        })
    }

    fn open_stream(&self, url: &str) -> Result<Box<dyn Read>, FetchError> {
        let response = Self::get(&self.stream_client, url)?;
        Ok(Box::new(response))
    }
}
