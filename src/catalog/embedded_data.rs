//! Extraction of the server-rendered `__NEXT_DATA__` payload.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static NEXT_DATA_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<script\s+id="__NEXT_DATA__"[^>]*>(\{.+\})</script>"#).unwrap()
});

/// Locates the inline `__NEXT_DATA__` script of a page and parses its JSON
///
/// Returns `None` if the script is missing or its content is not valid JSON;
/// both mean the page structure was not recognized.
pub fn extract_page_json(html: &str) -> Option<Value> {
    let captures = NEXT_DATA_SCRIPT.captures(html)?;
    serde_json::from_str(captures.get(1)?.as_str()).ok()
}
