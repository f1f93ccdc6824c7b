//! Lookups over the embedded page state.
//!
//! The page JSON keeps its GraphQL cache under `props.urqlState`. Every entry
//! in there carries a `data` field that is itself a JSON-encoded string, so
//! each one is parsed again before inspection. All functions here are pure and
//! never assume structure they have not checked.

use super::{DetailMetadata, STATIC_IMAGE_BASE_URL, resolve_site_url};
use serde_json::Value;

/// Module ids on a detail page that never contain episodes
const NON_EPISODE_MODULES: &[&str] = &["upcoming", "related"];

/// Follows a chain of object keys, stopping at the first non-object
fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

/// Renders a scalar JSON value the way it should appear in text
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Parses every `urqlState` entry, skipping those that are not valid JSON
fn state_entries(page: &Value) -> impl Iterator<Item = Value> + '_ {
    lookup(page, &["props", "urqlState"])
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|state| state.values())
        .filter_map(|entry| entry.get("data")?.as_str())
        .filter_map(|data| serde_json::from_str::<Value>(data).ok())
}

/// Returns all objects stored under `key` in the parsed state entries
fn objects_named<'a>(page: &'a Value, key: &'a str) -> impl Iterator<Item = Value> + 'a {
    state_entries(page).filter_map(move |mut entry| match entry.get_mut(key).map(Value::take) {
        Some(found @ Value::Object(_)) => Some(found),
        _ => None,
    })
}

/// Resolves the display name of a category page
///
/// Prefers the page's own heading or name. Otherwise the slug following
/// `/kategori/` in the URL is turned into words, and as a last resort
/// `"Unknown"` is returned.
pub fn category_name(page: &Value, url: &str) -> String {
    for category in objects_named(page, "categoryPage") {
        for field in ["heading", "name"] {
            if let Some(name) = category.get(field).and_then(Value::as_str) {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
    }

    category_name_from_url(url).unwrap_or_else(|| "Unknown".to_string())
}

/// Derives a category name from a `/kategori/<slug>` URL
fn category_name_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["kategori", slug, ..] => Some(title_case(&slug.replace('-', " "))),
        _ => None,
    }
}

/// Uppercases the first letter of every word and lowercases the rest
fn title_case(text: &str) -> String {
    let mut previous_is_letter = false;
    text.chars()
        .flat_map(|c| {
            let mapped: Vec<char> = if c.is_alphabetic() && !previous_is_letter {
                c.to_uppercase().collect()
            } else {
                c.to_lowercase().collect()
            };
            previous_is_letter = c.is_alphabetic();
            mapped
        })
        .collect()
}

/// Collects the raw listing entries of the `all` tab of a category page
///
/// Entries are returned in page order; turning them into `CatalogItem`s is
/// left to the caller so malformed entries can be reported individually.
pub fn category_entries(page: &Value) -> Vec<Value> {
    let mut entries = Vec::new();

    for category in objects_named(page, "categoryPage") {
        let tabs = category
            .get("lazyLoadedTabs")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for tab in tabs {
            if tab.get("slug").and_then(Value::as_str) != Some("all") {
                continue;
            }

            let modules = tab
                .get("modules")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            for module in modules {
                if let Some(items) = lookup(module, &["selection", "items"]).and_then(Value::as_array)
                {
                    entries.extend(items.iter().cloned());
                }
            }
        }
    }

    entries
}

/// Finds the `detailsPageByPath` object of a detail page
///
/// Entries carrying `smartStart` hold the richest data and win; otherwise the
/// first entry with an `item` is used.
pub(super) fn find_details(page: &Value) -> Option<Value> {
    let candidates: Vec<Value> = objects_named(page, "detailsPageByPath").collect();

    candidates
        .iter()
        .find(|details| details.get("smartStart").is_some())
        .or_else(|| candidates.iter().find(|details| details.get("item").is_some()))
        .cloned()
}

/// Reads title, year and JSON-provided cover image from a details object
pub(super) fn metadata_from_details(details: &Value) -> DetailMetadata {
    let title = non_empty_str(details, &["item", "parent", "name"])
        .or_else(|| non_empty_str(details, &["item", "name"]));

    let year = lookup(details, &["moreDetails", "productionYear"]).and_then(scalar_to_string);

    DetailMetadata {
        title,
        year,
        image_url: image_from_json(details),
    }
}

fn non_empty_str(value: &Value, path: &[&str]) -> Option<String> {
    lookup(value, path)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Resolves a cover image from the details JSON
fn image_from_json(details: &Value) -> Option<String> {
    [
        &["item", "parent", "image", "wide"][..],
        &["images", "wide"][..],
    ]
    .iter()
    .filter_map(|path| lookup(details, path))
    .find_map(image_url_from_value)
}

/// Turns an image reference into a URL
///
/// An object with `id` and `changed` maps onto the static image service; a
/// non-empty string is already a URL.
fn image_url_from_value(image: &Value) -> Option<String> {
    match image {
        Value::Object(_) => {
            let id = image.get("id").and_then(scalar_to_string)?;
            let changed = image.get("changed").and_then(scalar_to_string)?;
            Some(format!(
                "{}/{}/{}?format=auto&quality=100",
                STATIC_IMAGE_BASE_URL, id, changed
            ))
        }
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        _ => None,
    }
}

/// Lists the playable URLs of a detail page
///
/// A single video yields its own URL. For a series every content module is
/// scanned in order, skipping modules that hold upcoming, related, clip or
/// detail content; URLs are kept in first-seen order without duplicates.
pub(super) fn discover_episodes(details: &Value) -> Vec<String> {
    let playable_url = |item: &Value| {
        lookup(item, &["urls", "svtplay"])
            .and_then(Value::as_str)
            .and_then(|path| resolve_site_url(path).ok())
    };

    let parent_type = lookup(details, &["item", "parent", "__typename"]).and_then(Value::as_str);
    if parent_type == Some("Single") {
        return details
            .get("item")
            .and_then(playable_url)
            .into_iter()
            .collect();
    }

    let modules = details
        .get("modules")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut episodes: Vec<String> = Vec::new();

    for module in modules {
        let id = module.get("id").and_then(Value::as_str).unwrap_or_default();
        if is_non_episode_module(id) {
            continue;
        }

        let items = lookup(module, &["selection", "items"])
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for url in items.iter().filter_map(|entry| entry.get("item").and_then(playable_url)) {
            if !episodes.contains(&url) {
                episodes.push(url);
            }
        }
    }

    episodes
}

fn is_non_episode_module(id: &str) -> bool {
    NON_EPISODE_MODULES.contains(&id) || id.starts_with("details") || id.contains("clips")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Wraps state entries the way the site nests them
    fn page_with_entries(entries: &[Value]) -> Value {
        let state: serde_json::Map<String, Value> = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i.to_string(), json!({ "data": entry.to_string() })))
            .collect();
        json!({ "props": { "urqlState": state } })
    }

    fn episode_entry(path: &str) -> Value {
        json!({ "item": { "urls": { "svtplay": path } } })
    }

    #[test]
    fn test_state_entries_skip_unparseable_data() {
        let page = json!({
            "props": { "urqlState": {
                "a": { "data": "{not json" },
                "b": { "data": 42 },
                "c": { "other": "x" },
                "d": { "data": "{\"categoryPage\":{\"heading\":\"Filmer\"}}" }
            }}
        });

        assert_eq!(state_entries(&page).count(), 1);
        assert_eq!(category_name(&page, "https://www.svtplay.se/kategori/x"), "Filmer");
    }

    #[test]
    fn test_category_name_prefers_heading_then_name() {
        let page = page_with_entries(&[json!({ "categoryPage": { "heading": "", "name": "Dokumentär" } })]);
        assert_eq!(category_name(&page, "https://www.svtplay.se/kategori/x"), "Dokumentär");
    }

    #[test]
    fn test_category_name_from_url() {
        let page = json!({});
        assert_eq!(
            category_name(&page, "https://www.svtplay.se/kategori/barn-och-ungdom?tab=all"),
            "Barn Och Ungdom"
        );
        assert_eq!(category_name(&page, "https://www.svtplay.se/filmer"), "Unknown");
        assert_eq!(category_name(&page, "not a url"), "Unknown");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("drama"), "Drama");
        assert_eq!(title_case("SCI fi"), "Sci Fi");
        assert_eq!(title_case("o'neil"), "O'Neil");
    }

    #[test]
    fn test_category_entries_only_from_all_tab() {
        let page = page_with_entries(&[json!({
            "categoryPage": {
                "lazyLoadedTabs": [
                    { "slug": "popular", "modules": [
                        { "selection": { "items": [episode_entry("/popular")] } }
                    ]},
                    { "slug": "all", "modules": [
                        { "selection": { "items": [episode_entry("/a"), episode_entry("/b")] } },
                        { "id": "empty" },
                        { "selection": { "items": [episode_entry("/c")] } }
                    ]}
                ]
            }
        })]);

        let entries = category_entries(&page);
        let paths: Vec<&str> = entries
            .iter()
            .map(|e| e["item"]["urls"]["svtplay"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_find_details_prefers_smart_start() {
        let page = page_with_entries(&[
            json!({ "detailsPageByPath": { "item": { "name": "plain" } } }),
            json!({ "detailsPageByPath": { "item": { "name": "rich" }, "smartStart": {} } }),
        ]);

        let details = find_details(&page).unwrap();
        assert_eq!(details["item"]["name"], "rich");
    }

    #[test]
    fn test_find_details_falls_back_to_item() {
        let page = page_with_entries(&[
            json!({ "detailsPageByPath": { "heading": "no item" } }),
            json!({ "detailsPageByPath": { "item": { "name": "plain" } } }),
        ]);

        let details = find_details(&page).unwrap();
        assert_eq!(details["item"]["name"], "plain");

        let empty = page_with_entries(&[json!({ "somethingElse": {} })]);
        assert!(find_details(&empty).is_none());
    }

    #[test]
    fn test_metadata_from_details() {
        let details = json!({
            "item": {
                "name": "Episode 1",
                "parent": {
                    "name": "Film X",
                    "image": { "wide": { "id": "12345", "changed": 1700000000 } }
                }
            },
            "moreDetails": { "productionYear": 2020 }
        });

        let metadata = metadata_from_details(&details);
        assert_eq!(metadata.title.as_deref(), Some("Film X"));
        assert_eq!(metadata.year.as_deref(), Some("2020"));
        assert_eq!(
            metadata.image_url.as_deref(),
            Some("https://www.svtstatic.se/image/original/default/12345/1700000000?format=auto&quality=100")
        );
    }

    #[test]
    fn test_metadata_title_fallback_and_missing_year() {
        let details = json!({ "item": { "name": "Only Item", "parent": { "name": "" } } });

        let metadata = metadata_from_details(&details);
        assert_eq!(metadata.title.as_deref(), Some("Only Item"));
        assert_eq!(metadata.year, None);
        assert_eq!(metadata.image_url, None);
    }

    #[test]
    fn test_image_from_sibling_images_field() {
        let details = json!({
            "item": { "parent": { "image": { "wide": { "id": "only-id" } } } },
            "images": { "wide": "https://img.example/wide.jpg" }
        });

        assert_eq!(
            image_from_json(&details).as_deref(),
            Some("https://img.example/wide.jpg")
        );
    }

    #[test]
    fn test_discover_single_returns_own_url() {
        let details = json!({
            "item": {
                "parent": { "__typename": "Single" },
                "urls": { "svtplay": "/video/1/film-x" }
            },
            "modules": [{ "id": "episodes", "selection": { "items": [episode_entry("/ignored")] } }]
        });

        assert_eq!(
            discover_episodes(&details),
            vec!["https://www.svtplay.se/video/1/film-x"]
        );
    }

    #[test]
    fn test_discover_skips_non_episode_modules_and_dedups() {
        let details = json!({
            "item": { "parent": { "__typename": "TvSeries" } },
            "modules": [
                { "id": "details-header", "selection": { "items": [episode_entry("/d")] } },
                { "id": "season-1", "selection": { "items": [
                    episode_entry("/video/1"), episode_entry("/video/2")
                ]}},
                { "id": "upcoming", "selection": { "items": [episode_entry("/u")] } },
                { "id": "related", "selection": { "items": [episode_entry("/r")] } },
                { "id": "season-1-clips", "selection": { "items": [episode_entry("/c")] } },
                { "id": "season-2", "selection": { "items": [
                    episode_entry("/video/2"), episode_entry("/video/3"), json!({ "item": {} })
                ]}},
                { "id": "no-selection" }
            ]
        });

        assert_eq!(
            discover_episodes(&details),
            vec![
                "https://www.svtplay.se/video/1",
                "https://www.svtplay.se/video/2",
                "https://www.svtplay.se/video/3",
            ]
        );
    }
}
