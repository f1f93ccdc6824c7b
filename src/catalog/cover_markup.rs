//! Cover image fallback that reads the rendered page markup.

use scraper::{Html, Selector};

/// Finds the cover image inside the page's image container
///
/// The first `<img>` anywhere below the container counts, including one
/// inside nested wrapper elements. Uses the widest `srcset` candidate when a
/// candidate list exists, the plain `src` attribute otherwise.
pub(super) fn image_from_markup(html: &str) -> Option<String> {
    let selector = Selector::parse(r#"div[data-css-selector="imageContainer"] img"#)
        .expect("valid image container selector");
    let document = Html::parse_document(html);
    let image = document.select(&selector).next()?;

    let src = image.value().attr("src").map(str::to_string);

    match image.value().attr("srcset") {
        Some(srcset) if !srcset.is_empty() => widest_candidate(srcset).or(src),
        _ => src,
    }
}

/// Picks the URL with the largest `w` descriptor from a `srcset` list
fn widest_candidate(srcset: &str) -> Option<String> {
    let mut best: Option<(&str, u64)> = None;

    for candidate in srcset.split(',').map(str::trim) {
        let Some((url, descriptor)) = candidate.rsplit_once(' ') else {
            continue;
        };
        let Ok(width) = descriptor.trim_end_matches('w').parse::<u64>() else {
            continue;
        };

        if width > best.map_or(0, |(_, w)| w) {
            best = Some((url, width));
        }
    }

    best.map(|(url, _)| url.to_string())
}
