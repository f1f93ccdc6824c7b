use std::path::{Path, PathBuf};

/// Sanitizes a string for use as a file or folder name
///
/// Removes characters that are invalid or problematic in filenames across
/// platforms (`< > : " / \ | ? *`) and trims dots and spaces from both ends.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();

    // Trim spaces and dots from start/end
    sanitized.trim_matches(|c: char| c == ' ' || c == '.').to_string()
}

/// Formats the folder name of a title
///
/// Titles with a known year become `Title (2020)`, others just `Title`.
pub fn format_title_folder(title: &str, year: Option<&str>) -> String {
    let title = sanitize_filename(title);
    match year {
        Some(year) => format!("{} ({})", title, year),
        None => title,
    }
}

/// Builds `<output>/<category>/<title folder>` for one title
pub fn title_folder_path(
    output_dir: &Path,
    category_name: &str,
    title: &str,
    year: Option<&str>,
) -> PathBuf {
    output_dir
        .join(sanitize_filename(category_name))
        .join(format_title_folder(title, year))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Normal Title"), "Normal Title");
        assert_eq!(sanitize_filename("Title: With Colon"), "Title With Colon");
        assert_eq!(sanitize_filename("Path/With\\Slashes"), "PathWithSlashes");
        assert_eq!(sanitize_filename("What?*<>|\"now\""), "Whatnow");
        assert_eq!(sanitize_filename("  Spaces  "), "Spaces");
        assert_eq!(sanitize_filename("...dots..."), "dots");
        assert_eq!(sanitize_filename("Åsa-Nisse"), "Åsa-Nisse");
    }

    #[test]
    fn test_format_title_folder() {
        assert_eq!(format_title_folder("Film X", Some("2020")), "Film X (2020)");
        assert_eq!(format_title_folder("Who?", None), "Who");
    }

    #[test]
    fn test_title_folder_path() {
        assert_eq!(
            title_folder_path(Path::new("Downloads"), "Drama: Classics", "Film X", Some("2020")),
            Path::new("Downloads").join("Drama Classics").join("Film X (2020)")
        );
    }
}
