use std::collections::HashSet;

use ammonia::Builder;

/// Maximum characters kept from a display name.
const DISPLAY_NAME_MAX_CHARS: usize = 60;

/// Strips every tag from a user-supplied display name and decodes the
/// entities ammonia emits for quotes and ampersands.
///
/// Returns `None` when nothing printable is left.
pub fn clean_display_name(input: &str) -> Option<String> {
    let mut builder = Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    let stripped = builder.clean(input).to_string();
    let decoded = stripped
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&nbsp;", " ");
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed: String = collapsed.chars().take(DISPLAY_NAME_MAX_CHARS).collect();

    if trimmed.is_empty() { None } else { Some(trimmed) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_and_scripts() {
        assert_eq!(
            clean_display_name("<b>Ada</b> <script>alert(1)</script>Lovelace"),
            Some("Ada Lovelace".to_string())
        );
    }

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(clean_display_name("   "), None);
        assert_eq!(clean_display_name("<i></i>"), None);
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "x".repeat(200);
        assert_eq!(clean_display_name(&long).map(|n| n.len()), Some(DISPLAY_NAME_MAX_CHARS));
    }
}
