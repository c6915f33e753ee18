//! Artifact base names: the shortcode plus a short, filesystem-safe slice of
//! the caption.

const ILLEGAL: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// Room kept for the `.ext` suffix when capping the name length.
const EXTENSION_RESERVE: usize = 4;

pub fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|ch| !ILLEGAL.contains(ch))
        .collect::<String>()
        .trim()
        .to_string()
}

/// First `words` whitespace-separated words of the caption, joined by `_`.
pub fn caption_snippet(caption: &str, words: usize) -> String {
    caption
        .split_whitespace()
        .take(words)
        .collect::<Vec<_>>()
        .join("_")
}

/// Caps the name at `max_length - 4` characters.
pub fn truncate(name: &str, max_length: usize) -> String {
    let limit = max_length.saturating_sub(EXTENSION_RESERVE);
    name.chars().take(limit).collect()
}

pub fn base_name(shortcode: &str, caption: Option<&str>, words: usize, max_length: usize) -> String {
    let mut name = shortcode.to_string();
    if let Some(caption) = caption.map(str::trim).filter(|caption| !caption.is_empty()) {
        name.push('_');
        name.push_str(&sanitize(&caption_snippet(caption, words)));
    }
    truncate(&name, max_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_characters_are_removed() {
        assert_eq!(sanitize(r#" what?_a:b/c\d*e"f<g>h|i "#), "what_abcdefghi");
    }

    #[test]
    fn base_name_uses_first_six_words() {
        let name = base_name(
            "C1abc",
            Some("  one two three four five six seven eight "),
            6,
            50,
        );
        assert_eq!(name, "C1abc_one_two_three_four_five_six");
    }

    #[test]
    fn base_name_without_caption_is_shortcode() {
        assert_eq!(base_name("C1abc", None, 6, 50), "C1abc");
        assert_eq!(base_name("C1abc", Some("   "), 6, 50), "C1abc");
    }

    #[test]
    fn base_name_is_capped_on_char_boundaries() {
        let name = base_name(
            "C1abc",
            Some("ééééééééééééééééééééé ççççççççççççççççççççç ßßßßßßßßßßßßß"),
            6,
            50,
        );
        assert_eq!(name.chars().count(), 46);
        assert!(name.starts_with("C1abc_ééé"));
    }
}
