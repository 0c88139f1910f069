//! Input scrubbing for values that end up in paths or rendered pages.

/// Reduce a candidate file or directory name to a safe character set:
/// ASCII alphanumerics, space, dot, dash, underscore. Everything else is
/// dropped, then surrounding whitespace trimmed. Dots-only names are
/// reserved and reduce to empty. May return an empty string; callers
/// supply their own fallback.
pub fn file_name(input: &str) -> String {
    let kept: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '-' | '_'))
        .collect();
    let kept = kept.trim();
    // Dots-only names are reserved: ".." climbs out of its directory.
    if kept.chars().all(|c| c == '.') {
        return String::new();
    }
    kept.to_string()
}

/// Strip angle brackets from free text fields (titles, display names) so
/// stored metadata never carries markup.
pub fn text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '<' | '>'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_keeps_safe_characters() {
        assert_eq!(file_name("My Song 01.flac"), "My Song 01.flac");
        assert_eq!(file_name("demo_take-2.mp3"), "demo_take-2.mp3");
    }

    #[test]
    fn file_name_drops_separators_and_traversal() {
        assert_eq!(file_name("../../etc/passwd"), "....etcpasswd");
        assert_eq!(file_name("a/b\\c"), "abc");
        assert_eq!(file_name("nul\0byte"), "nulbyte");
    }

    #[test]
    fn file_name_can_empty_out() {
        assert_eq!(file_name("安全"), "");
        assert_eq!(file_name("   "), "");
    }

    #[test]
    fn file_name_reserves_dots_only_names() {
        assert_eq!(file_name(".."), "");
        assert_eq!(file_name("..."), "");
        assert_eq!(file_name("../.."), "");
        assert_eq!(file_name(" .. "), "");
        assert_eq!(file_name("..a"), "..a");
    }

    #[test]
    fn text_strips_markup() {
        assert_eq!(text("<script>alert(1)</script>"), "scriptalert(1)/script");
        assert_eq!(text("  plain title "), "plain title");
    }
}
