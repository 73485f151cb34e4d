//! UTF-8–safe string truncation.

/// Maximum characters of an error message emitted as a metric label.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 200;

/// Truncate `s` to at most `max_chars` characters.
///
/// Counts `char`s, not bytes, so multi-byte text is never split.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_limit_unchanged() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 5), "hello");
    }

    #[test]
    fn ascii_truncated() {
        assert_eq!(truncate_chars("hello world", 5), "hello");
    }

    #[test]
    fn multibyte_counts_chars() {
        assert_eq!(truncate_chars("ab—cd", 3), "ab—");
        assert_eq!(truncate_chars("日本語テキスト", 2), "日本");
    }

    #[test]
    fn zero_limit_is_empty() {
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn long_error_message_capped() {
        let long = "e".repeat(500);
        assert_eq!(truncate_chars(&long, MAX_ERROR_MESSAGE_CHARS).len(), 200);
    }
}
