//! Splits raw page markup into model-sized pieces.

/// Default chunk size, in characters, for selector inference requests.
pub const DEFAULT_CHUNK_CHARS: usize = 4000;

/// Split `html` into consecutive slices of `max_chars` characters.
///
/// Every slice but the last holds exactly `max_chars` characters; the last may be
/// shorter. Tags can be cut in half, the model copes with truncated markup. Slices
/// never split a UTF-8 code point. A `max_chars` of zero disables splitting.
pub fn chunk_markup(html: &str, max_chars: usize) -> Vec<&str> {
    if html.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![html];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in html.char_indices() {
        if count == max_chars {
            chunks.push(&html[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    chunks.push(&html[start..]);

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk_markup("", 10).is_empty());
    }

    #[test]
    fn test_concatenation_reproduces_input() {
        let html = "<html><body><p>Chapter one</p><p>Chapter two</p></body></html>";
        for size in [1, 3, 7, 16, 64, 1000] {
            let chunks = chunk_markup(html, size);
            assert_eq!(chunks.concat(), html, "size {}", size);
        }
    }

    #[test]
    fn test_all_but_last_are_full() {
        let html = "a".repeat(10_001);
        let chunks = chunk_markup(&html, DEFAULT_CHUNK_CHARS);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 4000);
        assert_eq!(chunks[1].len(), 4000);
        assert_eq!(chunks[2].len(), 2001);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let chunks = chunk_markup("abcdef", 3);
        assert_eq!(chunks, vec!["abc", "def"]);
    }

    #[test]
    fn test_multibyte_characters_are_not_split() {
        let html = "章節一章節二";
        let chunks = chunk_markup(html, 4);

        assert_eq!(chunks, vec!["章節一章", "節二"]);
        assert_eq!(chunks.concat(), html);
    }

    #[test]
    fn test_zero_size_keeps_input_whole() {
        assert_eq!(chunk_markup("<p>x</p>", 0), vec!["<p>x</p>"]);
    }
}
