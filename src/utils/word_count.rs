//! Whitespace word counting, the proxy used for "tokens saved".

/// Count whitespace-separated words in `text`.
///
/// Leading and trailing whitespace is ignored, and any run of whitespace
/// counts as a single separator.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
