//! Cheap token-count proxy used to size embedding batches
//!
//! Roughly one token per four characters, but never fewer tokens than words.
//! This is not a tokenizer.

const CHARS_PER_TOKEN: usize = 4;

/// Estimate the number of tokens in `text`
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let by_chars = text.chars().count() / CHARS_PER_TOKEN;
    let words = text.split_whitespace().count();
    by_chars.max(words)
}

/// Sum of [`estimate_tokens`] over several texts
pub fn estimate_tokens_batch<'a>(texts: impl IntoIterator<Item = &'a str>) -> usize {
    texts.into_iter().map(estimate_tokens).sum()
}
