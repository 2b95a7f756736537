//! Text shortening helpers for error messages and prompt context.

/// Return at most the first `max_chars` characters of `text`.
///
/// Cuts on a character boundary, never inside a multi-byte code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Keep the first `max_chars` characters and append a marker noting how many were dropped.
///
/// Used when a previous stage's output is fed into a later prompt.
pub fn truncate_with_marker(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let head = truncate_chars(text, max_chars);
    format!(
        "{head}\n[... output truncated, {} characters removed]",
        total - max_chars
    )
}
