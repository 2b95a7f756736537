//! Triple-backtick fenced block handling.

const FENCE: &str = "```";

/// Bodies of all closed fenced blocks, in order of appearance.
///
/// The info string on the opening line (e.g. `json`) is dropped.
pub fn extract_fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let body_start = skip_info_string(after_open);
        let body = &after_open[body_start..];
        match body.find(FENCE) {
            Some(close) => {
                blocks.push(body[..close].trim());
                rest = &body[close + FENCE.len()..];
            }
            None => break,
        }
    }
    blocks
}

/// Strip an optional fenced-code wrapper from a single-file response.
///
/// Only a fence opening the response counts as a wrapper. It is cut at the
/// last fence line, dropping anything after it; a wrapper whose closing fence
/// was cut off keeps the rest of the body. Any other text is only trimmed, so
/// fenced blocks inside a document stay where they are.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix(FENCE) else {
        return trimmed.to_string();
    };
    let body = &after_open[skip_info_string(after_open)..];
    let body = match last_fence_line(body) {
        Some(end) => &body[..end],
        None => body.trim_end().strip_suffix(FENCE).unwrap_or(body),
    };
    body.trim_matches('\n').trim_end().to_string()
}

/// Byte offset of the start of the last line that opens with a fence.
fn last_fence_line(body: &str) -> Option<usize> {
    let mut offset = 0;
    let mut last = None;
    for line in body.split_inclusive('\n') {
        if line.trim_start().starts_with(FENCE) {
            last = Some(offset);
        }
        offset += line.len();
    }
    last
}

/// Byte offset just past the info string and its newline.
///
/// An opening fence directly followed by content on the same line (`` ```{ ``)
/// has no info string.
fn skip_info_string(after_open: &str) -> usize {
    let line_end = after_open.find('\n').unwrap_or(after_open.len());
    let info = &after_open[..line_end];
    let is_info = info
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'));
    if is_info {
        (line_end + 1).min(after_open.len())
    } else {
        0
    }
}
