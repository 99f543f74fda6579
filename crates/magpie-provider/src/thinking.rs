//! Inline reasoning-tag extraction.
//!
//! Some models emit reasoning as a separate `reasoning_content` field;
//! others inline it in content between marker tags. [`extract`] normalizes
//! both into a `(clean_content, thinking)` pair. This sits on the hot path
//! of every stream chunk, so it only ever returns borrowed slices.

/// Recognized (open, close) tag pairs, in scan order.
const TAG_PAIRS: [(&str, &str); 2] = [
    ("<think>", "</think>"),
    (
        "<|start_header_id|>reasoning<|end_header_id|>",
        "<|start_header_id|>assistant<|end_header_id|>",
    ),
];

/// Separate inline reasoning from user-visible content.
///
/// If `reasoning_delta` is non-empty it wins and `content_delta` passes
/// through untouched. Otherwise the first recognized tag pair found in
/// `content_delta` yields the text between the tags as the thinking delta.
/// The clean content keeps the tags: stripping happens only at render
/// boundaries (see [`strip_thinking`]), never while accumulating.
pub fn extract<'a>(content_delta: &'a str, reasoning_delta: &'a str) -> (&'a str, &'a str) {
    if !reasoning_delta.is_empty() {
        return (content_delta, reasoning_delta);
    }

    if let Some((start, end)) = find_tag_span(content_delta) {
        return (content_delta, &content_delta[start..end]);
    }

    (content_delta, "")
}

/// Remove every recognized tag span (tags and enclosed reasoning) from
/// content for display surfaces.
pub fn strip_thinking(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    loop {
        match find_tag_bounds(rest) {
            Some((open_at, close_end)) => {
                out.push_str(&rest[..open_at]);
                rest = &rest[close_end..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

/// Byte range of the text between the first matched tag pair.
fn find_tag_span(content: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, usize)> = None;

    for (open, close) in TAG_PAIRS {
        if let Some(open_at) = content.find(open) {
            let inner_start = open_at + open.len();
            if let Some(close_off) = content[inner_start..].find(close) {
                let candidate = (open_at, inner_start, inner_start + close_off);
                if best.is_none_or(|(at, _, _)| open_at < at) {
                    best = Some(candidate);
                }
            }
        }
    }

    best.map(|(_, start, end)| (start, end))
}

/// Byte range covering the first matched tag pair including both tags.
fn find_tag_bounds(content: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;

    for (open, close) in TAG_PAIRS {
        if let Some(open_at) = content.find(open) {
            let inner_start = open_at + open.len();
            if let Some(close_off) = content[inner_start..].find(close) {
                let close_end = inner_start + close_off + close.len();
                if best.is_none_or(|(at, _)| open_at < at) {
                    best = Some((open_at, close_end));
                }
            }
        }
    }

    best
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
