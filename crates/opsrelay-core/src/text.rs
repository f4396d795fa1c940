//! Text shaping helpers for transport-bound output.

/// Marker appended when text is cut to fit a limit.
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Caps `raw` at `max_chars` characters, appending [`TRUNCATION_MARKER`] when cut.
pub fn truncate_chars(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        return raw.to_string();
    }
    let mut output = raw.chars().take(max_chars).collect::<String>();
    output.push_str(TRUNCATION_MARKER);
    output
}

/// Splits text into chunks of at most `max_chars` characters, preferring
/// newline boundaries when one exists inside the window.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() || max_chars == 0 {
        return Vec::new();
    }
    let chars = text.chars().collect::<Vec<_>>();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let hard_end = start.saturating_add(max_chars).min(chars.len());
        let mut end = hard_end;
        if hard_end < chars.len() {
            if let Some(offset) = chars[start..hard_end].iter().rposition(|ch| *ch == '\n') {
                if offset > 0 {
                    end = start + offset + 1;
                }
            }
        }
        chunks.push(chars[start..end].iter().collect());
        start = end;
    }
    chunks
}

/// Picks the first non-blank stream, trimmed.
pub fn first_non_blank<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
}
