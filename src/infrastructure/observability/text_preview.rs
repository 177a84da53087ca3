const MAX_VISIBLE_CHARS: usize = 120;

/// Shortens stage output for log lines: the first characters plus the total
/// length, never the whole transcript.
pub fn text_preview(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return String::from("[EMPTY]");
    }

    let total = trimmed.chars().count();
    if total > MAX_VISIBLE_CHARS {
        let visible: String = trimmed.chars().take(MAX_VISIBLE_CHARS).collect();
        format!("{}... ({} chars total)", visible, total)
    } else {
        trimmed.to_string()
    }
}
