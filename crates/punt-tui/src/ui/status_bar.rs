use unicode_width::UnicodeWidthChar;

/// Truncate `text` so it occupies at most `width` terminal columns
pub fn fit_to_width(text: &str, width: usize) -> &str {
    let mut used = 0;
    for (idx, ch) in text.char_indices() {
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            return &text[..idx];
        }
        used += w;
    }
    text
}
