/// Split `text` into chunks of at most `max_len` characters.
///
/// Each cut lands just after the last newline of the window when that newline sits
/// in the window's second half, otherwise just after the last whitespace; with no
/// whitespace at all the window is hard-cut at `max_len`. Lengths count `char`s,
/// never bytes, so multi-byte text is never split inside a code point.
///
/// With `overlap == 0` the chunks partition `text`: concatenated in order they
/// reproduce it exactly. With `overlap > 0` each chunk starts with the last
/// `overlap` characters of the previous one; boundaries inside that shared prefix
/// are ignored, so every chunk is longer than `overlap` and the text advances.
/// Empty input yields no chunks, and no chunk is ever empty.
pub fn split(text: &str, max_len: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let max_len = max_len.max(1);
    let overlap = overlap.min(max_len - 1);
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::with_capacity(chars.len() / max_len + 1);
    let mut start = 0;
    while start < chars.len() {
        let window_end = (start + max_len).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            cut_point(&chars[start..window_end], overlap).map_or(window_end, |p| start + p)
        };

        chunks.push(chars[start..end].iter().collect());

        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// Offset just past the preferred boundary inside `window`, ignoring boundaries
/// in the first `floor` characters.
fn cut_point(window: &[char], floor: usize) -> Option<usize> {
    let half = (window.len() / 2).max(floor);
    match window.iter().rposition(|&c| c == '\n') {
        Some(p) if p >= half => Some(p + 1),
        _ => window[floor..]
            .iter()
            .rposition(|c| c.is_whitespace())
            .map(|p| floor + p + 1),
    }
}
