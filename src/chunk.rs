//! Overlapping sliding-window text chunker.
//!
//! Splits one document's text into chunks of at most `max_chars` characters,
//! where each chunk shares exactly `overlap` characters with its predecessor.
//! The cut point prefers a structural boundary — paragraph break, then any
//! newline, then a space — within the window, falling back to a hard
//! character cut. Chunks are exact substrings, so concatenating them with the
//! overlap removed reconstructs the input.
//!
//! Chunking operates on characters, never raw bytes, so multi-byte UTF-8
//! input cannot be split mid-character.

/// Split text into overlapping chunks.
///
/// Returns an empty vector for empty input and a non-empty vector otherwise.
/// Callers must ensure `overlap < max_chars` (enforced by config validation);
/// out-of-range values are clamped so the window always advances.
pub fn split_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let overlap = overlap.min(max_chars - 1);

    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        if n - start <= max_chars {
            chunks.push(chars[start..n].iter().collect());
            break;
        }

        let window_end = start + max_chars;
        // The cut must leave at least one fresh character after the overlap,
        // or the window would never advance.
        let floor = start + overlap + 1;
        let cut = find_break(&chars, floor, window_end).unwrap_or(window_end);

        chunks.push(chars[start..cut].iter().collect());
        start = cut - overlap;
    }

    chunks
}

/// Find the best cut point in `[floor, window_end]`, scanning backward.
/// Preference order: paragraph break, newline, space. The returned cut sits
/// just after the boundary character.
fn find_break(chars: &[char], floor: usize, window_end: usize) -> Option<usize> {
    if floor > window_end {
        return None;
    }

    let mut newline = None;
    let mut space = None;

    for i in (floor..=window_end).rev() {
        let c = chars[i - 1];
        if c == '\n' {
            if i >= 2 && chars[i - 2] == '\n' {
                return Some(i);
            }
            if newline.is_none() {
                newline = Some(i);
            }
        } else if c == ' ' && space.is_none() {
            space = Some(i);
        }
    }

    newline.or(space)
}
