//! Line normalization for boilerplate-marker matching.
//!
//! Normalization uppercases, strips a leading byte-order mark, replaces any
//! character that isn't a word character, whitespace, or asterisk with a
//! space, collapses whitespace runs, and trims. It exists purely to make
//! marker matching robust to stray punctuation and casing — byte offsets
//! for boundaries are always computed from the *original* unnormalized
//! lines (see [`crate::markers`]).

const BOM: char = '\u{feff}';

/// Normalize one line of text for marker comparison.
pub fn normalize_line(line: &str) -> String {
    let stripped = line.strip_prefix(BOM).unwrap_or(line);
    let mut out = String::with_capacity(stripped.len());
    for c in stripped.chars() {
        let upper = c.to_ascii_uppercase();
        if upper.is_alphanumeric() || upper.is_whitespace() || upper == '*' || upper == '_' {
            out.push(upper);
        } else {
            out.push(' ');
        }
    }
    collapse_whitespace(&out).trim().to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out
}

/// Split `bytes` into lines, preserving each line's *original* byte length
/// (including a trailing `\r` for CRLF input) so absolute byte offsets can
/// be reconstructed by summing `line.len() + 1` (the `+1` accounts for the
/// `\n` terminator; the final line may have none).
pub fn split_lines_with_lengths(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            lines.push(&bytes[start..i]);
            start = i + 1;
        }
    }
    if start < bytes.len() {
        lines.push(&bytes[start..]);
    }
    lines
}

/// Absolute byte offset of the first byte of line `line_index` (0-based),
/// given the original (non-normalized) line slices from
/// [`split_lines_with_lengths`]. Each line before it contributes
/// `line.len() + 1` bytes (its own bytes plus the `\n` terminator it was
/// split on).
pub fn byte_offset_of_line(lines: &[&[u8]], line_index: usize) -> u64 {
    lines.iter().take(line_index).map(|l| l.len() as u64 + 1).sum()
}
