//! UTF-8-safe adjustment of a byte span that may have been cut mid-character
//! by an arbitrary-offset range fetch.

/// Is `b` a UTF-8 continuation byte (`10xxxxxx`)?
#[inline]
fn is_continuation(b: u8) -> bool {
    b & 0b1100_0000 == 0b1000_0000
}

/// Byte length of the UTF-8 sequence starting with lead byte `b`, or `None`
/// if `b` is not a valid lead byte.
#[inline]
fn lead_len(b: u8) -> Option<usize> {
    match b {
        0x00..=0x7f => Some(1),
        0xc0..=0xdf => Some(2),
        0xe0..=0xef => Some(3),
        0xf0..=0xf7 => Some(4),
        _ => None,
    }
}

/// Advance `start` forward within `buf` to the next UTF-8 lead byte (or to
/// `buf.len()` if none is found), used when a fetch began before the true
/// target offset and may have landed mid-character.
pub fn advance_to_lead_byte(buf: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < buf.len() && is_continuation(buf[i]) {
        i += 1;
    }
    i
}

/// Retreat `end` (exclusive) within `buf` so that `buf[..end]` ends on a
/// complete UTF-8 character, used when a fetch ran past the true target
/// offset and may have split a multi-byte character at the tail.
pub fn retreat_to_char_boundary(buf: &[u8], end: usize) -> usize {
    // Walk back over continuation bytes to find the lead byte of the last
    // (possibly incomplete) character. This must run even when `buf[end -
    // 1]` itself is not a continuation byte, since it may be a lead byte
    // whose body falls entirely past `end`.
    let mut lead = end;
    while lead > 0 && is_continuation(buf[lead - 1]) {
        lead -= 1;
    }
    if lead == 0 {
        return end;
    }
    match lead_len(buf[lead - 1]) {
        Some(needed) if lead - 1 + needed <= end => end,
        _ => lead - 1,
    }
}

/// Decode `buf[start..end]` as UTF-8 after adjusting both ends to character
/// boundaries, returning the adjusted `(start, end, text)`.
pub fn safe_slice(buf: &[u8], start: usize, end: usize) -> (usize, usize, &str) {
    let start = advance_to_lead_byte(buf, start.min(buf.len()));
    let end = retreat_to_char_boundary(buf, end.min(buf.len())).max(start);
    let text = std::str::from_utf8(&buf[start..end]).unwrap_or_else(|e| {
        // Should not happen given the boundary adjustment above, but if a
        // pathological input sneaks through, decode only the valid prefix.
        std::str::from_utf8(&buf[start..start + e.valid_up_to()]).unwrap_or("")
    });
    (start, end, text)
}

/// Does byte `b` sit at a word boundary, given the byte immediately before
/// it and the byte at it? Mid-word iff both sides are non-whitespace.
pub fn is_word_boundary(before: Option<u8>, at: Option<u8>) -> bool {
    let before_non_ws = before.map(|b| !b.is_ascii_whitespace()).unwrap_or(false);
    let at_non_ws = at.map(|b| !b.is_ascii_whitespace()).unwrap_or(false);
    !(before_non_ws && at_non_ws)
}
