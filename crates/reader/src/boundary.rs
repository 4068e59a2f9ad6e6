//! Boundary Detector: finds the clean content interval inside a book's raw
//! bytes by scanning a head window for a start marker and a tail window for
//! an end marker, skipping producer/license boilerplate in between.

use bookreader_core::markers::{
    fuzzy_contains_any, is_junk_continuation, END_MARKERS, FOOTER_SECTION_MARKERS,
    HEURISTIC_FALLBACK_PHRASES, POST_START_JUNK_PHRASES, SMALL_PRINT_END_MARKERS,
    SMALL_PRINT_START_MARKERS, START_MARKERS, UPDATE_NOTICE_MARKERS,
};
use bookreader_core::normalize::{byte_offset_of_line, normalize_line, split_lines_with_lengths};

pub const DEFAULT_HEAD_SCAN: usize = 60 * 1024;
pub const DEFAULT_TAIL_SCAN: usize = 60 * 1024;
/// How many lines past a triple-asterisk divider to look for footer keywords.
const DIVIDER_LOOKAHEAD_LINES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryFlag {
    StartMarkerFound,
    StartViaSmallPrintDisclaimer,
    StartHeuristicFallback,
    EndExplicitMarker,
    EndFooterSection,
    EndFuzzyMarker,
    EndNotFound,
}

#[derive(Debug, Clone)]
pub struct Boundaries {
    pub start_byte: u64,
    pub end_byte: u64,
    pub clean_length: u64,
    pub flags: Vec<BoundaryFlag>,
}

#[derive(Debug, Clone, Copy)]
pub struct BoundaryConfig {
    pub head_scan: usize,
    pub tail_scan: usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self { head_scan: DEFAULT_HEAD_SCAN, tail_scan: DEFAULT_TAIL_SCAN }
    }
}

/// Find the clean content interval `[start_byte, end_byte)` inside `bytes`.
/// Never fails: absent markers fall back to heuristics and are reported via
/// `flags` rather than aborting.
pub fn find_clean_boundaries(bytes: &[u8], config: BoundaryConfig) -> Boundaries {
    let head_len = config.head_scan.min(bytes.len());
    let (start_byte, mut flags) = find_start(&bytes[..head_len]);

    let tail_start = bytes.len().saturating_sub(config.tail_scan).max(start_byte as usize);
    let (end_byte, end_flags) = find_end(&bytes[tail_start..], tail_start as u64, bytes.len() as u64);
    flags.extend(end_flags);

    let end_byte = end_byte.max(start_byte);
    Boundaries { start_byte, end_byte, clean_length: end_byte - start_byte, flags }
}

/// Scan a head window (the first `head.len()` bytes of the book, fetched
/// through a Range Source) for the start marker. Exposed separately from
/// [`find_clean_boundaries`] so a caller can fetch only this window instead
/// of the whole book, then decide the tail window's start from the result
/// (see [`find_end_window`]).
pub fn find_start_window(head: &[u8]) -> (u64, Vec<BoundaryFlag>) {
    find_start(head)
}

/// Scan a tail window for the end marker. `base_offset` is the absolute
/// byte offset of `tail[0]` within the book; `file_len` is the book's total
/// size, used as the fallback end when no marker is found.
pub fn find_end_window(tail: &[u8], base_offset: u64, file_len: u64) -> (u64, Vec<BoundaryFlag>) {
    find_end(tail, base_offset, file_len)
}

fn line_text(raw: &[u8]) -> String {
    normalize_line(&String::from_utf8_lossy(raw))
}

enum ScanState {
    SeekingStart,
    InSmallPrint,
}

fn find_start(head: &[u8]) -> (u64, Vec<BoundaryFlag>) {
    let lines = split_lines_with_lengths(head);
    let mut state = ScanState::SeekingStart;
    let mut marker_line: Option<usize> = None;
    let mut via_small_print = false;

    for (i, raw) in lines.iter().enumerate() {
        let norm = line_text(raw);
        match state {
            ScanState::SeekingStart => {
                if END_MARKERS.iter().any(|m| norm.contains(m)) {
                    continue;
                }
                if fuzzy_contains_any(&norm, SMALL_PRINT_START_MARKERS) {
                    state = ScanState::InSmallPrint;
                    continue;
                }
                if fuzzy_contains_any(&norm, START_MARKERS) {
                    marker_line = Some(i + 1);
                    break;
                }
            }
            ScanState::InSmallPrint => {
                if fuzzy_contains_any(&norm, SMALL_PRINT_END_MARKERS) {
                    marker_line = Some(i + 1);
                    via_small_print = true;
                    break;
                }
                if fuzzy_contains_any(&norm, START_MARKERS) {
                    marker_line = Some(i + 1);
                    via_small_print = true;
                    break;
                }
            }
        }
    }

    let mut flags = Vec::new();
    let mut idx = match marker_line {
        Some(line) => {
            flags.push(BoundaryFlag::StartMarkerFound);
            if via_small_print {
                flags.push(BoundaryFlag::StartViaSmallPrintDisclaimer);
            }
            line
        }
        None => {
            flags.push(BoundaryFlag::StartHeuristicFallback);
            let mut idx = 0;
            while idx < lines.len() {
                let norm = line_text(lines[idx]);
                if norm.is_empty() || HEURISTIC_FALLBACK_PHRASES.iter().any(|m| norm.contains(m)) {
                    idx += 1;
                } else {
                    break;
                }
            }
            idx
        }
    };

    while idx < lines.len() {
        let norm = line_text(lines[idx]);
        if norm.is_empty()
            || POST_START_JUNK_PHRASES.iter().any(|m| norm.contains(m))
            || is_junk_continuation(&norm)
        {
            idx += 1;
        } else {
            break;
        }
    }

    (byte_offset_of_line(&lines, idx), flags)
}

fn is_divider_line(norm: &str) -> bool {
    !norm.is_empty() && norm.chars().all(|c| c == '*' || c == ' ')
}

fn find_end(tail: &[u8], base_offset: u64, file_len: u64) -> (u64, Vec<BoundaryFlag>) {
    let lines = split_lines_with_lengths(tail);
    let mut candidates: Vec<(u64, BoundaryFlag)> = Vec::new();

    // Pass 1: explicit END markers (exact substring only).
    for (i, raw) in lines.iter().enumerate() {
        let norm = line_text(raw);
        if END_MARKERS.iter().any(|m| norm.contains(m)) {
            candidates.push((base_offset + byte_offset_of_line(&lines, i), BoundaryFlag::EndExplicitMarker));
            break;
        }
    }

    // Pass 2: footer-section starts, including a divider line followed
    // within a short lookahead by footer keywords.
    for (i, raw) in lines.iter().enumerate() {
        let norm = line_text(raw);
        if fuzzy_contains_any(&norm, FOOTER_SECTION_MARKERS) || fuzzy_contains_any(&norm, UPDATE_NOTICE_MARKERS) {
            candidates.push((base_offset + byte_offset_of_line(&lines, i), BoundaryFlag::EndFooterSection));
            break;
        }
        if is_divider_line(&norm) {
            let window_end = (i + 1 + DIVIDER_LOOKAHEAD_LINES).min(lines.len());
            let hit = lines[i + 1..window_end].iter().any(|l| {
                let n = line_text(l);
                fuzzy_contains_any(&n, FOOTER_SECTION_MARKERS) || fuzzy_contains_any(&n, UPDATE_NOTICE_MARKERS)
            });
            if hit {
                candidates.push((base_offset + byte_offset_of_line(&lines, i), BoundaryFlag::EndFooterSection));
                break;
            }
        }
    }

    // Pass 3: fuzzy match against the full end marker set.
    for (i, raw) in lines.iter().enumerate() {
        let norm = line_text(raw);
        if fuzzy_contains_any(&norm, END_MARKERS) {
            candidates.push((base_offset + byte_offset_of_line(&lines, i), BoundaryFlag::EndFuzzyMarker));
            break;
        }
    }

    match candidates.into_iter().min_by_key(|(offset, _)| *offset) {
        Some((offset, flag)) => (offset, vec![flag]),
        None => (file_len, vec![BoundaryFlag::EndNotFound]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_modern_start_and_end_markers() {
        let text = "*** START OF THIS PROJECT GUTENBERG EBOOK FOO ***\r\n\
                     Produced by Jane Doe and the Online Team\r\n\
                     \r\n\
                     Chapter One\r\n\
                     It was a dark and stormy night.\r\n\
                     \r\n\
                     *** END OF THIS PROJECT GUTENBERG EBOOK FOO ***\r\n";
        let bytes = text.as_bytes();
        let b = find_clean_boundaries(bytes, BoundaryConfig::default());
        assert!(b.flags.contains(&BoundaryFlag::StartMarkerFound));
        let content = &bytes[b.start_byte as usize..b.end_byte as usize];
        assert!(String::from_utf8_lossy(content).contains("Chapter One"));
        assert!(!String::from_utf8_lossy(content).contains("Produced by"));
        assert!(!String::from_utf8_lossy(content).contains("END OF"));
    }

    #[test]
    fn falls_back_to_heuristic_when_no_marker() {
        let text = "PROJECT GUTENBERG presents\r\nCOPYRIGHT 1990\r\nChapter One\r\nHello world.\r\n";
        let b = find_clean_boundaries(text.as_bytes(), BoundaryConfig::default());
        assert!(b.flags.contains(&BoundaryFlag::StartHeuristicFallback));
        let content = &text.as_bytes()[b.start_byte as usize..b.end_byte as usize];
        assert!(String::from_utf8_lossy(content).starts_with("Chapter One"));
    }

    #[test]
    fn small_print_disclaimer_is_skipped() {
        let text = "*** SMALL PRINT! ***\r\n\
                     This disclaimer text goes on for a while.\r\n\
                     *** END SMALL PRINT ***\r\n\
                     Produced by the Team\r\n\
                     Real content starts here.\r\n\
                     *** END OF THE PROJECT GUTENBERG EBOOK ***\r\n";
        let bytes = text.as_bytes();
        let b = find_clean_boundaries(bytes, BoundaryConfig::default());
        assert!(b.flags.contains(&BoundaryFlag::StartViaSmallPrintDisclaimer));
        let content = String::from_utf8_lossy(&bytes[b.start_byte as usize..b.end_byte as usize]);
        assert!(content.starts_with("Real content"));
    }

    #[test]
    fn crlf_offsets_are_counted_correctly() {
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK FOO ***\r\nHello\r\n";
        let bytes = text.as_bytes();
        let b = find_clean_boundaries(bytes, BoundaryConfig::default());
        // Line 0 is 50 bytes + "\r\n" terminator = 52.
        let expected_start = bytes.windows(4).position(|w| w == b"\r\nHe").map(|p| p + 2).unwrap() as u64;
        assert_eq!(b.start_byte, expected_start);
    }

    #[test]
    fn missing_end_marker_falls_back_to_file_length() {
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK FOO ***\r\nNever-ending story.\r\n";
        let bytes = text.as_bytes();
        let b = find_clean_boundaries(bytes, BoundaryConfig::default());
        assert!(b.flags.contains(&BoundaryFlag::EndNotFound));
        assert_eq!(b.end_byte, bytes.len() as u64);
    }

    #[test]
    fn footer_divider_followed_by_keyword_is_detected() {
        let text = "*** START OF THE PROJECT GUTENBERG EBOOK FOO ***\r\n\
                     Body text here.\r\n\
                     ***\r\n\
                     This is the most recent update of this etext.\r\n";
        let bytes = text.as_bytes();
        let b = find_clean_boundaries(bytes, BoundaryConfig::default());
        assert!(b.flags.contains(&BoundaryFlag::EndFooterSection));
        let content = String::from_utf8_lossy(&bytes[b.start_byte as usize..b.end_byte as usize]);
        assert!(content.trim() == "Body text here.");
    }
}
