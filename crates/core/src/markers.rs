//! Fixed boilerplate marker tables and fuzzy marker matching.
//!
//! Matching a marker against a normalized line is exact-substring first,
//! falling back to a bounded-Levenshtein sliding window over the first
//! `PREFIX_WINDOW` characters of the line. This lets "*** START OF THlS
//! PROJECT GUTENBERG EBOOK ***"-style OCR noise still register as a start
//! marker.

use crate::levenshtein::bounded_distance;

/// How many characters of the line's prefix to slide the fuzzy window over.
pub const PREFIX_WINDOW: usize = 120;
/// How many starting offsets within the prefix window to try.
pub const MAX_OFFSET: usize = 20;
/// Maximum tolerated edit distance for a fuzzy marker match.
pub const MAX_FUZZY_DIST: usize = 6;

/// Strict start-of-content markers, ordered by specificity (most specific
/// phrasing first so an exact substring match prefers the tightest marker).
pub const START_MARKERS: &[&str] = &[
    "START OF THIS PROJECT GUTENBERG EBOOK",
    "START OF THE PROJECT GUTENBERG EBOOK",
    "START OF PROJECT GUTENBERG EBOOK",
];

/// Legacy "small print" disclaimer markers that precede real content in the
/// oldest Gutenberg texts.
pub const SMALL_PRINT_START_MARKERS: &[&str] = &["SMALL PRINT", "START SMALL PRINT"];

pub const SMALL_PRINT_END_MARKERS: &[&str] =
    &["END SMALL PRINT", "END THE SMALL PRINT", "SMALL PRINT FOR PUBLIC DOMAIN"];

/// End-of-content markers.
pub const END_MARKERS: &[&str] = &[
    "END OF THIS PROJECT GUTENBERG EBOOK",
    "END OF THE PROJECT GUTENBERG EBOOK",
    "END OF PROJECT GUTENBERG EBOOK",
];

/// Footer / legalese section starts that, once seen, mean everything after
/// is boilerplate even without an explicit END marker.
pub const FOOTER_SECTION_MARKERS: &[&str] =
    &["END OF THE PROJECT GUTENBERG", "START FULL LICENSE", "THE FULL PROJECT GUTENBERG LICENSE"];

/// Update-notice lines seen in footer sections.
pub const UPDATE_NOTICE_MARKERS: &[&str] = &["MOST RECENT UPDATE", "UPDATED EDITION"];

/// Regional-variant hint phrases (e.g. the Australian Project Gutenberg
/// variant) and their own cutoff markers.
pub const REGIONAL_VARIANT_HINTS: &[&str] = &["PROJECT GUTENBERG OF AUSTRALIA", "AUSTRALIA EBOOK"];
pub const REGIONAL_VARIANT_CUTOFFS: &[&str] = &["GO TO PROJECT GUTENBERG OF AUSTRALIA"];

/// Lines following a real start marker that are producer/credits/license
/// noise and should be skipped before real content begins.
pub const POST_START_JUNK_PHRASES: &[&str] =
    &["PRODUCED BY", "TRANSCRIBED FROM", "PROOFREADING TEAM", "CREDITS", "E TEXT PREPARED BY"];

/// Heuristic fallback phrases when no start marker is found at all.
pub const HEURISTIC_FALLBACK_PHRASES: &[&str] = &[
    "PROJECT GUTENBERG",
    "LICENSE",
    "COPYRIGHT",
    "PRODUCED BY",
    "THIS EBOOK IS FOR THE USE OF ANYONE ANYWHERE",
];

/// Triple-asterisk divider, normalized (punctuation collapses to a single
/// `*` run separated by spaces after [`crate::normalize::normalize_line`]).
pub const DIVIDER_MARKER: &str = "*";

/// Does `line` (already normalized) fuzzy-match `marker` (already
/// normalized)? Tries an exact substring match first, then a bounded
/// Levenshtein sliding window over the line's prefix.
pub fn fuzzy_contains(line: &str, marker: &str) -> bool {
    if marker.is_empty() {
        return false;
    }
    if line.contains(marker) {
        return true;
    }
    let prefix: Vec<char> = line.chars().take(PREFIX_WINDOW).collect();
    let marker_len = marker.chars().count();
    if marker_len == 0 || marker_len > prefix.len() {
        // marker longer than prefix can still fuzzy-match the whole prefix
        if !prefix.is_empty() {
            let window: String = prefix.iter().collect();
            return bounded_distance(&window, marker, MAX_FUZZY_DIST) <= MAX_FUZZY_DIST;
        }
        return false;
    }
    let max_start = (prefix.len() - marker_len).min(MAX_OFFSET);
    for start in 0..=max_start {
        let window: String = prefix[start..start + marker_len].iter().collect();
        if bounded_distance(&window, marker, MAX_FUZZY_DIST) <= MAX_FUZZY_DIST {
            return true;
        }
    }
    false
}

/// Does `line` fuzzy-match any marker in `markers`?
pub fn fuzzy_contains_any(line: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| fuzzy_contains(line, m))
}

/// Post-start junk continuation detection: lines beginning with "AND" or
/// containing an email/URL-like token.
pub fn is_junk_continuation(normalized_line: &str) -> bool {
    normalized_line.starts_with("AND ")
        || normalized_line.contains("HTTP")
        || normalized_line.contains(" COM")
        || normalized_line.contains('@')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_line;

    #[test]
    fn exact_marker_matches() {
        let line = normalize_line("*** START OF THE PROJECT GUTENBERG EBOOK FOO ***");
        assert!(fuzzy_contains_any(&line, START_MARKERS));
    }

    #[test]
    fn fuzzy_tolerates_ocr_noise() {
        let line = normalize_line("*** STRT 0F THE PROJECT GUTENBERG EBOOK FOO ***");
        assert!(fuzzy_contains_any(&line, START_MARKERS));
    }

    #[test]
    fn unrelated_line_does_not_match() {
        let line = normalize_line("Chapter One: In the beginning");
        assert!(!fuzzy_contains_any(&line, START_MARKERS));
    }

    #[test]
    fn junk_continuation_detects_and_and_urls() {
        assert!(is_junk_continuation("AND MARY SMITH"));
        assert!(is_junk_continuation("VISIT HTTP GUTENBERG ORG"));
        assert!(!is_junk_continuation("IN THE BEGINNING"));
    }
}
