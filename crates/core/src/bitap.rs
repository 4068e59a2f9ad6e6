//! Bounded bit-parallel (Bitap/Shift-Or) fuzzy search with Levenshtein errors.
//!
//! Works for patterns up to 31 bytes (comfortably inside a `u64` word). For
//! longer patterns the caller should fall back to a whitespace-tokenized
//! sliding window with per-word Levenshtein — see
//! [`crate::levenshtein::bounded_distance`], which that fallback is built
//! from; this module only implements the bit-parallel fast path.

use crate::levenshtein::bounded_distance;

/// Patterns longer than this must use the per-word fallback instead.
pub const MAX_BITAP_PATTERN_LEN: usize = 31;

/// A single fuzzy match reported by [`FuzzyMatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyHit {
    /// Absolute byte offset one past the last matched byte.
    pub end: u64,
    /// Lowest error count at which this position matched.
    pub errors: usize,
}

/// Streaming bit-parallel fuzzy matcher over a lowercase byte pattern,
/// tolerating up to `max_errors` substitutions/insertions/deletions.
pub struct FuzzyMatcher {
    pattern_len: usize,
    max_errors: usize,
    match_bit: u64,
    masks: [u64; 256],
    /// `r[d]` is the current state bitvector for <= d errors.
    r: Vec<u64>,
    position: u64,
    last_reported_end: Option<u64>,
}

impl FuzzyMatcher {
    /// `pattern` must already be lowercased and no longer than
    /// [`MAX_BITAP_PATTERN_LEN`].
    pub fn new(pattern: &[u8], max_errors: usize) -> Self {
        assert!(!pattern.is_empty() && pattern.len() <= MAX_BITAP_PATTERN_LEN);
        let m = pattern.len();
        let mut masks = [!0u64; 256];
        for (i, &b) in pattern.iter().enumerate() {
            masks[b as usize] &= !(1u64 << i);
        }
        // Convert from "0 = can extend" masks (built above by clearing bits)
        // to the "1 = can extend" active convention used by the recurrence
        // below: invert so bit i is set wherever pattern[i] == b.
        for m in masks.iter_mut() {
            *m = !*m;
        }
        let match_bit = 1u64 << (m - 1);
        let r = vec![0u64; max_errors + 1];
        Self { pattern_len: m, max_errors, match_bit, masks, r, position: 0, last_reported_end: None }
    }

    /// Feed one lowercased byte of text at the matcher's current stream
    /// position (positions are tracked internally across calls). Returns
    /// `Some(hit)` if a match with the lowest possible error count ends at
    /// this byte.
    pub fn step(&mut self, byte: u8) -> Option<FuzzyHit> {
        self.position += 1;
        let mask = self.masks[byte as usize];
        let old = self.r.clone();

        self.r[0] = ((old[0] << 1) | 1) & mask;
        for d in 1..=self.max_errors {
            let sub = old[d - 1] << 1;
            let ins = self.r[d - 1] << 1;
            let del = old[d - 1];
            let same = ((old[d] << 1) | 1) & mask;
            self.r[d] = same | sub | ins | del;
        }

        for d in 0..=self.max_errors {
            if self.r[d] & self.match_bit != 0 {
                let hit = FuzzyHit { end: self.position, errors: d };
                if self.last_reported_end != Some(self.position) {
                    self.last_reported_end = Some(self.position);
                    return Some(hit);
                }
                return None;
            }
        }
        None
    }

    /// Feed a whole chunk located at absolute offset `chunk_offset`; the
    /// matcher must have been fed exactly `chunk_offset` bytes already (or
    /// be fresh at offset 0). Returns all hits found in this chunk with
    /// absolute end offsets.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<FuzzyHit> {
        chunk.iter().filter_map(|&b| self.step(b.to_ascii_lowercase())).collect()
    }

    pub fn pattern_len(&self) -> usize {
        self.pattern_len
    }
}

/// One-shot fuzzy search returning `(start, errors)` for every match in
/// `text` against lowercased `pattern`, keeping only the lowest error count
/// per ending position and converting to start offsets.
pub fn search_whole(text: &[u8], pattern: &[u8], max_errors: usize) -> Vec<(u64, usize)> {
    let pattern: Vec<u8> = pattern.iter().map(|b| b.to_ascii_lowercase()).collect();
    let mut m = FuzzyMatcher::new(&pattern, max_errors);
    let mut out = Vec::new();
    for (i, &b) in text.iter().enumerate() {
        if let Some(hit) = m.step(b.to_ascii_lowercase()) {
            // The automaton reports only the end position and error count,
            // not the true matched length (which varies with insertions vs.
            // deletions vs. substitutions); approximate the start as exactly
            // `pattern.len()` back, which is exact for the substitution-only
            // case that dominates OCR noise and close enough otherwise for
            // context extraction.
            let start = (i as u64 + 1).saturating_sub(pattern.len() as u64);
            out.push((start, hit.errors));
        }
    }
    out
}

/// Per-word fallback for patterns longer than [`MAX_BITAP_PATTERN_LEN`]:
/// slide a window of whitespace-delimited words over `text_words` and score
/// each window by summed per-word Levenshtein distance, bounded by
/// `total_threshold` with a per-word threshold of `ceil(0.3 * word.len())`.
pub fn word_window_search(
    text_words: &[&str],
    pattern_words: &[&str],
    total_threshold: usize,
) -> Vec<(usize, usize)> {
    if pattern_words.is_empty() || text_words.len() < pattern_words.len() {
        return Vec::new();
    }
    let mut hits = Vec::new();
    for start in 0..=(text_words.len() - pattern_words.len()) {
        let mut total = 0usize;
        let mut ok = true;
        for (w, p) in text_words[start..start + pattern_words.len()].iter().zip(pattern_words) {
            let per_word_threshold = (p.chars().count() * 3).div_ceil(10).max(1);
            let d = bounded_distance(w, p, per_word_threshold.max(total_threshold));
            if d > per_word_threshold {
                ok = false;
                break;
            }
            total += d;
        }
        if ok && total <= total_threshold {
            hits.push((start, total));
        }
    }
    hits
}
