//! Adaptive Searcher: streaming exact (KMP) and bounded fuzzy (Bitap /
//! word-window) substring search over a Range Source, with adaptive chunk
//! sizing and head/tail boilerplate skipping.

use std::time::Instant;

use bookreader_core::bitap::{self, FuzzyMatcher, MAX_BITAP_PATTERN_LEN};
use bookreader_core::kmp::KmpMatcher;
use bookreader_core::utf8;
use bookreader_core::words::{tokenize, Token};
use serde::Serialize;

use crate::range_source::{RangeSource, RangeSourceError};

#[derive(Debug, thiserror::Error)]
pub enum SearcherError {
    #[error("search phrase must be at least 4 words and 10 characters")]
    PhraseTooShort,
    #[error(transparent)]
    RangeSource(#[from] RangeSourceError),
}

#[derive(Debug, Clone, Copy)]
pub struct SearcherConfig {
    pub small_file_threshold: u64,
    pub min_chunk: u64,
    pub max_chunk: u64,
    pub head_skip: u64,
    pub tail_skip: u64,
    pub context_size: u64,
    pub max_edit_distance: usize,
    pub max_matches: usize,
}

impl Default for SearcherConfig {
    fn default() -> Self {
        Self {
            small_file_threshold: 50 * 1024,
            min_chunk: 16 * 1024,
            max_chunk: 128 * 1024,
            head_skip: 500,
            tail_skip: 4 * 1024,
            context_size: 100,
            max_edit_distance: 2,
            max_matches: 50,
        }
    }
}

pub const MAX_EDIT_DISTANCE_CAP: usize = 3;
pub const MAX_MATCHES_CAP: usize = 100;
const MISSES_BEFORE_GROWTH: u32 = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchOptions {
    pub fuzzy: bool,
    pub max_matches: Option<usize>,
    pub max_edit_distance: Option<usize>,
    pub context_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FullDownload,
    RangeStreaming,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub byte_offset: u64,
    pub errors: usize,
    pub context: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub found: bool,
    pub matches: Vec<SearchMatch>,
    pub bytes_downloaded: u64,
    pub chunks_requested: u32,
    pub strategy: Strategy,
    pub elapsed_ms: u64,
}

fn check_phrase(phrase: &str) -> Result<(), SearcherError> {
    let word_count = phrase.split_whitespace().count();
    if word_count < 4 || phrase.chars().count() < 10 {
        return Err(SearcherError::PhraseTooShort);
    }
    Ok(())
}

pub fn search(
    range_source: &dyn RangeSource,
    id: &str,
    phrase: &str,
    options: SearchOptions,
    config: SearcherConfig,
) -> Result<SearchResult, SearcherError> {
    check_phrase(phrase)?;
    let started = Instant::now();

    let max_matches = options.max_matches.unwrap_or(config.max_matches).min(MAX_MATCHES_CAP);
    let max_edit_distance =
        options.max_edit_distance.unwrap_or(config.max_edit_distance).min(MAX_EDIT_DISTANCE_CAP);
    let context_size = options.context_size.unwrap_or(config.context_size);

    let file_size = range_source.file_size(id)?;
    let pattern_lower = phrase.to_ascii_lowercase();

    let (strategy, bytes_downloaded, chunks_requested, matches) = if file_size < config.small_file_threshold {
        let bytes = range_source.read_range(id, 0, file_size.saturating_sub(1))?;
        let matches = search_window(
            range_source,
            id,
            &bytes,
            0,
            file_size,
            &pattern_lower,
            options.fuzzy,
            max_edit_distance,
            context_size,
            max_matches,
            None,
        )?;
        (Strategy::FullDownload, bytes.len() as u64, 1, matches)
    } else {
        run_adaptive_scan(range_source, id, file_size, &pattern_lower, options.fuzzy, max_edit_distance, context_size, max_matches, &config)?
    };

    Ok(SearchResult {
        found: !matches.is_empty(),
        matches,
        bytes_downloaded,
        chunks_requested,
        strategy,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

#[allow(clippy::too_many_arguments)]
fn run_adaptive_scan(
    range_source: &dyn RangeSource,
    id: &str,
    file_size: u64,
    pattern_lower: &str,
    fuzzy: bool,
    max_edit_distance: usize,
    context_size: u64,
    max_matches: usize,
    config: &SearcherConfig,
) -> Result<(Strategy, u64, u32, Vec<SearchMatch>), SearcherError> {
    let head_bound = config.head_skip.min(file_size);
    let tail_bound = file_size.saturating_sub(config.tail_skip).max(head_bound);

    let pattern_len = pattern_lower.len() as u64;
    let overlap = pattern_len.saturating_sub(1);

    let mut pos = head_bound;
    let mut chunk_size = config.min_chunk;
    let mut misses = 0u32;
    let mut bytes_downloaded = 0u64;
    let mut chunks_requested = 0u32;
    let mut matches = Vec::new();
    // End offset of the previous window's fetch. A hit whose match ends at
    // or before this offset completed entirely inside that window and was
    // already reported there; only hits that straddle past it are new.
    let mut prev_fetch_hi: Option<u64> = None;

    while pos < tail_bound && matches.len() < max_matches {
        let fetch_lo = if pos == head_bound { pos } else { pos.saturating_sub(overlap).max(head_bound) };
        let fetch_hi = (pos + chunk_size - 1).min(tail_bound.saturating_sub(1));
        if fetch_lo > fetch_hi {
            break;
        }
        let window = range_source.read_range(id, fetch_lo, fetch_hi)?;
        chunks_requested += 1;
        bytes_downloaded += window.len() as u64;

        let fresh = search_window(
            range_source,
            id,
            &window,
            fetch_lo,
            file_size,
            pattern_lower,
            fuzzy,
            max_edit_distance,
            context_size,
            max_matches - matches.len(),
            prev_fetch_hi,
        )?;

        if fresh.is_empty() {
            misses += 1;
        } else {
            misses = 0;
        }
        matches.extend(fresh);
        if misses >= MISSES_BEFORE_GROWTH {
            chunk_size = (chunk_size * 2).min(config.max_chunk);
        }
        prev_fetch_hi = Some(fetch_hi);
        pos = fetch_hi + 1;
    }

    Ok((Strategy::RangeStreaming, bytes_downloaded, chunks_requested, matches))
}

#[allow(clippy::too_many_arguments)]
fn search_window(
    range_source: &dyn RangeSource,
    id: &str,
    window: &[u8],
    window_lo: u64,
    file_size: u64,
    pattern_lower: &str,
    fuzzy: bool,
    max_edit_distance: usize,
    context_size: u64,
    max_hits: usize,
    min_end_exclusive: Option<u64>,
) -> Result<Vec<SearchMatch>, SearcherError> {
    if max_hits == 0 {
        return Ok(Vec::new());
    }
    let lower: Vec<u8> = window.iter().map(|b| b.to_ascii_lowercase()).collect();
    let pattern_bytes = pattern_lower.as_bytes();

    let mut hits: Vec<(u64, u64, usize)> = if !fuzzy {
        let mut m = KmpMatcher::new(pattern_bytes);
        m.feed(&lower, window_lo)
            .into_iter()
            .map(|start| (start, start + pattern_bytes.len() as u64, 0))
            .collect()
    } else if pattern_bytes.len() <= MAX_BITAP_PATTERN_LEN {
        let mut m = FuzzyMatcher::new(pattern_bytes, max_edit_distance);
        let mut out = Vec::new();
        for (i, &b) in lower.iter().enumerate() {
            if let Some(hit) = m.step(b) {
                let abs_end = window_lo + i as u64 + 1;
                let abs_start = abs_end.saturating_sub(pattern_bytes.len() as u64);
                out.push((abs_start, abs_end, hit.errors));
            }
        }
        out
    } else {
        let text = String::from_utf8_lossy(&lower);
        let tokens = tokenize(&text);
        let word_tokens: Vec<&Token> = tokens.iter().filter(|t| t.is_word()).collect();
        let text_words: Vec<&str> = word_tokens
            .iter()
            .map(|t| match t {
                Token::Word { text, .. } => *text,
                Token::ParagraphBreak { .. } => unreachable!(),
            })
            .collect();
        let pattern_words: Vec<&str> = pattern_lower.split_whitespace().collect();
        let total_threshold = max_edit_distance * pattern_words.len().max(1);
        bitap::word_window_search(&text_words, &pattern_words, total_threshold)
            .into_iter()
            .map(|(word_idx, errors)| {
                let start_tok = word_tokens[word_idx];
                let end_tok = word_tokens[word_idx + pattern_words.len() - 1];
                let abs_start = window_lo + start_tok.byte_offset() as u64;
                let abs_end = window_lo + end_tok.byte_end() as u64;
                (abs_start, abs_end, errors)
            })
            .collect()
    };

    if let Some(threshold) = min_end_exclusive {
        // Hits that completed at or before the previous window's fetch
        // boundary were already found and reported there; a straddling
        // match's end lies past it, so it survives this filter.
        hits.retain(|(_, end, _)| *end > threshold);
    }
    hits.sort_by_key(|(start, _, _)| *start);
    hits.truncate(max_hits);

    hits.into_iter()
        .map(|(abs_start, abs_end, errors)| {
            let context =
                extract_context(range_source, id, window, window_lo, file_size, abs_start, abs_end, context_size)?;
            Ok(SearchMatch { byte_offset: abs_start, errors, context })
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn extract_context(
    range_source: &dyn RangeSource,
    id: &str,
    window: &[u8],
    window_lo: u64,
    file_size: u64,
    abs_start: u64,
    abs_end: u64,
    context_size: u64,
) -> Result<String, SearcherError> {
    let window_hi = window_lo + window.len() as u64;
    let want_lo = abs_start.saturating_sub(context_size);
    let want_hi = (abs_end + context_size).min(file_size);

    if want_lo >= window_lo && want_hi <= window_hi {
        let rel_lo = (want_lo - window_lo) as usize;
        let rel_hi = (want_hi - window_lo) as usize;
        let (_, _, text) = utf8::safe_slice(window, rel_lo, rel_hi);
        Ok(text.to_string())
    } else {
        let clamped_hi = want_hi.saturating_sub(1).min(file_size.saturating_sub(1));
        let bytes = range_source.read_range(id, want_lo, clamped_hi)?;
        let (_, _, text) = utf8::safe_slice(&bytes, 0, bytes.len());
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeSource {
        body: Vec<u8>,
        reads: Mutex<u32>,
    }

    impl RangeSource for FakeSource {
        fn file_size(&self, _id: &str) -> Result<u64, RangeSourceError> {
            Ok(self.body.len() as u64)
        }
        fn read_range(&self, _id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, RangeSourceError> {
            *self.reads.lock().unwrap() += 1;
            let hi = hi.min(self.body.len() as u64 - 1);
            Ok(self.body[lo as usize..=hi as usize].to_vec())
        }
    }

    fn small_book(needle: &str) -> Vec<u8> {
        let mut text = "word ".repeat(20);
        text.push_str(needle);
        text.push(' ');
        text.push_str(&"word ".repeat(20));
        text.into_bytes()
    }

    #[test]
    fn phrase_too_short_is_rejected() {
        let source = FakeSource { body: small_book("irrelevant text here"), reads: Mutex::new(0) };
        let err = search(&source, "book-1", "too short", SearchOptions::default(), SearcherConfig::default());
        assert!(matches!(err, Err(SearcherError::PhraseTooShort)));
    }

    #[test]
    fn small_file_uses_full_download_strategy() {
        let source = FakeSource { body: small_book("the dark and stormy night"), reads: Mutex::new(0) };
        let result = search(
            &source,
            "book-1",
            "the dark and stormy night",
            SearchOptions::default(),
            SearcherConfig::default(),
        )
        .unwrap();
        assert_eq!(result.strategy, Strategy::FullDownload);
        assert!(result.found);
        assert_eq!(result.matches.len(), 1);
    }

    #[test]
    fn large_file_uses_range_streaming_and_finds_match_across_chunks() {
        let mut body = vec![b'x'; 200_000];
        let needle = b"the quick brown fox jumps";
        let insert_at = 150_000;
        body[insert_at..insert_at + needle.len()].copy_from_slice(needle);
        let source = FakeSource { body, reads: Mutex::new(0) };

        let result = search(
            &source,
            "book-1",
            "the quick brown fox jumps",
            SearchOptions::default(),
            SearcherConfig::default(),
        )
        .unwrap();
        assert_eq!(result.strategy, Strategy::RangeStreaming);
        assert!(result.found);
        assert_eq!(result.matches[0].byte_offset, insert_at as u64);
    }

    #[test]
    fn match_straddling_a_chunk_boundary_is_found() {
        // Place the needle so it starts well inside the first adaptive
        // chunk but ends past that chunk's fetch boundary — streaming KMP
        // can't complete it there, so it's only found once the next
        // window's overlap re-fetch brings the rest of it into view.
        let config = SearcherConfig::default();
        let first_fetch_hi = config.head_skip + config.min_chunk - 1;
        let needle = b"the quick brown fox jumps";
        let insert_at = (first_fetch_hi - 10) as usize;
        assert!(insert_at + needle.len() > first_fetch_hi as usize + 1, "needle must cross the boundary");

        let mut body = vec![b'x'; 200_000];
        body[insert_at..insert_at + needle.len()].copy_from_slice(needle);
        let source = FakeSource { body, reads: Mutex::new(0) };

        let result = search(
            &source,
            "book-1",
            "the quick brown fox jumps",
            SearchOptions::default(),
            SearcherConfig::default(),
        )
        .unwrap();
        assert_eq!(result.strategy, Strategy::RangeStreaming);
        assert!(result.found, "match straddling the chunk boundary was not found");
        assert_eq!(result.matches[0].byte_offset, insert_at as u64);
    }

    #[test]
    fn fuzzy_search_tolerates_one_typo() {
        let source = FakeSource { body: small_book("the quuck brown fox jumps"), reads: Mutex::new(0) };
        let opts = SearchOptions { fuzzy: true, max_edit_distance: Some(1), ..Default::default() };
        let result =
            search(&source, "book-1", "the quick brown fox jumps", opts, SearcherConfig::default()).unwrap();
        assert!(result.found);
        assert!(result.matches[0].errors >= 1);
    }

    #[test]
    fn max_matches_is_respected() {
        let mut body = Vec::new();
        for _ in 0..5 {
            body.extend_from_slice(b"find the needle phrase here ");
        }
        let source = FakeSource { body, reads: Mutex::new(0) };
        let opts = SearchOptions { max_matches: Some(2), ..Default::default() };
        let result = search(&source, "book-1", "find the needle phrase", opts, SearcherConfig::default()).unwrap();
        assert_eq!(result.matches.len(), 2);
    }
}
