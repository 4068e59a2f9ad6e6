//! Navigator: a boilerplate-aware, UTF-8-safe, word-granular, bidirectional
//! cursor over a book's clean content interval, with calibrated
//! bytes-per-word density, a chunk LRU, and best-effort adjacent prefetch.

use std::sync::{Arc, Mutex};

use bookreader_core::utf8;
use bookreader_core::words::{self, Token};

use crate::boundary::{find_end_window, find_start_window, BoundaryConfig, Boundaries};
use crate::range_source::{RangeSource, RangeSourceError};

#[derive(Debug, thiserror::Error)]
pub enum NavigatorError {
    #[error(transparent)]
    RangeSource(#[from] RangeSourceError),
    #[error("chunk_words must be at least 1")]
    InvalidChunkWords,
}

#[derive(Debug, Clone, Copy)]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub word_index: u64,
    pub byte_start: u64,
    pub byte_end: u64,
    pub next_byte_start: Option<u64>,
    pub previous_byte_end: u64,
    pub percent: f64,
    pub is_near_end: bool,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct NavigatorConfig {
    pub chunk_words: usize,
    pub max_history: usize,
    pub max_lru_chunks: usize,
    pub safety_margin: u64,
    pub calibration_samples: usize,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self { chunk_words: 200, max_history: 50, max_lru_chunks: 10, safety_margin: 4, calibration_samples: 10 }
    }
}

type LruEntry = ((u64, u64), Arc<Vec<u8>>);

pub struct Navigator {
    range_source: Arc<dyn RangeSource>,
    book_id: String,
    pub boundaries: Boundaries,
    config: NavigatorConfig,
    avg_bytes_per_word: f64,
    total_words_estimate: f64,
    density_window: Vec<f64>,
    lru: Arc<Mutex<Vec<LruEntry>>>,
    history: Vec<Position>,
    future: Vec<Position>,
}

impl Navigator {
    /// Open a session on `book_id`, reading its boundaries and running
    /// initial density calibration.
    pub fn open(
        range_source: Arc<dyn RangeSource>,
        book_id: impl Into<String>,
        config: NavigatorConfig,
    ) -> Result<Self, NavigatorError> {
        if config.chunk_words < 1 {
            return Err(NavigatorError::InvalidChunkWords);
        }
        let book_id = book_id.into();
        let file_size = range_source.file_size(&book_id)?;
        let boundary_config = BoundaryConfig::default();

        // Boundary detection never downloads the whole book: it scans only
        // a head window and a tail window, each fetched through the Range
        // Source (so a cache-backed source only ever pulls those bytes).
        let head_len = (boundary_config.head_scan as u64).min(file_size);
        let head =
            if head_len == 0 { Vec::new() } else { range_source.read_range(&book_id, 0, head_len - 1)? };
        let (start_byte, mut flags) = find_start_window(&head);

        let tail_base = file_size.saturating_sub(boundary_config.tail_scan as u64).max(start_byte).min(file_size);
        let tail = if tail_base >= file_size {
            Vec::new()
        } else {
            range_source.read_range(&book_id, tail_base, file_size - 1)?
        };
        let (end_byte, end_flags) = find_end_window(&tail, tail_base, file_size);
        flags.extend(end_flags);
        let end_byte = end_byte.max(start_byte);
        let boundaries = Boundaries { start_byte, end_byte, clean_length: end_byte - start_byte, flags };

        let mut nav = Self {
            range_source,
            book_id,
            boundaries,
            config,
            avg_bytes_per_word: 6.0,
            total_words_estimate: 0.0,
            density_window: Vec::new(),
            lru: Arc::new(Mutex::new(Vec::new())),
            history: Vec::new(),
            future: Vec::new(),
        };
        nav.calibrate()?;
        Ok(nav)
    }

    fn calibrate(&mut self) -> Result<(), NavigatorError> {
        let clean_length = self.boundaries.clean_length;
        let mut densities = Vec::new();
        for frac in [0.1, 0.6] {
            let target = self.boundaries.start_byte + (clean_length as f64 * frac) as u64;
            let sample_len = (2000usize).min(((clean_length as f64) * 0.02) as usize).max(1) as u64;
            let lo = target.min(self.boundaries.end_byte.saturating_sub(1)).max(self.boundaries.start_byte);
            let hi = (lo + sample_len - 1).min(self.boundaries.end_byte.saturating_sub(1));
            if lo >= hi {
                continue;
            }
            let bytes = self.range_source.read_range(&self.book_id, lo, hi)?;
            let (_, _, text) = utf8::safe_slice(&bytes, 0, bytes.len());
            if text.is_empty() {
                continue;
            }
            let word_count = text.split_whitespace().count();
            densities.push(word_count as f64 / text.len() as f64);
        }
        let mean_density = if densities.is_empty() {
            1.0 / 6.0
        } else {
            densities.iter().sum::<f64>() / densities.len() as f64
        };
        self.avg_bytes_per_word = if mean_density > 0.0 { 1.0 / mean_density } else { 6.0 };
        self.total_words_estimate = clean_length as f64 * mean_density;
        self.density_window = densities;
        Ok(())
    }

    fn update_density(&mut self, words_found: usize, bytes_scanned: u64) {
        if bytes_scanned == 0 {
            return;
        }
        let density = words_found as f64 / bytes_scanned as f64;
        self.density_window.push(density);
        if self.density_window.len() > self.config.calibration_samples {
            self.density_window.remove(0);
        }
        let mean = self.density_window.iter().sum::<f64>() / self.density_window.len() as f64;
        if mean > 0.0 {
            self.avg_bytes_per_word = 1.0 / mean;
        }
    }

    pub fn set_chunk_words(&mut self, n: usize) -> Result<(), NavigatorError> {
        if n < 1 {
            return Err(NavigatorError::InvalidChunkWords);
        }
        self.config.chunk_words = n;
        self.history.clear();
        self.future.clear();
        Ok(())
    }

    fn span(&self) -> u64 {
        let primary = (self.config.chunk_words as f64 * self.avg_bytes_per_word * 2.5) as u64;
        let min_progress =
            ((self.config.chunk_words as f64) * self.avg_bytes_per_word * 0.5).floor().max(1.0) as u64;
        primary.max(min_progress)
    }

    fn lru_get(&self, lo: u64, hi: u64) -> Option<Arc<Vec<u8>>> {
        let mut guard = self.lru.lock().unwrap();
        let pos = guard.iter().position(|(k, _)| *k == (lo, hi))?;
        let entry = guard.remove(pos);
        let data = entry.1.clone();
        guard.insert(0, entry);
        Some(data)
    }

    fn lru_put(&self, lo: u64, hi: u64, data: Arc<Vec<u8>>) {
        let mut guard = self.lru.lock().unwrap();
        guard.retain(|(k, _)| *k != (lo, hi));
        guard.insert(0, ((lo, hi), data));
        if guard.len() > self.config.max_lru_chunks {
            guard.pop();
        }
    }

    fn read_window(&self, lo: u64, hi: u64) -> Result<Arc<Vec<u8>>, NavigatorError> {
        if let Some(cached) = self.lru_get(lo, hi) {
            return Ok(cached);
        }
        let bytes = Arc::new(self.range_source.read_range(&self.book_id, lo, hi)?);
        self.lru_put(lo, hi, bytes.clone());
        Ok(bytes)
    }

    fn spawn_prefetch(&self, lo: u64, hi: u64) {
        if lo > hi {
            return;
        }
        let range_source = self.range_source.clone();
        let book_id = self.book_id.clone();
        let lru = self.lru.clone();
        let max = self.config.max_lru_chunks;
        std::thread::spawn(move || {
            if let Ok(bytes) = range_source.read_range(&book_id, lo, hi) {
                let mut guard = lru.lock().unwrap();
                if !guard.iter().any(|(k, _)| *k == (lo, hi)) {
                    guard.insert(0, ((lo, hi), Arc::new(bytes)));
                    if guard.len() > max {
                        guard.pop();
                    }
                }
            }
        });
    }

    fn fetch_chunk(
        &mut self,
        direction: Direction,
        estimated_byte: u64,
        base_word_index: u64,
    ) -> Result<Position, NavigatorError> {
        let margin = self.config.safety_margin;
        let span = self.span().max(1);
        let start_bound = self.boundaries.start_byte;
        let end_bound_inclusive = self.boundaries.end_byte.saturating_sub(1).max(start_bound);

        let (req_lo, req_hi) = match direction {
            Direction::Forward => {
                let lo = estimated_byte.saturating_sub(margin).max(start_bound);
                let hi = (estimated_byte + span).min(end_bound_inclusive);
                (lo, hi.max(lo))
            }
            Direction::Backward => {
                let hi = (estimated_byte + margin).min(end_bound_inclusive);
                let lo = estimated_byte.saturating_sub(span).max(start_bound);
                (lo.min(hi), hi)
            }
        };

        let bytes = self.read_window(req_lo, req_hi)?;
        let (eff_start_rel, eff_end_rel, text) = utf8::safe_slice(&bytes, 0, bytes.len());
        let abs_eff_start = req_lo + eff_start_rel as u64;

        let before_byte = if eff_start_rel > 0 { Some(bytes[eff_start_rel - 1]) } else { None };
        let at_byte = bytes.get(eff_start_rel).copied();
        let mid_word = abs_eff_start > start_bound && !utf8::is_word_boundary(before_byte, at_byte);

        let mut tokens = words::tokenize(text);
        if mid_word {
            if let Some(Token::Word { .. }) = tokens.first() {
                tokens.remove(0);
            }
        }

        let chunk_words = self.config.chunk_words;
        let (sel_start, sel_end, words_collected) = match direction {
            Direction::Forward => select_forward(&tokens, chunk_words),
            Direction::Backward => select_backward(&tokens, chunk_words),
        };
        let selected = &tokens[sel_start..sel_end];

        let (byte_start, byte_end, next_tok_idx) = if selected.is_empty() {
            (abs_eff_start, abs_eff_start, None)
        } else {
            let byte_start = abs_eff_start + selected.first().unwrap().byte_offset() as u64;
            let byte_end = abs_eff_start + selected.last().unwrap().byte_end() as u64;
            (byte_start, byte_end, Some(sel_end))
        };

        let next_byte_start = next_tok_idx
            .and_then(|i| tokens.get(i))
            .map(|t| abs_eff_start + t.byte_offset() as u64);

        let selected_words: Vec<String> = selected
            .iter()
            .filter_map(|t| match t {
                Token::Word { text, .. } => Some((*text).to_string()),
                Token::ParagraphBreak { .. } => None,
            })
            .collect();

        let clean_length = self.boundaries.clean_length.max(1);
        let percent = 100.0 * (byte_start.saturating_sub(start_bound)) as f64 / clean_length as f64;
        let is_near_end = byte_end + 100 >= self.boundaries.end_byte || words_collected < chunk_words;

        self.update_density(words_collected, (eff_end_rel - eff_start_rel) as u64);

        let word_index = match direction {
            Direction::Forward => base_word_index,
            Direction::Backward => base_word_index.saturating_sub(words_collected as u64),
        };

        match direction {
            Direction::Forward => {
                let lookback = (span / 4).min(4096);
                self.spawn_prefetch(req_hi + 1, (req_hi + span).min(end_bound_inclusive));
                self.spawn_prefetch(req_hi.saturating_sub(lookback), req_hi);
            }
            Direction::Backward => {
                self.spawn_prefetch(req_lo.saturating_sub(span).max(start_bound), req_lo.saturating_sub(1).max(start_bound));
            }
        }

        Ok(Position {
            word_index,
            byte_start,
            byte_end,
            next_byte_start,
            previous_byte_end: byte_start,
            percent,
            is_near_end,
            words: selected_words,
        })
    }

    fn push_history(&mut self, pos: Position) {
        self.history.push(pos);
        if self.history.len() > self.config.max_history {
            self.history.remove(0);
        }
    }

    pub fn go_to_percent(&mut self, p: f64) -> Result<Position, NavigatorError> {
        let p = p.clamp(0.0, 100.0);
        self.history.clear();
        self.future.clear();
        let word_target = (self.total_words_estimate * p / 100.0).floor().max(0.0);
        let start_bound = self.boundaries.start_byte;
        let end_bound_inclusive = self.boundaries.end_byte.saturating_sub(1).max(start_bound);
        let estimated_byte =
            (start_bound + (word_target * self.avg_bytes_per_word) as u64).clamp(start_bound, end_bound_inclusive);
        self.fetch_chunk(Direction::Forward, estimated_byte, word_target as u64)
    }

    pub fn move_forward(&mut self, cur: &Position) -> Result<Position, NavigatorError> {
        let base_word_index = cur.word_index + cur.words.len() as u64;
        self.push_history(cur.clone());
        self.future.clear();
        let target = cur.next_byte_start.unwrap_or(
            (cur.byte_end as f64 + self.config.chunk_words as f64 * self.avg_bytes_per_word) as u64,
        );
        let start_bound = self.boundaries.start_byte;
        let end_bound_inclusive = self.boundaries.end_byte.saturating_sub(1).max(start_bound);
        let target = target.clamp(start_bound, end_bound_inclusive);
        self.fetch_chunk(Direction::Forward, target, base_word_index)
    }

    pub fn move_backward(&mut self, cur: &Position) -> Result<Position, NavigatorError> {
        if cur.byte_start <= self.boundaries.start_byte {
            return Ok(cur.clone());
        }
        if let Some(prev) = self.history.pop() {
            self.future.push(cur.clone());
            return Ok(prev);
        }
        self.fetch_chunk(Direction::Backward, cur.previous_byte_end, cur.word_index)
    }
}

fn select_forward(tokens: &[Token], chunk_words: usize) -> (usize, usize, usize) {
    let mut count = 0;
    let mut end_idx = tokens.len();
    for (i, t) in tokens.iter().enumerate() {
        if t.is_word() {
            count += 1;
            if count == chunk_words {
                end_idx = i + 1;
                return (0, end_idx, count);
            }
        }
    }
    (0, end_idx, count)
}

fn select_backward(tokens: &[Token], chunk_words: usize) -> (usize, usize, usize) {
    let mut count = 0;
    let mut start_idx = 0;
    for (i, t) in tokens.iter().enumerate().rev() {
        start_idx = i;
        if t.is_word() {
            count += 1;
            if count == chunk_words {
                break;
            }
        }
    }
    (start_idx, tokens.len(), count)
}
