//! Typed configuration, loaded from a TOML file with every field defaulted.
//!
//! Mirrors the teacher's `.codescope.toml` loading: a config file is
//! optional, missing fields fall back to the recognized defaults, and
//! unknown top-level keys are rejected rather than silently ignored.

use std::path::{Path, PathBuf};

use bookreader_cache::CacheConfig;
use bookreader_reader::{NavigatorConfig, SearcherConfig};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    #[serde(default = "default_validation_interval_ms")]
    pub validation_interval_ms: u64,
    #[serde(default = "default_max_coalesce_gap")]
    pub max_coalesce_gap: u64,
    #[serde(default)]
    pub max_books: Option<usize>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".bookreader-cache")
}
fn default_block_size() -> u64 {
    4096
}
fn default_validation_interval_ms() -> u64 {
    24 * 3600 * 1000
}
fn default_max_coalesce_gap() -> u64 {
    8 * 1024
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            block_size: default_block_size(),
            validation_interval_ms: default_validation_interval_ms(),
            max_coalesce_gap: default_max_coalesce_gap(),
            max_books: None,
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            block_size: self.block_size,
            max_coalesce_gap: self.max_coalesce_gap,
            validation_interval_secs: self.validation_interval_ms / 1000,
            max_books: self.max_books,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NavigatorSettings {
    #[serde(default = "default_chunk_words")]
    pub chunk_words: usize,
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    #[serde(default = "default_max_lru_chunks")]
    pub max_lru_chunks: usize,
    #[serde(default = "default_safety_margin")]
    pub safety_margin: u64,
    #[serde(default = "default_calibration_samples")]
    pub calibration_samples: usize,
}

fn default_chunk_words() -> usize {
    200
}
fn default_max_history() -> usize {
    50
}
fn default_max_lru_chunks() -> usize {
    10
}
fn default_safety_margin() -> u64 {
    4
}
fn default_calibration_samples() -> usize {
    10
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self {
            chunk_words: default_chunk_words(),
            max_history: default_max_history(),
            max_lru_chunks: default_max_lru_chunks(),
            safety_margin: default_safety_margin(),
            calibration_samples: default_calibration_samples(),
        }
    }
}

impl NavigatorSettings {
    pub fn to_navigator_config(self) -> NavigatorConfig {
        NavigatorConfig {
            chunk_words: self.chunk_words,
            max_history: self.max_history,
            max_lru_chunks: self.max_lru_chunks,
            safety_margin: self.safety_margin,
            calibration_samples: self.calibration_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearcherSettings {
    #[serde(default = "default_small_file_threshold")]
    pub small_file_threshold: u64,
    #[serde(default = "default_min_chunk")]
    pub min_chunk: u64,
    #[serde(default = "default_max_chunk")]
    pub max_chunk: u64,
    #[serde(default = "default_head_skip")]
    pub head_skip: u64,
    #[serde(default = "default_tail_skip")]
    pub tail_skip: u64,
    #[serde(default = "default_context_size")]
    pub context_size: u64,
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
}

fn default_small_file_threshold() -> u64 {
    50 * 1024
}
fn default_min_chunk() -> u64 {
    16 * 1024
}
fn default_max_chunk() -> u64 {
    128 * 1024
}
fn default_head_skip() -> u64 {
    500
}
fn default_tail_skip() -> u64 {
    4 * 1024
}
fn default_context_size() -> u64 {
    100
}
fn default_max_edit_distance() -> usize {
    2
}
fn default_max_matches() -> usize {
    50
}

impl Default for SearcherSettings {
    fn default() -> Self {
        Self {
            small_file_threshold: default_small_file_threshold(),
            min_chunk: default_min_chunk(),
            max_chunk: default_max_chunk(),
            head_skip: default_head_skip(),
            tail_skip: default_tail_skip(),
            context_size: default_context_size(),
            max_edit_distance: default_max_edit_distance(),
            max_matches: default_max_matches(),
        }
    }
}

impl SearcherSettings {
    pub fn to_searcher_config(self) -> SearcherConfig {
        SearcherConfig {
            small_file_threshold: self.small_file_threshold,
            min_chunk: self.min_chunk,
            max_chunk: self.max_chunk,
            head_skip: self.head_skip,
            tail_skip: self.tail_skip,
            context_size: self.context_size,
            max_edit_distance: self.max_edit_distance,
            max_matches: self.max_matches,
        }
    }
}

/// Full typed configuration: one section per component, each independently
/// defaulted so a config file only needs to mention the fields it overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReaderConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub navigator: NavigatorSettings,
    #[serde(default)]
    pub searcher: SearcherSettings,
}

impl ReaderConfig {
    /// Load from a TOML file on disk. Missing fields default; unknown
    /// top-level or section keys are a hard error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Parse from an in-memory TOML string (used by tests and `--config -`).
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_all_defaults() {
        let config = ReaderConfig::from_toml_str("").unwrap();
        assert_eq!(config.cache.block_size, 4096);
        assert_eq!(config.navigator.chunk_words, 200);
        assert_eq!(config.searcher.max_matches, 50);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = ReaderConfig::from_toml_str(
            "[searcher]\nmax_matches = 10\nmax_edit_distance = 1\n",
        )
        .unwrap();
        assert_eq!(config.searcher.max_matches, 10);
        assert_eq!(config.searcher.max_edit_distance, 1);
        assert_eq!(config.searcher.min_chunk, 16 * 1024);
        assert_eq!(config.navigator.chunk_words, 200);
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = ReaderConfig::from_toml_str("bogus = true\n");
        assert!(err.is_err());
    }

    #[test]
    fn load_from_file_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reader.toml");
        std::fs::write(&path, "[navigator]\nchunk_words = 75\n").unwrap();
        let config = ReaderConfig::load(&path).unwrap();
        assert_eq!(config.navigator.chunk_words, 75);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = ReaderConfig::load("/nonexistent/reader.toml");
        assert!(matches!(err, Err(ConfigError::Read { .. })));
    }
}
