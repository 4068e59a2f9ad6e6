//! Facade crate wiring configuration, logging, and the shared sparse-cache /
//! mirror-pool handles around the reader core into one constructed handle —
//! explicit, not a hidden global (mirrors the teacher's `server/src/lib.rs`
//! re-export facade, generalized here into a small constructor since this
//! workspace has no transport crates of its own to re-export).

pub mod config;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use bookreader_cache::{MirrorOrigin, SparseCache};
use bookreader_origin::MirrorPool;
use bookreader_reader::{
    CacheRangeSource, Navigator, NavigatorError, RangeSource, RangeSourceError, SearchOptions, SearchResult,
    SearcherError,
};

pub use config::{CacheSettings, ConfigError, NavigatorSettings, ReaderConfig, SearcherSettings};
pub use logging::init_logging;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error(transparent)]
    Cache(#[from] bookreader_cache::CacheError),
    #[error(transparent)]
    RangeSource(#[from] RangeSourceError),
    #[error(transparent)]
    Navigator(#[from] NavigatorError),
    #[error(transparent)]
    Searcher(#[from] SearcherError),
}

/// The library's single shared state: one sparse cache over one mirror
/// pool, with the typed config used to build every per-book session. Held
/// behind an `Arc` so a CLI or any future server front end can clone a
/// cheap handle per request rather than re-reading config and re-opening
/// the cache directory each time.
pub struct Library {
    cache: Arc<SparseCache>,
    config: ReaderConfig,
}

impl Library {
    /// Build a library over `mirrors` (equivalent origin base URLs), mapping
    /// a book id to its path under each mirror via `path_for`.
    pub fn open(
        mirrors: Vec<String>,
        path_for: impl Fn(&str) -> String + Send + Sync + 'static,
        config: ReaderConfig,
    ) -> Self {
        let pool = Arc::new(MirrorPool::new(mirrors, bookreader_origin::MirrorPoolConfig::default()));
        let origin = Arc::new(MirrorOrigin::new(pool, path_for));
        let cache = Arc::new(SparseCache::open(
            config.cache.cache_dir.clone(),
            origin,
            config.cache.to_cache_config(),
        ));
        Self { cache, config }
    }

    pub fn cache_dir(&self) -> &PathBuf {
        &self.config.cache.cache_dir
    }

    fn range_source(&self) -> Arc<dyn RangeSource> {
        Arc::new(CacheRangeSource::new(Arc::clone(&self.cache)))
    }

    /// Open a Navigator session over `book_id` using this library's
    /// navigator settings.
    pub fn open_navigator(&self, book_id: impl Into<String>) -> Result<Navigator, LibraryError> {
        let navigator = Navigator::open(
            self.range_source(),
            book_id,
            self.config.navigator.to_navigator_config(),
        )?;
        Ok(navigator)
    }

    /// Run an adaptive search over `book_id` using this library's searcher
    /// settings, with `options` overriding per-call.
    pub fn search(&self, book_id: &str, phrase: &str, options: SearchOptions) -> Result<SearchResult, LibraryError> {
        let source = self.range_source();
        let result = bookreader_reader::search(
            source.as_ref(),
            book_id,
            phrase,
            options,
            self.config.searcher.to_searcher_config(),
        )?;
        Ok(result)
    }

    pub fn cache_stats(&self) -> bookreader_cache::CacheStats {
        self.cache.stats()
    }

    pub fn book_stats(&self, book_id: &str) -> bookreader_cache::BookStats {
        self.cache.book_stats(book_id)
    }

    pub fn invalidate(&self, book_id: &str) -> Result<(), LibraryError> {
        self.cache.invalidate(book_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeOrigin {
        body: Vec<u8>,
        calls: Mutex<u32>,
    }

    impl bookreader_cache::BookOrigin for FakeOrigin {
        fn head(&self, _id: &str) -> Result<bookreader_cache::HeadInfo, String> {
            Ok(bookreader_cache::HeadInfo { size: self.body.len() as u64, etag: Some("v1".into()), last_modified: None })
        }

        fn get_range(&self, _id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, String> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.body[lo as usize..=hi as usize].to_vec())
        }
    }

    fn sample_book() -> Vec<u8> {
        "*** START OF THE PROJECT GUTENBERG EBOOK SAMPLE ***\r\n\
         Chapter One\r\n\
         It was a bright cold day in April, and the clocks were striking thirteen.\r\n\
         *** END OF THE PROJECT GUTENBERG EBOOK SAMPLE ***\r\n"
            .as_bytes()
            .to_vec()
    }

    fn open_library_with(dir: &std::path::Path, origin: Arc<dyn bookreader_cache::BookOrigin>) -> Library {
        let cache = Arc::new(SparseCache::open(dir.to_path_buf(), origin, bookreader_cache::CacheConfig::default()));
        Library { cache, config: ReaderConfig::default() }
    }

    #[test]
    fn navigator_opens_and_searcher_finds_phrase() {
        let dir = tempfile::tempdir().unwrap();
        let origin = Arc::new(FakeOrigin { body: sample_book(), calls: Mutex::new(0) });
        let lib = open_library_with(dir.path(), origin);

        let nav = lib.open_navigator("1984").unwrap();
        assert!(nav.boundaries.clean_length > 0);

        let result = lib.search("1984", "bright cold day in April", SearchOptions::default()).unwrap();
        assert!(result.found);
    }

    #[test]
    fn cache_stats_and_invalidate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let origin = Arc::new(FakeOrigin { body: sample_book(), calls: Mutex::new(0) });
        let lib = open_library_with(dir.path(), origin);

        let _ = lib.open_navigator("1984").unwrap();
        assert!(lib.cache_stats().requests > 0);
        lib.invalidate("1984").unwrap();
        assert_eq!(lib.book_stats("1984").file_size, 0);
    }
}
