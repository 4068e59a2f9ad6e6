//! The Range Source interface consumed by the Navigator and Searcher, and
//! its two adapters: one backed by the sparse block cache, one going
//! straight to origin.

use std::sync::Arc;

use bookreader_cache::{BookOrigin, SparseCache};

#[derive(Debug, thiserror::Error)]
pub enum RangeSourceError {
    #[error(transparent)]
    Cache(#[from] bookreader_cache::CacheError),
    #[error("origin unavailable: {0}")]
    Origin(String),
}

/// A source of byte ranges for a single book id, independent of whether
/// those bytes come from the sparse cache or straight from origin.
pub trait RangeSource: Send + Sync {
    fn file_size(&self, id: &str) -> Result<u64, RangeSourceError>;

    /// Returns exactly `hi - lo + 1` bytes after clamping to `[0, fileSize - 1]`.
    fn read_range(&self, id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, RangeSourceError>;
}

/// Range Source backed by the sparse block cache — the common case, so
/// repeated navigation and search over the same book amortize origin
/// requests.
pub struct CacheRangeSource {
    cache: Arc<SparseCache>,
}

impl CacheRangeSource {
    pub fn new(cache: Arc<SparseCache>) -> Self {
        Self { cache }
    }
}

impl RangeSource for CacheRangeSource {
    fn file_size(&self, id: &str) -> Result<u64, RangeSourceError> {
        Ok(self.cache.get_file_size(id)?)
    }

    fn read_range(&self, id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, RangeSourceError> {
        Ok(self.cache.get_range(id, lo, hi)?)
    }
}

/// Range Source that talks straight to origin, bypassing the cache
/// entirely — used when a caller explicitly opts out of local persistence.
pub struct DirectRangeSource {
    origin: Arc<dyn BookOrigin>,
}

impl DirectRangeSource {
    pub fn new(origin: Arc<dyn BookOrigin>) -> Self {
        Self { origin }
    }
}

impl RangeSource for DirectRangeSource {
    fn file_size(&self, id: &str) -> Result<u64, RangeSourceError> {
        self.origin.head(id).map(|h| h.size).map_err(RangeSourceError::Origin)
    }

    fn read_range(&self, id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, RangeSourceError> {
        if lo > hi {
            return Ok(Vec::new());
        }
        self.origin.get_range(id, lo, hi).map_err(RangeSourceError::Origin)
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

    impl BookOrigin for FakeOrigin {
        fn head(&self, _id: &str) -> Result<bookreader_cache::HeadInfo, String> {
            Ok(bookreader_cache::HeadInfo { size: self.body.len() as u64, etag: None, last_modified: None })
        }

        fn get_range(&self, _id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, String> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.body[lo as usize..=hi as usize].to_vec())
        }
    }

    #[test]
    fn direct_source_reads_through_to_origin() {
        let origin = Arc::new(FakeOrigin { body: b"hello world".to_vec(), calls: Mutex::new(0) });
        let source = DirectRangeSource::new(origin);
        assert_eq!(source.file_size("book-1").unwrap(), 11);
        assert_eq!(source.read_range("book-1", 0, 4).unwrap(), b"hello");
    }

    #[test]
    fn direct_source_empty_range_is_empty() {
        let origin = Arc::new(FakeOrigin { body: b"hello".to_vec(), calls: Mutex::new(0) });
        let source = DirectRangeSource::new(origin);
        assert_eq!(source.read_range("book-1", 4, 2).unwrap(), Vec::<u8>::new());
    }
}
