//! `SparseCache`: the public handle for the sparse block cache. Wraps
//! per-book [`crate::image::BookImage`] state behind a per-book lock and an
//! in-flight fetch dedup table, grounded in the `DashMap`-backed session
//! registries used elsewhere in this workspace for per-entity state.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bookreader_core::bitmap::{self, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_COALESCE_GAP};
use bookreader_origin::{HeadInfo, MirrorPool};
use dashmap::DashMap;

use crate::image::{now_secs, BookImage};
use crate::pending::PendingFetches;
use crate::CacheError;

/// Origin operations the cache needs, independent of how a book id maps to
/// a fetchable URL path.
pub trait BookOrigin: Send + Sync {
    fn head(&self, book_id: &str) -> Result<HeadInfo, String>;
    fn get_range(&self, book_id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, String>;
}

/// Adapts a [`MirrorPool`] into a [`BookOrigin`] given a function mapping a
/// book id to the path appended to each mirror's base URL.
pub struct MirrorOrigin {
    pool: Arc<MirrorPool>,
    path_for: Box<dyn Fn(&str) -> String + Send + Sync>,
}

impl MirrorOrigin {
    pub fn new(pool: Arc<MirrorPool>, path_for: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self { pool, path_for: Box::new(path_for) }
    }
}

impl BookOrigin for MirrorOrigin {
    fn head(&self, book_id: &str) -> Result<HeadInfo, String> {
        let path = (self.path_for)(book_id);
        self.pool.head(book_id, &path).map(|(_, info)| info).map_err(|e| e.to_string())
    }

    fn get_range(&self, book_id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, String> {
        let path = (self.path_for)(book_id);
        self.pool.get_range(book_id, &path, lo, hi).map(|(_, bytes)| bytes).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub block_size: u64,
    pub max_coalesce_gap: u64,
    pub validation_interval_secs: u64,
    pub max_books: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_coalesce_gap: DEFAULT_MAX_COALESCE_GAP,
            validation_interval_secs: 24 * 3600,
            max_books: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub requests: u64,
    pub cache_hit_bytes: u64,
    pub network_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BookStats {
    pub file_size: u64,
    pub total_blocks: u64,
    pub blocks_cached: u64,
    pub last_accessed: u64,
    pub cache_hit_bytes: u64,
    pub network_bytes: u64,
}

#[derive(Default)]
struct Counters {
    cache_hit_bytes: u64,
    network_bytes: u64,
}

pub struct SparseCache {
    dir: PathBuf,
    config: CacheConfig,
    origin: Arc<dyn BookOrigin>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    pending: PendingFetches,
    requests: Mutex<u64>,
    global_counters: Mutex<Counters>,
    book_counters: DashMap<String, Counters>,
}

impl SparseCache {
    pub fn open(dir: impl Into<PathBuf>, origin: Arc<dyn BookOrigin>, config: CacheConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
            origin,
            locks: DashMap::new(),
            pending: PendingFetches::new(),
            requests: Mutex::new(0),
            global_counters: Mutex::new(Counters::default()),
            book_counters: DashMap::new(),
        }
    }

    fn book_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Returns the origin's file size, initializing the image on first
    /// access and revalidating it if stale.
    pub fn get_file_size(&self, id: &str) -> Result<u64, CacheError> {
        self.ensure_image(id, false)
    }

    /// Force a validation pass regardless of `VALIDATION_INTERVAL`.
    pub fn force_validation(&self, id: &str) -> Result<(), CacheError> {
        self.ensure_image(id, true)?;
        Ok(())
    }

    fn ensure_image(&self, id: &str, force: bool) -> Result<u64, CacheError> {
        let lock = self.book_lock(id);
        let _guard = lock.lock().unwrap();

        match BookImage::open(&self.dir, id)? {
            Some(mut img) => {
                let now = now_secs();
                let due = force || now.saturating_sub(img.meta.last_validated) > self.config.validation_interval_secs;
                if due {
                    match self.origin.head(id) {
                        Ok(head) => {
                            let stale = head.size != img.meta.file_size
                                || (img.meta.etag.is_some()
                                    && head.etag.is_some()
                                    && img.meta.etag != head.etag)
                                || (img.meta.last_modified.is_some()
                                    && head.last_modified.is_some()
                                    && img.meta.last_modified != head.last_modified);
                            if stale {
                                tracing::info!(id, "origin changed since last validation, reinitializing image");
                                BookImage::remove(&self.dir, id)?;
                                let fresh = BookImage::init(
                                    &self.dir,
                                    id,
                                    head.size,
                                    self.config.block_size,
                                    head.etag,
                                    head.last_modified,
                                )?;
                                return Ok(fresh.meta.file_size);
                            }
                            img.meta.last_validated = now;
                            img.persist_meta()?;
                        }
                        Err(error) => {
                            tracing::warn!(id, error, "validation HEAD failed, keeping cached image");
                        }
                    }
                }
                Ok(img.meta.file_size)
            }
            None => {
                let head = self.origin.head(id).map_err(CacheError::OriginUnavailable)?;
                let img = BookImage::init(
                    &self.dir,
                    id,
                    head.size,
                    self.config.block_size,
                    head.etag,
                    head.last_modified,
                )?;
                Ok(img.meta.file_size)
            }
        }
    }

    /// Read `[lo, hi]` (inclusive), fetching and caching any missing ranges.
    /// A local I/O failure degrades this single call to a direct origin
    /// read without mutating the cache image.
    pub fn get_range(&self, id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, CacheError> {
        *self.requests.lock().unwrap() += 1;
        match self.get_range_cached(id, lo, hi) {
            Ok(bytes) => Ok(bytes),
            Err(CacheError::Io(io_err)) => {
                tracing::warn!(id, error = %io_err, "cache I/O failure, degrading to direct origin read");
                self.origin.get_range(id, lo, hi).map_err(CacheError::OriginUnavailable)
            }
            Err(other) => Err(other),
        }
    }

    fn get_range_cached(&self, id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, CacheError> {
        if lo > hi {
            return Ok(Vec::new());
        }
        let file_size = self.ensure_image(id, false)?;
        if file_size == 0 {
            return Ok(Vec::new());
        }
        let hi = hi.min(file_size - 1);
        if lo > hi {
            return Ok(Vec::new());
        }

        let (bitmap_snapshot, block_size) = {
            let lock = self.book_lock(id);
            let _guard = lock.lock().unwrap();
            let mut img = BookImage::open(&self.dir, id)?
                .ok_or(CacheError::Corrupt)?;
            img.touch_accessed();
            img.persist_meta()?;
            (img.bitmap, img.meta.block_size)
        };

        let missing = bitmap::find_uncached_ranges(
            &bitmap_snapshot,
            lo,
            hi,
            block_size,
            file_size,
            self.config.max_coalesce_gap,
        );
        let missing = bitmap::coalesce(&missing, self.config.max_coalesce_gap);

        let mut network_bytes = 0u64;
        for r in &missing {
            let origin = self.origin.clone();
            let book_id = id.to_string();
            let (range_lo, range_hi) = (r.lo, r.hi);
            let fetched = self
                .pending
                .run_once(id, r.lo, r.hi, move || origin.get_range(&book_id, range_lo, range_hi))
                .map_err(CacheError::OriginUnavailable)?;
            network_bytes += fetched.len() as u64;

            let lock = self.book_lock(id);
            let _guard = lock.lock().unwrap();
            let mut img = BookImage::open(&self.dir, id)?.ok_or(CacheError::Corrupt)?;
            img.write_at(r.lo, &fetched)?;
            img.persist()?;
        }

        let data = {
            let lock = self.book_lock(id);
            let _guard = lock.lock().unwrap();
            let img = BookImage::open(&self.dir, id)?.ok_or(CacheError::Corrupt)?;
            img.read_at(lo, hi)?
        };

        // `missing` ranges are block-aligned and so may extend past [lo, hi];
        // only the portion inside the requested window counts against the
        // cache-hit tally for this call.
        let window_network_bytes: u64 = missing
            .iter()
            .map(|r| r.hi.min(hi).saturating_sub(r.lo.max(lo)) + 1)
            .sum();
        let cache_hit_bytes = data.len() as u64 - window_network_bytes;
        {
            let mut g = self.global_counters.lock().unwrap();
            g.cache_hit_bytes += cache_hit_bytes;
            g.network_bytes += network_bytes;
        }
        {
            let mut c = self.book_counters.entry(id.to_string()).or_default();
            c.cache_hit_bytes += cache_hit_bytes;
            c.network_bytes += network_bytes;
        }

        self.evict_if_needed();
        Ok(data)
    }

    /// Remove all on-disk artifacts and in-memory state for `id`.
    pub fn invalidate(&self, id: &str) -> Result<(), CacheError> {
        let lock = self.book_lock(id);
        let _guard = lock.lock().unwrap();
        BookImage::remove(&self.dir, id)?;
        self.book_counters.remove(id);
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        let g = self.global_counters.lock().unwrap();
        CacheStats {
            requests: *self.requests.lock().unwrap(),
            cache_hit_bytes: g.cache_hit_bytes,
            network_bytes: g.network_bytes,
        }
    }

    pub fn book_stats(&self, id: &str) -> BookStats {
        let counters = self.book_counters.get(id);
        let (cache_hit_bytes, network_bytes) =
            counters.map(|c| (c.cache_hit_bytes, c.network_bytes)).unwrap_or_default();
        match BookImage::open(&self.dir, id) {
            Ok(Some(img)) => BookStats {
                file_size: img.meta.file_size,
                total_blocks: bitmap::total_blocks(img.meta.file_size, img.meta.block_size),
                blocks_cached: img.meta.blocks_cached,
                last_accessed: img.meta.last_accessed,
                cache_hit_bytes,
                network_bytes,
            },
            _ => BookStats { cache_hit_bytes, network_bytes, ..Default::default() },
        }
    }

    fn evict_if_needed(&self) {
        let Some(max_books) = self.config.max_books else { return };
        let Ok(entries) = std::fs::read_dir(&self.dir) else { return };
        let mut books: Vec<(String, u64)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let id = name.strip_suffix(".meta")?.to_string();
                let meta = BookImage::open(&self.dir, &id).ok().flatten()?;
                Some((id, meta.meta.last_accessed))
            })
            .collect();
        if books.len() <= max_books {
            return;
        }
        books.sort_by_key(|(_, last_accessed)| *last_accessed);
        let excess = books.len() - max_books;
        for (id, _) in books.into_iter().take(excess) {
            let lock = self.book_lock(&id);
            let guard = lock.try_lock();
            if guard.is_ok() {
                tracing::info!(id, "evicting LRU book image");
                let _ = BookImage::remove(&self.dir, &id);
                self.book_counters.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::tempdir;

    struct FakeOrigin {
        body: Vec<u8>,
        fetch_count: AtomicU64,
        fail_head: Mutex<bool>,
    }

    impl FakeOrigin {
        fn new(body: Vec<u8>) -> Self {
            Self { body, fetch_count: AtomicU64::new(0), fail_head: Mutex::new(false) }
        }
    }

    impl BookOrigin for FakeOrigin {
        fn head(&self, _book_id: &str) -> Result<HeadInfo, String> {
            if *self.fail_head.lock().unwrap() {
                return Err("origin down".to_string());
            }
            Ok(HeadInfo { size: self.body.len() as u64, etag: Some("v1".into()), last_modified: None })
        }

        fn get_range(&self, _book_id: &str, lo: u64, hi: u64) -> Result<Vec<u8>, String> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.body[lo as usize..=hi as usize].to_vec())
        }
    }

    fn small_cache(origin: Arc<FakeOrigin>) -> (tempfile::TempDir, SparseCache) {
        let dir = tempdir().unwrap();
        let config = CacheConfig { block_size: 16, max_coalesce_gap: 16, ..Default::default() };
        let cache = SparseCache::open(dir.path(), origin, config);
        (dir, cache)
    }

    #[test]
    fn first_read_fetches_and_second_read_hits_cache() {
        let origin = Arc::new(FakeOrigin::new(b"0123456789abcdef0123456789abcdef".to_vec()));
        let (_dir, cache) = small_cache(origin.clone());

        let first = cache.get_range("book-1", 0, 15).unwrap();
        assert_eq!(first, b"0123456789abcde".iter().chain(b"f").cloned().collect::<Vec<u8>>());
        assert_eq!(origin.fetch_count.load(Ordering::SeqCst), 1);

        let second = cache.get_range("book-1", 0, 15).unwrap();
        assert_eq!(second, first);
        assert_eq!(origin.fetch_count.load(Ordering::SeqCst), 1, "second read should hit cache, not refetch");

        let stats = cache.stats();
        assert_eq!(stats.network_bytes, 16);
        assert_eq!(stats.cache_hit_bytes, 16);
    }

    #[test]
    fn overlapping_reads_only_fetch_missing_portion() {
        let origin = Arc::new(FakeOrigin::new(vec![b'x'; 64]));
        let (_dir, cache) = small_cache(origin.clone());

        cache.get_range("book-1", 0, 15).unwrap();
        assert_eq!(origin.fetch_count.load(Ordering::SeqCst), 1);

        // Overlaps blocks [0] (cached) and [16..32) (new).
        cache.get_range("book-1", 8, 20).unwrap();
        assert_eq!(origin.fetch_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalidate_removes_cache_and_forces_refetch() {
        let origin = Arc::new(FakeOrigin::new(vec![b'y'; 32]));
        let (_dir, cache) = small_cache(origin.clone());
        cache.get_range("book-1", 0, 15).unwrap();
        cache.invalidate("book-1").unwrap();
        cache.get_range("book-1", 0, 15).unwrap();
        assert_eq!(origin.fetch_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn head_failure_during_validation_keeps_cache() {
        let origin = Arc::new(FakeOrigin::new(vec![b'z'; 32]));
        let (_dir, cache) = small_cache(origin.clone());
        cache.get_range("book-1", 0, 15).unwrap();

        *origin.fail_head.lock().unwrap() = true;
        // Force validation path; HEAD fails, so the cached image must survive.
        let result = cache.force_validation("book-1");
        assert!(result.is_ok());
        let bytes = cache.get_range("book-1", 0, 15).unwrap();
        assert_eq!(bytes, vec![b'z'; 16]);
    }

    #[test]
    fn empty_range_returns_empty() {
        let origin = Arc::new(FakeOrigin::new(vec![b'a'; 10]));
        let (_dir, cache) = small_cache(origin);
        let bytes = cache.get_range("book-1", 5, 2).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn book_stats_reports_blocks_cached() {
        let origin = Arc::new(FakeOrigin::new(vec![b'q'; 32]));
        let (_dir, cache) = small_cache(origin);
        cache.get_range("book-1", 0, 15).unwrap();
        let stats = cache.book_stats("book-1");
        assert_eq!(stats.file_size, 32);
        assert_eq!(stats.blocks_cached, 1);
        assert_eq!(stats.total_blocks, 2);
    }
}
