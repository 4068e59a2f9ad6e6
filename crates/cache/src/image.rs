//! Per-book on-disk image: a sparse `.dat` data file, a `.bm` bitmap
//! side-car, and a `.meta` TOML metadata file, grounded in the
//! block-map/block-store split used by block-device-backed filesystem
//! caches.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bookreader_core::bitmap;
use serde::{Deserialize, Serialize};

use crate::CacheError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub file_size: u64,
    pub block_size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub created_at: u64,
    pub last_validated: u64,
    pub last_accessed: u64,
    pub blocks_cached: u64,
}

pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

struct ImagePaths {
    dat: PathBuf,
    bm: PathBuf,
    meta: PathBuf,
}

impl ImagePaths {
    fn for_book(dir: &Path, id: &str) -> Self {
        Self {
            dat: dir.join(format!("{id}.dat")),
            bm: dir.join(format!("{id}.bm")),
            meta: dir.join(format!("{id}.meta")),
        }
    }

    fn all_exist(&self) -> bool {
        self.dat.exists() && self.bm.exists() && self.meta.exists()
    }

    fn remove_all(&self) -> Result<(), CacheError> {
        for p in [&self.dat, &self.bm, &self.meta] {
            if p.exists() {
                fs::remove_file(p)?;
            }
        }
        Ok(())
    }
}

/// A book's cache image, held open for the duration of one cache operation.
pub struct BookImage {
    paths: ImagePaths,
    pub meta: Meta,
    pub bitmap: Vec<u8>,
}

impl BookImage {
    /// Remove this book's on-disk artifacts entirely.
    pub fn remove(dir: &Path, id: &str) -> Result<(), CacheError> {
        ImagePaths::for_book(dir, id).remove_all()
    }

    /// Open an existing, non-corrupt image. Returns `Ok(None)` if no image
    /// exists yet, or if one exists but fails the corruption check (in which
    /// case its artifacts are discarded first).
    pub fn open(dir: &Path, id: &str) -> Result<Option<Self>, CacheError> {
        let paths = ImagePaths::for_book(dir, id);
        if !paths.all_exist() {
            return Ok(None);
        }
        let meta_str = fs::read_to_string(&paths.meta)?;
        let meta: Meta = toml::from_str(&meta_str).map_err(|_| CacheError::Corrupt)?;
        let bitmap = fs::read(&paths.bm)?;
        let dat_len = fs::metadata(&paths.dat)?.len();

        let expected_bitmap_len =
            bitmap::bitmap_bytes(bitmap::total_blocks(meta.file_size, meta.block_size));
        if bitmap.len() as u64 != expected_bitmap_len || dat_len != meta.file_size {
            tracing::warn!(id, "cache image corrupt, discarding");
            paths.remove_all()?;
            return Ok(None);
        }
        Ok(Some(Self { paths, meta, bitmap }))
    }

    /// Initialize a fresh image for a book of `file_size` bytes. Fails
    /// atomically: any artifacts written before a failing step are removed,
    /// so no partial image is ever left on disk.
    pub fn init(
        dir: &Path,
        id: &str,
        file_size: u64,
        block_size: u64,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        let paths = ImagePaths::for_book(dir, id);
        let result = Self::try_init(&paths, file_size, block_size, etag, last_modified);
        if result.is_err() {
            let _ = paths.remove_all();
        }
        result
    }

    fn try_init(
        paths: &ImagePaths,
        file_size: u64,
        block_size: u64,
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> Result<Self, CacheError> {
        let file = File::create(&paths.dat)?;
        file.set_len(file_size)?;
        drop(file);

        let bitmap =
            vec![0u8; bitmap::bitmap_bytes(bitmap::total_blocks(file_size, block_size)) as usize];
        fs::write(&paths.bm, &bitmap)?;

        let now = now_secs();
        let meta = Meta {
            file_size,
            block_size,
            etag,
            last_modified,
            created_at: now,
            last_validated: now,
            last_accessed: now,
            blocks_cached: 0,
        };
        let meta_str = toml::to_string_pretty(&meta).map_err(|_| CacheError::Corrupt)?;
        fs::write(&paths.meta, meta_str)?;

        Ok(Self { paths: ImagePaths { dat: paths.dat.clone(), bm: paths.bm.clone(), meta: paths.meta.clone() }, meta, bitmap })
    }

    /// Read `[lo, hi]` (inclusive) from the data file.
    pub fn read_at(&self, lo: u64, hi: u64) -> Result<Vec<u8>, CacheError> {
        let len = (hi - lo + 1) as usize;
        let mut file = File::open(&self.paths.dat)?;
        file.seek(SeekFrom::Start(lo))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Write `bytes` at offset `lo` and mark the spanned blocks cached.
    /// Does not persist the bitmap/metadata side-cars — call
    /// [`BookImage::persist`] once all ranges for this call are written.
    pub fn write_at(&mut self, lo: u64, bytes: &[u8]) -> Result<(), CacheError> {
        let mut file = OpenOptions::new().write(true).open(&self.paths.dat)?;
        file.seek(SeekFrom::Start(lo))?;
        file.write_all(bytes)?;

        if !bytes.is_empty() {
            let hi = lo + bytes.len() as u64 - 1;
            let k0 = bitmap::byte_to_block(lo, self.meta.block_size);
            let k1 = bitmap::byte_to_block(hi, self.meta.block_size);
            bitmap::mark_range(&mut self.bitmap, k0, k1);
        }
        Ok(())
    }

    pub fn touch_accessed(&mut self) {
        self.meta.last_accessed = now_secs();
    }

    /// Persist bitmap and metadata after one or more `write_at` calls.
    pub fn persist(&mut self) -> Result<(), CacheError> {
        self.meta.blocks_cached = bitmap::popcount(&self.bitmap);
        fs::write(&self.paths.bm, &self.bitmap)?;
        let meta_str = toml::to_string_pretty(&self.meta).map_err(|_| CacheError::Corrupt)?;
        fs::write(&self.paths.meta, meta_str)?;
        Ok(())
    }

    /// Persist only the metadata (e.g. after validation updates a timestamp
    /// with no bitmap change).
    pub fn persist_meta(&self) -> Result<(), CacheError> {
        let meta_str = toml::to_string_pretty(&self.meta).map_err(|_| CacheError::Corrupt)?;
        fs::write(&self.paths.meta, meta_str)?;
        Ok(())
    }
}
