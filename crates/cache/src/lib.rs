//! Sparse per-book block cache: each remote book is represented locally as
//! a pre-allocated sparse data file plus a block bitmap, with missing
//! ranges coalesced into as few origin requests as possible and staleness
//! checked against origin metadata on a schedule.

pub mod cache;
mod image;
mod pending;

pub use bookreader_origin::HeadInfo;
pub use cache::{BookOrigin, BookStats, CacheConfig, CacheStats, MirrorOrigin, SparseCache};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache image is corrupt")]
    Corrupt,
    #[error("origin unavailable: {0}")]
    OriginUnavailable(String),
}
