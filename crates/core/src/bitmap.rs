//! Block-aligned bitmap primitives for the sparse block cache.
//!
//! A bitmap is a packed bit-per-block array where a set bit means "block k
//! is fully cached and consistent with the metadata's recorded origin
//! state". All offsets here are in blocks unless named `byte`.

/// Default block size in bytes. Must be a power of two.
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;

/// Default coalescing gap (bytes) for [`find_uncached_ranges`].
pub const DEFAULT_MAX_COALESCE_GAP: u64 = 8 * 1024;

/// Number of blocks needed to cover a file of `file_size` bytes at `block_size`.
pub fn total_blocks(file_size: u64, block_size: u64) -> u64 {
    file_size.div_ceil(block_size)
}

/// Number of bytes a packed bitmap needs to hold `total_blocks` bits.
pub fn bitmap_bytes(total_blocks: u64) -> u64 {
    total_blocks.div_ceil(8)
}

/// Floor-divide a byte offset into its containing block index.
#[inline]
pub fn byte_to_block(byte: u64, block_size: u64) -> u64 {
    byte / block_size
}

/// Is block `k` fully cached?
#[inline]
pub fn is_cached(bm: &[u8], k: u64) -> bool {
    let (byte_idx, bit) = (k / 8, k % 8);
    match bm.get(byte_idx as usize) {
        Some(b) => (b >> bit) & 1 == 1,
        None => false,
    }
}

/// Set bits `k0..=k1` (inclusive) in `bm`, growing it if necessary.
pub fn mark_range(bm: &mut [u8], k0: u64, k1: u64) {
    for k in k0..=k1 {
        let (byte_idx, bit) = (k / 8, k % 8);
        if let Some(b) = bm.get_mut(byte_idx as usize) {
            *b |= 1 << bit;
        }
    }
}

/// Count set bits across the whole bitmap.
pub fn popcount(bm: &[u8]) -> u64 {
    bm.iter().map(|b| b.count_ones() as u64).sum()
}

/// A half-open-on-neither-side byte range, inclusive on both ends —
/// `[lo, hi]` — matching the HTTP `Range: bytes=lo-hi` convention used
/// throughout this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub lo: u64,
    pub hi: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.hi - self.lo + 1
    }

    pub fn is_empty(&self) -> bool {
        self.hi < self.lo
    }
}

/// Return the minimal list of block-aligned byte ranges covering every
/// uncached block in `[lo, hi]`, coalescing uncached runs separated by a gap
/// of cached blocks spanning at most `gap` bytes into a single range.
///
/// Ranges are byte-aligned: each returned range is `[k0*block_size,
/// (k1+1)*block_size - 1]`, with the very last range clamped to
/// `file_size - 1`.
pub fn find_uncached_ranges(
    bm: &[u8],
    lo: u64,
    hi: u64,
    block_size: u64,
    file_size: u64,
    gap: u64,
) -> Vec<ByteRange> {
    if lo > hi || file_size == 0 {
        return Vec::new();
    }
    let hi = hi.min(file_size - 1);
    let k_lo = byte_to_block(lo, block_size);
    let k_hi = byte_to_block(hi, block_size);
    let gap_blocks = gap / block_size;

    // First pass: collect maximal uncached block runs.
    let mut runs: Vec<(u64, u64)> = Vec::new();
    let mut run_start: Option<u64> = None;
    for k in k_lo..=k_hi {
        if is_cached(bm, k) {
            if let Some(s) = run_start.take() {
                runs.push((s, k - 1));
            }
        } else if run_start.is_none() {
            run_start = Some(k);
        }
    }
    if let Some(s) = run_start {
        runs.push((s, k_hi));
    }

    if runs.is_empty() {
        return Vec::new();
    }

    // Second pass: merge runs whose intervening cached-block gap is small enough.
    let mut merged: Vec<(u64, u64)> = Vec::with_capacity(runs.len());
    for (s, e) in runs {
        match merged.last_mut() {
            Some((_, last_e)) if s.saturating_sub(*last_e + 1) <= gap_blocks => {
                *last_e = e;
            }
            _ => merged.push((s, e)),
        }
    }

    let total = total_blocks(file_size, block_size);
    merged
        .into_iter()
        .map(|(k0, k1)| {
            let range_hi = if k1 + 1 >= total {
                file_size - 1
            } else {
                (k1 + 1) * block_size - 1
            };
            ByteRange { lo: k0 * block_size, hi: range_hi }
        })
        .collect()
}

/// Merge a sorted, non-overlapping list of ranges whose gap to the next
/// range is `<= gap` bytes.
pub fn coalesce(ranges: &[ByteRange], gap: u64) -> Vec<ByteRange> {
    let mut out: Vec<ByteRange> = Vec::with_capacity(ranges.len());
    for &r in ranges {
        match out.last_mut() {
            Some(last) if r.lo.saturating_sub(last.hi + 1) <= gap => {
                last.hi = last.hi.max(r.hi);
            }
            _ => out.push(r),
        }
    }
    out
}
