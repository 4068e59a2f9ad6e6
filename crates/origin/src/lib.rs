//! HTTP origin client (HEAD/ranged GET with redirects and timeouts) and an
//! optional mirror pool that keeps per-book sticky affinity across a set of
//! equivalent origins.

pub mod client;
pub mod mirror;

pub use client::{HeadInfo, OriginClient, OriginError};
pub use mirror::{MirrorPool, MirrorPoolConfig};
