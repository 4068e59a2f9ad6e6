//! Boilerplate boundary detection, the Range Source abstraction, and the
//! word-granular Navigator that rides on top of it.

pub mod boundary;
pub mod navigator;
pub mod range_source;
pub mod searcher;

pub use boundary::{
    find_clean_boundaries, find_end_window, find_start_window, BoundaryConfig, BoundaryFlag, Boundaries,
};
pub use navigator::{Direction, Navigator, NavigatorConfig, NavigatorError, Position};
pub use range_source::{CacheRangeSource, DirectRangeSource, RangeSource, RangeSourceError};
pub use searcher::{search, SearchMatch, SearchOptions, SearchResult, SearcherConfig, SearcherError, Strategy};
