//! Paging for the photo feed.
//!
//! - `PhotoPager` - Loads keyed pages from a photo source
//! - `PagingState` - Picks the refresh key around the scroll anchor
//! - `Feed` - Concatenated, deduplicated pages with per-edge load state

pub mod feed;
pub mod pager;
pub mod state;

pub use feed::{Feed, ScrollAnchor, DEFAULT_PREFETCH_COUNT};
pub use pager::{LoadError, PagerConfig, PhotoPager};
