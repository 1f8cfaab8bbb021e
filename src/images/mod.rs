//! Image download, validation and caching.
//!
//! - `ImageCache` - Memory LRU with a byte budget over an optional disk layer
//! - `ImagePrefetcher` - Async worker pool that warms the cache ahead of scrolling
//! - `read_dimensions` - Validates encoded bytes before they are cached

pub mod cache;
pub mod decode;
pub mod prefetch;

pub use cache::{ImageCache, ImageCacheConfig};
pub use prefetch::{HttpImageFetcher, ImagePrefetcher, PrefetchConfig, PrefetchResult};
