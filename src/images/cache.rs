//! Image caching with both disk and memory layers.
//!
//! - Disk cache: Stores downloaded bytes in XDG_CACHE_HOME/pinfeed/images/
//! - Memory cache: LRU of encoded bytes, budgeted by decoded size
//!
//! Entries are keyed by the resized image URL, so each grid width gets its own entry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use lru::LruCache;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, trace, warn};
use xxhash_rust::xxh3::xxh3_64;

use super::decode::read_dimensions;

/// Default memory cache size in megabytes.
pub const DEFAULT_MAX_MEMORY_MB: usize = 64;

/// Minimum memory cache size in megabytes.
const MIN_MEMORY_MB: usize = 8;

/// Maximum memory cache size in megabytes.
const MAX_MEMORY_MB: usize = 512;

/// Estimated bytes per pixel once decoded for display.
const BYTES_PER_PIXEL: usize = 4;

/// Bump when the on-disk format changes.
const IMAGE_CACHE_VERSION: u8 = 1;

/// Default capacity for the LRU cache (number of entries).
const DEFAULT_LRU_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("image does not decode: {0}")]
    Decode(String),
    #[error("cache io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    /// Directory for the disk layer; `None` keeps images in memory only.
    pub cache_dir: Option<PathBuf>,
    pub max_memory_mb: usize,
    pub lru_capacity: usize,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            max_memory_mb: DEFAULT_MAX_MEMORY_MB,
            lru_capacity: DEFAULT_LRU_CAPACITY,
        }
    }
}

/// A cached image: the encoded bytes plus its dimensions.
#[derive(Debug, Clone)]
pub struct CachedImage {
    pub bytes: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    /// Estimated decoded memory usage in bytes.
    pub memory_bytes: usize,
}

impl CachedImage {
    fn new(bytes: Arc<Vec<u8>>, width: u32, height: u32) -> Self {
        let memory_bytes = (width as usize) * (height as usize) * BYTES_PER_PIXEL;
        Self {
            bytes,
            width,
            height,
            memory_bytes,
        }
    }
}

/// Cache key for image lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(url: &str) -> Self {
        let mut data = Vec::with_capacity(url.len() + 1);
        data.push(IMAGE_CACHE_VERSION);
        data.extend_from_slice(url.as_bytes());
        Self(xxh3_64(&data))
    }

    /// Get the filename for disk cache storage.
    pub fn disk_filename(&self) -> String {
        format!("{:016x}.img", self.0)
    }
}

/// Image cache with disk and memory layers. Clones share the same storage.
#[derive(Clone)]
pub struct ImageCache {
    cache_dir: Option<PathBuf>,
    max_memory_bytes: usize,
    current_memory_bytes: Arc<RwLock<usize>>,
    memory_cache: Arc<RwLock<LruCache<CacheKey, CachedImage>>>,
}

impl ImageCache {
    pub fn new(config: ImageCacheConfig) -> Self {
        let max_memory_mb = config.max_memory_mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB);
        let max_memory_bytes = max_memory_mb * 1024 * 1024;

        if let Some(dir) = &config.cache_dir {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(?dir, error = ?e, "Failed to create cache directory");
            }
        }

        let capacity = std::num::NonZeroUsize::new(config.lru_capacity)
            .unwrap_or(std::num::NonZeroUsize::MIN);

        debug!(cache_dir = ?config.cache_dir, max_memory_mb, "Initialized image cache");

        Self {
            cache_dir: config.cache_dir,
            max_memory_bytes,
            current_memory_bytes: Arc::new(RwLock::new(0)),
            memory_cache: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    /// Get the default cache directory path.
    pub fn default_cache_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pinfeed").map(|dirs| dirs.cache_dir().join("images"))
    }

    /// Look up an image, promoting disk hits into memory.
    pub fn get(&self, url: &str) -> Option<CachedImage> {
        let key = CacheKey::new(url);

        if let Some(cached) = self.memory_cache.write().get(&key).cloned() {
            trace!(url, "Memory cache hit");
            return Some(cached);
        }

        let disk_path = self.disk_path(&key)?;
        if !disk_path.exists() {
            return None;
        }
        match self.load_from_disk(&key, &disk_path) {
            Ok(cached) => {
                trace!(url, "Disk cache hit");
                Some(cached)
            }
            Err(e) => {
                warn!(url, error = %e, "Removing unreadable cache entry");
                let _ = std::fs::remove_file(&disk_path);
                None
            }
        }
    }

    /// Validate and store downloaded bytes for `url`.
    pub fn insert(&self, url: &str, bytes: Vec<u8>) -> Result<CachedImage, CacheError> {
        let (width, height) =
            read_dimensions(&bytes).map_err(|e| CacheError::Decode(format!("{e:#}")))?;
        let key = CacheKey::new(url);

        if let Some(disk_path) = self.disk_path(&key) {
            std::fs::write(&disk_path, &bytes)?;
        }

        let cached = CachedImage::new(Arc::new(bytes), width, height);
        self.add_to_memory_cache(key, cached.clone());
        Ok(cached)
    }

    /// Check if an image exists in cache (memory or disk).
    pub fn exists(&self, url: &str) -> bool {
        let key = CacheKey::new(url);
        if self.memory_cache.read().contains(&key) {
            return true;
        }
        self.disk_path(&key).is_some_and(|p| p.exists())
    }

    fn disk_path(&self, key: &CacheKey) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|d| d.join(key.disk_filename()))
    }

    fn load_from_disk(&self, key: &CacheKey, disk_path: &Path) -> Result<CachedImage, CacheError> {
        let bytes = std::fs::read(disk_path)?;
        let (width, height) =
            read_dimensions(&bytes).map_err(|e| CacheError::Decode(format!("{e:#}")))?;
        let cached = CachedImage::new(Arc::new(bytes), width, height);
        self.add_to_memory_cache(*key, cached.clone());
        Ok(cached)
    }

    fn add_to_memory_cache(&self, key: CacheKey, cached: CachedImage) {
        let new_size = cached.memory_bytes;

        // Lock order is always usage, then entries. Both are held for the
        // whole update so concurrent inserts cannot overshoot the budget.
        let mut current = self.current_memory_bytes.write();
        let mut cache = self.memory_cache.write();

        if let Some(old) = cache.pop(&key) {
            *current = current.saturating_sub(old.memory_bytes);
        }
        self.evict_if_needed(&mut current, &mut cache, new_size);

        // `push` also reports the entry dropped for LRU capacity.
        if let Some((_, dropped)) = cache.push(key, cached) {
            *current = current.saturating_sub(dropped.memory_bytes);
        }
        *current += new_size;
    }

    /// Evict entries from the memory cache until we have room for `needed_bytes`.
    fn evict_if_needed(
        &self,
        current: &mut usize,
        cache: &mut LruCache<CacheKey, CachedImage>,
        needed_bytes: usize,
    ) {
        while *current + needed_bytes > self.max_memory_bytes {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current = current.saturating_sub(evicted.memory_bytes);
                    trace!(
                        evicted_bytes = evicted.memory_bytes,
                        current_bytes = *current,
                        "Evicted image from memory cache"
                    );
                }
                None => break,
            }
        }
    }

    /// Clear the memory cache.
    pub fn clear_memory(&self) {
        let mut current = self.current_memory_bytes.write();
        self.memory_cache.write().clear();
        *current = 0;
        debug!("Cleared memory cache");
    }

    /// Clear both memory and disk caches.
    pub fn clear_all(&self) -> Result<(), CacheError> {
        self.clear_memory();

        if let Some(dir) = self.cache_dir.as_ref().filter(|d| d.exists()) {
            for entry in std::fs::read_dir(dir)?.flatten() {
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|e| e == "img") {
                    let _ = std::fs::remove_file(path);
                }
            }
            debug!(?dir, "Cleared disk cache");
        }
        Ok(())
    }

    /// Get the current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        *self.current_memory_bytes.read()
    }

    /// Get the number of entries in the memory cache.
    pub fn memory_entry_count(&self) -> usize {
        self.memory_cache.read().len()
    }

    /// Get the maximum memory limit in bytes.
    pub fn max_memory(&self) -> usize {
        self.max_memory_bytes
    }

    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }
}
