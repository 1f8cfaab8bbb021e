//! Image prefetch queue.
//!
//! - Bounded pool of tokio worker tasks (1-4) downloading resized images
//! - Requests go through a bounded flume queue; duplicates are dropped while pending
//! - Downloaded bytes are validated and stored in the shared `ImageCache`
//! - Completed downloads are reported on a results channel

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flume::{Receiver, Sender};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::cache::ImageCache;
use crate::models::Photo;
use crate::paging::{Feed, DEFAULT_PREFETCH_COUNT};

/// Default number of worker tasks.
const DEFAULT_WORKERS: usize = 2;

/// Maximum number of worker tasks.
const MAX_WORKERS: usize = 4;

/// Maximum number of pending requests in the queue.
const MAX_QUEUE_SIZE: usize = 256;

/// Width requested from the image server for grid tiles.
pub const DEFAULT_TARGET_WIDTH: u32 = 400;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("download failed: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
}

/// Downloads image bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    pub workers: usize,
    pub queue_size: usize,
    /// Tile width passed to `Photo::optimized_url`.
    pub target_width: u32,
    /// How many items past the current position to warm.
    pub count: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_size: MAX_QUEUE_SIZE,
            target_width: DEFAULT_TARGET_WIDTH,
            count: DEFAULT_PREFETCH_COUNT,
        }
    }
}

/// Outcome of one prefetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchResult {
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Error message if the download or validation failed.
    pub error: Option<String>,
}

/// Shared state handed to each worker.
#[derive(Clone)]
struct WorkerContext {
    fetcher: Arc<dyn ImageFetcher>,
    cache: ImageCache,
    pending: Arc<RwLock<HashSet<String>>>,
    active: Arc<AtomicUsize>,
    results: Sender<PrefetchResult>,
}

/// Warms the image cache ahead of the scroll position.
pub struct ImagePrefetcher {
    request_tx: Sender<String>,
    result_rx: Receiver<PrefetchResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    active_workers: Arc<AtomicUsize>,
    pending: Arc<RwLock<HashSet<String>>>,
    cache: ImageCache,
    target_width: u32,
    count: usize,
}

impl ImagePrefetcher {
    /// Spawn the worker pool on the current tokio runtime.
    pub fn new(fetcher: Arc<dyn ImageFetcher>, cache: ImageCache, config: PrefetchConfig) -> Self {
        let num_workers = config.workers.clamp(1, MAX_WORKERS);

        let (request_tx, request_rx) = flume::bounded(config.queue_size.max(1));
        let (result_tx, result_rx) = flume::unbounded();

        let shutdown = CancellationToken::new();
        let active_workers = Arc::new(AtomicUsize::new(0));
        let pending = Arc::new(RwLock::new(HashSet::new()));

        let ctx = WorkerContext {
            fetcher,
            cache: cache.clone(),
            pending: Arc::clone(&pending),
            active: Arc::clone(&active_workers),
            results: result_tx,
        };

        let workers = (0..num_workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    request_rx.clone(),
                    ctx.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        debug!(num_workers, "Started image prefetch queue");

        Self {
            request_tx,
            result_rx,
            workers,
            shutdown,
            active_workers,
            pending,
            cache,
            target_width: config.target_width,
            count: config.count,
        }
    }

    /// Queue a download. Returns false if cached, already pending, or the queue is full.
    pub fn request(&self, url: &str) -> bool {
        // Claim the URL first; workers cache an image before releasing its claim.
        if !self.pending.write().insert(url.to_string()) {
            trace!(url, "Request already pending");
            return false;
        }

        if self.cache.exists(url) {
            trace!(url, "Image already cached");
            self.pending.write().remove(url);
            return false;
        }

        match self.request_tx.try_send(url.to_string()) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(url)) => {
                warn!("Prefetch queue full, dropping request");
                self.pending.write().remove(&url);
                false
            }
            Err(flume::TrySendError::Disconnected(url)) => {
                error!("Prefetch queue disconnected");
                self.pending.write().remove(&url);
                false
            }
        }
    }

    /// URL of the grid-sized image for `photo`.
    pub fn tile_url(&self, photo: &Photo) -> String {
        photo.optimized_url(self.target_width)
    }

    /// Queue the grid-sized image of each photo. Returns how many were queued.
    pub fn prefetch_photos(&self, photos: &[&Photo]) -> usize {
        photos
            .iter()
            .filter(|photo| self.request(&self.tile_url(photo)))
            .count()
    }

    /// Queue the items following `current_index` in the feed.
    pub fn prefetch_from(&self, feed: &Feed, current_index: usize) -> usize {
        self.prefetch_photos(&feed.prefetch_candidates(current_index, self.count))
    }

    /// Poll for completed downloads (non-blocking).
    pub fn poll_results(&self) -> Vec<PrefetchResult> {
        self.result_rx.try_iter().collect()
    }

    /// Wait for the next completed download.
    pub async fn next_result(&self) -> Option<PrefetchResult> {
        self.result_rx.recv_async().await.ok()
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn pending_count(&self) -> usize {
        self.pending.read().len()
    }

    pub fn active_worker_count(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    pub fn is_busy(&self) -> bool {
        !self.pending.read().is_empty() || self.active_worker_count() > 0
    }

    /// Stop the workers and wait for them. Queued requests are dropped.
    pub async fn shutdown(mut self) {
        debug!("Shutting down prefetch queue");
        self.shutdown.cancel();
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        debug!("Prefetch queue shutdown complete");
    }
}

impl Drop for ImagePrefetcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Receiver<String>,
    ctx: WorkerContext,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "Prefetch worker started");

    loop {
        let url = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv_async() => match next {
                Ok(url) => url,
                Err(_) => break,
            },
        };

        ctx.active.fetch_add(1, Ordering::Relaxed);
        let result = process_request(&url, &ctx).await;
        ctx.pending.write().remove(&url);
        if let Err(e) = ctx.results.send(result) {
            warn!(worker_id, error = ?e, "Failed to send prefetch result");
        }
        ctx.active.fetch_sub(1, Ordering::Relaxed);
    }

    debug!(worker_id, "Prefetch worker stopped");
}

async fn process_request(url: &str, ctx: &WorkerContext) -> PrefetchResult {
    trace!(url, "Prefetching image");

    let failed = |error: String| PrefetchResult {
        url: url.to_string(),
        width: 0,
        height: 0,
        error: Some(error),
    };

    let bytes = match ctx.fetcher.fetch(url).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url, error = %e, "Failed to prefetch image");
            return failed(e.to_string());
        }
    };

    // Decoding and disk writes are blocking work.
    let cache = ctx.cache.clone();
    let key = url.to_string();
    let stored = tokio::task::spawn_blocking(move || cache.insert(&key, bytes)).await;

    match stored {
        Ok(Ok(cached)) => PrefetchResult {
            url: url.to_string(),
            width: cached.width,
            height: cached.height,
            error: None,
        },
        Ok(Err(e)) => {
            warn!(url, error = %e, "Prefetched image rejected");
            failed(e.to_string())
        }
        Err(e) => failed(format!("cache task failed: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::cache::ImageCacheConfig;
    use crate::images::decode::encode_png;
    use parking_lot::Mutex;

    /// Serves a 20x10 PNG for every URL except those containing "missing".
    #[derive(Default)]
    struct StubFetcher {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.lock().push(url.to_string());
            if url.contains("missing") {
                return Err(FetchError::Status(404));
            }
            if url.contains("html") {
                return Ok(b"<html></html>".to_vec());
            }
            Ok(encode_png(20, 10))
        }
    }

    fn prefetcher(fetcher: Arc<StubFetcher>) -> ImagePrefetcher {
        ImagePrefetcher::new(
            fetcher,
            ImageCache::new(ImageCacheConfig::default()),
            PrefetchConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_prefetch_fills_cache() {
        let fetcher = Arc::new(StubFetcher::default());
        let queue = prefetcher(fetcher.clone());

        assert!(queue.request("https://img/1/400/200"));
        let result = queue.next_result().await.unwrap();

        assert_eq!(
            result,
            PrefetchResult {
                url: "https://img/1/400/200".into(),
                width: 20,
                height: 10,
                error: None
            }
        );
        assert!(queue.cache().exists("https://img/1/400/200"));
        assert_eq!(queue.pending_count(), 0);

        // Cached now, so a second request is skipped.
        assert!(!queue.request("https://img/1/400/200"));
        assert_eq!(fetcher.calls.lock().len(), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_pending_request_is_dropped() {
        let fetcher = Arc::new(StubFetcher::default());
        let queue = prefetcher(fetcher.clone());

        let first = queue.request("https://img/2/400/200");
        let second = queue.request("https://img/2/400/200");
        assert!(first);
        // Either still pending (rejected) or already cached (rejected).
        assert!(!second);

        queue.next_result().await.unwrap();
        assert_eq!(fetcher.calls.lock().len(), 1);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_requests_queue_once() {
        let fetcher = Arc::new(StubFetcher::default());
        let queue = prefetcher(fetcher.clone());
        let url = "https://img/3/400/200";

        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| queue.request(url)))
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().unwrap()))
                .sum()
        });
        assert_eq!(accepted, 1);

        queue.next_result().await.unwrap();
        assert_eq!(fetcher.calls.lock().len(), 1);
        assert!(!queue.request(url));
        assert_eq!(queue.pending_count(), 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_cached() {
        let fetcher = Arc::new(StubFetcher::default());
        let queue = prefetcher(fetcher);

        queue.request("https://img/missing");
        queue.request("https://img/html");
        let mut results = vec![
            queue.next_result().await.unwrap(),
            queue.next_result().await.unwrap(),
        ];
        results.sort_by(|a, b| a.url.cmp(&b.url));

        assert_eq!(results[0].url, "https://img/html");
        assert!(results[0]
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("image does not decode")));
        assert_eq!(results[1].error.as_deref(), Some("HTTP 404"));
        assert!(!queue.cache().exists("https://img/missing"));
        assert!(!queue.cache().exists("https://img/html"));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_prefetch_photos_uses_optimized_urls() {
        let fetcher = Arc::new(StubFetcher::default());
        let queue = prefetcher(fetcher.clone());
        let a = Photo::new("a", "https://picsum.photos/id/1", 300, 600, "t").unwrap();
        let b = Photo::new("b", "https://picsum.photos/id/2", 400, 300, "t").unwrap();

        assert_eq!(queue.prefetch_photos(&[&a, &b]), 2);
        queue.next_result().await.unwrap();
        queue.next_result().await.unwrap();

        let mut calls = fetcher.calls.lock().clone();
        calls.sort();
        assert_eq!(
            calls,
            [
                "https://picsum.photos/id/1/400/800",
                "https://picsum.photos/id/2/400/300"
            ]
        );
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_prefetch_from_feed_window() {
        use crate::paging::pager::testing::ScriptedSource;
        use crate::paging::{PagerConfig, PhotoPager};

        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let mut feed = Feed::new(PhotoPager::new(source, PagerConfig::default()));
        feed.load_initial().await.unwrap();

        let fetcher = Arc::new(StubFetcher::default());
        let queue = ImagePrefetcher::new(
            fetcher.clone(),
            ImageCache::new(ImageCacheConfig::default()),
            PrefetchConfig {
                count: 3,
                ..Default::default()
            },
        );

        assert_eq!(queue.prefetch_from(&feed, 5), 3);
        for _ in 0..3 {
            queue.next_result().await.unwrap();
        }
        let expected: Vec<String> = feed.items()[6..9]
            .iter()
            .map(|p| p.optimized_url(DEFAULT_TARGET_WIDTH))
            .collect();
        let mut calls = fetcher.calls.lock().clone();
        calls.sort();
        let mut expected_sorted = expected.clone();
        expected_sorted.sort();
        assert_eq!(calls, expected_sorted);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_worker_count_is_clamped() {
        let queue = ImagePrefetcher::new(
            Arc::new(StubFetcher::default()),
            ImageCache::new(ImageCacheConfig::default()),
            PrefetchConfig {
                workers: 32,
                ..Default::default()
            },
        );
        assert_eq!(queue.workers.len(), MAX_WORKERS);
        assert!(!queue.is_busy());
        queue.shutdown().await;
    }
}
