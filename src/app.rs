use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use crate::images::{
    HttpImageFetcher, ImageCache, ImageCacheConfig, ImagePrefetcher, PrefetchConfig,
    PrefetchResult,
};
use crate::layout::StaggeredLayout;
use crate::paging::{Feed, LoadError, PagerConfig, PhotoPager};
use crate::perf::{FrameClock, JankMonitor, JankReport};
use crate::source::{picsum, MockConfig, MockSource, PhotoSource, PicsumConfig, PicsumSource};

/// Upper bound on simulated frames, in case the feed never fills the viewport.
const MAX_FRAMES: usize = 10_000;

/// Height of the simulated viewport in pixels.
const VIEWPORT_HEIGHT: f32 = 800.0;

/// How long to wait for outstanding prefetches before shutting down.
const PREFETCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct AppArgs {
    /// Use the offline source instead of Lorem Picsum.
    pub mock: bool,
    /// Stop scrolling once this many pages are loaded.
    pub pages: usize,
    pub page_size: u32,
    pub latency_ms: u64,
    pub columns: usize,
    pub width: f32,
    pub prefetch: bool,
    pub disk_cache: bool,
    /// Empty both image cache layers before the session.
    pub clear_cache: bool,
    pub max_retries: u32,
    /// Pull-to-refresh at the end of the session.
    pub refresh: bool,
    /// Display refresh rate used to classify frames; 0 uses the fixed threshold.
    pub refresh_hz: u32,
}

impl Default for AppArgs {
    fn default() -> Self {
        Self {
            mock: false,
            pages: 5,
            page_size: PagerConfig::default().page_size,
            latency_ms: MockConfig::default().latency.as_millis() as u64,
            columns: StaggeredLayout::default().columns,
            width: 416.0,
            prefetch: false,
            disk_cache: true,
            clear_cache: false,
            max_retries: 2,
            refresh: false,
            refresh_hz: 0,
        }
    }
}

impl AppArgs {
    pub fn parse() -> Result<Self> {
        Self::parse_from(env::args().skip(1))
    }

    fn parse_from(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mock" => parsed.mock = true,
                "--prefetch" => parsed.prefetch = true,
                "--no-disk-cache" => parsed.disk_cache = false,
                "--clear-cache" => parsed.clear_cache = true,
                "--refresh" => parsed.refresh = true,
                "--pages" => {
                    let value = args.next().context("Missing value for --pages")?;
                    parsed.pages = value
                        .parse::<usize>()
                        .context("Failed to parse --pages as a positive integer")?;
                }
                "--page-size" => {
                    let value = args.next().context("Missing value for --page-size")?;
                    parsed.page_size = value
                        .parse::<u32>()
                        .context("Failed to parse --page-size as a positive integer")?;
                }
                "--latency-ms" => {
                    let value = args.next().context("Missing value for --latency-ms")?;
                    parsed.latency_ms = value
                        .parse::<u64>()
                        .context("Failed to parse --latency-ms as a non-negative integer")?;
                }
                "--columns" => {
                    let value = args.next().context("Missing value for --columns")?;
                    parsed.columns = value
                        .parse::<usize>()
                        .context("Failed to parse --columns as a positive integer")?;
                }
                "--width" => {
                    let value = args.next().context("Missing value for --width")?;
                    parsed.width = value
                        .parse::<f32>()
                        .context("Failed to parse --width as a number of pixels")?;
                }
                "--max-retries" => {
                    let value = args.next().context("Missing value for --max-retries")?;
                    parsed.max_retries = value
                        .parse::<u32>()
                        .context("Failed to parse --max-retries as a non-negative integer")?;
                }
                "--refresh-hz" => {
                    let value = args.next().context("Missing value for --refresh-hz")?;
                    parsed.refresh_hz = value
                        .parse::<u32>()
                        .context("Failed to parse --refresh-hz as a non-negative integer")?;
                }
                other => bail!("Unknown argument: {other}"),
            }
        }

        if parsed.pages == 0 {
            bail!("--pages must be greater than zero");
        }
        if parsed.page_size == 0 {
            bail!("--page-size must be greater than zero");
        }
        if parsed.columns == 0 {
            bail!("--columns must be greater than zero");
        }
        if parsed.width <= 0.0 {
            bail!("--width must be positive");
        }

        Ok(parsed)
    }

    /// Pager settings: the first load covers two pages.
    fn pager_config(&self) -> PagerConfig {
        PagerConfig {
            page_size: self.page_size,
            initial_load_size: self.page_size.saturating_mul(2),
            ..Default::default()
        }
    }
}

/// Counters for visible tiles that were already in the image cache.
#[derive(Debug, Default)]
struct TileStats {
    hits: usize,
    misses: usize,
    bytes: usize,
}

/// Composition root: wires source, pager, feed, image cache and jank
/// monitor together and drives a simulated scroll session.
pub struct PinFeedApp {
    args: AppArgs,
}

impl PinFeedApp {
    pub fn new(args: AppArgs) -> Self {
        Self { args }
    }

    pub fn run(&self) -> i32 {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                eprintln!("Failed to start runtime: {e}");
                return 1;
            }
        };

        match runtime.block_on(self.session()) {
            Ok(report) => {
                println!(
                    "frames={} jank_frames={} jank_rate={:.2}% verdict={}",
                    report.total_frames, report.jank_frames, report.jank_rate, report.verdict
                );
                0
            }
            Err(e) => {
                eprintln!("pinfeed failed: {e:#}");
                1
            }
        }
    }

    fn build_source(&self, client: reqwest::Client) -> Arc<dyn PhotoSource> {
        if self.args.mock {
            info!(latency_ms = self.args.latency_ms, "Using offline photo source");
            return Arc::new(MockSource::new(MockConfig {
                latency: Duration::from_millis(self.args.latency_ms),
                total: None,
            }));
        }
        Arc::new(PicsumSource::with_client(client, PicsumConfig::default()))
    }

    fn build_cache(&self) -> ImageCache {
        let cache_dir = if self.args.disk_cache {
            ImageCache::default_cache_dir()
        } else {
            None
        };
        let cache = ImageCache::new(ImageCacheConfig {
            cache_dir,
            ..Default::default()
        });
        if self.args.clear_cache {
            match cache.clear_all() {
                Ok(()) => info!(cache_dir = ?cache.cache_dir(), "Cleared image cache"),
                Err(e) => warn!(error = %e, "Failed to clear image cache"),
            }
        }
        cache
    }

    fn build_prefetcher(&self, client: reqwest::Client, cache: ImageCache) -> Option<ImagePrefetcher> {
        if !self.args.prefetch {
            return None;
        }
        let fetcher = Arc::new(HttpImageFetcher::new(client));
        Some(ImagePrefetcher::new(
            fetcher,
            cache,
            PrefetchConfig::default(),
        ))
    }

    async fn session(&self) -> Result<JankReport> {
        let args = &self.args;
        // One connection pool for the photo list and image downloads.
        let client = picsum::build_client(&PicsumConfig::default())
            .context("Failed to create HTTP client")?;
        let source = self.build_source(client.clone());
        let mut feed = Feed::new(PhotoPager::new(source, args.pager_config()));
        let prefetcher = self.build_prefetcher(client, self.build_cache());
        let layout = StaggeredLayout {
            columns: args.columns,
            ..Default::default()
        };
        let mut monitor = JankMonitor::new();
        let mut clock = FrameClock::with_refresh_rate(args.refresh_hz);
        let mut tiles = TileStats::default();

        let interrupted = feed.cancel_handle();
        let cancel = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling page loads");
                cancel.cancel();
            }
        });

        let mut states = feed.subscribe();
        tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let current = states.borrow_and_update().clone();
                debug!(
                    refresh = ?current.refresh,
                    prepend = ?current.prepend,
                    append = ?current.append,
                    "Load state changed"
                );
            }
        });

        let first = feed.load_initial().await;
        let loaded = with_retries(&mut feed, args.max_retries, first)
            .await
            .context("Initial load failed")?;
        info!(loaded, "Initial pages loaded");

        monitor.start();
        let mut scroll_y = 0.0f32;
        let step = VIEWPORT_HEIGHT / 3.0;

        for _ in 0..MAX_FRAMES {
            if interrupted.is_cancelled() {
                break;
            }
            if let Some(report) = clock.tick(Instant::now()).and_then(|s| monitor.record(s)) {
                if let Some(jank) = report.jank {
                    debug!(
                        jank = jank.jank_number,
                        frame = jank.frame_number,
                        duration_ms = jank.duration_ns / 1_000_000,
                        scroll_y,
                        "Janky frame while scrolling"
                    );
                }
                if let Some(rate) = report.running_rate {
                    info!(
                        frame = report.frame_number,
                        jank_rate = %format!("{rate:.2}%"),
                        items = feed.item_count(),
                        "Scrolling"
                    );
                }
            }

            let cells = layout.compute(&feed.items(), args.width);
            let anchor = layout.anchor_at(&cells, scroll_y);
            feed.save_scroll_position(
                anchor.first_visible_item_index,
                anchor.first_visible_item_scroll_offset,
            );
            let last_visible = layout.last_visible_index(&cells, scroll_y, VIEWPORT_HEIGHT);

            if let Some(prefetcher) = &prefetcher {
                if let Some(last) = last_visible {
                    let items = feed.items();
                    let visible = items
                        .get(anchor.first_visible_item_index..=last)
                        .unwrap_or_default();
                    for photo in visible {
                        match prefetcher.cache().get(&prefetcher.tile_url(photo)) {
                            Some(image) => {
                                tiles.hits += 1;
                                tiles.bytes += image.bytes.len();
                            }
                            None => tiles.misses += 1,
                        }
                    }
                }
                prefetcher.prefetch_from(&feed, anchor.first_visible_item_index);
            }

            let wants_more = feed.pages().len() < args.pages
                && last_visible.is_some_and(|last| feed.should_append(last));
            if wants_more {
                let first = feed.append().await;
                match with_retries(&mut feed, args.max_retries, first).await {
                    Ok(added) => debug!(added, pages = feed.pages().len(), "Scrolled into next page"),
                    Err(e) => {
                        warn!(error = %e, "Append failed, stopping scroll");
                        break;
                    }
                }
                // Waiting on the network is not frame time.
                clock.reset();
            }

            let max_scroll = (layout.total_height(&cells) - VIEWPORT_HEIGHT).max(0.0);
            if scroll_y >= max_scroll && !wants_more {
                break;
            }
            scroll_y = (scroll_y + step).min(max_scroll);
        }

        let report = monitor.stop();
        info!(
            items = feed.item_count(),
            pages = feed.pages().len(),
            "Scroll session finished"
        );
        if let Some(photo) = feed.items().get(feed.scroll_anchor().first_visible_item_index) {
            info!(
                id = photo.id(),
                title = photo.title(),
                author = photo.author(),
                url = photo.url(),
                width = photo.width(),
                height = photo.height(),
                "Stopped at photo"
            );
        }

        if args.refresh && !interrupted.is_cancelled() {
            let before = feed.scroll_anchor();
            let first = feed.refresh().await;
            let count = with_retries(&mut feed, args.max_retries, first)
                .await
                .context("Refresh failed")?;
            info!(
                count,
                anchor_before = before.first_visible_item_index,
                anchor_after = feed.scroll_anchor().first_visible_item_index,
                "Refreshed around scroll position"
            );
        }

        if let Some(prefetcher) = prefetcher {
            info!(
                pending = prefetcher.pending_count(),
                active_workers = prefetcher.active_worker_count(),
                "Waiting for prefetches"
            );
            let results = drain_prefetches(&prefetcher, PREFETCH_DRAIN_TIMEOUT).await;
            let failed = results.iter().filter(|r| r.error.is_some()).count();
            let cache = prefetcher.cache();
            info!(
                downloaded = results.len() - failed,
                failed,
                visible_hits = tiles.hits,
                visible_misses = tiles.misses,
                visible_bytes = tiles.bytes,
                entries = cache.memory_entry_count(),
                memory_bytes = cache.memory_usage(),
                max_memory_bytes = cache.max_memory(),
                cache_dir = ?cache.cache_dir(),
                "Prefetch summary"
            );
            prefetcher.shutdown().await;
        }

        feed.close();
        Ok(report)
    }
}

/// Retry the failed edge while the error is retriable, up to `max_retries` times.
async fn with_retries(
    feed: &mut Feed,
    max_retries: u32,
    first: Result<usize, LoadError>,
) -> Result<usize, LoadError> {
    let mut result = first;
    let mut attempt = 0;
    while let Err(err) = &result {
        if !err.is_retriable() || attempt >= max_retries {
            break;
        }
        attempt += 1;
        warn!(attempt, max_retries, error = %err, "Retrying failed load");
        result = feed.retry().await;
    }
    result
}

/// Collect prefetch results until the queue is idle or `limit` elapses.
async fn drain_prefetches(prefetcher: &ImagePrefetcher, limit: Duration) -> Vec<PrefetchResult> {
    let deadline = tokio::time::Instant::now() + limit;
    let mut results = prefetcher.poll_results();
    while prefetcher.is_busy() {
        match tokio::time::timeout_at(deadline, prefetcher.next_result()).await {
            Ok(Some(result)) => results.push(result),
            Ok(None) | Err(_) => break,
        }
    }
    results
}
