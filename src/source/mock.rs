//! Offline photo source for running the feed without network access.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

use super::{PhotoSource, SourceError};
use crate::models::Photo;

const TITLES: [&str; 12] = [
    "Mountain Landscape",
    "City Lights",
    "Ocean Sunset",
    "Forest Path",
    "Desert Dunes",
    "Urban Architecture",
    "Tropical Beach",
    "Northern Lights",
    "Autumn Colors",
    "Winter Wonderland",
    "Spring Flowers",
    "Summer Vibes",
];

const AUTHORS: [&str; 6] = [
    "Alex Johnson",
    "Maria Garcia",
    "John Smith",
    "Emma Wilson",
    "Carlos Rodriguez",
    "Sophie Chen",
];

/// Width range of generated photos (inclusive).
const WIDTH_RANGE: (u32, u32) = (300, 600);
/// Height range of generated photos (inclusive).
const HEIGHT_RANGE: (u32, u32) = (400, 800);

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Simulated network latency per request.
    pub latency: Duration,
    /// Total number of photos available; `None` for an endless feed.
    pub total: Option<u32>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(500),
            total: None,
        }
    }
}

/// Generates stable photos: the same index always yields the same record.
pub struct MockSource {
    config: MockConfig,
}

impl MockSource {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    fn photo_at(index: u32) -> Result<Photo, SourceError> {
        let hash = xxh3_64(&index.to_le_bytes());
        let width = pick(hash, WIDTH_RANGE);
        let height = pick(hash >> 32, HEIGHT_RANGE);
        let i = index as usize;

        Photo::new(
            format!("photo_{index}"),
            format!("https://picsum.photos/id/{}", index % 100),
            width,
            height,
            TITLES[i % TITLES.len()],
        )
        .map(|p| p.with_author(AUTHORS[i % AUTHORS.len()]))
        .map_err(|e| SourceError::Unknown(e.to_string()))
    }
}

fn pick(hash: u64, (lo, hi): (u32, u32)) -> u32 {
    lo + (hash % u64::from(hi - lo + 1)) as u32
}

#[async_trait]
impl PhotoSource for MockSource {
    async fn fetch(&self, page: u32, limit: u32) -> Result<Vec<Photo>, SourceError> {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        let start = page.saturating_mul(limit);
        let mut end = start.saturating_add(limit);
        if let Some(total) = self.config.total {
            end = end.min(total);
        }
        trace!(page, start, end, "Generating mock photos");

        (start..end.max(start)).map(Self::photo_at).collect()
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
