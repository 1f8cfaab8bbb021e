//! Upstream photo sources.
//!
//! - `PicsumSource` - Lorem Picsum list API over HTTP
//! - `MockSource` - Deterministic offline data with simulated latency
//!
//! Both map upstream records into validated [`Photo`]s. Records with
//! non-positive dimensions are skipped and logged, never coerced.

pub mod mock;
pub mod picsum;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::models::Photo;

pub use mock::{MockConfig, MockSource};
pub use picsum::{PicsumConfig, PicsumSource};

/// Failure reported by an upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Connectivity problem: DNS, refused connection, timeout.
    #[error("transport error: {0}")]
    Transport(String),
    /// The upstream answered, but not with what we expected.
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}

/// A provider of photo batches addressed by page index.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Fetch up to `limit` photos for zero-based page `page`.
    async fn fetch(&self, page: u32, limit: u32) -> Result<Vec<Photo>, SourceError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Photo descriptor as returned by `GET /v2/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPhoto {
    pub id: String,
    pub author: String,
    pub width: i64,
    pub height: i64,
    pub url: String,
}

impl RawPhoto {
    /// Map into a feed photo whose base URL points at `{base_url}/id/{id}`.
    pub fn into_photo(self, base_url: &str) -> Option<Photo> {
        let width = u32::try_from(self.width).unwrap_or(0);
        let height = u32::try_from(self.height).unwrap_or(0);
        let url = format!("{}/id/{}", base_url.trim_end_matches('/'), self.id);
        let title = format!("Photo by {}", self.author);

        match Photo::new(self.id, url, width, height, title) {
            Ok(photo) => Some(photo.with_author(self.author)),
            Err(e) => {
                warn!(error = %e, source_url = %self.url, "Skipping malformed photo record");
                None
            }
        }
    }
}

/// Map a batch of descriptors, dropping the malformed ones.
pub fn map_descriptors(base_url: &str, raws: Vec<RawPhoto>) -> Vec<Photo> {
    raws.into_iter()
        .filter_map(|raw| raw.into_photo(base_url))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_JSON: &str = r#"[
        {"id":"0","author":"Alejandro Escamilla","width":5000,"height":3333,
         "url":"https://unsplash.com/photos/yC-Yzbqy7PY",
         "download_url":"https://picsum.photos/id/0/5000/3333"},
        {"id":"1","author":"Broken Upload","width":0,"height":3333,
         "url":"https://unsplash.com/photos/x","download_url":"https://picsum.photos/id/1/0/3333"},
        {"id":"2","author":"Negative Height","width":100,"height":-4,
         "url":"https://unsplash.com/photos/y","download_url":"https://picsum.photos/id/2/100/4"},
        {"id":"10","author":"Paul Jarvis","width":2500,"height":1667,
         "url":"https://unsplash.com/photos/6J--NXulQCs",
         "download_url":"https://picsum.photos/id/10/2500/1667"}
    ]"#;

    #[test]
    fn test_map_descriptors_skips_malformed() {
        let raws: Vec<RawPhoto> = serde_json::from_str(LIST_JSON).unwrap();
        let photos = map_descriptors("https://picsum.photos/", raws);

        assert_eq!(photos.len(), 2);
        assert_eq!(photos[0].id(), "0");
        assert_eq!(photos[0].url(), "https://picsum.photos/id/0");
        assert_eq!(photos[0].title(), "Photo by Alejandro Escamilla");
        assert_eq!(photos[0].author(), "Alejandro Escamilla");
        assert_eq!(photos[1].id(), "10");
        assert_eq!((photos[1].width(), photos[1].height()), (2500, 1667));
    }

    #[test]
    fn test_descriptor_missing_field_is_rejected() {
        let result: Result<Vec<RawPhoto>, _> =
            serde_json::from_str(r#"[{"id":"0","author":"A","width":1}]"#);
        assert!(result.is_err());
    }
}
