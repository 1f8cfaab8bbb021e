//! Page loading over a [`PhotoSource`].
//!
//! The pager is stateless between calls: every `load` is independent, so a
//! failed key can be retried by calling `load` again with the same key.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::state::PagingState;
use crate::models::Page;
use crate::source::{PhotoSource, SourceError};

/// Page loading configuration.
#[derive(Debug, Clone)]
pub struct PagerConfig {
    /// Photos per page after the first load.
    pub page_size: u32,
    /// Start appending when the user is this many items from the end.
    pub prefetch_distance: usize,
    /// Photos requested by the first load and by refreshes.
    pub initial_load_size: u32,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            prefetch_distance: 5,
            initial_load_size: 40,
        }
    }
}

/// Why a page could not be loaded.
///
/// `Transport`, `Protocol` and `Unknown` are all retriable with the same key;
/// the distinction is only informational.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
    #[error("unknown error: {0}")]
    Unknown(String),
    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn is_retriable(&self) -> bool {
        !matches!(self, LoadError::Cancelled)
    }
}

impl From<SourceError> for LoadError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Transport(msg) => LoadError::Transport(msg),
            SourceError::Protocol(msg) => LoadError::Protocol(msg),
            SourceError::Unknown(msg) => LoadError::Unknown(msg),
        }
    }
}

pub struct PhotoPager {
    source: Arc<dyn PhotoSource>,
    config: PagerConfig,
}

impl PhotoPager {
    pub fn new(source: Arc<dyn PhotoSource>, config: PagerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    /// Load the page at `key` (first page when `None`).
    ///
    /// Returns [`LoadError::Cancelled`] without side effects if `cancel` fires
    /// before the source answers.
    pub async fn load(
        &self,
        key: Option<u32>,
        page_size: u32,
        cancel: &CancellationToken,
    ) -> Result<Page, LoadError> {
        let key = key.unwrap_or(0);
        debug!(source = self.source.name(), key, page_size, "Loading page");

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(key, "Page load cancelled");
                return Err(LoadError::Cancelled);
            }
            result = self.source.fetch(key, page_size) => result,
        };

        match fetched {
            Ok(photos) => {
                debug!(key, count = photos.len(), "Loaded page");
                Ok(Page::for_key(key, photos))
            }
            Err(err) => {
                match &err {
                    SourceError::Transport(_) => warn!(key, error = %err, "Network error loading page"),
                    SourceError::Protocol(_) => warn!(key, error = %err, "HTTP error loading page"),
                    SourceError::Unknown(_) => warn!(key, error = %err, "Unknown error loading page"),
                }
                Err(err.into())
            }
        }
    }

    /// Key to restart loading from, keeping the user near `state`'s anchor.
    pub fn refresh_key(&self, state: &PagingState<'_>) -> Option<u32> {
        state.refresh_key()
    }
}
