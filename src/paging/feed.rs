//! Consumer-side feed state: loaded pages, per-edge load state and the
//! remembered scroll anchor.
//!
//! Loads are serialized by `&mut self`, so two loads never race on one feed.
//! Cancelling the feed's token (or dropping a load future) leaves pages
//! untouched and restores the edge's previous load state.

use std::collections::HashSet;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pager::{LoadError, PhotoPager};
use super::state::PagingState;
use crate::models::{Page, Photo};

/// Number of photos to hand to the image prefetcher past the current position.
pub const DEFAULT_PREFETCH_COUNT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    NotLoading { end_reached: bool },
    Loading,
    Error(LoadError),
}

impl LoadState {
    pub fn is_error(&self) -> bool {
        matches!(self, LoadState::Error(_))
    }

    fn idle() -> Self {
        LoadState::NotLoading { end_reached: false }
    }
}

/// Load state of each edge of the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadStates {
    /// First load and pull-to-refresh.
    pub refresh: LoadState,
    pub prepend: LoadState,
    pub append: LoadState,
}

impl Default for LoadStates {
    fn default() -> Self {
        Self {
            refresh: LoadState::idle(),
            prepend: LoadState::idle(),
            append: LoadState::idle(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Refresh,
    Prepend,
    Append,
}

impl LoadStates {
    fn get(&self, edge: Edge) -> &LoadState {
        match edge {
            Edge::Refresh => &self.refresh,
            Edge::Prepend => &self.prepend,
            Edge::Append => &self.append,
        }
    }

    fn set(&mut self, edge: Edge, state: LoadState) {
        match edge {
            Edge::Refresh => self.refresh = state,
            Edge::Prepend => self.prepend = state,
            Edge::Append => self.append = state,
        }
    }
}

/// First visible item and its pixel offset, used to restore position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollAnchor {
    pub first_visible_item_index: usize,
    pub first_visible_item_scroll_offset: u32,
}

/// Restores an edge's load state if a load future is dropped mid-flight.
struct EdgeGuard<'a> {
    states: &'a watch::Sender<LoadStates>,
    edge: Edge,
    previous: Option<LoadState>,
}

impl<'a> EdgeGuard<'a> {
    fn begin(states: &'a watch::Sender<LoadStates>, edge: Edge) -> Self {
        let previous = states.borrow().get(edge).clone();
        states.send_modify(|s| s.set(edge, LoadState::Loading));
        Self {
            states,
            edge,
            previous: Some(previous),
        }
    }

    fn finish(mut self, state: LoadState) {
        self.previous = None;
        self.states.send_modify(|s| s.set(self.edge, state));
    }

    fn restore(mut self) {
        if let Some(previous) = self.previous.take() {
            self.states.send_modify(|s| s.set(self.edge, previous));
        }
    }
}

impl Drop for EdgeGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            let edge = self.edge;
            self.states.send_modify(|s| s.set(edge, previous));
        }
    }
}

/// An ordered, deduplicated photo feed built from pager pages.
pub struct Feed {
    pager: PhotoPager,
    pages: Vec<Page>,
    states: watch::Sender<LoadStates>,
    anchor: ScrollAnchor,
    cancel: CancellationToken,
}

impl Feed {
    pub fn new(pager: PhotoPager) -> Self {
        let (states, _) = watch::channel(LoadStates::default());
        Self {
            pager,
            pages: Vec::new(),
            states,
            anchor: ScrollAnchor::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn load_states(&self) -> LoadStates {
        self.states.borrow().clone()
    }

    /// Watch load state changes, e.g. to render spinners and retry buttons.
    pub fn subscribe(&self) -> watch::Receiver<LoadStates> {
        self.states.subscribe()
    }

    /// Token that cancels any in-flight load on this feed when triggered.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Tear down the feed; in-flight and later loads return `Cancelled`.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// All loaded photos in order, keeping the first occurrence of each id.
    pub fn items(&self) -> Vec<&Photo> {
        let mut seen = HashSet::new();
        self.pages
            .iter()
            .flat_map(|p| p.photos.iter())
            .filter(|photo| seen.insert(photo.id()))
            .collect()
    }

    pub fn item_count(&self) -> usize {
        self.items().len()
    }

    pub fn scroll_anchor(&self) -> ScrollAnchor {
        self.anchor
    }

    pub fn save_scroll_position(&mut self, index: usize, offset: u32) {
        self.anchor = ScrollAnchor {
            first_visible_item_index: index,
            first_visible_item_scroll_offset: offset,
        };
        debug!(index, offset, "Scroll saved");
    }

    pub fn clear_scroll_state(&mut self) {
        self.anchor = ScrollAnchor::default();
    }

    /// Whether the user is close enough to the end that the next page is needed.
    pub fn should_append(&self, last_visible_index: usize) -> bool {
        if self.pages.is_empty() {
            return false;
        }
        let remaining = self.item_count().saturating_sub(last_visible_index + 1);
        remaining <= self.pager.config().prefetch_distance
            && *self.states.borrow().get(Edge::Append) == LoadState::idle()
    }

    /// Photos after `current_index` whose images should be warmed up.
    pub fn prefetch_candidates(&self, current_index: usize, count: usize) -> Vec<&Photo> {
        self.items()
            .into_iter()
            .skip(current_index + 1)
            .take(count)
            .collect()
    }

    /// Load the first page if nothing is loaded yet.
    pub async fn load_initial(&mut self) -> Result<usize, LoadError> {
        if !self.pages.is_empty() {
            return Ok(0);
        }
        self.refresh().await
    }

    /// Reload the feed around the scroll anchor, replacing all pages.
    ///
    /// Loads `initial_load_size` worth of consecutive `page_size` pages
    /// starting at the refresh key, so every key maps to the same items as
    /// a later `append` or `prepend` would. On success the anchor is moved to
    /// wherever its photo lands in the new sequence, or to the top if the
    /// photo is gone. A failure part way through keeps the old pages.
    pub async fn refresh(&mut self) -> Result<usize, LoadError> {
        let anchor_id = self
            .items()
            .get(self.anchor.first_visible_item_index)
            .map(|p| p.id().to_string());
        let anchor_position = anchor_id
            .as_deref()
            .and_then(|id| self.raw_position(id));
        let key = self
            .pager
            .refresh_key(&PagingState::new(&self.pages, anchor_position));
        let start = key.unwrap_or(0);
        let size = self.pager.config().page_size;
        let span = self.refresh_span();

        let guard = EdgeGuard::begin(&self.states, Edge::Refresh);
        let mut loaded = Vec::new();
        for offset in 0..span {
            let page_key = start.saturating_add(offset);
            match self.pager.load(Some(page_key), size, &self.cancel).await {
                Ok(page) => {
                    let end = page.next_key.is_none();
                    loaded.push(page);
                    if end {
                        break;
                    }
                }
                Err(err) => return Self::settle_error(guard, err),
            }
        }

        let count: usize = loaded.iter().map(Page::len).sum();
        let prepend_end = loaded.first().map_or(true, |p| p.prev_key.is_none());
        let append_end = loaded.last().map_or(true, |p| p.next_key.is_none());
        self.pages = loaded;
        guard.finish(LoadState::NotLoading { end_reached: false });
        self.states.send_modify(|s| {
            s.prepend = LoadState::NotLoading {
                end_reached: prepend_end,
            };
            s.append = LoadState::NotLoading {
                end_reached: append_end,
            };
        });

        let restored = anchor_id.and_then(|id| self.items().iter().position(|p| p.id() == id));
        match restored {
            Some(index) => self.anchor.first_visible_item_index = index,
            None => self.clear_scroll_state(),
        }
        info!(key = start, pages = self.pages.len(), count, "Feed refreshed");
        Ok(count)
    }

    /// Load the page after the last one. Returns 0 when the end was reached.
    pub async fn append(&mut self) -> Result<usize, LoadError> {
        let Some(key) = self.pages.last().and_then(|p| p.next_key) else {
            return Ok(0);
        };
        let size = self.pager.config().page_size;

        let guard = EdgeGuard::begin(&self.states, Edge::Append);
        match self.pager.load(Some(key), size, &self.cancel).await {
            Ok(page) => {
                let before = self.item_count();
                let end_reached = page.next_key.is_none();
                self.pages.push(page);
                guard.finish(LoadState::NotLoading { end_reached });
                let added = self.item_count() - before;
                debug!(key, added, end_reached, "Appended page");
                Ok(added)
            }
            Err(err) => Self::settle_error(guard, err),
        }
    }

    /// Load the page before the first one (after a refresh deep in the feed).
    pub async fn prepend(&mut self) -> Result<usize, LoadError> {
        let Some(key) = self.pages.first().and_then(|p| p.prev_key) else {
            return Ok(0);
        };
        let size = self.pager.config().page_size;

        let guard = EdgeGuard::begin(&self.states, Edge::Prepend);
        match self.pager.load(Some(key), size, &self.cancel).await {
            Ok(page) => {
                let before = self.item_count();
                let end_reached = page.prev_key.is_none();
                self.pages.insert(0, page);
                guard.finish(LoadState::NotLoading { end_reached });
                let added = self.item_count() - before;
                // Keep the same photo under the anchor.
                self.anchor.first_visible_item_index += added;
                debug!(key, added, end_reached, "Prepended page");
                Ok(added)
            }
            Err(err) => Self::settle_error(guard, err),
        }
    }

    /// Re-run the failed edge, if any, with the same key.
    pub async fn retry(&mut self) -> Result<usize, LoadError> {
        let states = self.load_states();
        if states.refresh.is_error() {
            self.refresh().await
        } else if states.prepend.is_error() {
            self.prepend().await
        } else if states.append.is_error() {
            self.append().await
        } else {
            Ok(0)
        }
    }

    fn settle_error(guard: EdgeGuard<'_>, err: LoadError) -> Result<usize, LoadError> {
        if err == LoadError::Cancelled {
            guard.restore();
        } else {
            guard.finish(LoadState::Error(err.clone()));
        }
        Err(err)
    }

    /// Number of `page_size` pages covering `initial_load_size`.
    fn refresh_span(&self) -> u32 {
        let config = self.pager.config();
        config
            .initial_load_size
            .div_ceil(config.page_size.max(1))
            .max(1)
    }

    /// Position of the first occurrence of `id` across all raw page items.
    fn raw_position(&self, id: &str) -> Option<usize> {
        self.pages
            .iter()
            .flat_map(|p| p.photos.iter())
            .position(|p| p.id() == id)
    }
}
