use super::Photo;

/// One fetched batch of photos plus the keys of its neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub photos: Vec<Photo>,
    pub prev_key: Option<u32>,
    pub next_key: Option<u32>,
}

impl Page {
    /// Builds a page for `key`, deriving the neighbour keys.
    ///
    /// An empty batch marks the end of the feed, so it has no next key.
    pub fn for_key(key: u32, photos: Vec<Photo>) -> Self {
        let prev_key = key.checked_sub(1);
        let next_key = if photos.is_empty() { None } else { Some(key + 1) };
        Self {
            photos,
            prev_key,
            next_key,
        }
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }
}
