use crate::models::Page;

/// Snapshot of loaded pages and the scroll anchor, used to pick a refresh key.
#[derive(Debug, Clone, Copy)]
pub struct PagingState<'a> {
    pub pages: &'a [Page],
    /// Position of the anchor item counted over all loaded pages.
    pub anchor_position: Option<usize>,
}

impl<'a> PagingState<'a> {
    pub fn new(pages: &'a [Page], anchor_position: Option<usize>) -> Self {
        Self {
            pages,
            anchor_position,
        }
    }

    /// Page containing `position`, or the last page when it lies past the end.
    pub fn closest_page_to_position(&self, position: usize) -> Option<&'a Page> {
        let last = self.pages.len().checked_sub(1)?;
        let mut page_index = 0;
        let mut item_index = position;
        while page_index < last && item_index >= self.pages[page_index].len() {
            item_index -= self.pages[page_index].len();
            page_index += 1;
        }
        self.pages.get(page_index)
    }

    /// Key to reload around the anchor so a refresh does not jump back to the top.
    pub fn refresh_key(&self) -> Option<u32> {
        let anchor = self.anchor_position?;
        let page = self.closest_page_to_position(anchor)?;
        page.prev_key
            .map(|k| k + 1)
            .or_else(|| page.next_key.and_then(|k| k.checked_sub(1)))
    }
}
