use crate::models::Photo;
use crate::paging::ScrollAnchor;

/// Configuration for the staggered (masonry) grid.
///
/// Columns share the viewport width equally. Each photo keeps its aspect
/// ratio and goes into the currently shortest column, leftmost on ties.
#[derive(Debug, Clone)]
pub struct StaggeredLayout {
    /// Number of columns (default: 2)
    pub columns: usize,
    /// Horizontal and vertical spacing between tiles in pixels (default: 8)
    pub gap: f32,
    /// Padding around the whole grid in pixels (default: 8)
    pub padding: f32,
}

impl Default for StaggeredLayout {
    fn default() -> Self {
        Self {
            columns: 2,
            gap: 8.0,
            padding: 8.0,
        }
    }
}

/// Placement of one photo in the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub column: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl GridCell {
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

impl StaggeredLayout {
    pub fn new(columns: usize, gap: f32, padding: f32) -> Self {
        Self {
            columns,
            gap,
            padding,
        }
    }

    /// Width of one column for the given viewport.
    pub fn column_width(&self, viewport_width: f32) -> f32 {
        let columns = self.columns.max(1) as f32;
        let usable = viewport_width - 2.0 * self.padding - (columns - 1.0) * self.gap;
        (usable / columns).max(1.0)
    }

    /// Places `photos` in order; cell `i` belongs to `photos[i]`.
    pub fn compute(&self, photos: &[&Photo], viewport_width: f32) -> Vec<GridCell> {
        if photos.is_empty() || viewport_width <= 0.0 {
            return Vec::new();
        }

        let columns = self.columns.max(1);
        let width = self.column_width(viewport_width);
        let mut heights = vec![self.padding; columns];
        let mut cells = Vec::with_capacity(photos.len());

        for photo in photos {
            let column = shortest(&heights);
            let height = (width / photo.aspect_ratio()).max(1.0);
            let x = self.padding + column as f32 * (width + self.gap);
            let y = heights[column];
            heights[column] = y + height + self.gap;
            cells.push(GridCell {
                column,
                x,
                y,
                width,
                height,
            });
        }

        cells
    }

    /// Scrollable height of the laid-out grid.
    pub fn total_height(&self, cells: &[GridCell]) -> f32 {
        cells
            .iter()
            .map(GridCell::bottom)
            .fold(0.0f32, f32::max)
            .max(0.0)
            + if cells.is_empty() { 0.0 } else { self.padding }
    }

    /// First visible item at `scroll_y` and how far it is scrolled past its top.
    pub fn anchor_at(&self, cells: &[GridCell], scroll_y: f32) -> ScrollAnchor {
        let found = cells
            .iter()
            .enumerate()
            .find(|(_, cell)| cell.bottom() > scroll_y);
        match found {
            Some((index, cell)) => ScrollAnchor {
                first_visible_item_index: index,
                first_visible_item_scroll_offset: (scroll_y - cell.y).max(0.0).round() as u32,
            },
            None => ScrollAnchor {
                first_visible_item_index: cells.len().saturating_sub(1),
                first_visible_item_scroll_offset: 0,
            },
        }
    }

    /// Index of the last item intersecting the viewport.
    pub fn last_visible_index(
        &self,
        cells: &[GridCell],
        scroll_y: f32,
        viewport_height: f32,
    ) -> Option<usize> {
        let bottom = scroll_y + viewport_height;
        cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.y < bottom && cell.bottom() > scroll_y)
            .map(|(i, _)| i)
            .max()
    }
}

fn shortest(heights: &[f32]) -> usize {
    let mut best = 0;
    for (i, h) in heights.iter().enumerate() {
        if *h < heights[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(w: u32, h: u32) -> Photo {
        Photo::new(format!("{w}x{h}"), "u", w, h, "t").unwrap()
    }

    fn no_spacing() -> StaggeredLayout {
        StaggeredLayout::new(2, 0.0, 0.0)
    }

    #[test]
    fn test_empty_input() {
        let layout = StaggeredLayout::default();
        assert!(layout.compute(&[], 400.0).is_empty());
        assert!(layout.compute(&[&photo(1, 1)], 0.0).is_empty());
        assert_eq!(layout.total_height(&[]), 0.0);
    }

    #[test]
    fn test_column_width_accounts_for_spacing() {
        let layout = StaggeredLayout::default();
        // 416 - 16 padding - 8 gap = 392, two columns
        assert_eq!(layout.column_width(416.0), 196.0);
    }

    #[test]
    fn test_items_go_to_shortest_column() {
        let tall = photo(100, 300);
        let square = photo(100, 100);
        let wide = photo(200, 100);
        let items = [&tall, &square, &wide, &square];
        let cells = no_spacing().compute(&items, 200.0);

        // Column width 100: heights 300, 100, 50, 100.
        assert_eq!(cells[0].column, 0);
        assert_eq!(cells[1].column, 1);
        assert_eq!(cells[2].column, 1);
        assert_eq!(cells[2].y, 100.0);
        assert_eq!(cells[3].column, 1);
        assert_eq!(cells[3].y, 150.0);
        assert_eq!(cells[3].x, 100.0);
        assert_eq!(no_spacing().total_height(&cells), 300.0);
    }

    #[test]
    fn test_tiles_keep_aspect_ratio() {
        let p = photo(300, 600);
        let cells = StaggeredLayout::default().compute(&[&p], 416.0);
        assert_eq!(cells[0].width, 196.0);
        assert_eq!(cells[0].height, 392.0);
        assert_eq!((cells[0].x, cells[0].y), (8.0, 8.0));
    }

    #[test]
    fn test_anchor_at_scroll_offset() {
        let square = photo(100, 100);
        let items = [&square, &square, &square, &square];
        let cells = no_spacing().compute(&items, 200.0);
        // Rows of two 100px squares.
        assert_eq!(no_spacing().anchor_at(&cells, 0.0), ScrollAnchor::default());
        assert_eq!(
            no_spacing().anchor_at(&cells, 130.0),
            ScrollAnchor {
                first_visible_item_index: 2,
                first_visible_item_scroll_offset: 30
            }
        );
        assert_eq!(
            no_spacing().anchor_at(&cells, 999.0).first_visible_item_index,
            3
        );
    }

    #[test]
    fn test_last_visible_index() {
        let square = photo(100, 100);
        let items = [&square; 6];
        let cells = no_spacing().compute(&items, 200.0);
        assert_eq!(no_spacing().last_visible_index(&cells, 0.0, 150.0), Some(3));
        assert_eq!(no_spacing().last_visible_index(&cells, 0.0, 300.0), Some(5));
        assert_eq!(no_spacing().last_visible_index(&cells, 400.0, 100.0), None);
    }
}
