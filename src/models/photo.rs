use thiserror::Error;

/// Author used when the upstream record does not name one.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhotoError {
    #[error("photo {id} has invalid dimensions {width}x{height}")]
    InvalidDimensions { id: String, width: u32, height: u32 },
}

/// A photo in the feed with its source dimensions.
///
/// Constructed only through [`Photo::new`], so `width` and `height` are always
/// positive and [`Photo::aspect_ratio`] is always defined.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    id: String,
    url: String,
    width: u32,
    height: u32,
    title: String,
    author: String,
}

impl Photo {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        width: u32,
        height: u32,
        title: impl Into<String>,
    ) -> Result<Self, PhotoError> {
        let id = id.into();
        if width == 0 || height == 0 {
            return Err(PhotoError::InvalidDimensions { id, width, height });
        }
        Ok(Self {
            id,
            url: url.into(),
            width,
            height,
            title: title.into(),
            author: UNKNOWN_AUTHOR.to_string(),
        })
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Height that keeps the source proportions at `target_width`.
    pub fn scaled_height(&self, target_width: u32) -> u32 {
        (f64::from(target_width) * f64::from(self.height) / f64::from(self.width)).round() as u32
    }

    /// URL of a server-side resized variant, so only the pixels the grid
    /// needs are downloaded.
    pub fn optimized_url(&self, target_width: u32) -> String {
        format!(
            "{}/{}/{}",
            self.url,
            target_width,
            self.scaled_height(target_width)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(width: u32, height: u32) -> Photo {
        Photo::new("1", "https://picsum.photos/id/1", width, height, "Photo by Alex").unwrap()
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        let err = Photo::new("bad", "u", 0, 100, "t").unwrap_err();
        assert_eq!(
            err,
            PhotoError::InvalidDimensions {
                id: "bad".into(),
                width: 0,
                height: 100
            }
        );
        assert!(Photo::new("bad", "u", 100, 0, "t").is_err());
    }

    #[test]
    fn test_author_defaults_to_unknown() {
        assert_eq!(photo(10, 10).author(), "Unknown");
        assert_eq!(photo(10, 10).with_author("Emma Wilson").author(), "Emma Wilson");
    }

    #[test]
    fn test_aspect_ratio() {
        assert_eq!(photo(300, 600).aspect_ratio(), 0.5);
        assert_eq!(photo(1920, 1080).aspect_ratio(), 1920.0 / 1080.0);
    }

    #[test]
    fn test_optimized_url_preserves_aspect() {
        assert_eq!(
            photo(300, 600).optimized_url(400),
            "https://picsum.photos/id/1/400/800"
        );
    }

    #[test]
    fn test_optimized_url_rounds_height() {
        // 400 * 400 / 300 = 533.33
        assert!(photo(300, 400).optimized_url(400).ends_with("/400/533"));
        // 400 * 500 / 600 = 333.33, 401 * 500 / 600 = 334.17
        assert!(photo(600, 500).optimized_url(401).ends_with("/401/334"));
        // 500 * 5 / 3 = 833.33
        assert!(photo(3, 5).optimized_url(500).ends_with("/500/833"));
    }
}
