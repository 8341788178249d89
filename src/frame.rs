//! Frame data structures for captured label images

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;
use std::time::Instant;

/// A captured camera frame
#[derive(Debug, Clone)]
pub struct LabelFrame {
    /// Frame identifier used to correlate log events
    pub id: String,
    /// RGB pixel data
    pub image: RgbImage,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl LabelFrame {
    /// Create a new frame with a fresh identifier
    pub fn new(image: RgbImage) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            image,
            timestamp: Instant::now(),
        }
    }

    /// Load a frame from an image file
    pub fn from_path(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("Failed to open image {:?}", path))?
            .to_rgb8();
        Ok(Self::new(image))
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_get_distinct_ids() {
        let a = LabelFrame::new(RgbImage::new(4, 3));
        let b = LabelFrame::new(RgbImage::new(4, 3));
        assert_ne!(a.id, b.id);
        assert_eq!(a.dimensions(), (4, 3));
    }

    #[test]
    fn test_from_path_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbImage::from_pixel(6, 2, image::Rgb([10, 20, 30])).save(&path).unwrap();

        let frame = LabelFrame::from_path(&path).unwrap();
        assert_eq!(frame.dimensions(), (6, 2));
        assert_eq!(frame.image.get_pixel(5, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_from_missing_path_fails() {
        assert!(LabelFrame::from_path(Path::new("/nonexistent/frame.png")).is_err());
    }
}
