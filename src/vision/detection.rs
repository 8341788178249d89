//! Label detection interface
//!
//! The instance-segmentation network is an external collaborator; the
//! pipeline consumes its boxes and masks through [`LabelDetector`].

use anyhow::{Context, Result};
use image::{GrayImage, RgbImage};
use std::path::Path;

/// One detected label candidate
#[derive(Debug, Clone)]
pub struct Detection {
    /// Bounding box (x1, y1, x2, y2)
    pub bounding_box: (i32, i32, i32, i32),
    /// Class name reported by the detector
    pub class_name: String,
    /// Detection confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Binary segmentation mask in frame coordinates
    pub mask: Option<GrayImage>,
}

impl Detection {
    /// Detection covering the whole mask, built from a stored mask image
    pub fn from_mask(mask: GrayImage, class_name: impl Into<String>) -> Self {
        let (w, h) = mask.dimensions();
        Self {
            bounding_box: (0, 0, w as i32, h as i32),
            class_name: class_name.into(),
            confidence: 1.0,
            mask: Some(mask),
        }
    }

    /// Load a binary mask from an image file
    pub fn from_mask_file(path: &Path) -> Result<Self> {
        let mask = image::open(path)
            .with_context(|| format!("Failed to open mask {:?}", path))?
            .to_luma8();
        Ok(Self::from_mask(mask, "label"))
    }
}

/// Label detector
pub trait LabelDetector {
    /// Detect label candidates, sorted by descending confidence
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Detector replaying detections produced elsewhere
///
/// Every call returns the same candidates, whatever the frame.
pub struct RecordedDetector {
    detections: Vec<Detection>,
}

impl RecordedDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    /// Single full-confidence detection from a stored mask image
    pub fn from_mask_file(path: &Path) -> Result<Self> {
        Ok(Self::new(vec![Detection::from_mask_file(path)?]))
    }
}

impl LabelDetector for RecordedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}

/// Keep detections at or above `threshold`, highest confidence first
pub fn filter_detections(mut detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections.retain(|d| d.confidence >= threshold);
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(confidence: f32) -> Detection {
        Detection {
            bounding_box: (0, 0, 10, 10),
            class_name: "label".to_string(),
            confidence,
            mask: None,
        }
    }

    #[test]
    fn test_filter_detections_orders_and_thresholds() {
        let filtered = filter_detections(vec![detection(0.4), detection(0.7), detection(0.9)], 0.5);
        assert_eq!(filtered.len(), 2);
        assert!((filtered[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_from_mask_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        GrayImage::from_pixel(20, 10, image::Luma([255])).save(&path).unwrap();

        let detection = Detection::from_mask_file(&path).unwrap();
        assert_eq!(detection.bounding_box, (0, 0, 20, 10));
        assert!(detection.mask.is_some());

        let mut detector = RecordedDetector::from_mask_file(&path).unwrap();
        let found = detector.detect(&RgbImage::new(20, 10)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_name, "label");
    }

    #[test]
    fn test_missing_mask_file() {
        assert!(RecordedDetector::from_mask_file(Path::new("/nonexistent/mask.png")).is_err());
    }
}
