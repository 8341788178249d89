//! Label rectification
//!
//! Turns an arbitrarily rotated label region, given as a contour of the
//! detector's mask, into an upright rectangular crop. Optionally forces
//! landscape orientation and undoes upside-down labels with an orientation
//! classifier.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::geometry::{distance, min_area_corners, order_points, Affine2, PointI};
use super::orientation::OrientationClassifier;
use crate::config::RectifierSettings;

/// Result of the crop/deskew step
#[derive(Debug, Clone)]
pub struct RectifyOutcome {
    /// Upright crop, `None` on failure
    pub image: Option<RgbImage>,
    /// Human-readable status
    pub message: String,
}

/// Result of the full rectification sequence
#[derive(Debug, Clone)]
pub struct RectifyResult {
    /// Final image, `None` if the crop/deskew step failed
    pub image: Option<RgbImage>,
    /// Whether an image was produced
    pub success: bool,
    /// Status of every step, joined with " | "
    pub message: String,
}

/// Label rectifier
pub struct Rectifier {
    settings: RectifierSettings,
    classifier: Option<Arc<dyn OrientationClassifier>>,
}

impl Rectifier {
    /// Create a rectifier without an orientation classifier
    pub fn new(settings: RectifierSettings) -> Self {
        Self {
            settings,
            classifier: None,
        }
    }

    /// Attach an orientation classifier for the 180° check
    pub fn with_classifier(mut self, classifier: Arc<dyn OrientationClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Crop and deskew the label described by `points`
    pub fn rectify(&self, image: &RgbImage, points: &[PointI]) -> RectifyOutcome {
        if image.width() == 0 || image.height() == 0 {
            return RectifyOutcome {
                image: None,
                message: "Empty image".to_string(),
            };
        }
        if points.len() < 3 {
            return RectifyOutcome {
                image: None,
                message: "Insufficient points (need at least 3)".to_string(),
            };
        }

        let Some(corners) = min_area_corners(points) else {
            return RectifyOutcome {
                image: None,
                message: "Insufficient points (need at least 3)".to_string(),
            };
        };
        let [tl, tr, br, bl] = order_points(&corners);

        let width = distance(br, bl).max(distance(tr, tl)) as i64;
        let height = distance(tr, br).max(distance(tl, bl)) as i64;
        if width <= 0 || height <= 0 {
            return invalid_dimensions();
        }
        let (width, height) = (width as u32, height as u32);

        // Inverse map: output pixel -> source pixel
        let dst = [
            (0.0, 0.0),
            (width as f64 - 1.0, 0.0),
            (width as f64 - 1.0, height as f64 - 1.0),
        ];
        let src = [tl, tr, br].map(|p| (p.0 as f64, p.1 as f64));
        let Some(inverse) = Affine2::from_triangles(dst, src) else {
            return invalid_dimensions();
        };

        let warped = warp_affine(image, &inverse, width, height);
        debug!("Rectified label to {}x{}", width, height);

        RectifyOutcome {
            image: Some(warped),
            message: format!("Success: {}x{}", width, height),
        }
    }

    /// Rotate 90° clockwise iff the image is taller than it is wide
    pub fn force_landscape(&self, image: RgbImage) -> (RgbImage, bool) {
        force_landscape(image)
    }

    /// Rotate 180° when the orientation classifier is confident the label is upside down
    ///
    /// Never fails: a missing or failing classifier passes the image through.
    pub fn correct_orientation_with_ai(&self, image: RgbImage) -> (RgbImage, String) {
        let Some(classifier) = &self.classifier else {
            return (image, "AI not available".to_string());
        };
        if !classifier.is_available() {
            return (image, "AI not available".to_string());
        }

        let max_width = self.settings.ai_max_width.max(1);
        let prediction = if image.width() > max_width {
            let scale = max_width as f32 / image.width() as f32;
            let new_height = ((image.height() as f32 * scale) as u32).max(1);
            let small = imageops::resize(&image, max_width, new_height, FilterType::Triangle);
            classifier.classify(&small)
        } else {
            classifier.classify(&image)
        };

        match prediction {
            Ok(p) if p.label.contains("180") && p.score > self.settings.ai_confidence_threshold => {
                info!("Label upside down (conf {:.2}), rotating 180°", p.score);
                (
                    imageops::rotate180(&image),
                    format!("Rotated 180° (conf: {:.2})", p.score),
                )
            }
            Ok(p) => (
                image,
                format!("No rotation needed (detected: {}, conf: {:.2})", p.label, p.score),
            ),
            Err(e) => {
                warn!("Orientation classifier failed: {:#}", e);
                (image, format!("Error: {}", e))
            }
        }
    }

    /// Rectify, then force landscape and run the orientation check as configured
    pub fn process(&self, image: &RgbImage, points: &[PointI]) -> RectifyResult {
        let mut messages = Vec::with_capacity(3);

        let outcome = self.rectify(image, points);
        messages.push(format!("Step1: {}", outcome.message));
        let Some(mut current) = outcome.image else {
            return RectifyResult {
                image: None,
                success: false,
                message: messages.join(" | "),
            };
        };

        if self.settings.force_landscape {
            let (rotated, did_rotate) = force_landscape(current);
            current = rotated;
            messages.push(if did_rotate {
                "Step2: Rotated 90°".to_string()
            } else {
                "Step2: Already landscape".to_string()
            });
        } else {
            messages.push("Step2: Skipped (landscape not forced)".to_string());
        }

        if !self.settings.ai_orientation_fix {
            messages.push("Step3: Skipped (AI fix disabled)".to_string());
        } else if self.classifier.as_ref().map_or(true, |c| !c.is_available()) {
            messages.push("Step3: Skipped (AI not available)".to_string());
        } else {
            let (corrected, status) = self.correct_orientation_with_ai(current);
            current = corrected;
            messages.push(format!("Step3: {}", status));
        }

        RectifyResult {
            image: Some(current),
            success: true,
            message: messages.join(" | "),
        }
    }
}

fn invalid_dimensions() -> RectifyOutcome {
    RectifyOutcome {
        image: None,
        message: "Invalid dimensions after transformation".to_string(),
    }
}

/// Rotate 90° clockwise iff height > width
pub fn force_landscape(image: RgbImage) -> (RgbImage, bool) {
    if image.height() > image.width() {
        (imageops::rotate90(&image), true)
    } else {
        (image, false)
    }
}

/// Warp with an output-to-source affine map, bilinear sampling and edge replication
fn warp_affine(src: &RgbImage, inverse: &Affine2, width: u32, height: u32) -> RgbImage {
    let max_x = src.width().saturating_sub(1) as f64;
    let max_y = src.height().saturating_sub(1) as f64;

    RgbImage::from_fn(width, height, |x, y| {
        let (sx, sy) = inverse.apply(x as f64, y as f64);
        // Replicate border pixels for samples falling outside the source
        let sx = sx.clamp(0.0, max_x);
        let sy = sy.clamp(0.0, max_y);

        let x0 = sx.floor() as u32;
        let y0 = sy.floor() as u32;
        let x1 = (x0 + 1).min(max_x as u32);
        let y1 = (y0 + 1).min(max_y as u32);
        let fx = sx - x0 as f64;
        let fy = sy - y0 as f64;

        let p00 = src.get_pixel(x0, y0);
        let p10 = src.get_pixel(x1, y0);
        let p01 = src.get_pixel(x0, y1);
        let p11 = src.get_pixel(x1, y1);

        let mut out = [0u8; 3];
        for c in 0..3 {
            let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
            let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
            out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}
